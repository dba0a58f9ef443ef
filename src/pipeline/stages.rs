//! Pipeline stages for one chart job.
//!
//! ```text
//! ┌─────────┐   ┌─────────┐   ┌───────────┐   ┌────────┐   ┌───────┐   ┌──────────┐   ┌─────────┐
//! │ Acquire │──▶│ Extract │──▶│ Normalize │──▶│ Raster │──▶│ Merge │──▶│ Quantize │──▶│ Package │
//! └─────────┘   └─────────┘   └───────────┘   └────────┘   └───────┘   └──────────┘   └─────────┘
//!   cache        1_unzipped    1_unzipped      2..4          5_merged    6_quantized    <chart>.db
//! ```
//!
//! Each stage reads only from earlier stage folders. A stage returns a
//! `StageOutcome` on success; per-unit failures inside a stage (one area, one
//! image) are counted rather than propagated.

use crate::config::{TileConfig, ZoomRange};
use crate::error::{PipelineError, Result};
use crate::job::ChartJob;
use crate::naming::{chart_areas, normalize_directory};
use crate::pipeline::batch::CommandBatch;
use crate::pipeline::cache::acquire_archive;
use crate::tools::{run_logged, CommandRunner, Toolchain};
use crate::workspace::StageDir;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Archive entries never extracted.
const EXTRACT_EXCLUDES: &[&str] = &["*.htm"];

/// Marker of the nested enroute low-altitude archives inside IFR bundles.
const ENROUTE_LOW_MARKER: &str = "ENR_L";

/// Extraction byproducts purged from IFR unzip folders.
const IFR_PURGE_EXTENSIONS: &[&str] = &["pdf", "htm", "zip"];

/// Log quantization progress every this many images.
const QUANTIZE_PROGRESS_INTERVAL: usize = 1000;

/// Metadata descriptor version.
const METADATA_VERSION: &str = "1.1";

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Extract,
    Normalize,
    RasterProcess,
    Merge,
    Quantize,
    Package,
}

impl Stage {
    /// Execution order.
    pub const ORDER: [Stage; 7] = [
        Stage::Acquire,
        Stage::Extract,
        Stage::Normalize,
        Stage::RasterProcess,
        Stage::Merge,
        Stage::Quantize,
        Stage::Package,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Extract => "extract",
            Self::Normalize => "normalize",
            Self::RasterProcess => "raster",
            Self::Merge => "merge",
            Self::Quantize => "quantize",
            Self::Package => "package",
        }
    }

    /// Run this stage for the job in `ctx`.
    pub fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome> {
        match self {
            Self::Acquire => acquire_archive(ctx),
            Self::Extract => extract_archive(ctx),
            Self::Normalize => normalize_names(ctx),
            Self::RasterProcess => process_areas(ctx),
            Self::Merge => merge_tiles(ctx),
            Self::Quantize => quantize_tiles(ctx),
            Self::Package => package_database(ctx),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a stage that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Ran over its units of work; `failed` units were logged and skipped.
    Completed { succeeded: usize, failed: usize },
    /// Cached output was reused.
    Reused,
    /// Nothing to do for this job.
    Skipped(&'static str),
}

impl StageOutcome {
    fn from_counts(succeeded: usize, failed: usize) -> Self {
        Self::Completed { succeeded, failed }
    }

    pub fn has_failures(&self) -> bool {
        matches!(self, Self::Completed { failed, .. } if *failed > 0)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { succeeded, failed: 0 } => write!(f, "ok ({})", succeeded),
            Self::Completed { succeeded, failed } => {
                write!(f, "partial ({} ok, {} failed)", succeeded, failed)
            }
            Self::Reused => write!(f, "reused"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// Read-only inputs shared by all stages of one job.
pub struct StageContext<'a> {
    pub job: &'a ChartJob,
    pub tiles: &'a TileConfig,
    pub zoom: ZoomRange,
    pub tools: Toolchain<'a>,
    pub runner: &'a dyn CommandRunner,
    pub cache_dir: &'a Path,
}

fn sorted_entries(dir: &Path) -> Result<Vec<std::fs::DirEntry>> {
    let mut entries = std::fs::read_dir(dir)
        .and_then(|it| it.collect::<std::io::Result<Vec<_>>>())
        .map_err(|e| PipelineError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Extract stage.
fn extract_archive(ctx: &StageContext<'_>) -> Result<StageOutcome> {
    let job = ctx.job;
    let unzip_dir = job.dir(StageDir::Unzipped);

    tracing::info!("Extracting {}", job.archive.display());
    run_logged(ctx.runner, &ctx.tools.unzip(&job.archive, unzip_dir, EXTRACT_EXCLUDES))?;

    if !job.is_ifr() {
        return Ok(StageOutcome::from_counts(1, 0));
    }

    // IFR bundles contain one archive per chart series.
    let mut succeeded = 1;
    let mut failed = 0;
    for entry in sorted_entries(unzip_dir)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(ENROUTE_LOW_MARKER) || !name.to_lowercase().ends_with(".zip") {
            continue;
        }
        match run_logged(ctx.runner, &ctx.tools.unzip(&entry.path(), unzip_dir, &[])) {
            Ok(()) => succeeded += 1,
            Err(_) => failed += 1,
        }
    }

    let purged = purge_by_extension(unzip_dir, IFR_PURGE_EXTENSIONS)?;
    tracing::info!("Purged {} extraction byproducts from {}", purged, unzip_dir.display());

    Ok(StageOutcome::from_counts(succeeded, failed))
}

/// Remove files in `dir` whose extension is one of `extensions` (case-insensitive).
fn purge_by_extension(dir: &Path, extensions: &[&str]) -> Result<usize> {
    let mut removed = 0;
    for entry in sorted_entries(dir)? {
        let path = entry.path();
        let matches = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| extensions.contains(&e.as_str()));
        if matches && path.is_file() {
            std::fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Normalize stage.
fn normalize_names(ctx: &StageContext<'_>) -> Result<StageOutcome> {
    let unzip_dir = ctx.job.dir(StageDir::Unzipped);
    let renamed = normalize_directory(unzip_dir).map_err(|e| PipelineError::io(unzip_dir, e))?;
    tracing::info!("Normalized {} chart file names", renamed);
    Ok(StageOutcome::from_counts(renamed, 0))
}

/// Intermediate and output paths of one chart area.
struct AreaPaths {
    source: PathBuf,
    shape: PathBuf,
    expanded: PathBuf,
    clipped: PathBuf,
    tiled: PathBuf,
}

impl AreaPaths {
    fn new(job: &ChartJob, area: &str) -> Self {
        Self {
            source: job.dir(StageDir::Unzipped).join(format!("{area}.tif")),
            shape: job.clip_shape_dir.join(format!("{area}.shp")),
            expanded: job.dir(StageDir::Expanded).join(format!("{area}.vrt")),
            clipped: job.dir(StageDir::Clipped).join(format!("{area}.vrt")),
            tiled: job.dir(StageDir::Tiled).join(area),
        }
    }
}

/// Translate, warp, build overviews and tile one area. Stops at the first failure.
fn process_area(ctx: &StageContext<'_>, area: &str) -> Result<()> {
    let paths = AreaPaths::new(ctx.job, area);
    let tools = &ctx.tools;

    run_logged(ctx.runner, &tools.translate(ctx.job.category, &paths.source, &paths.expanded))?;
    run_logged(ctx.runner, &tools.warp(&paths.shape, &paths.expanded, &paths.clipped))?;
    run_logged(ctx.runner, &tools.overviews(&paths.clipped))?;
    run_logged(
        ctx.runner,
        &tools.tile(
            ctx.zoom,
            ctx.tiles.processes,
            ctx.tiles.format,
            ctx.tiles.quality,
            &paths.clipped,
            &paths.tiled,
        ),
    )?;
    Ok(())
}

/// Raster stage.
fn process_areas(ctx: &StageContext<'_>) -> Result<StageOutcome> {
    let unzip_dir = ctx.job.dir(StageDir::Unzipped);
    let areas = chart_areas(unzip_dir).map_err(|e| PipelineError::io(unzip_dir, e))?;
    if areas.is_empty() {
        tracing::warn!("No chart areas found in {}", unzip_dir.display());
        return Ok(StageOutcome::Skipped("no chart areas"));
    }

    let mut succeeded = 0;
    let mut failed = 0;
    for area in &areas {
        tracing::info!("* chart {}", area);
        match process_area(ctx, area) {
            Ok(()) => succeeded += 1,
            Err(e) => {
                tracing::error!("Area {} failed: {}", area, e);
                failed += 1;
            }
        }
    }

    Ok(StageOutcome::from_counts(succeeded, failed))
}

/// Merge stage.
fn merge_tiles(ctx: &StageContext<'_>) -> Result<StageOutcome> {
    let tiled_dir = ctx.job.dir(StageDir::Tiled);
    let merged_dir = ctx.job.dir(StageDir::Merged);

    let mut succeeded = 0;
    let mut failed = 0;
    for entry in sorted_entries(tiled_dir)? {
        let source = entry.path();
        if !source.is_dir() {
            continue;
        }
        tracing::info!("Merging {}", source.display());
        match run_logged(ctx.runner, &ctx.tools.merge(&source, merged_dir)) {
            Ok(()) => succeeded += 1,
            Err(_) => failed += 1,
        }
    }

    if succeeded + failed == 0 {
        return Ok(StageOutcome::Skipped("no tiled areas"));
    }
    Ok(StageOutcome::from_counts(succeeded, failed))
}

/// Quantize stage. Images the quantizer rejects are copied unmodified.
fn quantize_tiles(ctx: &StageContext<'_>) -> Result<StageOutcome> {
    if !ctx.tiles.quantize_enabled() {
        return Ok(StageOutcome::Skipped("quantization not requested"));
    }

    let batch = CommandBatch::mirror_tile_tree(
        ctx.job.dir(StageDir::Merged),
        ctx.job.dir(StageDir::Quantized),
    )?;
    let quality = ctx.tiles.quality;
    tracing::info!("Quantizing {} png images at {}%", batch.len(), quality);

    let mut succeeded = 0;
    let mut copied = 0;
    let mut failed = 0;
    for (i, pair) in batch.iter().enumerate() {
        let command = ctx.tools.quantize(quality, &pair.source, &pair.destination);
        match ctx.runner.run(&command) {
            Ok(_) => succeeded += 1,
            Err(e) => {
                tracing::debug!("{}; copying original", e);
                match std::fs::copy(&pair.source, &pair.destination) {
                    Ok(_) => copied += 1,
                    Err(e) => {
                        tracing::error!("Failed to copy {}: {}", pair.source.display(), e);
                        failed += 1;
                    }
                }
            }
        }

        if (i + 1) % QUANTIZE_PROGRESS_INTERVAL == 0 {
            tracing::info!("{} of {} images processed", i + 1, batch.len());
        }
    }

    tracing::info!(
        "Total processed image count = {} ({} quantized, {} copied unmodified)",
        batch.len(),
        succeeded,
        copied
    );
    Ok(StageOutcome::from_counts(succeeded + copied, failed))
}

/// Metadata descriptor read by the packaging tool.
#[derive(Debug, Serialize)]
pub struct TileMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    pub format: String,
    pub quality: u8,
    pub minzoom: String,
    pub maxzoom: String,
    pub attribution: String,
}

impl TileMetadata {
    pub fn new(chart_name: &str, tiles: &TileConfig, zoom: ZoomRange) -> Self {
        Self {
            name: chart_name.to_string(),
            description: format!("{} Charts", chart_name.replace('_', " ")),
            version: METADATA_VERSION.to_string(),
            layer_type: tiles.layer_type.as_str().to_string(),
            format: tiles.format.as_str().to_string(),
            quality: tiles.quality,
            minzoom: zoom.min.to_string(),
            maxzoom: zoom.max.to_string(),
            attribution: tiles.attribution.clone(),
        }
    }
}

/// Package stage.
fn package_database(ctx: &StageContext<'_>) -> Result<StageOutcome> {
    let job = ctx.job;
    let source = if ctx.tiles.quantize_enabled() {
        job.dir(StageDir::Quantized)
    } else {
        job.dir(StageDir::Merged)
    };

    tracing::info!("Generating metadata json");
    let metadata = TileMetadata::new(&job.chart_name, ctx.tiles, ctx.zoom);
    let metadata_path = source.join("metadata.json");
    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| PipelineError::io(&metadata_path, e.into()))?;
    std::fs::write(&metadata_path, json).map_err(|e| PipelineError::io(&metadata_path, e))?;

    match std::fs::remove_file(&job.database) {
        Ok(()) => tracing::info!("Removed previous {}", job.database.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::io(&job.database, e)),
    }

    tracing::info!("Creating database: {}", job.database.display());
    run_logged(ctx.runner, &ctx.tools.package(ctx.tiles.format, source, &job.database))?;
    Ok(StageOutcome::from_counts(1, 0))
}
