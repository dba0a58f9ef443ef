//! Configuration for the chart tiling pipeline.

use crate::dates::parse_chart_date;
use crate::workspace::{is_within, normalize_lexically};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Main configuration for the chart pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Charts known to the pipeline
    pub charts: Vec<ChartEntry>,

    /// Indexes into `charts` selecting what to process (all charts if omitted)
    #[serde(default)]
    pub process_indexes: Option<Vec<usize>>,

    /// Candidate publication dates
    #[serde(default)]
    pub chart_dates: Vec<String>,

    /// Optional JSON file with additional candidate dates (`{"ChartDates": [...]}`)
    #[serde(default)]
    pub chart_dates_file: Option<PathBuf>,

    /// Download URL templates
    #[serde(default)]
    pub download: DownloadConfig,

    /// Tile generation settings
    #[serde(default)]
    pub tiles: TileConfig,

    /// Workspace and cache layout
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// External tool command prefixes
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Log destination
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chart category; decides the archive layout and the download template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartCategory {
    Ifr,
    Vfr,
}

impl fmt::Display for ChartCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ifr => write!(f, "IFR"),
            Self::Vfr => write!(f, "VFR"),
        }
    }
}

/// One chart known to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartEntry {
    /// Name used in download URLs and cache keys (e.g. "Denver", "ENR_L")
    pub work_name: String,

    /// IFR or VFR
    pub category: ChartCategory,

    /// Display name for IFR charts; ignored for VFR charts
    #[serde(default)]
    pub alias: Option<String>,
}

/// Download URL templates. `<chartdate>` and `<charttype>` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_ifr_template")]
    pub ifr_template: String,

    #[serde(default = "default_vfr_template")]
    pub vfr_template: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ifr_template: default_ifr_template(),
            vfr_template: default_vfr_template(),
        }
    }
}

impl DownloadConfig {
    pub fn template_for(&self, category: ChartCategory) -> &str {
        match category {
            ChartCategory::Ifr => &self.ifr_template,
            ChartCategory::Vfr => &self.vfr_template,
        }
    }
}

/// Tile image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    Png,
    Webp,
}

impl TileFormat {
    /// Lower-case name used for file formats and database metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    /// Tile driver name understood by the tiler.
    pub fn driver(&self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Webp => "WEBP",
        }
    }
}

/// Layer type recorded in the database metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Overlay,
    Baselayer,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::Baselayer => "baselayer",
        }
    }
}

/// Inclusive zoom level range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

/// Highest zoom level accepted in configuration.
pub const MAX_ZOOM: u8 = 24;

impl ZoomRange {
    /// Parse `"min-max"` or a single level `"n"`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let parse_level = |s: &str| -> anyhow::Result<u8> {
            let level: u8 = s
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid zoom level '{}' in '{}'", s, raw))?;
            if level > MAX_ZOOM {
                anyhow::bail!("Zoom level {} exceeds maximum {}", level, MAX_ZOOM);
            }
            Ok(level)
        };

        let range = match raw.split_once('-') {
            Some((min, max)) => Self {
                min: parse_level(min)?,
                max: parse_level(max)?,
            },
            None => {
                let level = parse_level(raw)?;
                Self { min: level, max: level }
            }
        };

        if range.min > range.max {
            anyhow::bail!("Zoom range '{}' has min greater than max", raw);
        }
        Ok(range)
    }
}

impl fmt::Display for ZoomRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Tile generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileConfig {
    /// Zoom range, `"min-max"` or a single level
    #[serde(default = "default_zoom_range")]
    pub zoom_range: String,

    /// Tile image format
    #[serde(default = "default_tile_format")]
    pub format: TileFormat,

    /// Image quality percentage (1-100). PNG below 100 enables quantization.
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Layer type recorded in the database metadata
    #[serde(default = "default_layer_type")]
    pub layer_type: LayerType,

    /// Attribution text recorded in the database metadata
    #[serde(default = "default_attribution")]
    pub attribution: String,

    /// Worker processes used by the tiler
    #[serde(default = "default_tile_processes")]
    pub processes: usize,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            zoom_range: default_zoom_range(),
            format: default_tile_format(),
            quality: default_quality(),
            layer_type: default_layer_type(),
            attribution: default_attribution(),
            processes: default_tile_processes(),
        }
    }
}

impl TileConfig {
    /// Parsed zoom range. Call `Config::validate()` first to surface errors early.
    pub fn zoom(&self) -> anyhow::Result<ZoomRange> {
        ZoomRange::parse(&self.zoom_range)
    }

    /// Whether merged PNG tiles go through the quantizer.
    /// WEBP quality is applied by the tiler itself.
    pub fn quantize_enabled(&self) -> bool {
        self.format == TileFormat::Png && self.quality < 100
    }
}

/// Workspace, cache and clip-shape locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory holding the workspace, cache and clip shapes
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Workspace folder name under `base_dir`
    #[serde(default = "default_workarea_name")]
    pub workarea_name: String,

    /// Download cache folder name under `base_dir`
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Folder of per-chart clip shapes, relative to `base_dir`
    #[serde(default = "default_clip_shapes_dir")]
    pub clip_shapes_dir: PathBuf,

    /// Suffix the workspace folder with the chart date
    #[serde(default)]
    pub rename_by_date: bool,

    /// Remove everything but the databases from the workspace after the run
    #[serde(default)]
    pub clean_process_folders: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            workarea_name: default_workarea_name(),
            cache_name: default_cache_name(),
            clip_shapes_dir: default_clip_shapes_dir(),
            rename_by_date: false,
            clean_process_folders: false,
        }
    }
}

/// Command prefixes (program followed by leading arguments) for external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_fetch_tool")]
    pub fetch: Vec<String>,

    #[serde(default = "default_unzip_tool")]
    pub unzip: Vec<String>,

    #[serde(default = "default_translate_tool")]
    pub translate: Vec<String>,

    #[serde(default = "default_warp_tool")]
    pub warp: Vec<String>,

    #[serde(default = "default_overviews_tool")]
    pub overviews: Vec<String>,

    #[serde(default = "default_tiler_tool")]
    pub tiler: Vec<String>,

    #[serde(default = "default_merge_tool")]
    pub merge: Vec<String>,

    #[serde(default = "default_quantize_tool")]
    pub quantize: Vec<String>,

    #[serde(default = "default_package_tool")]
    pub package: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetch: default_fetch_tool(),
            unzip: default_unzip_tool(),
            translate: default_translate_tool(),
            warp: default_warp_tool(),
            overviews: default_overviews_tool(),
            tiler: default_tiler_tool(),
            merge: default_merge_tool(),
            quantize: default_quantize_tool(),
            package: default_package_tool(),
        }
    }
}

impl ToolsConfig {
    /// All tool prefixes with a label, in pipeline order.
    pub fn entries(&self) -> [(&'static str, &[String]); 9] {
        [
            ("fetch", self.fetch.as_slice()),
            ("unzip", self.unzip.as_slice()),
            ("translate", self.translate.as_slice()),
            ("warp", self.warp.as_slice()),
            ("overviews", self.overviews.as_slice()),
            ("tiler", self.tiler.as_slice()),
            ("merge", self.merge.as_slice()),
            ("quantize", self.quantize.as_slice()),
            ("package", self.package.as_slice()),
        ]
    }
}

/// Log destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to `file` instead of stdout
    #[serde(default)]
    pub to_file: bool,

    /// Log file path, relative to the working directory
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            to_file: false,
            file: default_log_file(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Charts selected for this run, in processing order.
    pub fn selected_charts(&self) -> Vec<&ChartEntry> {
        match &self.process_indexes {
            Some(indexes) => indexes.iter().filter_map(|&i| self.charts.get(i)).collect(),
            None => self.charts.iter().collect(),
        }
    }

    /// Gather and parse all candidate publication dates.
    pub fn candidate_dates(&self) -> anyhow::Result<Vec<NaiveDate>> {
        let mut raw = self.chart_dates.clone();
        if let Some(path) = &self.chart_dates_file {
            raw.extend(crate::dates::load_chart_dates_file(path)?);
        }

        raw.iter()
            .map(|s| parse_chart_date(s).map_err(anyhow::Error::from))
            .collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.charts.is_empty() {
            anyhow::bail!("At least one chart must be configured");
        }

        for (i, chart) in self.charts.iter().enumerate() {
            if chart.work_name.trim().is_empty() {
                anyhow::bail!("Chart {} has an empty work_name", i);
            }
            if chart.work_name.contains(['/', '\\']) {
                anyhow::bail!("Chart work_name '{}' must not contain path separators", chart.work_name);
            }
            if chart.category == ChartCategory::Ifr {
                match chart.alias.as_deref() {
                    Some(alias) if !alias.trim().is_empty() && !alias.contains(['/', '\\']) => {}
                    _ => anyhow::bail!("IFR chart '{}' needs a plain alias", chart.work_name),
                }
            }
        }

        if let Some(indexes) = &self.process_indexes {
            if let Some(bad) = indexes.iter().find(|&&i| i >= self.charts.len()) {
                anyhow::bail!(
                    "process_indexes entry {} is out of range (0..{})",
                    bad,
                    self.charts.len()
                );
            }
        }

        if self.chart_dates.is_empty() && self.chart_dates_file.is_none() {
            anyhow::bail!("Must specify chart_dates or chart_dates_file");
        }
        for raw in &self.chart_dates {
            parse_chart_date(raw)?;
        }

        for (name, template) in [
            ("ifr_template", &self.download.ifr_template),
            ("vfr_template", &self.download.vfr_template),
        ] {
            if !template.contains("<charttype>") {
                anyhow::bail!("download.{} must contain <charttype>", name);
            }
        }

        self.tiles.zoom()?;
        if self.tiles.quality == 0 || self.tiles.quality > 100 {
            anyhow::bail!("Tile quality must be 1-100");
        }
        if self.tiles.processes == 0 {
            anyhow::bail!("Tile processes must be > 0");
        }

        let workspace = &self.workspace;
        let root = normalize_lexically(&workspace.base_dir.join(&workspace.workarea_name));
        let cache = normalize_lexically(&workspace.base_dir.join(&workspace.cache_name));
        if is_within(&root, &cache) {
            anyhow::bail!(
                "workspace cache {} must not be or contain the workarea {}",
                cache.display(),
                root.display()
            );
        }

        for (name, prefix) in self.tools.entries() {
            if prefix.is_empty() || prefix[0].trim().is_empty() {
                anyhow::bail!("tools.{} must name a program", name);
            }
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_ifr_template() -> String {
    "https://aeronav.faa.gov/enroute/<chartdate>/<charttype>.zip".to_string()
}
fn default_vfr_template() -> String {
    "https://aeronav.faa.gov/visual/<chartdate>/sectional-files/<charttype>.zip".to_string()
}
fn default_zoom_range() -> String { "0-11".to_string() }
fn default_tile_format() -> TileFormat { TileFormat::Png }
fn default_quality() -> u8 { 100 }
fn default_layer_type() -> LayerType { LayerType::Overlay }
fn default_attribution() -> String { "Aeronautical charts courtesy of the FAA".to_string() }
fn default_tile_processes() -> usize { 4 }
fn default_base_dir() -> PathBuf { PathBuf::from(".") }
fn default_workarea_name() -> String { "workarea".to_string() }
fn default_cache_name() -> String { "chartcache".to_string() }
fn default_clip_shapes_dir() -> PathBuf { PathBuf::from("clipshapes") }
fn default_log_file() -> PathBuf { PathBuf::from("debug.log") }
fn default_fetch_tool() -> Vec<String> { vec!["wget".to_string()] }
fn default_unzip_tool() -> Vec<String> { vec!["unzip".to_string()] }
fn default_translate_tool() -> Vec<String> { vec!["gdal_translate".to_string()] }
fn default_warp_tool() -> Vec<String> { vec!["gdalwarp".to_string()] }
fn default_overviews_tool() -> Vec<String> { vec!["gdaladdo".to_string()] }
fn default_tiler_tool() -> Vec<String> { vec!["gdal2tiles.py".to_string()] }
fn default_merge_tool() -> Vec<String> { vec!["perl".to_string(), "./mergetiles.pl".to_string()] }
fn default_quantize_tool() -> Vec<String> { vec!["pngquant".to_string()] }
fn default_package_tool() -> Vec<String> { vec!["python3".to_string(), "./mbutil/mb-util".to_string()] }
