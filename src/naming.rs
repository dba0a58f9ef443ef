//! Chart file name normalization and chart area discovery.
//!
//! Source archives ship images with mixed case, spaces, hyphens and a trailing
//! chart-category token (`Denver SEC.tif`). Everything downstream addresses
//! files by their normalized name (`denver.tif`).

use std::io;
use std::path::Path;

/// Primary raster extension.
pub const IMAGE_EXTENSION: &str = ".tif";

/// Primary raster plus its georeferencing sidecars.
pub const CHART_IMAGE_EXTENSIONS: &[&str] = &[".tif", ".tfw", ".tfwx"];

/// Chart-category tokens stripped from the end of a file stem.
const CATEGORY_SUFFIXES: &[&str] = &["_sec", "_tac"];

/// Areas whose names contain these markers are inset or planning sheets, not charts.
const EXCLUDED_AREA_MARKERS: &[&str] = &["fly", "planning"];

/// Split a name at its first dot into (stem, extension-with-dot).
fn split_extension(name: &str) -> (&str, &str) {
    match name.find('.') {
        Some(idx) => name.split_at(idx),
        None => (name, ""),
    }
}

/// Normalize a chart file name.
///
/// Lower-cases, turns spaces and hyphens into underscores, drops single quotes,
/// then strips the `_sec` / `_tac` category token from the end of the stem.
pub fn normalize_file_name(name: &str) -> String {
    let cleaned = name.to_lowercase().replace([' ', '-'], "_").replace('\'', "");
    let (mut stem, extension) = split_extension(&cleaned);

    while let Some(stripped) = CATEGORY_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
    {
        stem = stripped;
    }

    format!("{stem}{extension}")
}

/// Whether the file is a chart image or one of its sidecars.
pub fn is_chart_image_file(name: &str) -> bool {
    let (_, extension) = split_extension(name);
    let extension = extension.to_lowercase();
    CHART_IMAGE_EXTENSIONS.contains(&extension.as_str())
}

/// Rename every chart image and sidecar in `dir` to its normalized name.
///
/// Returns the number of files actually renamed.
pub fn normalize_directory(dir: &Path) -> io::Result<usize> {
    let mut renamed = 0;
    let entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;

    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!("Skipping non UTF-8 file name in {}", dir.display());
            continue;
        };
        if !is_chart_image_file(&name) {
            continue;
        }

        let normalized = normalize_file_name(&name);
        if normalized != name {
            let source = entry.path();
            let target = dir.join(&normalized);
            if overwrites_other_file(&source, &target) {
                tracing::warn!("{} replaces existing {}", name, target.display());
            }
            tracing::debug!("Renaming {} -> {}", name, normalized);
            std::fs::rename(&source, &target)?;
            renamed += 1;
        }
    }

    Ok(renamed)
}

/// Whether renaming `source` to `target` would replace a different file.
///
/// On case-insensitive filesystems the target can be the source itself.
fn overwrites_other_file(source: &Path, target: &Path) -> bool {
    if !target.exists() {
        return false;
    }
    match (std::fs::canonicalize(source), std::fs::canonicalize(target)) {
        (Ok(a), Ok(b)) => a != b,
        _ => true,
    }
}

/// List the chart areas available in an unzip folder, sorted by name.
///
/// An area is a primary image whose name contains none of the excluded markers;
/// the area name is the file name without its extension.
pub fn chart_areas(dir: &Path) -> io::Result<Vec<String>> {
    let mut areas = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();

        let Some(area) = name.strip_suffix(IMAGE_EXTENSION) else {
            continue;
        };
        if EXCLUDED_AREA_MARKERS.iter().any(|marker| area.contains(marker)) {
            continue;
        }
        areas.push(area.to_string());
    }

    areas.sort();
    Ok(areas)
}
