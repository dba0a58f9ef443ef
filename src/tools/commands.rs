//! Builders for every external command the pipeline issues.

use crate::config::{ChartCategory, TileFormat, ToolsConfig, ZoomRange};
use crate::tools::ToolCommand;
use std::ffi::OsString;
use std::path::Path;

/// Target spatial reference for reprojection.
pub const TARGET_SRS: &str = "EPSG:4326";

/// Pixel width of the alpha blend along the cutline.
const CUTLINE_BLEND: &str = "6";

fn flag_with_path(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

/// Builds commands from the configured tool prefixes.
#[derive(Debug, Clone, Copy)]
pub struct Toolchain<'a> {
    tools: &'a ToolsConfig,
}

impl<'a> Toolchain<'a> {
    pub fn new(tools: &'a ToolsConfig) -> Self {
        Self { tools }
    }

    /// Download `url` into `dest`.
    pub fn fetch(&self, url: &str, dest: &Path) -> ToolCommand {
        ToolCommand::from_prefix(&self.tools.fetch)
            .arg(url)
            .arg(flag_with_path("--output-document=", dest))
    }

    /// Extract `archive` into `dest`, overwriting, skipping entries matching `exclude`.
    pub fn unzip(&self, archive: &Path, dest: &Path, exclude: &[&str]) -> ToolCommand {
        let mut cmd = ToolCommand::from_prefix(&self.tools.unzip).arg("-o").path(archive);
        if !exclude.is_empty() {
            cmd = cmd.arg("-x").args(exclude.iter().copied());
        }
        cmd.arg("-d").path(dest)
    }

    /// Expand the source image into a virtual raster.
    ///
    /// VFR images carry a color table that is expanded to RGBA; IFR images are
    /// already RGB but need their spatial reference taken from the EPSG code.
    pub fn translate(&self, category: ChartCategory, src: &Path, dst: &Path) -> ToolCommand {
        let cmd = ToolCommand::from_prefix(&self.tools.translate)
            .args(["-strict", "-of", "vrt", "-co", "TILED=YES"]);
        let cmd = match category {
            ChartCategory::Ifr => cmd.args(["-co", "GTIFF_SRS_SOURCE=EPSG"]),
            ChartCategory::Vfr => cmd.args(["-expand", "rgba"]),
        };
        cmd.path(src).path(dst)
    }

    /// Reproject and clip to the cutline in `shape`.
    pub fn warp(&self, shape: &Path, src: &Path, dst: &Path) -> ToolCommand {
        ToolCommand::from_prefix(&self.tools.warp)
            .args(["-t_srs", TARGET_SRS, "-dstalpha", "-cblend", CUTLINE_BLEND, "-cutline"])
            .path(shape)
            .arg("-crop_to_cutline")
            .path(src)
            .path(dst)
    }

    /// Build overviews on all CPUs.
    pub fn overviews(&self, src: &Path) -> ToolCommand {
        ToolCommand::from_prefix(&self.tools.overviews)
            .args(["--config", "GDAL_NUM_THREADS", "ALL_CPUS"])
            .path(src)
    }

    /// Render the clipped raster into a TMS tile tree.
    pub fn tile(
        &self,
        zoom: ZoomRange,
        processes: usize,
        format: TileFormat,
        quality: u8,
        src: &Path,
        dst: &Path,
    ) -> ToolCommand {
        let mut cmd = ToolCommand::from_prefix(&self.tools.tiler)
            .arg(format!("--zoom={}", zoom))
            .arg(format!("--processes={}", processes))
            .arg(format!("--tiledriver={}", format.driver()));
        if format == TileFormat::Webp {
            cmd = cmd.arg(format!("--webp-quality={}", quality));
        }
        cmd.args(["--tmscompatible", "--webviewer=leaflet"])
            .path(src)
            .path(dst)
    }

    /// Merge one tile tree into the cumulative tree.
    pub fn merge(&self, src: &Path, dst: &Path) -> ToolCommand {
        ToolCommand::from_prefix(&self.tools.merge).path(src).path(dst)
    }

    /// Palette-reduce one PNG.
    pub fn quantize(&self, quality: u8, src: &Path, dst: &Path) -> ToolCommand {
        ToolCommand::from_prefix(&self.tools.quantize)
            .args(["--strip", "--skip-if-larger", "--force", "--quality"])
            .arg(quality.to_string())
            .path(src)
            .arg("--output")
            .path(dst)
    }

    /// Package a tile tree plus `metadata.json` into a single database file.
    pub fn package(&self, format: TileFormat, src: &Path, database: &Path) -> ToolCommand {
        ToolCommand::from_prefix(&self.tools.package)
            .arg(format!("--image_format={}", format.as_str()))
            .arg("--scheme=tms")
            .path(src)
            .path(database)
    }
}
