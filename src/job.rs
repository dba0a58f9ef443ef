//! Per-chart job context.

use crate::config::{ChartCategory, ChartEntry, DownloadConfig};
use crate::dates::ChartDate;
use crate::workspace::{StageDir, Workspace};
use std::path::{Path, PathBuf};

/// Everything one chart iteration needs, fixed at creation.
///
/// Built at the start of a chart iteration and handed by reference to every
/// stage; nothing in it is shared with other jobs.
#[derive(Debug, Clone)]
pub struct ChartJob {
    /// Name used in the download URL and the cache key
    pub work_name: String,

    /// Display name: the alias for IFR charts, the work name for VFR charts.
    /// Also names the chart folder and the output database.
    pub chart_name: String,

    pub category: ChartCategory,

    /// Resolved download URL
    pub url: String,

    /// Folder holding `<area>.shp` clip shapes for this chart
    pub clip_shape_dir: PathBuf,

    /// Cached archive location
    pub archive: PathBuf,

    /// Output database location
    pub database: PathBuf,

    folder: PathBuf,
    stage_dirs: [PathBuf; 6],
}

impl ChartJob {
    pub fn new(
        entry: &ChartEntry,
        download: &DownloadConfig,
        workspace: &Workspace,
        date: &ChartDate,
    ) -> Self {
        // IFR charts are addressed by their alias, VFR charts by work name.
        let (chart_name, shape_key) = match entry.category {
            ChartCategory::Ifr => {
                let alias = entry.alias.clone().unwrap_or_else(|| entry.work_name.clone());
                let key = alias.to_lowercase();
                (alias, key)
            }
            ChartCategory::Vfr => (entry.work_name.clone(), entry.work_name.to_lowercase()),
        };

        let url = download
            .template_for(entry.category)
            .replace("<chartdate>", &date.to_string())
            .replace("<charttype>", &entry.work_name);

        let folder = workspace.root().join(&chart_name);
        let stage_dirs = StageDir::ALL.map(|d| folder.join(d.folder_name()));

        Self {
            work_name: entry.work_name.clone(),
            category: entry.category,
            url,
            clip_shape_dir: workspace.clip_shapes().join(shape_key),
            archive: workspace.cached_archive(&entry.work_name, date),
            database: workspace.database_path(&chart_name),
            chart_name,
            folder,
            stage_dirs,
        }
    }

    pub fn is_ifr(&self) -> bool {
        self.category == ChartCategory::Ifr
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn dir(&self, stage: StageDir) -> &Path {
        &self.stage_dirs[stage.index()]
    }

    pub fn stage_dirs(&self) -> &[PathBuf] {
        &self.stage_dirs
    }
}
