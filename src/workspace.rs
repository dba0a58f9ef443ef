//! Workspace and download cache layout.
//!
//! ```text
//! <base_dir>/
//! ├── chartcache/                 persists across runs
//! │   └── <work>-<MM-DD-YYYY>.zip
//! ├── clipshapes/<chart>/<area>.shp
//! └── workarea[_<MM-DD-YYYY>]/
//!     ├── <chart>.db
//!     └── <chart>/
//!         ├── 1_unzipped/  2_expanded/  3_clipped/
//!         └── 4_tiled/     5_merged/    6_quantized/
//! ```

use crate::config::WorkspaceConfig;
use crate::dates::ChartDate;
use crate::error::{PipelineError, Result};
use std::path::{Component, Path, PathBuf};

/// Extension of packaged databases, the only workspace entries kept by cleanup.
pub const DATABASE_EXTENSION: &str = "db";

/// Per-chart stage folders, in data-flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageDir {
    Unzipped,
    Expanded,
    Clipped,
    Tiled,
    Merged,
    Quantized,
}

impl StageDir {
    pub const ALL: [StageDir; 6] = [
        StageDir::Unzipped,
        StageDir::Expanded,
        StageDir::Clipped,
        StageDir::Tiled,
        StageDir::Merged,
        StageDir::Quantized,
    ];

    pub fn folder_name(&self) -> &'static str {
        match self {
            Self::Unzipped => "1_unzipped",
            Self::Expanded => "2_expanded",
            Self::Clipped => "3_clipped",
            Self::Tiled => "4_tiled",
            Self::Merged => "5_merged",
            Self::Quantized => "6_quantized",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Unzipped => 0,
            Self::Expanded => 1,
            Self::Clipped => 2,
            Self::Tiled => 3,
            Self::Merged => 4,
            Self::Quantized => 5,
        }
    }
}

/// Create `dir` (and parents) unless it already exists.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    }
    Ok(())
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Whether `path` is `dir` or lies below it. Both must be lexically normalized.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    if dir == Path::new(".") {
        return path.is_relative() && !path.starts_with("..");
    }
    path.starts_with(dir)
}

/// Resolved locations for one run.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    cache: PathBuf,
    clip_shapes: PathBuf,
}

impl Workspace {
    /// Resolve the layout for a run on `date`. Nothing is created yet.
    pub fn new(config: &WorkspaceConfig, date: &ChartDate) -> Self {
        let mut root_name = config.workarea_name.clone();
        if config.rename_by_date {
            root_name.push('_');
            root_name.push_str(&date.to_string());
        }

        Self {
            root: normalize_lexically(&config.base_dir.join(root_name)),
            cache: normalize_lexically(&config.base_dir.join(&config.cache_name)),
            clip_shapes: config.base_dir.join(&config.clip_shapes_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    pub fn clip_shapes(&self) -> &Path {
        &self.clip_shapes
    }

    /// Cache key for a chart archive: `<work>-<MM-DD-YYYY>.zip`.
    pub fn cached_archive(&self, work_name: &str, date: &ChartDate) -> PathBuf {
        self.cache.join(format!("{}-{}.zip", work_name, date))
    }

    /// Output database for a chart.
    pub fn database_path(&self, chart_name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", chart_name, DATABASE_EXTENSION))
    }

    /// Create the workspace root and the download cache.
    pub fn prepare(&self) -> Result<()> {
        tracing::info!("Preparing workspace {}", self.root.display());
        ensure_dir(&self.root)?;
        ensure_dir(&self.cache)?;
        Ok(())
    }

    /// Create a chart folder and its six stage folders.
    pub fn prepare_chart(&self, stage_dirs: &[PathBuf]) -> Result<()> {
        for dir in stage_dirs {
            ensure_dir(dir)?;
        }
        Ok(())
    }

    /// Remove every workspace entry except packaged databases.
    ///
    /// Only the workspace root is touched. Nothing inside the cache is removed,
    /// even when the cache lives somewhere below the root. Returns the number of
    /// entries removed.
    pub fn clean(&self) -> Result<usize> {
        if is_within(&self.root, &self.cache) {
            tracing::warn!(
                "Workspace {} lies inside the cache {}; skipping cleanup",
                self.root.display(),
                self.cache.display()
            );
            return Ok(0);
        }

        let removed = self.clean_dir(&self.root)?;
        tracing::info!("Cleaned {} entries from {}", removed, self.root.display());
        Ok(removed)
    }

    fn clean_dir(&self, dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
        let mut removed = 0;

        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
            let path = entry.path();

            if is_within(&path, &self.cache) {
                continue;
            }
            // A folder holding the cache is emptied around it, not removed.
            if is_within(&self.cache, &path) {
                removed += self.clean_dir(&path)?;
                continue;
            }
            let is_database = path.is_file()
                && path.extension().is_some_and(|e| e == DATABASE_EXTENSION);
            if is_database {
                continue;
            }

            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> ChartDate {
        ChartDate::new(NaiveDate::from_ymd_opt(2024, 1, 25).unwrap())
    }

    fn config(base: &Path) -> WorkspaceConfig {
        WorkspaceConfig {
            base_dir: base.to_path_buf(),
            ..WorkspaceConfig::default()
        }
    }

    #[test]
    fn test_stage_dir_order() {
        let names: Vec<_> = StageDir::ALL.iter().map(|d| d.folder_name()).collect();
        assert_eq!(
            names,
            vec!["1_unzipped", "2_expanded", "3_clipped", "4_tiled", "5_merged", "6_quantized"]
        );
        for (i, dir) in StageDir::ALL.iter().enumerate() {
            assert_eq!(dir.index(), i);
        }
    }

    #[test]
    fn test_layout_paths() {
        let ws = Workspace::new(&config(Path::new("/data")), &date());
        assert_eq!(ws.root(), Path::new("/data/workarea"));
        assert_eq!(ws.cache(), Path::new("/data/chartcache"));
        assert_eq!(
            ws.cached_archive("Denver", &date()),
            PathBuf::from("/data/chartcache/Denver-01-25-2024.zip")
        );
        assert_eq!(ws.database_path("Denver"), PathBuf::from("/data/workarea/Denver.db"));
    }

    #[test]
    fn test_rename_by_date() {
        let mut cfg = config(Path::new("/data"));
        cfg.rename_by_date = true;
        let ws = Workspace::new(&cfg, &date());
        assert_eq!(ws.root(), Path::new("/data/workarea_01-25-2024"));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(&config(dir.path()), &date());

        ws.prepare().unwrap();
        ws.prepare().unwrap();
        assert!(ws.root().is_dir());
        assert!(ws.cache().is_dir());

        let stages: Vec<_> = StageDir::ALL
            .iter()
            .map(|d| ws.root().join("Denver").join(d.folder_name()))
            .collect();
        ws.prepare_chart(&stages).unwrap();
        ws.prepare_chart(&stages).unwrap();
        assert!(stages.iter().all(|s| s.is_dir()));
    }

    #[test]
    fn test_clean_keeps_databases_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(&config(dir.path()), &date());
        ws.prepare().unwrap();

        std::fs::create_dir_all(ws.root().join("Denver/5_merged/5")).unwrap();
        std::fs::write(ws.root().join("Denver/5_merged/5/a.png"), b"x").unwrap();
        std::fs::write(ws.root().join("Denver.db"), b"db").unwrap();
        std::fs::write(ws.root().join("stray.txt"), b"x").unwrap();
        std::fs::write(ws.cache().join("Denver-01-25-2024.zip"), b"zip").unwrap();

        let removed = ws.clean().unwrap();
        assert_eq!(removed, 2);
        assert!(ws.root().join("Denver.db").exists());
        assert!(!ws.root().join("Denver").exists());
        assert!(!ws.root().join("stray.txt").exists());
        assert!(ws.cache().join("Denver-01-25-2024.zip").exists());
    }

    #[test]
    fn test_clean_skips_cache_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.cache_name = "workarea/cache".to_string();
        let ws = Workspace::new(&cfg, &date());
        ws.prepare().unwrap();
        std::fs::write(ws.cache().join("x.zip"), b"zip").unwrap();

        ws.clean().unwrap();
        assert!(ws.cache().join("x.zip").exists());
    }

    #[test]
    fn test_clean_keeps_cache_nested_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.cache_name = "workarea/keep/cache".to_string();
        let ws = Workspace::new(&cfg, &date());
        ws.prepare().unwrap();
        std::fs::write(ws.cache().join("Denver-01-25-2024.zip"), b"zip").unwrap();
        std::fs::write(ws.root().join("keep/stray.txt"), b"x").unwrap();
        std::fs::create_dir_all(ws.root().join("Denver/1_unzipped")).unwrap();

        let removed = ws.clean().unwrap();
        assert_eq!(removed, 2);
        assert!(ws.cache().join("Denver-01-25-2024.zip").exists());
        assert!(!ws.root().join("keep/stray.txt").exists());
        assert!(!ws.root().join("Denver").exists());
    }

    #[test]
    fn test_clean_never_empties_cache_equal_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.cache_name = "workarea/".to_string();
        let ws = Workspace::new(&cfg, &date());
        assert_eq!(ws.root(), ws.cache());
        ws.prepare().unwrap();
        std::fs::write(ws.cache().join("Denver-01-25-2024.zip"), b"zip").unwrap();

        assert_eq!(ws.clean().unwrap(), 0);
        assert!(ws.cache().join("Denver-01-25-2024.zip").exists());
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(normalize_lexically(Path::new("/data/./workarea/")), PathBuf::from("/data/workarea"));
        assert_eq!(normalize_lexically(Path::new("/data/cache/../workarea")), PathBuf::from("/data/workarea"));
        assert_eq!(normalize_lexically(Path::new("./workarea")), PathBuf::from("workarea"));
        assert_eq!(normalize_lexically(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_lexically(Path::new(".")), PathBuf::from("."));
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within(Path::new("/data/workarea"), Path::new("/data/workarea")));
        assert!(is_within(Path::new("/data/workarea/cache"), Path::new("/data/workarea")));
        assert!(!is_within(Path::new("/data/workarea2"), Path::new("/data/workarea")));
        assert!(is_within(Path::new("workarea"), Path::new(".")));
        assert!(!is_within(Path::new("../workarea"), Path::new(".")));
        assert!(!is_within(Path::new("/data"), Path::new(".")));
    }
}
