//! Download cache for chart archives.
//!
//! One archive per chart is kept, keyed by work name and cycle date
//! (`<work>-<MM-DD-YYYY>.zip`). A cache hit skips the network entirely; a miss
//! first evicts the previous cycle's archive of the same chart.

use crate::error::{PipelineError, Result};
use crate::pipeline::{StageContext, StageOutcome};
use crate::tools::run_logged;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Whether `file_name` is a cache key `<work_name>-<MM-DD-YYYY>.zip`.
fn is_archive_of(file_name: &str, work_name: &str) -> bool {
    file_name
        .strip_prefix(work_name)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(".zip"))
        .is_some_and(|date| NaiveDate::parse_from_str(date, "%m-%d-%Y").is_ok())
}

/// Remove the cached archive of `work_name` other than `keep`, if there is one.
///
/// At most one archive is evicted; the cache never holds two for the same chart.
pub fn evict_stale_archive(cache: &Path, work_name: &str, keep: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(cache).map_err(|e| PipelineError::io(cache, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(cache, e))?;
        let path = entry.path();
        let name = entry.file_name();

        if path == keep || !is_archive_of(&name.to_string_lossy(), work_name) {
            continue;
        }

        std::fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
        return Ok(Some(path));
    }

    Ok(None)
}

/// Acquire stage: reuse the cached archive or fetch a fresh one.
pub fn acquire_archive(ctx: &StageContext<'_>) -> Result<StageOutcome> {
    let job = ctx.job;
    let archive = &job.archive;

    if archive.is_file() {
        tracing::info!("Using cached {}", archive.display());
        return Ok(StageOutcome::Reused);
    }

    if let Some(stale) = evict_stale_archive(ctx.cache_dir, &job.work_name, archive)? {
        tracing::info!("Evicted stale archive {}", stale.display());
    }

    tracing::info!("Downloading {} -> {}", job.url, archive.display());
    let command = ctx.tools.fetch(&job.url, archive);
    if let Err(e) = run_logged(ctx.runner, &command) {
        // The fetch tool creates its output before the transfer completes.
        if archive.exists() {
            if let Err(rm) = std::fs::remove_file(archive) {
                tracing::warn!("Failed to remove partial download {}: {}", archive.display(), rm);
            }
        }
        return Err(e.into());
    }

    Ok(StageOutcome::Completed {
        succeeded: 1,
        failed: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{JobFixture, RecordingRunner};
    use crate::tools::ToolCommand;

    #[test]
    fn test_is_archive_of() {
        assert!(is_archive_of("foo-01-01-2024.zip", "foo"));
        assert!(!is_archive_of("foobar-01-01-2024.zip", "foo"));
        assert!(!is_archive_of("foo-North-01-01-2024.zip", "foo"));
        assert!(!is_archive_of("foo-01-01-2024.tif", "foo"));
        assert!(is_archive_of("foo-North-01-01-2024.zip", "foo-North"));
    }

    #[test]
    fn test_evicts_only_same_chart() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path();
        std::fs::write(cache.join("foo-01-01-2024.zip"), b"old").unwrap();
        std::fs::write(cache.join("bar-01-01-2024.zip"), b"other").unwrap();

        let keep = cache.join("foo-02-01-2024.zip");
        let evicted = evict_stale_archive(cache, "foo", &keep).unwrap();

        assert_eq!(evicted, Some(cache.join("foo-01-01-2024.zip")));
        assert!(!cache.join("foo-01-01-2024.zip").exists());
        assert!(cache.join("bar-01-01-2024.zip").exists());

        assert_eq!(evict_stale_archive(cache, "foo", &keep).unwrap(), None);
    }

    #[test]
    fn test_cache_hit_skips_fetch() {
        let fixture = JobFixture::vfr("foo", "2024-02-01");
        std::fs::write(&fixture.job.archive, b"zip").unwrap();

        let runner = RecordingRunner::succeeding();
        let outcome = acquire_archive(&fixture.context(&runner)).unwrap();

        assert_eq!(outcome, StageOutcome::Reused);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_cache_miss_evicts_then_fetches() {
        let fixture = JobFixture::vfr("foo", "2024-02-01");
        let stale = fixture.workspace.cache().join("foo-01-01-2024.zip");
        std::fs::write(&stale, b"old").unwrap();

        let archive = fixture.job.archive.clone();
        let runner = RecordingRunner::new(move |cmd: &ToolCommand| {
            // The old archive must already be gone when the fetch runs.
            assert!(!stale.exists());
            std::fs::write(&archive, b"new").unwrap();
            let _ = cmd;
            Ok(String::new())
        });

        let outcome = acquire_archive(&fixture.context(&runner)).unwrap();
        assert_eq!(outcome, StageOutcome::Completed { succeeded: 1, failed: 0 });
        assert_eq!(runner.programs(), vec!["wget"]);

        let cached: Vec<_> = std::fs::read_dir(fixture.workspace.cache())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(cached, vec!["foo-02-01-2024.zip"]);
    }

    #[test]
    fn test_failed_fetch_leaves_no_archive() {
        let fixture = JobFixture::vfr("foo", "2024-02-01");
        let archive = fixture.job.archive.clone();
        let runner = RecordingRunner::new(move |cmd: &ToolCommand| {
            std::fs::write(&archive, b"").unwrap();
            Err(RecordingRunner::exit_error(cmd))
        });

        let err = acquire_archive(&fixture.context(&runner)).unwrap_err();
        assert!(!err.is_fatal());
        assert!(!fixture.job.archive.exists());
    }
}
