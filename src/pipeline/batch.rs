//! Bulk (source, destination) pairs for per-image tool invocations.

use crate::error::{PipelineError, Result};
use crate::workspace::ensure_dir;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Depth of leaf images below a tile tree root: `<zoom>/<x>/<y>.png`.
const TILE_DEPTH: usize = 3;

/// One image to process and where its result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Ordered list of image pairs, built and consumed within one stage.
#[derive(Debug, Default)]
pub struct CommandBatch {
    pairs: Vec<ImagePair>,
}

impl CommandBatch {
    /// Pair every leaf image under `source_root` with the same relative path
    /// under `dest_root`.
    ///
    /// Destination folders are created as they are first needed, so every
    /// destination parent exists when this returns.
    pub fn mirror_tile_tree(source_root: &Path, dest_root: &Path) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut created: HashSet<PathBuf> = HashSet::new();

        let walker = WalkDir::new(source_root)
            .min_depth(TILE_DEPTH)
            .max_depth(TILE_DEPTH)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source_root).to_path_buf();
                PipelineError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(source_root)
                .unwrap_or_else(|_| entry.path());
            let destination = dest_root.join(relative);

            if let Some(parent) = destination.parent() {
                if !created.contains(parent) {
                    ensure_dir(parent)?;
                    created.insert(parent.to_path_buf());
                }
            }

            pairs.push(ImagePair {
                source: entry.into_path(),
                destination,
            });
        }

        Ok(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImagePair> {
        self.pairs.iter()
    }
}

impl<'a> IntoIterator for &'a CommandBatch {
    type Item = &'a ImagePair;
    type IntoIter = std::slice::Iter<'a, ImagePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"png").unwrap();
    }

    #[test]
    fn test_mirrors_every_leaf_image() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("5_merged");
        let quantized = dir.path().join("6_quantized");
        std::fs::create_dir_all(&quantized).unwrap();

        let leaves = [
            "5/10/12.png",
            "5/10/13.png",
            "5/11/12.png",
            "6/20/24.png",
            "6/20/25.png",
            "6/21/24.png",
            "6/22/26.png",
        ];
        for leaf in leaves {
            touch(&merged.join(leaf));
        }
        // Files above leaf depth are not tiles.
        touch(&merged.join("metadata.json"));
        touch(&merged.join("5/stray.txt"));

        let batch = CommandBatch::mirror_tile_tree(&merged, &quantized).unwrap();
        assert_eq!(batch.len(), leaves.len());

        let mut sources: Vec<_> = batch
            .iter()
            .map(|p| p.source.strip_prefix(&merged).unwrap().to_path_buf())
            .collect();
        sources.sort();
        let mut expected: Vec<_> = leaves.iter().map(PathBuf::from).collect();
        expected.sort();
        assert_eq!(sources, expected);

        for pair in &batch {
            let rel_src = pair.source.strip_prefix(&merged).unwrap();
            let rel_dst = pair.destination.strip_prefix(&quantized).unwrap();
            assert_eq!(rel_src, rel_dst);
            assert!(pair.destination.parent().unwrap().is_dir());
            assert!(!pair.destination.exists());
        }
    }

    #[test]
    fn test_rebuild_over_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("m");
        let quantized = dir.path().join("q");
        touch(&merged.join("7/1/1.png"));
        std::fs::create_dir_all(quantized.join("7/1")).unwrap();

        let batch = CommandBatch::mirror_tile_tree(&merged, &quantized).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let batch = CommandBatch::mirror_tile_tree(dir.path(), &dir.path().join("q")).unwrap();
        assert!(batch.is_empty());
    }
}
