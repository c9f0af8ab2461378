//! Cluster-by-cluster merge of shards into one on-disk index.

use super::base::BaseIndex;
use super::invlists::{MappedInvertedLists, OnDiskListWriter, ShardHandle};
use crate::error::{IndexError, Result};
use crate::persistence::{write_index_file, PendingPair};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A published merged index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedIndex {
    pub path: PathBuf,
    pub data_path: PathBuf,
    /// Vectors in the merged index; equals the sum of the shard counts.
    pub ntotal: u64,
    pub shard_count: usize,
}

/// Merge `shards` (all derived from `base`) into a new index at `output`.
///
/// Shard posting lists are memory-mapped and streamed one cluster at a time
/// into the output data file, so no shard's raw vectors are ever resident in
/// full. Every mapping is released before this function returns, whether it
/// succeeds or not, so callers may delete or move the shards right away.
///
/// The merged count is checked against the sum of the shard headers before
/// anything is published; on mismatch the staged files are discarded and
/// [`IndexError::MergeCountMismatch`] is returned.
pub fn merge_shards(shards: &[PathBuf], base: &BaseIndex, output: &Path) -> Result<MergedIndex> {
    if shards.is_empty() {
        return Err(IndexError::InvalidParameter(
            "no shards to merge".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = shards.iter().find(|p| !seen.insert(p.as_path())) {
        return Err(IndexError::InvalidParameter(format!(
            "shard {} listed twice",
            dup.display()
        )));
    }

    let pending = PendingPair::new(output);
    if let Some(existing) = pending.conflicts() {
        warn!(path = %existing.display(), "merge output already exists");
        return Err(IndexError::ShardPathConflict(existing.to_path_buf()));
    }

    let mut expected = 0u64;
    let mut lists: Vec<MappedInvertedLists> = Vec::with_capacity(shards.len());
    for path in shards {
        let handle = ShardHandle::open(path)?;
        base.check_derived(handle.header())?;
        expected += handle.vector_count();
        debug!(shard = %path.display(), vectors = handle.vector_count(), "mapped shard");
        lists.push(handle.detach_lists());
    }

    let mut file = base.empty_file();
    let mut writer = OnDiskListWriter::create(pending.tmp_data(), base.dimension())?;
    let mut actual = 0u64;
    for cluster in 0..base.nlist() {
        let codes: Vec<&[u8]> = lists.iter().map(|l| l.codes_bytes(cluster)).collect();
        let ids: Vec<&[u8]> = lists.iter().map(|l| l.ids_bytes(cluster)).collect();
        let entry = writer.write_list(&codes, &ids)?;
        actual += entry.len;
        file.lists[cluster] = entry;
    }
    writer.finish()?;
    drop(lists);

    if actual != expected {
        return Err(IndexError::MergeCountMismatch { expected, actual });
    }

    file.header.ntotal = actual;
    file.data_file = pending.data_file_name();
    write_index_file(pending.tmp_index(), &file)?;
    let data_path = pending.data_path().to_path_buf();
    let path = pending.publish(true)?;

    info!(
        path = %path.display(),
        shards = shards.len(),
        vectors = actual,
        "merged shards"
    );
    Ok(MergedIndex {
        path,
        data_path,
        ntotal: actual,
        shard_count: shards.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::ivf::ShardBuilder;
    use crate::persistence::{read_index_file, write_index_file};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn base() -> Arc<BaseIndex> {
        Arc::new(
            BaseIndex::from_centroids(2, vec![0.0, 0.0, 10.0, 10.0], DistanceMetric::L2).unwrap(),
        )
    }

    #[test]
    fn merged_count_is_sum_of_shards() {
        let dir = TempDir::new().unwrap();
        let mut builder = ShardBuilder::new(base());
        builder
            .build(&dir.path().join("a.index"), &[0.0, 0.0, 10.0, 9.0], &[1, 2])
            .unwrap();
        builder
            .build(&dir.path().join("b.index"), &[1.0, 1.0], &[3])
            .unwrap();

        let out = dir.path().join("merged.index");
        let merged = builder.registry().merge(&base(), &out).unwrap();
        assert_eq!(merged.ntotal, 3);
        assert_eq!(merged.shard_count, 2);

        let file = read_index_file(&out).unwrap();
        assert_eq!(file.header.ntotal, 3);
        assert_eq!(file.lists[0].len, 2);
        assert_eq!(file.lists[1].len, 1);
    }

    #[test]
    fn miscounted_shard_header_aborts_without_output() {
        let dir = TempDir::new().unwrap();
        let shard = dir.path().join("a.index");
        ShardBuilder::new(base())
            .build(&shard, &[0.0, 0.0], &[1])
            .unwrap();

        let mut file = read_index_file(&shard).unwrap();
        file.header.ntotal = 7;
        std::fs::remove_file(&shard).unwrap();
        write_index_file(&shard, &file).unwrap();

        let out = dir.path().join("merged.index");
        let err = merge_shards(&[shard], &base(), &out).unwrap_err();
        assert!(matches!(
            err,
            IndexError::MergeCountMismatch {
                expected: 7,
                actual: 1
            }
        ));
        assert!(!out.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn shard_from_another_base_is_rejected() {
        let dir = TempDir::new().unwrap();
        let shard = dir.path().join("a.index");
        ShardBuilder::new(base())
            .build(&shard, &[0.0, 0.0], &[1])
            .unwrap();

        let other =
            BaseIndex::from_centroids(2, vec![0.0, 0.0, 5.0, 5.0], DistanceMetric::L2).unwrap();
        assert!(matches!(
            merge_shards(&[shard], &other, &dir.path().join("m.index")),
            Err(IndexError::InvalidBaseIndex { .. })
        ));
    }

    #[test]
    fn existing_output_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let shard = dir.path().join("a.index");
        ShardBuilder::new(base())
            .build(&shard, &[0.0, 0.0], &[1])
            .unwrap();
        let out = dir.path().join("m.index");
        std::fs::write(&out, b"keep").unwrap();

        assert!(matches!(
            merge_shards(&[shard], &base(), &out),
            Err(IndexError::ShardPathConflict(_))
        ));
        assert_eq!(std::fs::read(&out).unwrap(), b"keep");
    }

    #[test]
    fn empty_and_duplicate_inputs_are_rejected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("m.index");
        assert!(merge_shards(&[], &base(), &out).is_err());

        let shard = dir.path().join("a.index");
        ShardBuilder::new(base())
            .build(&shard, &[0.0, 0.0], &[1])
            .unwrap();
        assert!(merge_shards(&[shard.clone(), shard], &base(), &out).is_err());
    }
}
