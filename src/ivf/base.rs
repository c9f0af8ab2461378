//! The trained, empty base index every shard derives from.

use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};
use crate::partitioning::{nearest_centroid, KMeans};
use crate::persistence::{read_index_file, write_index_file, IndexFile, IndexHeader, ListEntry};
use crate::persistence::PendingPair;
use std::path::Path;

/// Pre-trained coarse quantizer with empty posting lists.
///
/// A `BaseIndex` can only be constructed in a valid state (`is_trained`, no
/// vectors), so holding one is proof the build preconditions on the base hold.
/// It is never mutated; share it behind an `Arc` between builders and mergers.
#[derive(Debug, Clone)]
pub struct BaseIndex {
    dimension: usize,
    nlist: usize,
    metric: DistanceMetric,
    centroids: Vec<f32>,
    fingerprint: u32,
}

impl BaseIndex {
    /// Wrap already-trained centroids (`nlist * dimension` values, row-major).
    pub fn from_centroids(
        dimension: usize,
        centroids: Vec<f32>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        if centroids.is_empty() || centroids.len() % dimension != 0 {
            return Err(IndexError::InvalidBaseIndex {
                reason: format!(
                    "{} centroid values do not form whole {dimension}-d centroids",
                    centroids.len()
                ),
                is_trained: false,
                ntotal: 0,
            });
        }
        let nlist = centroids.len() / dimension;
        let fingerprint = fingerprint(dimension, metric, &centroids);
        Ok(Self {
            dimension,
            nlist,
            metric,
            centroids,
            fingerprint,
        })
    }

    /// Train centroids with seeded k-means over a row-major sample.
    pub fn train(
        dimension: usize,
        nlist: usize,
        sample: &[f32],
        metric: DistanceMetric,
        seed: u64,
    ) -> Result<Self> {
        if dimension == 0 || sample.len() % dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: sample.len(),
            });
        }
        let mut kmeans = KMeans::new(dimension, nlist)?
            .with_seed(seed)
            .with_metric(metric);
        kmeans.fit(sample, sample.len() / dimension)?;
        Self::from_centroids(dimension, kmeans.into_centroids(), metric)
    }

    /// Load a base index, rejecting untrained or populated files.
    pub fn load(path: &Path) -> Result<Self> {
        let file = read_index_file(path)?;
        Self::from_index_file(file)
    }

    /// Validate a decoded index file as a base.
    pub fn from_index_file(file: IndexFile) -> Result<Self> {
        let header = &file.header;
        if !header.is_trained || header.ntotal != 0 || file.listed_vectors() != 0 {
            return Err(IndexError::InvalidBaseIndex {
                reason: "index must be empty and pre-trained".to_string(),
                is_trained: header.is_trained,
                ntotal: header.ntotal.max(file.listed_vectors()),
            });
        }
        let dimension = header.dimension as usize;
        let metric = header.metric;
        let stored = header.base_fingerprint;
        let base = Self::from_centroids(dimension, file.centroids, metric)?;
        if base.nlist != file.header.nlist as usize || base.fingerprint != stored {
            return Err(IndexError::InvalidBaseIndex {
                reason: "centroids do not match the recorded nlist/fingerprint".to_string(),
                is_trained: true,
                ntotal: 0,
            });
        }
        Ok(base)
    }

    /// Persist as a standalone `.index` file (no data half).
    pub fn save(&self, path: &Path) -> Result<()> {
        let pending = PendingPair::new(path);
        if pending.conflicts().is_some() {
            return Err(IndexError::ShardPathConflict(path.to_path_buf()));
        }
        let mut file = self.empty_file();
        file.lists.clear();
        write_index_file(pending.tmp_index(), &file)?;
        pending.publish(false)?;
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Flattened centroids (nlist x dimension).
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Checksum over (dimension, metric, centroids) identifying this base.
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    /// Cluster a vector belongs to.
    pub fn assign(&self, vector: &[f32]) -> usize {
        nearest_centroid(self.metric, &self.centroids, vector)
    }

    /// Header describing an index derived from this base holding `ntotal` vectors.
    pub fn header(&self, ntotal: u64) -> IndexHeader {
        IndexHeader {
            dimension: self.dimension as u32,
            nlist: self.nlist as u32,
            metric: self.metric,
            is_trained: true,
            ntotal,
            base_fingerprint: self.fingerprint,
        }
    }

    /// A fresh, empty copy of the index structure.
    pub fn empty_file(&self) -> IndexFile {
        IndexFile {
            header: self.header(0),
            centroids: self.centroids.clone(),
            lists: vec![ListEntry::default(); self.nlist],
            data_file: None,
        }
    }

    /// Check that an index file was derived from this base.
    pub fn check_derived(&self, header: &IndexHeader) -> Result<()> {
        if header.dimension as usize != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: header.dimension as usize,
            });
        }
        if header.nlist as usize != self.nlist
            || header.metric != self.metric
            || header.base_fingerprint != self.fingerprint
        {
            return Err(IndexError::InvalidBaseIndex {
                reason: format!(
                    "index was built from base {:#010x}, not {:#010x}",
                    header.base_fingerprint, self.fingerprint
                ),
                is_trained: header.is_trained,
                ntotal: header.ntotal,
            });
        }
        Ok(())
    }
}

fn fingerprint(dimension: usize, metric: DistanceMetric, centroids: &[f32]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&(dimension as u64).to_le_bytes());
    hasher.update(&[metric.tag()]);
    for c in centroids {
        hasher.update(&c.to_le_bytes());
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn grid_base() -> BaseIndex {
        BaseIndex::from_centroids(2, vec![0.0, 0.0, 10.0, 10.0], DistanceMetric::L2).unwrap()
    }

    #[test]
    fn assigns_to_nearest_centroid() {
        let base = grid_base();
        assert_eq!(base.nlist(), 2);
        assert_eq!(base.assign(&[1.0, 1.0]), 0);
        assert_eq!(base.assign(&[9.0, 8.0]), 1);
    }

    #[test]
    fn save_then_load_keeps_identity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.index");
        let base = grid_base();
        base.save(&path).unwrap();

        let loaded = BaseIndex::load(&path).unwrap();
        assert_eq!(loaded.fingerprint(), base.fingerprint());
        assert_eq!(loaded.centroids(), base.centroids());
    }

    #[test]
    fn save_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.index");
        grid_base().save(&path).unwrap();
        assert!(matches!(
            grid_base().save(&path),
            Err(IndexError::ShardPathConflict(_))
        ));
    }

    #[test]
    fn populated_file_is_not_a_base() {
        let mut file = grid_base().empty_file();
        file.header.ntotal = 5;
        let err = BaseIndex::from_index_file(file).unwrap_err();
        assert!(matches!(err, IndexError::InvalidBaseIndex { ntotal: 5, .. }));
    }

    #[test]
    fn untrained_file_is_not_a_base() {
        let mut file = grid_base().empty_file();
        file.header.is_trained = false;
        assert!(matches!(
            BaseIndex::from_index_file(file),
            Err(IndexError::InvalidBaseIndex {
                is_trained: false,
                ..
            })
        ));
    }

    #[test]
    fn different_centroids_mean_different_base() {
        let other =
            BaseIndex::from_centroids(2, vec![0.0, 0.0, 5.0, 5.0], DistanceMetric::L2).unwrap();
        let base = grid_base();
        assert!(base.check_derived(&base.header(3)).is_ok());
        assert!(matches!(
            base.check_derived(&other.header(3)),
            Err(IndexError::InvalidBaseIndex { .. })
        ));
    }

    #[test]
    fn train_produces_requested_lists() {
        let sample: Vec<f32> = (0..64).flat_map(|i| [i as f32, (i % 8) as f32]).collect();
        let base = BaseIndex::train(2, 4, &sample, DistanceMetric::L2, 42).unwrap();
        assert_eq!(base.nlist(), 4);
        assert_eq!(base.dimension(), 2);
    }
}
