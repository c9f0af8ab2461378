//! Read-only, query-ready view of a merged index.

use super::invlists::MappedInvertedLists;
use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};
use crate::persistence::{read_index_file, resolve_data_path, IndexFile, PersistenceError};
use crate::search::{SearchResults, VectorSearch};
use crate::VectorId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Load-time search parameters.
#[derive(Clone, Debug)]
pub struct DeployParams {
    /// Posting lists probed per query. Clamped to the index's `nlist`.
    pub nprobe: usize,
}

impl Default for DeployParams {
    fn default() -> Self {
        Self { nprobe: 32 }
    }
}

/// A merged index opened for search with a fixed `nprobe`.
#[derive(Debug)]
pub struct DeployedIndex {
    path: PathBuf,
    dimension: usize,
    metric: DistanceMetric,
    centroids: Vec<f32>,
    lists: MappedInvertedLists,
    ntotal: u64,
    nprobe: usize,
}

impl DeployedIndex {
    /// Open `path` with the given fan-out.
    pub fn load(path: &Path, nprobe: usize) -> Result<Self> {
        Self::load_with(path, DeployParams { nprobe })
    }

    /// Open `path`, validating its structure.
    ///
    /// Any structural inconsistency (unreadable or checksum-failing index file,
    /// centroid or list table of the wrong size, list lengths disagreeing with
    /// the header, missing or truncated data file) is reported as
    /// [`IndexError::DeployableIndexCorrupt`].
    pub fn load_with(path: &Path, params: DeployParams) -> Result<Self> {
        if params.nprobe == 0 {
            return Err(IndexError::InvalidParameter(
                "nprobe must be greater than 0".to_string(),
            ));
        }
        let corrupt = |reason: String| IndexError::DeployableIndexCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let file = match read_index_file(path) {
            Ok(file) => file,
            Err(PersistenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::Io(e))
            }
            Err(e) => return Err(corrupt(e.to_string())),
        };
        validate_structure(&file).map_err(corrupt)?;

        let data_path = resolve_data_path(path, &file)
            .ok_or_else(|| corrupt("index has no posting-list data file".to_string()))?;
        let dimension = file.header.dimension as usize;
        let lists = MappedInvertedLists::open(&data_path, file.lists, dimension).map_err(corrupt)?;

        let nlist = file.header.nlist as usize;
        let nprobe = params.nprobe.min(nlist);
        info!(
            path = %path.display(),
            vectors = file.header.ntotal,
            nlist,
            nprobe,
            "deployed index"
        );

        Ok(Self {
            path: path.to_path_buf(),
            dimension,
            metric: file.header.metric,
            centroids: file.centroids,
            lists,
            ntotal: file.header.ntotal,
            nprobe,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.ntotal
    }

    pub fn is_empty(&self) -> bool {
        self.ntotal == 0
    }

    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    pub fn nlist(&self) -> usize {
        self.lists.nlist()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Search for the `k` nearest neighbors of each row of `queries`.
    ///
    /// Each row of the result is sorted by ascending distance, ties broken by
    /// ascending id, and holds at most `k` entries (fewer when the probed lists
    /// hold fewer vectors).
    pub fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        if k == 0 {
            return Err(IndexError::InvalidParameter(
                "k must be greater than 0".to_string(),
            ));
        }
        if queries.is_empty() || queries.len() % self.dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: queries.len(),
            });
        }

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<Neighbor>> = queries
            .par_chunks_exact(self.dimension)
            .map(|q| self.search_one(q, k))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<Neighbor>> = queries
            .chunks_exact(self.dimension)
            .map(|q| self.search_one(q, k))
            .collect();

        let mut results = SearchResults::with_capacity(rows.len());
        for row in rows {
            results.push_row(
                row.iter().map(|n| n.distance).collect(),
                row.iter().map(|n| n.id).collect(),
            );
        }
        Ok(results)
    }

    fn search_one(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut probes: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(list, centroid)| (list, self.metric.distance(query, centroid)))
            .collect();
        probes.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let probed = &probes[..self.nprobe.min(probes.len())];
        let candidates: u64 = probed.iter().map(|&(list, _)| self.lists.list_len(list)).sum();
        let capacity = usize::try_from(candidates).map_or(k, |c| c.min(k));

        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(capacity);
        let mut scratch = Vec::with_capacity(self.dimension);
        for &(list, _) in probed {
            self.lists.for_each_vector(list, &mut scratch, |id, vector| {
                let candidate = Neighbor {
                    distance: self.metric.distance(query, vector),
                    id,
                };
                if heap.len() < k {
                    heap.push(candidate);
                } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                    heap.pop();
                    heap.push(candidate);
                }
            });
        }
        heap.into_sorted_vec()
    }
}

impl VectorSearch for DeployedIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        DeployedIndex::search(self, queries, k)
    }
}

fn validate_structure(file: &IndexFile) -> std::result::Result<(), String> {
    let header = &file.header;
    let dimension = header.dimension as usize;
    let nlist = header.nlist as usize;
    if dimension == 0 || nlist == 0 {
        return Err(format!("dimension {dimension} / nlist {nlist} must be positive"));
    }
    if !header.is_trained {
        return Err("coarse quantizer is not trained".to_string());
    }
    if file.centroids.len() != nlist * dimension {
        return Err(format!(
            "{} centroid values, expected {}",
            file.centroids.len(),
            nlist * dimension
        ));
    }
    if file.lists.len() != nlist {
        return Err(format!("{} posting lists, expected {nlist}", file.lists.len()));
    }
    let listed = file.listed_vectors();
    if listed != header.ntotal {
        return Err(format!(
            "posting lists hold {listed} vectors, header claims {}",
            header.ntotal
        ));
    }
    Ok(())
}

/// Candidate ordered by (distance, id); the max-heap keeps the current worst on top.
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    distance: f32,
    id: VectorId,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}
