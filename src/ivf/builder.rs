//! Building immutable shards from (vector, id) batches.

use super::base::BaseIndex;
use super::invlists::OnDiskListWriter;
use super::registry::ShardRegistry;
use crate::error::{IndexError, Result};
use crate::persistence::{write_index_file, PendingPair, INDEX_EXTENSION};
use crate::VectorId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A published shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// The `.index` half.
    pub path: PathBuf,
    /// The `.ivfdata` half.
    pub data_path: PathBuf,
    pub vector_count: u64,
}

/// Builds shards against one shared base index and records them.
///
/// # Example
///
/// ```no_run
/// use ivfshard::ivf::{BaseIndex, ShardBuilder};
/// use std::sync::Arc;
///
/// let base = Arc::new(BaseIndex::load("base.index".as_ref())?);
/// let mut builder = ShardBuilder::new(base);
/// let vectors = vec![0.0f32; 2 * base_dim()];
/// builder.build("2018-08-07_a.index".as_ref(), &vectors, &[10_000, 10_001])?;
/// # fn base_dim() -> usize { 384 }
/// # Ok::<(), ivfshard::IndexError>(())
/// ```
#[derive(Debug)]
pub struct ShardBuilder {
    base: Arc<BaseIndex>,
    registry: ShardRegistry,
}

impl ShardBuilder {
    pub fn new(base: Arc<BaseIndex>) -> Self {
        Self::with_registry(base, ShardRegistry::new())
    }

    /// Continue recording into an existing registry.
    pub fn with_registry(base: Arc<BaseIndex>, registry: ShardRegistry) -> Self {
        Self { base, registry }
    }

    pub fn base(&self) -> &Arc<BaseIndex> {
        &self.base
    }

    pub fn registry(&self) -> &ShardRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> ShardRegistry {
        self.registry
    }

    /// Build a shard at `dest` from row-major `vectors` and their `ids`.
    ///
    /// Every call starts from empty posting lists; nothing from a previous build
    /// leaks into the next one. Both files are written under temporary names and
    /// only appear at `dest` once the whole shard is on disk.
    pub fn build(&mut self, dest: &Path, vectors: &[f32], ids: &[VectorId]) -> Result<Shard> {
        let dim = self.base.dimension();
        if dest.extension().and_then(|e| e.to_str()) != Some(INDEX_EXTENSION) {
            return Err(IndexError::InvalidParameter(format!(
                "shard path {} must end in .{INDEX_EXTENSION}",
                dest.display()
            )));
        }
        if ids.is_empty() {
            return Err(IndexError::InvalidParameter(
                "cannot build a shard from an empty batch".to_string(),
            ));
        }
        if vectors.len() % dim != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: vectors.len() % dim,
            });
        }
        if vectors.len() / dim != ids.len() {
            return Err(IndexError::LengthMismatch {
                left: vectors.len() / dim,
                right: ids.len(),
            });
        }

        let pending = PendingPair::new(dest);
        if let Some(existing) = pending.conflicts() {
            return Err(IndexError::ShardPathConflict(existing.to_path_buf()));
        }

        let assignments = self.assign_all(vectors);
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.base.nlist()];
        for (row, &cluster) in assignments.iter().enumerate() {
            members[cluster].push(row);
        }

        let mut file = self.base.empty_file();
        let mut writer = OnDiskListWriter::create(pending.tmp_data(), dim)?;
        let mut codes = Vec::new();
        let mut list_ids = Vec::new();
        for (cluster, rows) in members.iter().enumerate() {
            codes.clear();
            list_ids.clear();
            for &row in rows {
                codes.extend_from_slice(&vectors[row * dim..(row + 1) * dim]);
                list_ids.push(ids[row]);
            }
            file.lists[cluster] = writer.write_vectors(&codes, &list_ids)?;
        }
        let bytes = writer.finish()?;
        debug!(path = %dest.display(), bytes, "wrote shard posting lists");

        file.header.ntotal = ids.len() as u64;
        file.data_file = pending.data_file_name();
        write_index_file(pending.tmp_index(), &file)?;
        let data_path = pending.data_path().to_path_buf();
        let path = pending.publish(true)?;

        info!(
            path = %path.display(),
            vectors = ids.len(),
            nonempty_lists = members.iter().filter(|m| !m.is_empty()).count(),
            "built shard"
        );
        self.registry.record(&path);

        Ok(Shard {
            path,
            data_path,
            vector_count: ids.len() as u64,
        })
    }

    fn assign_all(&self, vectors: &[f32]) -> Vec<usize> {
        let dim = self.base.dimension();
        #[cfg(feature = "parallel")]
        {
            vectors
                .par_chunks_exact(dim)
                .map(|v| self.base.assign(v))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            vectors
                .chunks_exact(dim)
                .map(|v| self.base.assign(v))
                .collect()
        }
    }
}
