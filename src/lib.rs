//! ivfshard: sharded on-disk IVF indexes for sentence-embedding search.
//!
//! Embeddings arrive in batches. Each batch becomes an immutable *shard*
//! built against a shared, pre-trained *base index*; shards are grouped by the
//! date in their file name and merged cluster-by-cluster into one index per
//! day, which is then deployed for search behind an LRU result cache.
//!
//! - [`ivf`]: base index, shard builder, registry, merger, deployed index
//! - [`shards`]: grouping, relocation and zipping of index files on disk
//! - [`search`]: the [`VectorSearch`] trait, caching and result ordering
//! - [`persistence`]: the index / data file format
//!
//! # Example
//!
//! ```no_run
//! use ivfshard::ivf::{BaseIndex, DeployedIndex, ShardBuilder};
//! use ivfshard::search::{CacheParams, CachedSearch};
//! use ivfshard::VectorSearch;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let base = Arc::new(BaseIndex::load(Path::new("base.index"))?);
//! let mut builder = ShardBuilder::new(base.clone());
//! # let (vectors, ids): (Vec<f32>, Vec<u64>) = (vec![], vec![]);
//! builder.build(Path::new("2018-08-07_a.index"), &vectors, &ids)?;
//!
//! let merged = builder.registry().merge(&base, Path::new("2018-08-07_zipped.index"))?;
//! let index = DeployedIndex::load(&merged.path, 32)?;
//! let cached = CachedSearch::new(index, CacheParams::default())?;
//! let results = cached.search(&vectors[..base.dimension()], 5)?;
//! # Ok::<(), ivfshard::IndexError>(())
//! ```

pub mod distance;
pub mod error;
pub mod ivf;
pub mod partitioning;
pub mod persistence;
pub mod search;
pub mod shards;
pub mod simd;

/// External vector id: `document_id * 10^4 + sentence_offset` by convention,
/// opaque to the index.
pub type VectorId = u64;

pub use distance::DistanceMetric;
pub use error::{IndexError, Result};
pub use search::{SearchResults, VectorSearch};
