//! Error types for ivfshard.

use crate::persistence::PersistenceError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, merging, relocating or searching indexes.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The base index handed to a build or merge is untrained or already populated.
    #[error("invalid base index: {reason} (is_trained: {is_trained}, ntotal: {ntotal})")]
    InvalidBaseIndex {
        reason: String,
        is_trained: bool,
        ntotal: u64,
    },

    /// A shard or merged index would be written over an existing artifact.
    #[error("shard path already exists: {}", .0.display())]
    ShardPathConflict(PathBuf),

    /// No group key could be extracted from the shard filename.
    #[error("shard has no recognizable group key: {}", .0.display())]
    UngroupableShard(PathBuf),

    /// A relocation target already exists.
    #[error("destination already exists: {}", .0.display())]
    DestinationConflict(PathBuf),

    /// The merged vector count does not equal the sum of shard counts.
    #[error("merge count mismatch: expected {expected} vectors, merged {actual}")]
    MergeCountMismatch { expected: u64, actual: u64 },

    /// A deployable index failed structural validation on load.
    #[error("deployable index {} is corrupt: {reason}", .path.display())]
    DeployableIndexCorrupt { path: PathBuf, reason: String },

    /// Dimension mismatch between a vector and the index.
    #[error("dimension mismatch: index has {expected} dimensions, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Two parallel inputs (vectors/ids, scores/ids) disagree in length.
    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Filesystem error outside the index file codec.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reading or writing an index file.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
