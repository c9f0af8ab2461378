//! Disk persistence for IVF index pairs.
//!
//! - [`format`]: index / data file layout, magic bytes, checksums
//! - [`publish`]: staging under temporary names and atomic publication
//!
//! Files are immutable once published. Nothing in this module rewrites a
//! published file in place.

pub mod error;
pub mod format;
pub mod publish;

pub use error::{PersistenceError, PersistenceResult};
pub use format::{
    data_path_for, read_index_file, resolve_data_path, write_index_file, IndexFile, IndexHeader,
    ListEntry, DATA_EXTENSION, INDEX_EXTENSION,
};
pub use publish::PendingPair;
