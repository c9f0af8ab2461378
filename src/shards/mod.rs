//! Directory-level shard management: grouping, relocation and zipping.

pub mod group;
pub mod relocate;
pub mod zip;

pub use group::{find_index_paths, group_by_key, group_key};
pub use relocate::{
    relocate, relocate_pair, unique_path, RelocateMode, RelocateOptions, RelocationReport,
    MAX_UNIQUE_NAME_ATTEMPTS,
};
pub use zip::{zip_indexes, Superseded, ZipOptions, ZipReport};
