//! Sharded IVF index: base, shard building, merging and deployment.
//!
//! The life cycle of an index pair:
//!
//! 1. A trained, empty [`BaseIndex`] is loaded once and shared.
//! 2. [`ShardBuilder::build`] writes one immutable shard per batch of vectors.
//! 3. [`merge_shards`] streams the posting lists of many shards into one index.
//! 4. [`DeployedIndex::load`] opens the merged index for search.

pub mod base;
pub mod builder;
pub mod deploy;
pub mod invlists;
pub mod merge;
pub mod registry;

pub use base::BaseIndex;
pub use builder::{Shard, ShardBuilder};
pub use deploy::{DeployParams, DeployedIndex};
pub use invlists::{MappedInvertedLists, OnDiskListWriter, ShardHandle};
pub use merge::{merge_shards, MergedIndex};
pub use registry::{RegistryEntry, ShardRegistry};
