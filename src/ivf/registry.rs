//! Ordered, append-only list of built shards.

use super::base::BaseIndex;
use super::merge::{merge_shards, MergedIndex};
use crate::error::Result;
use crate::persistence::PersistenceResult;
use crate::shards::group::group_key;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One recorded shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub path: PathBuf,
    /// Group key parsed from the filename, if it has one.
    pub group_key: Option<String>,
}

/// Shard paths in build order; the unit of input to a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRegistry {
    entries: Vec<RegistryEntry>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shard path.
    pub fn record(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let group_key = group_key(&path);
        self.entries.push(RegistryEntry { path, group_key });
    }

    /// Append paths recorded elsewhere, e.g. by a previous run.
    pub fn extend<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            self.record(path);
        }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Recorded paths, in order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge every recorded shard into `output`.
    pub fn merge(&self, base: &BaseIndex, output: &Path) -> Result<MergedIndex> {
        merge_shards(&self.paths(), base, output)
    }

    /// Write the registry as JSON, replacing any previous manifest.
    pub fn save(&self, path: &Path) -> PersistenceResult<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> PersistenceResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_keep_order_and_group_keys() {
        let mut registry = ShardRegistry::new();
        registry.record("/shards/2018-08-07_b.index");
        registry.extend(["/shards/2018-08-06_a.index", "/shards/unnamed.index"]);

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.paths()[1],
            PathBuf::from("/shards/2018-08-06_a.index")
        );
        assert_eq!(registry.entries()[0].group_key.as_deref(), Some("2018-08-07"));
        assert_eq!(registry.entries()[2].group_key, None);
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        let mut registry = ShardRegistry::new();
        registry.record(dir.path().join("2020-01-01_x.index"));
        registry.save(&path).unwrap();

        assert_eq!(ShardRegistry::load(&path).unwrap(), registry);
    }
}
