//! Zipping: merge every date group of shards in a directory into one index.

use super::group::{find_index_paths, group_by_key};
use super::relocate::{
    prepare_destination, relocate_pair, unique_path, RelocateMode, MAX_UNIQUE_NAME_ATTEMPTS,
};
use crate::error::{IndexError, Result};
use crate::ivf::{merge_shards, BaseIndex, MergedIndex};
use crate::persistence::{data_path_for, INDEX_EXTENSION};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What happens to shards once their group has been merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Superseded {
    /// Delete both files of every merged shard.
    Remove,
    /// Leave the shards where they are.
    Keep,
    /// Move the shards into this directory.
    MoveTo(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ZipOptions {
    /// Suffix of merged output names: `<key>_<partial_name>.index`.
    pub partial_name: String,
    pub recursive: bool,
    /// Create the destination directory if it is missing.
    pub mkdir: bool,
    pub superseded: Superseded,
}

impl Default for ZipOptions {
    fn default() -> Self {
        Self {
            partial_name: "zipped".to_string(),
            recursive: false,
            mkdir: true,
            superseded: Superseded::Remove,
        }
    }
}

/// Result of a zip run.
#[derive(Debug, Default)]
pub struct ZipReport {
    /// One merged index per group key, in key order.
    pub merged: Vec<(String, MergedIndex)>,
    /// Shards removed or moved away after merging.
    pub retired: Vec<PathBuf>,
}

/// Merge each date group of shards under `src_dir` into `dst_dir`.
///
/// Every discovered shard must carry a group key; otherwise nothing is merged
/// and [`IndexError::UngroupableShard`] is returned. Groups are processed in key
/// order and the run stops at the first failing group. Groups merged before the
/// failure stay merged and their shards stay retired.
pub fn zip_indexes(
    src_dir: &Path,
    dst_dir: &Path,
    base: &BaseIndex,
    opts: &ZipOptions,
) -> Result<ZipReport> {
    if opts.partial_name.is_empty() || opts.partial_name.contains(std::path::is_separator) {
        return Err(IndexError::InvalidParameter(format!(
            "partial name {:?} is not a plain file name part",
            opts.partial_name
        )));
    }
    prepare_destination(dst_dir, opts.mkdir)?;
    if let Superseded::MoveTo(archive) = &opts.superseded {
        prepare_destination(archive, opts.mkdir)?;
    }

    let shards = find_index_paths(src_dir, opts.recursive)?;
    let groups = group_by_key(&shards)?;
    info!(shards = shards.len(), groups = groups.len(), "zipping shards");

    let mut report = ZipReport::default();
    for (key, paths) in groups {
        let wanted = dst_dir.join(format!("{key}_{}.{INDEX_EXTENSION}", opts.partial_name));
        let output = unique_path(&wanted, MAX_UNIQUE_NAME_ATTEMPTS)?;
        if output != wanted {
            warn!(wanted = %wanted.display(), using = %output.display(), "merged name taken");
        }

        let merged = merge_shards(&paths, base, &output)?;
        for shard in &paths {
            retire(shard, &opts.superseded)?;
        }
        if opts.superseded != Superseded::Keep {
            report.retired.extend(paths);
        }
        report.merged.push((key, merged));
    }
    Ok(report)
}

fn retire(shard: &Path, how: &Superseded) -> Result<()> {
    match how {
        Superseded::Keep => Ok(()),
        Superseded::Remove => {
            remove_if_present(&data_path_for(shard))?;
            fs::remove_file(shard)?;
            Ok(())
        }
        Superseded::MoveTo(dir) => {
            let name = shard
                .file_name()
                .ok_or_else(|| {
                    IndexError::InvalidParameter(format!("{} has no file name", shard.display()))
                })?;
            relocate_pair(shard, &dir.join(name), RelocateMode::Move)
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
