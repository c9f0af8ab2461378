//! Temp-file staging for index pairs.
//!
//! Builds and merges write both halves of a pair under hidden temporary names in
//! the destination directory, then rename them into place only once everything
//! succeeded. Dropping an unpublished [`PendingPair`] removes the temporaries, so
//! a failed build or merge never leaves a partial artifact at the final path.

use super::error::{PersistenceError, PersistenceResult};
use super::format::data_path_for;
use std::path::{Path, PathBuf};

/// Staged index + data files awaiting publication.
#[derive(Debug)]
pub struct PendingPair {
    index_path: PathBuf,
    data_path: PathBuf,
    tmp_index: PathBuf,
    tmp_data: PathBuf,
    published: bool,
}

impl PendingPair {
    /// Stage a pair whose final index file will be `index_path`.
    pub fn new(index_path: &Path) -> Self {
        let data_path = data_path_for(index_path);
        Self {
            tmp_index: tmp_name(index_path),
            tmp_data: tmp_name(&data_path),
            index_path: index_path.to_path_buf(),
            data_path,
            published: false,
        }
    }

    /// True if either half of the final pair already exists.
    pub fn conflicts(&self) -> Option<&Path> {
        [&self.index_path, &self.data_path]
            .into_iter()
            .find(|p| p.exists())
            .map(PathBuf::as_path)
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Temporary path the index file should be written to.
    pub fn tmp_index(&self) -> &Path {
        &self.tmp_index
    }

    /// Temporary path the data file should be written to.
    pub fn tmp_data(&self) -> &Path {
        &self.tmp_data
    }

    /// File name the index should record for its data half.
    pub fn data_file_name(&self) -> Option<String> {
        self.data_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Move both temporaries to their final names.
    ///
    /// The data file goes first so a published index never points at a
    /// missing data file.
    pub fn publish(mut self, with_data: bool) -> PersistenceResult<PathBuf> {
        if let Some(existing) = self.conflicts() {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} appeared while staging", existing.display()),
            )));
        }
        if with_data {
            std::fs::rename(&self.tmp_data, &self.data_path)?;
        }
        std::fs::rename(&self.tmp_index, &self.index_path)?;
        self.published = true;
        Ok(self.index_path.clone())
    }
}

impl Drop for PendingPair {
    fn drop(&mut self) {
        if !self.published {
            let _ = std::fs::remove_file(&self.tmp_index);
            let _ = std::fs::remove_file(&self.tmp_data);
        }
    }
}

fn tmp_name(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}
