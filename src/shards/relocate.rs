//! Moving and copying index pairs between directories.
//!
//! Relocation is fail-fast: the first conflict or I/O error stops the run, and
//! the report lists what already moved and what was never attempted. Files
//! that moved are gone from the source, so re-running the same command after
//! fixing the conflict picks up exactly the remainder.

use super::group::find_index_paths;
use crate::error::{IndexError, Result};
use crate::persistence::data_path_for;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Upper bound on `_N` suffixes tried when looking for a free file name.
pub const MAX_UNIQUE_NAME_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateMode {
    Move,
    Copy,
}

#[derive(Debug, Clone)]
pub struct RelocateOptions {
    pub mode: RelocateMode,
    /// Also relocate `.index` files in subdirectories of the source.
    pub recursive: bool,
    /// Create the destination directory if it is missing.
    pub mkdir: bool,
}

impl Default for RelocateOptions {
    fn default() -> Self {
        Self {
            mode: RelocateMode::Move,
            recursive: false,
            mkdir: true,
        }
    }
}

/// Outcome of a relocation run.
#[derive(Debug, Default)]
pub struct RelocationReport {
    /// `(source, destination)` of every index file relocated, with its data half.
    pub relocated: Vec<(PathBuf, PathBuf)>,
    /// The index file that stopped the run, and why.
    pub failed: Option<(PathBuf, IndexError)>,
    /// Index files never attempted because of the failure.
    pub pending: Vec<PathBuf>,
}

impl RelocationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }

    /// The relocated pairs, or the error that stopped the run.
    pub fn into_result(self) -> Result<Vec<(PathBuf, PathBuf)>> {
        match self.failed {
            None => Ok(self.relocated),
            Some((_, err)) => Err(err),
        }
    }
}

/// Relocate every index pair found in `src_dir` into `dst_dir`.
///
/// Pairs from subdirectories (with `recursive`) land flat in `dst_dir`.
/// An existing destination file is never overwritten: the run stops with
/// [`IndexError::DestinationConflict`] recorded in the report.
pub fn relocate(src_dir: &Path, dst_dir: &Path, opts: &RelocateOptions) -> Result<RelocationReport> {
    prepare_destination(dst_dir, opts.mkdir)?;
    let sources = find_index_paths(src_dir, opts.recursive)?;
    let mut report = RelocationReport::default();

    let mut remaining = sources.into_iter();
    while let Some(src) = remaining.next() {
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = dst_dir.join(name);
        match relocate_pair(&src, &dst, opts.mode) {
            Ok(()) => {
                debug!(from = %src.display(), to = %dst.display(), "relocated index pair");
                report.relocated.push((src, dst));
            }
            Err(err) => {
                warn!(path = %src.display(), error = %err, "relocation stopped");
                report.failed = Some((src, err));
                report.pending = remaining.collect();
                break;
            }
        }
    }

    info!(
        relocated = report.relocated.len(),
        pending = report.pending.len(),
        complete = report.is_complete(),
        "relocation finished"
    );
    Ok(report)
}

/// Relocate one index file and its data file, data file first.
///
/// Both destinations are checked before anything is touched, so a conflict
/// leaves source and destination exactly as they were. If the index file then
/// fails to transfer, the data file is put back; a failed rollback is logged
/// with both halves of the split pair.
pub fn relocate_pair(src_index: &Path, dst_index: &Path, mode: RelocateMode) -> Result<()> {
    let src_data = data_path_for(src_index);
    let dst_data = data_path_for(dst_index);
    let has_data = src_data.exists();

    if dst_index.exists() {
        return Err(IndexError::DestinationConflict(dst_index.to_path_buf()));
    }
    if has_data && dst_data.exists() {
        return Err(IndexError::DestinationConflict(dst_data));
    }

    if has_data {
        transfer(&src_data, &dst_data, mode)?;
    }
    if let Err(err) = transfer(src_index, dst_index, mode) {
        if has_data {
            undo_transfer(&src_data, &dst_data, mode);
        }
        return Err(err);
    }
    Ok(())
}

fn undo_transfer(src: &Path, dst: &Path, mode: RelocateMode) {
    let undone = match mode {
        RelocateMode::Copy => fs::remove_file(dst).map_err(IndexError::from),
        RelocateMode::Move => transfer(dst, src, RelocateMode::Move),
    };
    match undone {
        Ok(()) => debug!(data = %src.display(), "rolled back data file"),
        Err(e) => error!(
            relocated = %dst.display(),
            origin = %src.display(),
            error = %e,
            "index pair left split: data file relocated without its index"
        ),
    }
}

/// Move or copy one file without overwriting `dst`.
pub fn transfer(src: &Path, dst: &Path, mode: RelocateMode) -> Result<()> {
    match mode {
        RelocateMode::Copy => copy_new(src, dst),
        RelocateMode::Move => {
            if dst.exists() {
                return Err(IndexError::DestinationConflict(dst.to_path_buf()));
            }
            match fs::rename(src, dst) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e.into()),
                Err(e) => {
                    // rename cannot cross filesystems; fall back to copy + unlink
                    debug!(from = %src.display(), error = %e, "rename failed, copying");
                    copy_new(src, dst)?;
                    fs::remove_file(src)?;
                    Ok(())
                }
            }
        }
    }
}

fn copy_new(src: &Path, dst: &Path) -> Result<()> {
    let mut from = File::open(src)?;
    let mut to = match OpenOptions::new().write(true).create_new(true).open(dst) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(IndexError::DestinationConflict(dst.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    io::copy(&mut from, &mut to)?;
    to.sync_all()?;
    Ok(())
}

/// First of `path`, `stem_1.ext`, `stem_2.ext`, ... whose index and data files
/// are both free.
///
/// Gives up with [`IndexError::DestinationConflict`] after `max_attempts`
/// suffixed candidates.
pub fn unique_path(path: &Path, max_attempts: usize) -> Result<PathBuf> {
    let is_free = |p: &Path| !p.exists() && !data_path_for(p).exists();
    if is_free(path) {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    for attempt in 1..=max_attempts {
        let candidate = path.with_file_name(format!("{stem}_{attempt}{ext}"));
        if is_free(&candidate) {
            return Ok(candidate);
        }
    }
    Err(IndexError::DestinationConflict(path.to_path_buf()))
}

pub(crate) fn prepare_destination(dst_dir: &Path, mkdir: bool) -> Result<()> {
    if dst_dir.is_dir() {
        return Ok(());
    }
    if mkdir {
        fs::create_dir_all(dst_dir)?;
        return Ok(());
    }
    Err(IndexError::InvalidParameter(format!(
        "destination {} is not a directory",
        dst_dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch_pair(dir: &Path, stem: &str) {
        fs::write(dir.join(format!("{stem}.index")), stem.as_bytes()).unwrap();
        fs::write(dir.join(format!("{stem}.ivfdata")), b"data").unwrap();
    }

    #[test]
    fn copy_keeps_source() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch_pair(src.path(), "2018-08-07_a");

        let opts = RelocateOptions {
            mode: RelocateMode::Copy,
            ..Default::default()
        };
        let report = relocate(src.path(), dst.path(), &opts).unwrap();
        assert!(report.is_complete());
        assert!(src.path().join("2018-08-07_a.index").exists());
        assert!(dst.path().join("2018-08-07_a.ivfdata").exists());
    }

    #[test]
    fn move_takes_both_halves() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch_pair(src.path(), "a");

        let report = relocate(src.path(), dst.path(), &RelocateOptions::default()).unwrap();
        assert_eq!(report.relocated.len(), 1);
        assert!(!src.path().join("a.ivfdata").exists());
        assert!(dst.path().join("a.index").exists());
        assert!(dst.path().join("a.ivfdata").exists());
    }

    #[test]
    fn conflicting_data_file_blocks_the_index_too() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch_pair(src.path(), "a");
        fs::write(dst.path().join("a.ivfdata"), b"old").unwrap();

        let err = relocate_pair(
            &src.path().join("a.index"),
            &dst.path().join("a.index"),
            RelocateMode::Move,
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::DestinationConflict(_)));
        assert!(src.path().join("a.index").exists());
        assert!(!dst.path().join("a.index").exists());
        assert_eq!(fs::read(dst.path().join("a.ivfdata")).unwrap(), b"old");
    }

    #[test]
    fn failed_index_transfer_puts_the_data_file_back() {
        for mode in [RelocateMode::Move, RelocateMode::Copy] {
            let src = TempDir::new().unwrap();
            let dst = TempDir::new().unwrap();
            // data half present, index half missing: the index transfer fails
            fs::write(src.path().join("a.ivfdata"), b"data").unwrap();

            let result = relocate_pair(
                &src.path().join("a.index"),
                &dst.path().join("a.index"),
                mode,
            );
            assert!(result.is_err());
            assert_eq!(fs::read(src.path().join("a.ivfdata")).unwrap(), b"data");
            assert!(!dst.path().join("a.ivfdata").exists());
            assert!(!dst.path().join("a.index").exists());
        }
    }

    #[test]
    fn unique_path_appends_a_counter() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("2018-08-07_zipped.index");
        assert_eq!(unique_path(&target, 3).unwrap(), target);

        fs::write(&target, b"").unwrap();
        fs::write(dir.path().join("2018-08-07_zipped_1.ivfdata"), b"").unwrap();
        assert_eq!(
            unique_path(&target, 3).unwrap(),
            dir.path().join("2018-08-07_zipped_2.index")
        );
    }

    #[test]
    fn unique_path_is_bounded() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("x.index");
        fs::write(&target, b"").unwrap();
        fs::write(dir.path().join("x_1.index"), b"").unwrap();
        assert!(matches!(
            unique_path(&target, 1),
            Err(IndexError::DestinationConflict(_))
        ));
    }

    #[test]
    fn missing_destination_without_mkdir_fails() {
        let src = TempDir::new().unwrap();
        let opts = RelocateOptions {
            mkdir: false,
            ..Default::default()
        };
        assert!(relocate(src.path(), &src.path().join("nope"), &opts).is_err());
    }
}
