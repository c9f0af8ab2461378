//! Group keys embedded in shard filenames, and shard discovery.

use crate::error::{IndexError, Result};
use crate::persistence::INDEX_EXTENSION;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static DATE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("date key regex must compile"));

/// ISO date (`YYYY-MM-DD`) embedded in the file name of `path`, if any.
///
/// The first substring that looks like a date and is a real calendar date wins,
/// so `2018-13-45_2018-08-07.index` groups under `2018-08-07`.
pub fn group_key(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    DATE_KEY.captures_iter(name).find_map(|caps| {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
    })
}

/// Group shard paths by their filename key, keeping input order inside a group.
///
/// Fails on the first path without a key.
pub fn group_by_key(paths: &[PathBuf]) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in paths {
        let key = group_key(path).ok_or_else(|| IndexError::UngroupableShard(path.clone()))?;
        groups.entry(key).or_default().push(path.clone());
    }
    Ok(groups)
}

/// `.index` files under `dir`, sorted. With `recursive`, subdirectories are
/// searched too. Hidden files (including staging temporaries) are skipped.
pub fn find_index_paths(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 });

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => IndexError::Io(io),
            None => IndexError::InvalidParameter(format!(
                "filesystem loop under {}",
                dir.display()
            )),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if !hidden && path.extension().and_then(|e| e.to_str()) == Some(INDEX_EXTENSION) {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn date_in_name_is_the_key() {
        assert_eq!(
            group_key(Path::new("/x/2018-08-07_a.index")).as_deref(),
            Some("2018-08-07")
        );
        assert_eq!(
            group_key(Path::new("shard-2021-02-28-part3.index")).as_deref(),
            Some("2021-02-28")
        );
        assert_eq!(group_key(Path::new("unnamed.index")), None);
    }

    #[test]
    fn impossible_dates_are_not_keys() {
        assert_eq!(group_key(Path::new("2018-02-30_a.index")), None);
        assert_eq!(
            group_key(Path::new("2018-13-45_2018-08-07.index")).as_deref(),
            Some("2018-08-07")
        );
    }

    #[test]
    fn directory_dates_do_not_count() {
        assert_eq!(group_key(Path::new("/2018-08-07/unnamed.index")), None);
    }

    #[test]
    fn grouping_rejects_keyless_shards() {
        let err = group_by_key(&[
            PathBuf::from("2018-08-07_a.index"),
            PathBuf::from("unnamed.index"),
        ])
        .unwrap_err();
        assert!(matches!(err, IndexError::UngroupableShard(p) if p == Path::new("unnamed.index")));
    }

    #[test]
    fn discovery_respects_recursion_and_skips_data_files() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("day");
        std::fs::create_dir(&sub).unwrap();
        for p in [
            dir.path().join("b.index"),
            dir.path().join("a.index"),
            dir.path().join("a.ivfdata"),
            dir.path().join(".a.index.tmp"),
            sub.join("c.index"),
        ] {
            std::fs::write(p, b"").unwrap();
        }

        let flat = find_index_paths(dir.path(), false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.index"), dir.path().join("b.index")]);

        let deep = find_index_paths(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&sub.join("c.index")));
    }
}
