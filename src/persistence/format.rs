//! On-disk format for IVF index files.
//!
//! Every index (base, shard or merged) is a pair of files sharing a stem:
//!
//! ```text
//! 2018-08-07_a.index     # header, centroids, posting-list directory
//! 2018-08-07_a.ivfdata   # posting-list payloads (absent for an empty base)
//! ```
//!
//! # Index File
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Magic (4B): "IVFX"                      │
//! │ Format version (4B, LE)                 │
//! │ Body length (8B, LE)                    │
//! │ CRC32 of body (4B, LE)                  │
//! ├─────────────────────────────────────────┤
//! │ Body (postcard):                        │
//! │   - IndexHeader                         │
//! │   - Centroids (nlist x dimension f32)   │
//! │   - ListEntry per cluster               │
//! │   - Data file name (relative)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Data File
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Magic (4B): "IVFD"                      │
//! │ Format version (4B, LE)                 │
//! │ Dimension (4B, LE)                      │
//! │ Reserved (4B)                           │
//! ├─────────────────────────────────────────┤
//! │ Per cluster, at ListEntry::offset:      │
//! │   - codes: len x dimension f32 (LE)     │
//! │   - ids:   len x u64 (LE)               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The data file name is stored relative to the index file, so moving both
//! files of a pair together keeps the pair valid. Moving only one breaks it.

use super::error::{PersistenceError, PersistenceResult};
use crate::distance::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for index files.
pub const INDEX_MAGIC: &[u8; 4] = b"IVFX";

/// Magic bytes for posting-list data files.
pub const DATA_MAGIC: &[u8; 4] = b"IVFD";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Extension of the index (metadata) half of a pair.
pub const INDEX_EXTENSION: &str = "index";

/// Extension of the posting-list data half of a pair.
pub const DATA_EXTENSION: &str = "ivfdata";

/// Size of the fixed data file header; list payloads start at this offset.
pub const DATA_HEADER_LEN: u64 = 16;

const INDEX_PREAMBLE_LEN: usize = 4 + 4 + 8 + 4;

/// Index header metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    /// Vector dimension
    pub dimension: u32,
    /// Number of clusters (posting lists)
    pub nlist: u32,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Whether the coarse quantizer is trained
    pub is_trained: bool,
    /// Total vector count across all posting lists
    pub ntotal: u64,
    /// Checksum identifying the base index this file derives from
    pub base_fingerprint: u32,
}

impl IndexHeader {
    /// Bytes one stored vector occupies in a data file (codes + id).
    pub fn entry_size(&self) -> u64 {
        self.dimension as u64 * 4 + 8
    }
}

/// Location of one posting list inside the data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    /// Byte offset of the list payload in the data file
    pub offset: u64,
    /// Number of vectors in the list
    pub len: u64,
}

/// Decoded contents of an index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub header: IndexHeader,
    /// Flattened centroids, `nlist * dimension` values
    pub centroids: Vec<f32>,
    /// One entry per cluster; empty for a base index
    pub lists: Vec<ListEntry>,
    /// Data file name relative to the index file's directory
    pub data_file: Option<String>,
}

impl IndexFile {
    /// Sum of posting-list lengths.
    pub fn listed_vectors(&self) -> u64 {
        self.lists.iter().map(|l| l.len).sum()
    }
}

/// Path of the data file that pairs with `index_path`.
pub fn data_path_for(index_path: &Path) -> PathBuf {
    index_path.with_extension(DATA_EXTENSION)
}

/// Resolve the data file referenced by `file`, relative to `index_path`.
pub fn resolve_data_path(index_path: &Path, file: &IndexFile) -> Option<PathBuf> {
    let name = file.data_file.as_ref()?;
    let dir = index_path.parent().unwrap_or_else(|| Path::new("."));
    Some(dir.join(name))
}

/// Write an index file.
pub fn write_index_file(path: &Path, file: &IndexFile) -> PersistenceResult<()> {
    let body = postcard::to_stdvec(file)?;
    let checksum = crc32fast::hash(&body);

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(INDEX_MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&(body.len() as u64).to_le_bytes())?;
    writer.write_all(&checksum.to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Read and verify an index file.
pub fn read_index_file(path: &Path) -> PersistenceResult<IndexFile> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut preamble = [0u8; INDEX_PREAMBLE_LEN];
    reader.read_exact(&mut preamble).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            PersistenceError::Format("index file shorter than its preamble".to_string())
        } else {
            PersistenceError::Io(e)
        }
    })?;

    if &preamble[0..4] != INDEX_MAGIC {
        return Err(PersistenceError::Format("bad index magic".to_string()));
    }
    let version = u32::from_le_bytes(read_array(&preamble[4..8]));
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Format(format!(
            "unsupported index format version {version}"
        )));
    }
    let body_len = u64::from_le_bytes(read_array(&preamble[8..16]));
    let expected = u32::from_le_bytes(read_array(&preamble[16..20]));

    let mut body = Vec::new();
    reader.take(body_len).read_to_end(&mut body)?;
    if body.len() as u64 != body_len {
        return Err(PersistenceError::Format(format!(
            "index body truncated: expected {body_len} bytes, found {}",
            body.len()
        )));
    }

    let actual = crc32fast::hash(&body);
    if actual != expected {
        return Err(PersistenceError::ChecksumMismatch { expected, actual });
    }

    postcard::from_bytes(&body)
        .map_err(|e| PersistenceError::Deserialization(format!("postcard error: {e}")))
}

/// Write the fixed header at the start of a data file.
pub fn write_data_header<W: Write>(writer: &mut W, dimension: u32) -> PersistenceResult<()> {
    writer.write_all(DATA_MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&dimension.to_le_bytes())?;
    writer.write_all(&[0u8; 4])?;
    Ok(())
}

/// Validate a data file header and return the dimension it declares.
pub fn read_data_header(bytes: &[u8]) -> PersistenceResult<u32> {
    if bytes.len() < DATA_HEADER_LEN as usize {
        return Err(PersistenceError::Format(
            "data file shorter than its header".to_string(),
        ));
    }
    if &bytes[0..4] != DATA_MAGIC {
        return Err(PersistenceError::Format("bad data file magic".to_string()));
    }
    let version = u32::from_le_bytes(read_array(&bytes[4..8]));
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Format(format!(
            "unsupported data format version {version}"
        )));
    }
    Ok(u32::from_le_bytes(read_array(&bytes[8..12])))
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
