//! Memory-mapped and streaming posting lists.
//!
//! Posting lists never pass through an owning in-memory structure on their way
//! from a shard into a merged index: readers expose byte slices of a shared
//! mapping, and [`OnDiskListWriter`] streams those slices straight into the
//! output data file.

use crate::error::{IndexError, Result};
use crate::persistence::format::{read_data_header, write_data_header, DATA_HEADER_LEN};
use crate::persistence::{
    read_index_file, resolve_data_path, IndexFile, IndexHeader, ListEntry, PersistenceError,
};
use crate::VectorId;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only posting lists backed by a memory-mapped data file.
///
/// Cloning shares the mapping; the mapping is unmapped when the last clone drops.
#[derive(Debug, Clone)]
pub struct MappedInvertedLists {
    mmap: Arc<Mmap>,
    lists: Vec<ListEntry>,
    dimension: usize,
}

impl MappedInvertedLists {
    /// Map `data_path` and check every list lies inside it.
    ///
    /// Errors are returned as plain reasons; callers decide which error kind a
    /// structural problem maps to.
    pub fn open(
        data_path: &Path,
        lists: Vec<ListEntry>,
        dimension: usize,
    ) -> std::result::Result<Self, String> {
        let file = File::open(data_path)
            .map_err(|e| format!("cannot open posting lists {}: {e}", data_path.display()))?;
        // SAFETY: published data files are immutable; nothing writes to them
        // while a mapping is alive.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| format!("cannot map posting lists {}: {e}", data_path.display()))?;

        let declared = read_data_header(&mmap).map_err(|e| e.to_string())?;
        if declared as usize != dimension {
            return Err(format!(
                "data file declares dimension {declared}, index declares {dimension}"
            ));
        }

        let entry_size = dimension as u64 * 4 + 8;
        let file_len = mmap.len() as u64;
        // empty lists are checked too: their offset is still sliced on search
        for (i, list) in lists.iter().enumerate() {
            let end = list
                .len
                .checked_mul(entry_size)
                .and_then(|bytes| bytes.checked_add(list.offset));
            match end {
                Some(end) if list.offset >= DATA_HEADER_LEN && end <= file_len => {}
                _ => {
                    return Err(format!(
                        "posting list {i} ({} vectors at offset {}) exceeds data file of {file_len} bytes",
                        list.len, list.offset
                    ))
                }
            }
        }

        Ok(Self {
            mmap: Arc::new(mmap),
            lists,
            dimension,
        })
    }

    pub fn nlist(&self) -> usize {
        self.lists.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors in list `list`.
    pub fn list_len(&self, list: usize) -> u64 {
        self.lists[list].len
    }

    /// Total vectors across all lists.
    pub fn total(&self) -> u64 {
        self.lists.iter().map(|l| l.len).sum()
    }

    /// Raw little-endian f32 codes of list `list`.
    pub fn codes_bytes(&self, list: usize) -> &[u8] {
        let entry = self.lists[list];
        let start = entry.offset as usize;
        let len = entry.len as usize * self.dimension * 4;
        &self.mmap[start..start + len]
    }

    /// Raw little-endian u64 ids of list `list`.
    pub fn ids_bytes(&self, list: usize) -> &[u8] {
        let entry = self.lists[list];
        let start = entry.offset as usize + entry.len as usize * self.dimension * 4;
        let len = entry.len as usize * 8;
        &self.mmap[start..start + len]
    }

    /// Iterate `(id, codes)` of list `list`, decoding codes into `scratch`.
    pub fn for_each_vector<F>(&self, list: usize, scratch: &mut Vec<f32>, mut f: F)
    where
        F: FnMut(VectorId, &[f32]),
    {
        let row_bytes = self.dimension * 4;
        let codes = self.codes_bytes(list);
        let ids = self.ids_bytes(list);
        for (row, id) in codes.chunks_exact(row_bytes).zip(ids.chunks_exact(8)) {
            scratch.clear();
            scratch.extend(
                row.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
            let id = VectorId::from_le_bytes([id[0], id[1], id[2], id[3], id[4], id[5], id[6], id[7]]);
            f(id, scratch);
        }
    }
}

/// An opened shard: its decoded index file plus mapped posting lists.
///
/// The handle owns the metadata only. [`ShardHandle::detach_lists`] gives up the
/// handle while keeping the mapped storage alive for whoever holds the lists.
#[derive(Debug)]
pub struct ShardHandle {
    path: PathBuf,
    file: IndexFile,
    lists: MappedInvertedLists,
}

impl ShardHandle {
    /// Open a shard's index file and map its data file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = read_index_file(path)?;
        if file.lists.len() != file.header.nlist as usize {
            return Err(PersistenceError::Format(format!(
                "{} has {} posting lists, header declares {}",
                path.display(),
                file.lists.len(),
                file.header.nlist
            ))
            .into());
        }
        let data_path = resolve_data_path(path, &file).ok_or_else(|| {
            PersistenceError::Format(format!("{} has no posting-list data", path.display()))
        })?;
        let dimension = file.header.dimension as usize;
        let lists = MappedInvertedLists::open(&data_path, file.lists.clone(), dimension)
            .map_err(PersistenceError::Format)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            lists,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &IndexHeader {
        &self.file.header
    }

    /// Vector count the shard header claims.
    pub fn vector_count(&self) -> u64 {
        self.file.header.ntotal
    }

    /// Release the handle, keeping only the mapped lists.
    pub fn detach_lists(self) -> MappedInvertedLists {
        self.lists
    }
}

/// Sequential writer for a posting-list data file.
pub struct OnDiskListWriter {
    writer: BufWriter<File>,
    dimension: usize,
    offset: u64,
}

impl OnDiskListWriter {
    /// Create `path` and write the data file header.
    pub fn create(path: &Path, dimension: usize) -> Result<Self> {
        let mut writer = BufWriter::with_capacity(1 << 20, File::create(path)?);
        write_data_header(&mut writer, dimension as u32)?;
        Ok(Self {
            writer,
            dimension,
            offset: DATA_HEADER_LEN,
        })
    }

    /// Append one list assembled from code and id segments.
    ///
    /// All code segments are written before all id segments, so a list gathered
    /// from several shards ends up with the same layout as a freshly built one.
    pub fn write_list(&mut self, codes: &[&[u8]], ids: &[&[u8]]) -> Result<ListEntry> {
        let code_bytes: usize = codes.iter().map(|c| c.len()).sum();
        let id_bytes: usize = ids.iter().map(|c| c.len()).sum();
        let row_bytes = self.dimension * 4;
        if code_bytes % row_bytes != 0 || id_bytes % 8 != 0 || code_bytes / row_bytes != id_bytes / 8
        {
            return Err(IndexError::LengthMismatch {
                left: code_bytes / row_bytes,
                right: id_bytes / 8,
            });
        }

        let entry = ListEntry {
            offset: self.offset,
            len: (id_bytes / 8) as u64,
        };
        for segment in codes.iter().chain(ids) {
            self.writer.write_all(segment)?;
        }
        self.offset += (code_bytes + id_bytes) as u64;
        Ok(entry)
    }

    /// Append one list from decoded vectors and ids.
    pub fn write_vectors(&mut self, vectors: &[f32], ids: &[VectorId]) -> Result<ListEntry> {
        let codes: Vec<u8> = vectors.iter().flat_map(|v| v.to_le_bytes()).collect();
        let id_bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_le_bytes()).collect();
        self.write_list(&[&codes], &[&id_bytes])
    }

    /// Flush and fsync; returns the final file length.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.offset)
    }
}
