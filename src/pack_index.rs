//! Pack index (`.idx`) v2 lookup.
//!
//! Maps an object id to a byte offset in the paired `.pack` file. Two
//! implementations share the contract behind one enum:
//! - `MappedPackIndex` memory-maps the file, decodes all 256 fanout
//!   values at open, and indexes into the map thereafter;
//! - `StreamedPackIndex` owns a file handle and seeks per lookup.
//!
//! Both are read-only and validate structure up front: magic, version,
//! fanout monotonicity, and table sizes against the file length.
//!
//! # Layout (v2)
//! ```text
//! +----------------+
//! | Magic (4B)     |  0xff 't' 'O' 'c'
//! | Version (4B)   |  Big-endian 2
//! +----------------+
//! | Fanout (1024B) |  256 * u32 BE cumulative counts
//! +----------------+
//! | Name Table     |  N * 20 bytes (sorted)
//! +----------------+
//! | CRC Table      |  N * 4 bytes (skipped)
//! +----------------+
//! | Offset Table   |  N * 4 bytes (MSB=1 -> large offset)
//! +----------------+
//! | Large Offsets  |  M * 8 bytes (optional)
//! +----------------+
//! | Pack SHA (20B) |
//! | Idx SHA (20B)  |
//! +----------------+
//! ```

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::Mmap;

use crate::errors::GitError;
use crate::object_id::{ObjectId, OID_RAW_LEN};

const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
const IDX_VERSION: u32 = 2;
const IDX_HEADER_SIZE: u64 = 8;
const FANOUT_ENTRIES: usize = 256;
const FANOUT_SIZE: u64 = FANOUT_ENTRIES as u64 * 4;
/// Two trailing SHA-1 checksums (pack, then index).
const TRAILER_SIZE: u64 = 2 * OID_RAW_LEN as u64;
/// MSB flag routing a 4-byte offset through the large-offset table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Object-id-to-pack-offset lookup over a v2 index file.
///
/// The two variants implement the same contract; the choice is a
/// repository option (`use_mapped_index`).
#[derive(Debug)]
pub enum PackIndex {
    Mapped(MappedPackIndex),
    Streamed(StreamedPackIndex),
}

impl PackIndex {
    /// Opens an index file with the requested implementation.
    pub fn open(path: &Path, mapped: bool) -> Result<Self, GitError> {
        if mapped {
            MappedPackIndex::open(path).map(Self::Mapped)
        } else {
            StreamedPackIndex::open(path).map(Self::Streamed)
        }
    }

    /// Returns the pack offset for `id`, or `None` if the pack does not
    /// contain it.
    ///
    /// The `EMPTY` id is "not requested" and always misses.
    pub fn get_offset(&self, id: &ObjectId) -> Result<Option<u64>, GitError> {
        if id.is_empty() {
            return Ok(None);
        }
        match self {
            Self::Mapped(idx) => idx.get_offset(id),
            Self::Streamed(idx) => idx.get_offset(id),
        }
    }

    /// Number of objects in the index.
    #[must_use]
    pub fn object_count(&self) -> u32 {
        match self {
            Self::Mapped(idx) => idx.object_count,
            Self::Streamed(idx) => idx.object_count,
        }
    }
}

/// Validated table geometry shared by both implementations.
#[derive(Debug, Clone, Copy)]
struct IdxLayout {
    names_start: u64,
    offsets_start: u64,
    large_start: u64,
    large_count: u64,
}

impl IdxLayout {
    /// Computes table positions from the object count and file length.
    fn compute(object_count: u32, file_len: u64) -> Result<Self, GitError> {
        let n = u64::from(object_count);
        let names_start = IDX_HEADER_SIZE + FANOUT_SIZE;
        let crc_start = names_start + n * OID_RAW_LEN as u64;
        let offsets_start = crc_start + n * 4;
        let large_start = offsets_start + n * 4;

        let min_len = large_start + TRAILER_SIZE;
        if file_len < min_len {
            return Err(GitError::corrupt_index("file too small for tables"));
        }
        let large_bytes = file_len - large_start - TRAILER_SIZE;
        if large_bytes % 8 != 0 {
            return Err(GitError::corrupt_index(
                "large offset table not a multiple of 8 bytes",
            ));
        }

        Ok(Self {
            names_start,
            offsets_start,
            large_start,
            large_count: large_bytes / 8,
        })
    }
}

/// Validates the 8-byte header, returning the version on a good magic.
fn check_header(header: &[u8; 8]) -> Result<(), GitError> {
    if header[0..4] != IDX_MAGIC {
        return Err(GitError::corrupt_index("bad magic"));
    }
    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version != IDX_VERSION {
        return Err(GitError::UnsupportedFormat {
            detail: "pack index version is not 2",
        });
    }
    Ok(())
}

/// Validates fanout monotonicity and returns the decoded table.
fn decode_fanout(raw: &[u8]) -> Result<[u32; FANOUT_ENTRIES], GitError> {
    debug_assert_eq!(raw.len() as u64, FANOUT_SIZE);

    let mut fanout = [0u32; FANOUT_ENTRIES];
    let mut prev = 0u32;
    for (i, chunk) in raw.chunks_exact(4).enumerate() {
        let value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if value < prev {
            return Err(GitError::corrupt_index("fanout not monotonic"));
        }
        fanout[i] = value;
        prev = value;
    }
    Ok(fanout)
}

/// Resolves a raw 4-byte offset entry, following large-offset indirection.
fn resolve_offset_entry(
    raw: u32,
    read_large: impl FnOnce(u64) -> Result<u64, GitError>,
    large_count: u64,
) -> Result<u64, GitError> {
    if raw & LARGE_OFFSET_FLAG == 0 {
        return Ok(u64::from(raw));
    }
    let index = u64::from(raw & !LARGE_OFFSET_FLAG);
    if index >= large_count {
        return Err(GitError::corrupt_index("large offset index out of bounds"));
    }
    read_large(index)
}

/// Memory-mapped index: fanout decoded once, tables sliced thereafter.
#[derive(Debug)]
pub struct MappedPackIndex {
    map: Mmap,
    fanout: [u32; FANOUT_ENTRIES],
    object_count: u32,
    layout: IdxLayout,
}

impl MappedPackIndex {
    /// Opens and validates an index, mapping it for the reader's lifetime.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let file = File::open(path)?;
        // SAFETY: index files are immutable for the lifetime of a repository.
        let map = unsafe { Mmap::map(&file)? };

        let min_len = IDX_HEADER_SIZE + FANOUT_SIZE + TRAILER_SIZE;
        if (map.len() as u64) < min_len {
            return Err(GitError::corrupt_index("file too small"));
        }

        let header: &[u8; 8] = map[0..8].try_into().expect("header slice");
        check_header(header)?;

        let fanout_raw = &map[IDX_HEADER_SIZE as usize..(IDX_HEADER_SIZE + FANOUT_SIZE) as usize];
        let fanout = decode_fanout(fanout_raw)?;
        let object_count = fanout[FANOUT_ENTRIES - 1];
        let layout = IdxLayout::compute(object_count, map.len() as u64)?;

        Ok(Self {
            map,
            fanout,
            object_count,
            layout,
        })
    }

    fn get_offset(&self, id: &ObjectId) -> Result<Option<u64>, GitError> {
        let bucket = id.first_byte() as usize;
        let lo = if bucket == 0 {
            0
        } else {
            self.fanout[bucket - 1]
        };
        let hi = self.fanout[bucket];

        let Some(slot) = self.search_names(id, lo, hi) else {
            return Ok(None);
        };

        let entry_start = (self.layout.offsets_start + u64::from(slot) * 4) as usize;
        let raw = u32::from_be_bytes(
            self.map[entry_start..entry_start + 4]
                .try_into()
                .expect("offset entry"),
        );
        let offset = resolve_offset_entry(
            raw,
            |index| {
                let start = (self.layout.large_start + index * 8) as usize;
                Ok(u64::from_be_bytes(
                    self.map[start..start + 8].try_into().expect("large entry"),
                ))
            },
            self.layout.large_count,
        )?;
        Ok(Some(offset))
    }

    /// Binary search over the sorted name table within `[lo, hi)`.
    fn search_names(&self, id: &ObjectId, mut lo: u32, mut hi: u32) -> Option<u32> {
        let names_start = self.layout.names_start as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let start = names_start + mid as usize * OID_RAW_LEN;
            let name = &self.map[start..start + OID_RAW_LEN];
            match name.cmp(id.as_bytes().as_slice()) {
                Ordering::Equal => return Some(mid),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        None
    }
}

/// Seek-per-lookup index over an owned file handle.
///
/// Open-time validation reads the header and the full fanout table once
/// (for monotonicity and the object count); lookups afterwards seek for
/// the fanout bucket, the name probes, and the offset entries.
#[derive(Debug)]
pub struct StreamedPackIndex {
    file: RefCell<File>,
    object_count: u32,
    layout: IdxLayout,
}

impl StreamedPackIndex {
    /// Opens and validates an index file for streamed lookups.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut header = [0u8; 8];
        file.read_exact(&mut header)
            .map_err(|_| GitError::corrupt_index("file too small"))?;
        check_header(&header)?;

        let mut fanout_raw = vec![0u8; FANOUT_SIZE as usize];
        file.read_exact(&mut fanout_raw)
            .map_err(|_| GitError::corrupt_index("truncated fanout table"))?;
        let fanout = decode_fanout(&fanout_raw)?;
        let object_count = fanout[FANOUT_ENTRIES - 1];
        let layout = IdxLayout::compute(object_count, file_len)?;

        Ok(Self {
            file: RefCell::new(file),
            object_count,
            layout,
        })
    }

    fn get_offset(&self, id: &ObjectId) -> Result<Option<u64>, GitError> {
        let mut file = self.file.borrow_mut();

        let bucket = id.first_byte() as usize;
        let lo = if bucket == 0 {
            0
        } else {
            read_u32_at(&mut file, IDX_HEADER_SIZE + (bucket as u64 - 1) * 4)?
        };
        let hi = read_u32_at(&mut file, IDX_HEADER_SIZE + bucket as u64 * 4)?;
        if hi < lo || hi > self.object_count {
            return Err(GitError::corrupt_index("fanout outside name table"));
        }

        let Some(slot) = self.search_names(&mut file, id, lo, hi)? else {
            return Ok(None);
        };

        let raw = read_u32_at(&mut file, self.layout.offsets_start + u64::from(slot) * 4)?;
        let offset = resolve_offset_entry(
            raw,
            |index| read_u64_at(&mut file, self.layout.large_start + index * 8),
            self.layout.large_count,
        )?;
        Ok(Some(offset))
    }

    /// Binary search over the name table, one 20-byte read per probe.
    fn search_names(
        &self,
        file: &mut File,
        id: &ObjectId,
        mut lo: u32,
        mut hi: u32,
    ) -> Result<Option<u32>, GitError> {
        let mut name = [0u8; OID_RAW_LEN];
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let pos = self.layout.names_start + u64::from(mid) * OID_RAW_LEN as u64;
            file.seek(SeekFrom::Start(pos))?;
            file.read_exact(&mut name)
                .map_err(|_| GitError::corrupt_index("truncated name table"))?;
            match name.as_slice().cmp(id.as_bytes().as_slice()) {
                Ordering::Equal => return Ok(Some(mid)),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }
}

fn read_u32_at(file: &mut File, pos: u64) -> Result<u32, GitError> {
    let mut buf = [0u8; 4];
    file.seek(SeekFrom::Start(pos))?;
    file.read_exact(&mut buf)
        .map_err(|_| GitError::corrupt_index("truncated table read"))?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64_at(file: &mut File, pos: u64) -> Result<u64, GitError> {
    let mut buf = [0u8; 8];
    file.seek(SeekFrom::Start(pos))?;
    file.read_exact(&mut buf)
        .map_err(|_| GitError::corrupt_index("truncated large offset read"))?;
    Ok(u64::from_be_bytes(buf))
}
