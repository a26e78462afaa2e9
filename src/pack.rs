//! Pack file reading: entry headers, object streams, delta chains.
//!
//! A `Pack` pairs a `.pack` file with its `.idx` sidecar. The index is
//! opened on the first lookup; the pack header is validated on the first
//! object read. Object reads go through a FIFO pool of file handles so
//! recursive delta resolution does not reopen the file per hop.
//!
//! # Entry header encoding
//! The first byte carries the object type in bits 4-6 and the low 4 bits
//! of the inflated size; continuation bytes add 7 size bits each,
//! least-significant first. `ofs-delta` entries follow with a distance
//! varint using Git's off-by-one accumulation; `ref-delta` entries follow
//! with a raw 20-byte base id. The zlib frame begins immediately after.
//!
//! # Delta resolution
//! Chains materialize bottom-up: the base is resolved first (by offset
//! within this pack, or by id through the `BaseResolver` for ref deltas),
//! the script is applied, and the result lands in the shared object cache
//! before a buffer stream is returned. Non-delta entries stream straight
//! from the pack through a pooled handle.

use std::cell::{Cell, RefCell};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use crate::delta::apply_delta;
use crate::errors::GitError;
use crate::file_pool::{HandlePool, PooledFile};
use crate::object_cache::ObjectCache;
use crate::object_id::{ObjectId, OID_RAW_LEN};
use crate::object_stream::ObjectStream;
use crate::object_type::ObjectType;
use crate::pack_index::PackIndex;
use crate::zlib_stream::{inflate_exact, ZlibStreamReader};

/// Pack header size: magic(4) + version(4) + object count(4).
const PACK_HEADER_SIZE: u64 = 12;
/// Trailing SHA-1 over the pack contents.
const PACK_TRAILER_SIZE: u64 = 20;
/// Upper bound on an encoded entry header: size varint (10) plus either
/// an ofs varint (10) or a raw base id (20).
const MAX_ENTRY_HEADER_BYTES: usize = 48;

/// Resolves ref-delta bases outside the current pack.
///
/// The repository implements this so base lookup traverses every pack and
/// loose storage, not just the pack holding the delta.
pub trait BaseResolver {
    /// Returns the object for `id`, or `None` if no source contains it.
    fn base_object(&self, id: &ObjectId) -> Result<Option<ObjectStream>, GitError>;
}

/// Parsed pack entry kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PackEntryKind {
    /// Stored object (commit, tree, blob, tag).
    Stored(ObjectType),
    /// Delta against a base earlier in the same pack.
    OfsDelta { base_offset: u64 },
    /// Delta against a base identified by id.
    RefDelta { base_id: ObjectId },
}

/// Parsed entry header; the zlib frame starts at `data_start`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PackEntryHeader {
    pub(crate) kind: PackEntryKind,
    /// Inflated payload size (the delta script size for delta entries).
    pub(crate) size: u64,
    pub(crate) data_start: u64,
}

/// One `.pack`/`.idx` pair within a repository.
#[derive(Debug)]
pub struct Pack {
    pack_id: usize,
    idx_path: PathBuf,
    use_mapped_index: bool,
    index: RefCell<Option<Rc<PackIndex>>>,
    pool: HandlePool,
    /// End of object data (file length minus trailer), set on first read.
    data_end: Cell<Option<u64>>,
    cache: Rc<RefCell<ObjectCache>>,
}

impl Pack {
    pub(crate) fn new(
        pack_id: usize,
        idx_path: PathBuf,
        pack_path: PathBuf,
        use_mapped_index: bool,
        cache: Rc<RefCell<ObjectCache>>,
    ) -> Self {
        Self {
            pack_id,
            idx_path,
            use_mapped_index,
            index: RefCell::new(None),
            pool: HandlePool::new(pack_path),
            data_end: Cell::new(None),
            cache,
        }
    }

    /// Returns the pack offset for `id`, opening the index on first use.
    pub(crate) fn offset_of(&self, id: &ObjectId) -> Result<Option<u64>, GitError> {
        self.index()?.get_offset(id)
    }

    /// Reads the object at `offset`, resolving delta chains.
    ///
    /// `expected` is validated against the effective type (a delta's type
    /// is its resolved base's).
    pub(crate) fn read_at(
        &self,
        bases: &dyn BaseResolver,
        offset: u64,
        expected: Option<ObjectType>,
    ) -> Result<ObjectStream, GitError> {
        let data_end = self.ensure_open()?;

        let cached = self.cache.borrow_mut().get(self.pack_id, offset);
        if let Some((object_type, bytes)) = cached {
            check_expected(expected, object_type)?;
            return Ok(ObjectStream::from_buffer(object_type, bytes));
        }

        let mut file = self.pool.acquire()?;
        let header = self.entry_header_at(&mut file, offset, data_end)?;

        match header.kind {
            PackEntryKind::Stored(object_type) => {
                check_expected(expected, object_type)?;
                file.seek(SeekFrom::Start(header.data_start))?;
                let reader = ZlibStreamReader::new(file, header.size);
                Ok(ObjectStream::from_pack_frame(object_type, header.size, reader))
            }
            PackEntryKind::OfsDelta { base_offset } => {
                let script = self.read_delta_script(file, &header)?;
                let (object_type, base) = self.materialize_at(bases, base_offset)?;
                self.finish_delta(offset, expected, object_type, &base, &script)
            }
            PackEntryKind::RefDelta { base_id } => {
                let script = self.read_delta_script(file, &header)?;
                let base_stream = bases
                    .base_object(&base_id)?
                    .ok_or(GitError::ObjectNotFound(base_id))?;
                let object_type = base_stream.object_type();
                let base = base_stream.read_to_vec()?;
                self.finish_delta(offset, expected, object_type, &base, &script)
            }
        }
    }

    /// Reads the object at `offset` fully into memory, caching the bytes.
    ///
    /// This is the delta-base path: bases are held as cache-owned buffers
    /// so sibling deltas against the same base reuse them.
    pub(crate) fn materialize_at(
        &self,
        bases: &dyn BaseResolver,
        offset: u64,
    ) -> Result<(ObjectType, Arc<[u8]>), GitError> {
        let cached = self.cache.borrow_mut().get(self.pack_id, offset);
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let stream = self.read_at(bases, offset, None)?;
        let object_type = stream.object_type();
        let bytes: Arc<[u8]> = stream.read_to_vec()?.into();
        self.cache
            .borrow_mut()
            .insert(self.pack_id, offset, object_type, Arc::clone(&bytes));
        Ok((object_type, bytes))
    }

    /// Applies a delta script, caches the result, and returns a stream.
    fn finish_delta(
        &self,
        offset: u64,
        expected: Option<ObjectType>,
        object_type: ObjectType,
        base: &[u8],
        script: &[u8],
    ) -> Result<ObjectStream, GitError> {
        let bytes: Arc<[u8]> = apply_delta(base, script)?.into();
        self.cache
            .borrow_mut()
            .insert(self.pack_id, offset, object_type, Arc::clone(&bytes));
        check_expected(expected, object_type)?;
        Ok(ObjectStream::from_buffer(object_type, bytes))
    }

    /// Inflates the delta script frame following an entry header.
    fn read_delta_script(
        &self,
        mut file: PooledFile,
        header: &PackEntryHeader,
    ) -> Result<Vec<u8>, GitError> {
        file.seek(SeekFrom::Start(header.data_start))?;
        let size = usize::try_from(header.size)
            .map_err(|_| GitError::corrupt_pack("delta script size exceeds address space"))?;
        inflate_exact(&mut file, size).map_err(map_frame_error)
    }

    fn index(&self) -> Result<Rc<PackIndex>, GitError> {
        let mut slot = self.index.borrow_mut();
        if let Some(index) = slot.as_ref() {
            return Ok(Rc::clone(index));
        }
        let index = Rc::new(PackIndex::open(&self.idx_path, self.use_mapped_index)?);
        *slot = Some(Rc::clone(&index));
        Ok(index)
    }

    /// Validates the pack header on first use and returns the data end.
    fn ensure_open(&self) -> Result<u64, GitError> {
        if let Some(data_end) = self.data_end.get() {
            return Ok(data_end);
        }

        let mut file = self.pool.acquire()?;
        let file_len = file.seek(SeekFrom::End(0))?;
        if file_len < PACK_HEADER_SIZE + PACK_TRAILER_SIZE {
            return Err(GitError::corrupt_pack("file too small"));
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; PACK_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != b"PACK" {
            return Err(GitError::corrupt_pack("bad signature"));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != 2 && version != 3 {
            return Err(GitError::UnsupportedFormat {
                detail: "pack version is not 2 or 3",
            });
        }

        let data_end = file_len - PACK_TRAILER_SIZE;
        self.data_end.set(Some(data_end));
        Ok(data_end)
    }

    /// Parses the entry header at `offset`.
    fn entry_header_at(
        &self,
        file: &mut PooledFile,
        offset: u64,
        data_end: u64,
    ) -> Result<PackEntryHeader, GitError> {
        if offset < PACK_HEADER_SIZE || offset >= data_end {
            return Err(GitError::corrupt_pack("entry offset out of range"));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; MAX_ENTRY_HEADER_BYTES];
        let available = read_up_to(file, &mut buf)?;
        // Never parse header bytes out of the trailer hash.
        let usable = available.min((data_end - offset) as usize);
        let buf = &buf[..usable];

        let mut pos = 0usize;
        let first = next_byte(buf, &mut pos)?;
        let type_bits = (first >> 4) & 0x07;

        let mut size = u64::from(first & 0x0f);
        let mut shift = 4u32;
        let mut byte = first;
        while byte & 0x80 != 0 {
            byte = next_byte(buf, &mut pos)?;
            size |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if shift > 63 {
                return Err(GitError::corrupt_pack("size varint overflow"));
            }
        }

        let kind = match type_bits {
            1 => PackEntryKind::Stored(ObjectType::Commit),
            2 => PackEntryKind::Stored(ObjectType::Tree),
            3 => PackEntryKind::Stored(ObjectType::Blob),
            4 => PackEntryKind::Stored(ObjectType::Tag),
            6 => {
                let distance = read_ofs_distance(buf, &mut pos)?;
                if distance >= offset {
                    return Err(GitError::corrupt_pack("ofs delta base underflow"));
                }
                PackEntryKind::OfsDelta {
                    base_offset: offset - distance,
                }
            }
            7 => {
                let raw = buf
                    .get(pos..pos + OID_RAW_LEN)
                    .ok_or(GitError::corrupt_pack("truncated entry header"))?;
                pos += OID_RAW_LEN;
                PackEntryKind::RefDelta {
                    base_id: ObjectId::try_from_slice(raw).expect("20-byte slice"),
                }
            }
            _ => return Err(GitError::corrupt_pack("bad object type")),
        };

        let data_start = offset + pos as u64;
        if data_start > data_end {
            return Err(GitError::corrupt_pack("entry header past data end"));
        }

        Ok(PackEntryHeader {
            kind,
            size,
            data_start,
        })
    }
}

/// Validates an expected type against the effective one.
fn check_expected(expected: Option<ObjectType>, actual: ObjectType) -> Result<(), GitError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(GitError::ObjectTypeMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Decodes the ofs-delta distance varint.
///
/// Each continuation first increments the accumulator, then shifts in the
/// next 7 bits; getting this wrong silently lands on the wrong base.
fn read_ofs_distance(buf: &[u8], pos: &mut usize) -> Result<u64, GitError> {
    let mut byte = next_byte(buf, pos)?;
    let mut value = u64::from(byte & 0x7f);
    let mut bytes_read = 1usize;

    while byte & 0x80 != 0 {
        if bytes_read >= 10 {
            return Err(GitError::corrupt_pack("ofs distance varint too long"));
        }
        byte = next_byte(buf, pos)?;
        value = ((value + 1) << 7) | u64::from(byte & 0x7f);
        bytes_read += 1;
    }
    Ok(value)
}

fn next_byte(buf: &[u8], pos: &mut usize) -> Result<u8, GitError> {
    let byte = *buf
        .get(*pos)
        .ok_or(GitError::corrupt_pack("truncated entry header"))?;
    *pos += 1;
    Ok(byte)
}

/// Fills `buf` as far as the file allows, tolerating EOF.
fn read_up_to(file: &mut PooledFile, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Maps frame inflation failures onto the pack error taxonomy.
fn map_frame_error(err: io::Error) -> GitError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            GitError::corrupt_pack("zlib frame truncated or invalid")
        }
        _ => GitError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ofs_distance_single_byte() {
        let mut pos = 0;
        assert_eq!(read_ofs_distance(&[0x05], &mut pos).unwrap(), 5);
        assert_eq!(pos, 1);
    }

    #[test]
    fn ofs_distance_two_bytes_off_by_one() {
        // Git encodes distance 128 as [0x80, 0x00]: the continuation
        // increments before shifting, so the naive decode (0) is wrong.
        let mut pos = 0;
        assert_eq!(read_ofs_distance(&[0x80, 0x00], &mut pos).unwrap(), 128);

        let mut pos = 0;
        assert_eq!(read_ofs_distance(&[0x81, 0x00], &mut pos).unwrap(), 256);

        let mut pos = 0;
        assert_eq!(read_ofs_distance(&[0xff, 0x7f], &mut pos).unwrap(), 16511);
    }

    #[test]
    fn ofs_distance_truncated() {
        let mut pos = 0;
        assert!(matches!(
            read_ofs_distance(&[0x80], &mut pos),
            Err(GitError::CorruptPack { .. })
        ));
    }

    #[test]
    fn expected_type_checked() {
        assert!(check_expected(None, ObjectType::Blob).is_ok());
        assert!(check_expected(Some(ObjectType::Blob), ObjectType::Blob).is_ok());
        assert!(matches!(
            check_expected(Some(ObjectType::Commit), ObjectType::Tree),
            Err(GitError::ObjectTypeMismatch { .. })
        ));
    }
}
