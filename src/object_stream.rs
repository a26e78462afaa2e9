//! Readable object payloads with known length.
//!
//! Every object read resolves to an `ObjectStream`: a read-only byte
//! stream that knows its type and exact length. Two ownership shapes
//! exist, matching where the bytes live:
//! - frame streams inflate straight off a file handle (a pooled pack
//!   handle that re-enters its pool on drop, or a loose object file);
//! - buffer streams share a materialized object from the cache.
//!
//! Delta objects are always fully materialized before a stream is
//! returned; no lazy base reads happen after return.

use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;

use crate::file_pool::PooledFile;
use crate::object_type::ObjectType;
use crate::zlib_stream::ZlibStreamReader;

/// A read-only object payload with known type and length.
#[derive(Debug)]
pub struct ObjectStream {
    object_type: ObjectType,
    len: u64,
    body: Body,
}

#[derive(Debug)]
enum Body {
    /// Inflating from a pack entry through a pooled handle.
    Pack(ZlibStreamReader<PooledFile>),
    /// Inflating from a loose object file.
    Loose(ZlibStreamReader<File>),
    /// Shared materialized bytes (cache-owned).
    Buffer { bytes: Arc<[u8]>, pos: usize },
}

impl ObjectStream {
    /// Wraps a pack frame whose inflated length came from the entry header.
    pub(crate) fn from_pack_frame(
        object_type: ObjectType,
        len: u64,
        reader: ZlibStreamReader<PooledFile>,
    ) -> Self {
        Self {
            object_type,
            len,
            body: Body::Pack(reader),
        }
    }

    /// Wraps a loose frame positioned just past its object header.
    pub(crate) fn from_loose_frame(
        object_type: ObjectType,
        len: u64,
        reader: ZlibStreamReader<File>,
    ) -> Self {
        Self {
            object_type,
            len,
            body: Body::Loose(reader),
        }
    }

    /// Wraps shared materialized bytes.
    pub(crate) fn from_buffer(object_type: ObjectType, bytes: Arc<[u8]>) -> Self {
        Self {
            object_type,
            len: bytes.len() as u64,
            body: Body::Buffer { bytes, pos: 0 },
        }
    }

    /// The object's type.
    #[inline]
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Total payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for zero-length payloads.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consumes the stream, reading the full payload into memory.
    pub fn read_to_vec(mut self) -> io::Result<Vec<u8>> {
        match self.body {
            // Already materialized; hand back a copy of the remainder.
            Body::Buffer { ref bytes, pos } => Ok(bytes[pos..].to_vec()),
            _ => {
                let mut out = Vec::with_capacity(self.len.min(usize::MAX as u64) as usize);
                self.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Pack(reader) => reader.read(buf),
            Body::Loose(reader) => reader.read(buf),
            Body::Buffer { bytes, pos } => {
                let remaining = &bytes[*pos..];
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                *pos += n;
                Ok(n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_stream_reads_and_reports_length() {
        let bytes: Arc<[u8]> = b"tree payload".to_vec().into();
        let mut stream = ObjectStream::from_buffer(ObjectType::Tree, bytes);

        assert_eq!(stream.object_type(), ObjectType::Tree);
        assert_eq!(stream.len(), 12);
        assert!(!stream.is_empty());

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"tree payload");
    }

    #[test]
    fn buffer_stream_partial_reads() {
        let bytes: Arc<[u8]> = b"abcdef".to_vec().into();
        let mut stream = ObjectStream::from_buffer(ObjectType::Blob, bytes);

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_to_vec_respects_position() {
        let bytes: Arc<[u8]> = b"abcdef".to_vec().into();
        let mut stream = ObjectStream::from_buffer(ObjectType::Blob, bytes);
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(stream.read_to_vec().unwrap(), b"cdef");
    }
}
