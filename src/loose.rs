//! Loose object reading.
//!
//! A loose object lives at `<objects>/<first 2 hex>/<remaining 38 hex>`
//! as a single zlib frame. The inflated content opens with the ASCII
//! header `"<type> <decimal-length>\0"` followed by the raw payload.
//!
//! A missing file is not an error: lookup falls through to the pack set.
//! Everything else about a present file is strict: unknown type tags,
//! malformed lengths, and truncated frames are `CorruptLooseObject`.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use flate2::read::ZlibDecoder;
use memchr::memchr;

use crate::errors::GitError;
use crate::object_id::ObjectId;
use crate::object_stream::ObjectStream;
use crate::object_type::ObjectType;
use crate::zlib_stream::ZlibStreamReader;

/// Safety allowance for the inflated header (`"commit <size>\0"`).
const LOOSE_HEADER_MAX_BYTES: usize = 64;

/// Reader for `objects/xx/yyyy...` files under one object directory.
#[derive(Debug)]
pub struct LooseObjectReader {
    objects_dir: PathBuf,
}

impl LooseObjectReader {
    pub(crate) fn new(objects_dir: PathBuf) -> Self {
        Self { objects_dir }
    }

    /// Opens the loose object for `id`, or `None` if no file exists.
    ///
    /// The returned stream is positioned at the payload, past the header.
    pub(crate) fn open_object(
        &self,
        id: &ObjectId,
        expected: Option<ObjectType>,
    ) -> Result<Option<ObjectStream>, GitError> {
        let hex = id.to_string();
        let path = self.objects_dir.join(&hex[..2]).join(&hex[2..]);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(GitError::Io(err)),
        };

        let mut decoder = ZlibDecoder::new(file);
        let (object_type, len) = read_object_header(&mut decoder)?;

        if let Some(expected) = expected {
            if expected != object_type {
                return Err(GitError::ObjectTypeMismatch {
                    expected,
                    actual: object_type,
                });
            }
        }

        let reader = ZlibStreamReader::resume(decoder, len);
        Ok(Some(ObjectStream::from_loose_frame(object_type, len, reader)))
    }
}

/// Pulls `"<type> <len>\0"` off the front of an inflating frame.
fn read_object_header<R: Read>(
    decoder: &mut ZlibDecoder<R>,
) -> Result<(ObjectType, u64), GitError> {
    let mut header = Vec::with_capacity(LOOSE_HEADER_MAX_BYTES);
    let mut byte = [0u8; 1];
    loop {
        let n = decoder.read(&mut byte).map_err(map_frame_error)?;
        if n == 0 {
            return Err(GitError::corrupt_loose("frame ended inside header"));
        }
        if byte[0] == 0 {
            break;
        }
        header.push(byte[0]);
        if header.len() > LOOSE_HEADER_MAX_BYTES {
            return Err(GitError::corrupt_loose("header too long"));
        }
    }

    let space = memchr(b' ', &header).ok_or(GitError::corrupt_loose("header missing space"))?;
    let object_type = ObjectType::from_header_tag(&header[..space])
        .ok_or(GitError::corrupt_loose("unknown object type tag"))?;
    let len = parse_decimal(&header[space + 1..])
        .ok_or(GitError::corrupt_loose("malformed length"))?;

    Ok((object_type, len))
}

/// Parses a non-empty ASCII decimal with no sign or leading junk.
fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add(u64::from(b - b'0'))?;
    }
    Some(value)
}

fn map_frame_error(err: io::Error) -> GitError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            GitError::corrupt_loose("zlib frame truncated or invalid")
        }
        _ => GitError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_loose(dir: &std::path::Path, id: &ObjectId, content: &[u8]) {
        let hex = id.to_string();
        let bucket = dir.join(&hex[..2]);
        std::fs::create_dir_all(&bucket).unwrap();
        let mut encoder = ZlibEncoder::new(
            File::create(bucket.join(&hex[2..])).unwrap(),
            Compression::default(),
        );
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap();
    }

    fn framed(tag: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = format!("{tag} {}\0", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn reads_blob_payload() {
        let dir = tempfile::TempDir::new().unwrap();
        let id = ObjectId::from_bytes([0x18; 20]);
        write_loose(dir.path(), &id, &framed("blob", b"Hello, World"));

        let reader = LooseObjectReader::new(dir.path().to_path_buf());
        let stream = reader.open_object(&id, Some(ObjectType::Blob)).unwrap().unwrap();
        assert_eq!(stream.object_type(), ObjectType::Blob);
        assert_eq!(stream.len(), 12);
        assert_eq!(stream.read_to_vec().unwrap(), b"Hello, World");
    }

    #[test]
    fn missing_file_falls_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let reader = LooseObjectReader::new(dir.path().to_path_buf());
        let id = ObjectId::from_bytes([0x33; 20]);
        assert!(reader.open_object(&id, None).unwrap().is_none());
    }

    #[test]
    fn type_mismatch_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let id = ObjectId::from_bytes([0x44; 20]);
        write_loose(dir.path(), &id, &framed("blob", b"x"));

        let reader = LooseObjectReader::new(dir.path().to_path_buf());
        let err = reader.open_object(&id, Some(ObjectType::Commit)).unwrap_err();
        assert!(matches!(
            err,
            GitError::ObjectTypeMismatch {
                expected: ObjectType::Commit,
                actual: ObjectType::Blob,
            }
        ));
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let id = ObjectId::from_bytes([0x55; 20]);
        write_loose(dir.path(), &id, &framed("blobby", b"x"));

        let reader = LooseObjectReader::new(dir.path().to_path_buf());
        assert!(matches!(
            reader.open_object(&id, None),
            Err(GitError::CorruptLooseObject { .. })
        ));
    }

    #[test]
    fn malformed_length_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let id = ObjectId::from_bytes([0x66; 20]);
        write_loose(dir.path(), &id, b"blob 12x\0junk");

        let reader = LooseObjectReader::new(dir.path().to_path_buf());
        assert!(matches!(
            reader.open_object(&id, None),
            Err(GitError::CorruptLooseObject { .. })
        ));
    }

    #[test]
    fn non_zlib_file_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let id = ObjectId::from_bytes([0x77; 20]);
        let hex = id.to_string();
        let bucket = dir.path().join(&hex[..2]);
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(bucket.join(&hex[2..]), b"plainly not zlib").unwrap();

        let reader = LooseObjectReader::new(dir.path().to_path_buf());
        assert!(matches!(
            reader.open_object(&id, None),
            Err(GitError::CorruptLooseObject { .. })
        ));
    }
}
