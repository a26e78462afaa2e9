//! Length-bounded streaming zlib inflation.
//!
//! Pack entries and loose objects are single zlib frames. The reader
//! presents each as a non-seekable `Read` with a known length:
//! - pack case: the entry header declares the inflated size before the
//!   frame starts;
//! - loose case: the size is parsed out of the inflated `"<type> <len>\0"`
//!   header, after which the remainder of the same frame is the payload.
//!
//! `ZlibStreamReader::new` covers the first case; `resume` adopts a
//! decoder that has already consumed a header prefix for the second.
//!
//! # Invariants
//! - At most `remaining` bytes are ever handed to the caller.
//! - A frame that ends before producing `remaining` bytes surfaces as
//!   `UnexpectedEof`, never as a silent short read.

use std::io::{self, Read};

use flate2::read::ZlibDecoder;

/// A length-bounded readable view over one zlib frame.
#[derive(Debug)]
pub struct ZlibStreamReader<R: Read> {
    inner: ZlibDecoder<R>,
    remaining: u64,
}

impl<R: Read> ZlibStreamReader<R> {
    /// Starts inflating a frame whose inflated length is known up front.
    pub fn new(source: R, len: u64) -> Self {
        Self {
            inner: ZlibDecoder::new(source),
            remaining: len,
        }
    }

    /// Adopts a decoder mid-frame with `len` payload bytes still to come.
    ///
    /// Used by the loose object reader after it has pulled the object
    /// header off the front of the frame.
    pub fn resume(inner: ZlibDecoder<R>, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read> Read for ZlibStreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "zlib frame ended before declared length",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Inflates exactly `expected` bytes from the front of a zlib frame.
///
/// Used for delta scripts, whose inflated size comes from the pack entry
/// header. The frame may be followed by further pack data; only the frame
/// itself is consumed from `source`.
pub fn inflate_exact<R: Read>(source: R, expected: usize) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(source);
    let mut out = vec![0u8; expected];
    decoder.read_exact(&mut out)?;
    Ok(out)
}
