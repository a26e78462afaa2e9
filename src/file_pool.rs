//! Pooled random-access file handles.
//!
//! Recursive delta resolution opens the same pack file many times in quick
//! succession. Each pack keeps a FIFO of open handles: acquiring a reader
//! dequeues an existing handle (rewound to offset 0) or opens a new one,
//! and dropping the reader re-enqueues the handle. The pool is unbounded;
//! its population is naturally capped by the deepest delta chain because a
//! handle is checked out only while a stream is alive.
//!
//! The pool is single-threaded by construction (`Rc`/`RefCell`), matching
//! the reader's one-repository-per-thread model.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::rc::Rc;

/// FIFO pool of open handles for one file.
#[derive(Debug, Clone)]
pub struct HandlePool {
    path: PathBuf,
    handles: Rc<RefCell<VecDeque<File>>>,
}

impl HandlePool {
    /// Creates an empty pool for `path`. No handle is opened until the
    /// first acquire.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            handles: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Dequeues a pooled handle, or opens a new one if the pool is empty.
    ///
    /// Pooled handles are rewound to offset 0 before being handed out.
    pub fn acquire(&self) -> io::Result<PooledFile> {
        let recycled = self.handles.borrow_mut().pop_front();
        let file = match recycled {
            Some(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                file
            }
            None => File::open(&self.path)?,
        };
        Ok(PooledFile {
            file: Some(file),
            pool: Rc::clone(&self.handles),
        })
    }

    /// Number of handles currently parked in the pool.
    #[must_use]
    pub fn idle_handles(&self) -> usize {
        self.handles.borrow().len()
    }
}

/// A scoped file handle that re-enters its pool on drop.
///
/// Dropping returns the handle on every exit path, including unwinds, so
/// streams that own a `PooledFile` release it without explicit close calls.
#[derive(Debug)]
pub struct PooledFile {
    file: Option<File>,
    pool: Rc<RefCell<VecDeque<File>>>,
}

impl Read for PooledFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.as_mut().expect("pooled file present").read(buf)
    }
}

impl Seek for PooledFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.as_mut().expect("pooled file present").seek(pos)
    }
}

impl Drop for PooledFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            self.pool.borrow_mut().push_back(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture_file(content: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content)
            .unwrap();
        (dir, path)
    }

    #[test]
    fn acquire_opens_then_recycles() {
        let (_dir, path) = fixture_file(b"0123456789");
        let pool = HandlePool::new(path);

        assert_eq!(pool.idle_handles(), 0);
        let reader = pool.acquire().unwrap();
        drop(reader);
        assert_eq!(pool.idle_handles(), 1);

        // The recycled handle is rewound to the start.
        let mut reader = pool.acquire().unwrap();
        assert_eq!(pool.idle_handles(), 0);
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");
    }

    #[test]
    fn concurrent_checkouts_open_new_handles() {
        let (_dir, path) = fixture_file(b"abcdef");
        let pool = HandlePool::new(path);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_handles(), 2);
    }

    #[test]
    fn pooled_handles_seek_independently() {
        let (_dir, path) = fixture_file(b"abcdef");
        let pool = HandlePool::new(path);

        let mut a = pool.acquire().unwrap();
        let mut b = pool.acquire().unwrap();
        a.seek(SeekFrom::Start(3)).unwrap();

        let mut buf = [0u8; 3];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"def");
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }
}
