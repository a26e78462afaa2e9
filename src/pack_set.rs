//! Pack enumeration and lookup dispatch.
//!
//! Enumerates `<objects>/pack/*.idx` files with `.pack` siblings, once,
//! on the first lookup. The order is stable for the life of the set
//! (index file name order); lookups return the first pack containing the
//! id. A repository without packs (or without a pack directory at all)
//! yields an empty set, not an error.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::errors::GitError;
use crate::object_cache::ObjectCache;
use crate::object_id::ObjectId;
use crate::object_stream::ObjectStream;
use crate::object_type::ObjectType;
use crate::pack::{BaseResolver, Pack};

/// The set of packs under one object directory.
#[derive(Debug)]
pub struct PackSet {
    pack_dir: PathBuf,
    use_mapped_index: bool,
    cache: Rc<RefCell<ObjectCache>>,
    packs: RefCell<Option<Rc<[Rc<Pack>]>>>,
}

impl PackSet {
    pub(crate) fn new(
        objects_dir: &Path,
        use_mapped_index: bool,
        cache: Rc<RefCell<ObjectCache>>,
    ) -> Self {
        Self {
            pack_dir: objects_dir.join("pack"),
            use_mapped_index,
            cache,
            packs: RefCell::new(None),
        }
    }

    /// Reads the object for `id` from the first pack containing it.
    ///
    /// Returns `None` if no pack in the set knows the id.
    pub(crate) fn read_object(
        &self,
        bases: &dyn BaseResolver,
        id: &ObjectId,
        expected: Option<ObjectType>,
    ) -> Result<Option<ObjectStream>, GitError> {
        for pack in self.packs()?.iter() {
            if let Some(offset) = pack.offset_of(id)? {
                return pack.read_at(bases, offset, expected).map(Some);
            }
        }
        Ok(None)
    }

    /// Number of packs in the set (forces enumeration).
    pub fn pack_count(&self) -> Result<usize, GitError> {
        Ok(self.packs()?.len())
    }

    /// Enumerates packs lazily; the captured order is reused afterwards.
    fn packs(&self) -> Result<Rc<[Rc<Pack>]>, GitError> {
        if let Some(packs) = self.packs.borrow().as_ref() {
            return Ok(Rc::clone(packs));
        }

        let mut idx_paths = Vec::new();
        match std::fs::read_dir(&self.pack_dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry.map_err(GitError::Io)?.path();
                    let is_idx = path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("idx"));
                    if is_idx && path.with_extension("pack").is_file() {
                        idx_paths.push(path);
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(GitError::Io(err)),
        }
        idx_paths.sort();

        let packs: Rc<[Rc<Pack>]> = idx_paths
            .into_iter()
            .enumerate()
            .map(|(pack_id, idx_path)| {
                let pack_path = idx_path.with_extension("pack");
                Rc::new(Pack::new(
                    pack_id,
                    idx_path,
                    pack_path,
                    self.use_mapped_index,
                    Rc::clone(&self.cache),
                ))
            })
            .collect();

        *self.packs.borrow_mut() = Some(Rc::clone(&packs));
        Ok(packs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoBases;

    impl BaseResolver for NoBases {
        fn base_object(&self, id: &ObjectId) -> Result<Option<ObjectStream>, GitError> {
            Err(GitError::ObjectNotFound(*id))
        }
    }

    fn empty_cache() -> Rc<RefCell<ObjectCache>> {
        Rc::new(RefCell::new(ObjectCache::new(None)))
    }

    #[test]
    fn missing_pack_dir_is_empty_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = PackSet::new(dir.path(), true, empty_cache());
        assert_eq!(set.pack_count().unwrap(), 0);

        let id = ObjectId::from_bytes([0x42; 20]);
        assert!(set.read_object(&NoBases, &id, None).unwrap().is_none());
    }

    #[test]
    fn idx_without_pack_sibling_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let pack_dir = dir.path().join("pack");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("pack-orphan.idx"), b"not read").unwrap();

        let set = PackSet::new(dir.path(), true, empty_cache());
        assert_eq!(set.pack_count().unwrap(), 0);
    }
}
