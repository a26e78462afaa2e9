//! On-disk repository fixtures for integration tests.
//!
//! Builds byte-exact loose objects, pack files, and pack indexes without
//! shelling out to git. Object ids are chosen by the tests; nothing here
//! hashes payloads, because the reader never verifies hashes.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use gitstamp::ObjectId;

pub const TYPE_COMMIT: u8 = 1;
pub const TYPE_TREE: u8 = 2;
pub const TYPE_BLOB: u8 = 3;

/// A scratch repository directory with a `.git` layout.
pub struct RepoFixture {
    pub root: tempfile::TempDir,
}

impl RepoFixture {
    /// Creates `<root>/.git` with an empty objects directory and a
    /// HEAD on `refs/heads/master`.
    pub fn new() -> Self {
        let root = tempfile::TempDir::new().unwrap();
        let git_dir = root.path().join(".git");
        fs::create_dir_all(git_dir.join("objects")).unwrap();
        fs::create_dir_all(git_dir.join("refs/heads")).unwrap();
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/master\n").unwrap();
        Self { root }
    }

    pub fn work_dir(&self) -> &Path {
        self.root.path()
    }

    pub fn git_dir(&self) -> PathBuf {
        self.root.path().join(".git")
    }

    pub fn write_file(&self, rel: &str, content: &str) {
        let path = self.git_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Points `refs/heads/master` at `id`.
    pub fn set_master(&self, id: ObjectId) {
        self.write_file("refs/heads/master", &format!("{id}\n"));
    }

    /// Detaches HEAD at `id`.
    pub fn detach_head(&self, id: ObjectId) {
        self.write_file("HEAD", &format!("{id}\n"));
    }

    /// Writes a loose object frame for `id`.
    pub fn write_loose(&self, id: ObjectId, tag: &str, payload: &[u8]) {
        let hex = id.to_string();
        let bucket = self.git_dir().join("objects").join(&hex[..2]);
        fs::create_dir_all(&bucket).unwrap();

        let mut content = format!("{tag} {}\0", payload.len()).into_bytes();
        content.extend_from_slice(payload);

        let file = File::create(bucket.join(&hex[2..])).unwrap();
        let mut encoder = ZlibEncoder::new(file, Compression::default());
        encoder.write_all(&content).unwrap();
        encoder.finish().unwrap();
    }

    /// Installs a pack and its index under `objects/pack`.
    pub fn install_pack(&self, name: &str, pack: &[u8], objects: &[(ObjectId, u64)]) {
        let pack_dir = self.git_dir().join("objects/pack");
        fs::create_dir_all(&pack_dir).unwrap();
        fs::write(pack_dir.join(format!("{name}.pack")), pack).unwrap();
        fs::write(pack_dir.join(format!("{name}.idx")), build_idx(objects)).unwrap();
    }
}

/// Builds a v2 pack index over `(id, offset)` pairs.
pub fn build_idx(objects: &[(ObjectId, u64)]) -> Vec<u8> {
    const LARGE_FLAG: u32 = 0x8000_0000;

    let mut sorted = objects.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut counts = [0u32; 256];
    for (id, _) in &sorted {
        counts[id.as_bytes()[0] as usize] += 1;
    }

    let mut out = Vec::new();
    out.extend_from_slice(&[0xff, b't', b'O', b'c']);
    out.extend_from_slice(&2u32.to_be_bytes());

    let mut running = 0u32;
    for count in counts {
        running += count;
        out.extend_from_slice(&running.to_be_bytes());
    }

    for (id, _) in &sorted {
        out.extend_from_slice(id.as_bytes());
    }
    out.extend_from_slice(&vec![0u8; sorted.len() * 4]); // CRC table

    let mut large = Vec::new();
    for (_, offset) in &sorted {
        if *offset >= u64::from(LARGE_FLAG) {
            let index = (large.len() / 8) as u32;
            out.extend_from_slice(&(LARGE_FLAG | index).to_be_bytes());
            large.extend_from_slice(&offset.to_be_bytes());
        } else {
            out.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(&large);
    out.extend_from_slice(&[0u8; 40]); // pack + index checksums
    out
}

/// Incrementally builds a pack file, returning entry offsets.
pub struct PackBuilder {
    data: Vec<u8>,
    count: u32,
}

impl PackBuilder {
    pub fn new() -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(b"PACK");
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes()); // patched in finish()
        Self { data, count: 0 }
    }

    /// Appends a stored (non-delta) entry; returns its offset.
    pub fn add_stored(&mut self, type_code: u8, payload: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        self.data
            .extend_from_slice(&entry_header(type_code, payload.len() as u64));
        self.data.extend_from_slice(&compress(payload));
        self.count += 1;
        offset
    }

    /// Appends an ofs-delta entry against `base_offset`; returns its offset.
    pub fn add_ofs_delta(&mut self, base_offset: u64, script: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        self.data
            .extend_from_slice(&entry_header(6, script.len() as u64));
        self.data
            .extend_from_slice(&encode_ofs_distance(offset - base_offset));
        self.data.extend_from_slice(&compress(script));
        self.count += 1;
        offset
    }

    /// Appends a ref-delta entry against `base_id`; returns its offset.
    pub fn add_ref_delta(&mut self, base_id: ObjectId, script: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        self.data
            .extend_from_slice(&entry_header(7, script.len() as u64));
        self.data.extend_from_slice(base_id.as_bytes());
        self.data.extend_from_slice(&compress(script));
        self.count += 1;
        offset
    }

    /// Patches the object count and appends a placeholder trailer hash.
    pub fn finish(mut self) -> Vec<u8> {
        self.data[8..12].copy_from_slice(&self.count.to_be_bytes());
        self.data.extend_from_slice(&[0u8; 20]);
        self.data
    }
}

/// Encodes a pack entry header: type in bits 4-6 of the first byte, size
/// varint LSB-first with 4 bits in the first byte.
pub fn entry_header(type_code: u8, size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut first = (type_code << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;
    if rest > 0 {
        first |= 0x80;
    }
    out.push(first);
    while rest > 0 {
        let mut byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

/// Encodes an ofs-delta distance with Git's off-by-one accumulation.
pub fn encode_ofs_distance(mut distance: u64) -> Vec<u8> {
    let mut bytes = vec![(distance & 0x7f) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        bytes.push(0x80 | (distance & 0x7f) as u8);
        distance >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Encodes a delta size varint (LSB first, MSB continuation).
pub fn delta_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

/// Builds a delta script that replaces the base with `result` wholesale.
pub fn replace_delta(base_len: usize, result: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    script.extend_from_slice(&delta_varint(base_len as u64));
    script.extend_from_slice(&delta_varint(result.len() as u64));
    for chunk in result.chunks(0x7f) {
        script.push(chunk.len() as u8);
        script.extend_from_slice(chunk);
    }
    script
}

/// Builds a minimal commit payload.
pub fn commit_payload(tree: ObjectId, parents: &[ObjectId], message: &str) -> Vec<u8> {
    let mut out = format!("tree {tree}\n");
    for parent in parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str("author A U Thor <author@example.com> 1700000000 +0000\n");
    out.push_str("committer A U Thor <author@example.com> 1700000000 +0000\n");
    out.push('\n');
    out.push_str(message);
    out.into_bytes()
}

/// Builds a tree payload from `(mode, name, id)` entries.
///
/// Entries are emitted in the given order; pass them sorted the way git
/// stores them.
pub fn tree_payload(entries: &[(&str, &str, ObjectId)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (mode, name, id) in entries {
        out.extend_from_slice(mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(id.as_bytes());
    }
    out
}

pub fn oid(hex: &str) -> ObjectId {
    ObjectId::parse_hex(hex).unwrap()
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
