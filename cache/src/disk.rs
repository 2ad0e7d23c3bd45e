//! The cold tier: one file per spilled key plus an in-memory index.
//!
//! Values are written verbatim (no header, no fsync) to
//! `<root>/<shard>/<name>.data`, where `shard = hash(key) % 1000` and the
//! name is a hex escaping of the key. The index file (`index.dat`) maps
//! key bytes to relative paths and is rewritten on clean shutdown; it is
//! the source of truth on startup, and data files it does not mention are
//! ignored. This is a cache tier, not a database: a crash may lose spilled
//! values, never corrupt reads.

use ahash::{AHashMap, RandomState};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::warn;

const INDEX_FILE: &str = "index.dat";
const SHARD_COUNT: u64 = 1000;

/// Keys up to this length are hex-escaped verbatim in the filename.
/// Longer keys get a truncated-hex prefix plus a 128-bit hashed tail so
/// the name stays under filesystem limits.
const MAX_LITERAL_KEY: usize = 100;

// Fixed seeds keep shard derivation and long-key names deterministic for
// the life of the process. Restart never re-derives a path: lookups go
// through the persisted index.
const SHARD_SEEDS: [u64; 4] = [0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a];
const TAIL_SEEDS_A: [u64; 4] = [0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19];
const TAIL_SEEDS_B: [u64; 4] = [0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5];

/// Content-by-key spill store for warm-tier evictees.
pub struct DiskStore {
    root: PathBuf,
    index: AHashMap<Vec<u8>, String>,
    shard_state: RandomState,
    tail_state_a: RandomState,
    tail_state_b: RandomState,
}

impl DiskStore {
    /// Open (or create) the store rooted at `root` and load the index.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let mut store = Self {
            root,
            index: AHashMap::new(),
            shard_state: seeded(SHARD_SEEDS),
            tail_state_a: seeded(TAIL_SEEDS_A),
            tail_state_b: seeded(TAIL_SEEDS_B),
        };
        store.load_index()?;
        Ok(store)
    }

    /// Write `value` to the key's derived path (truncating any previous
    /// file) and update the index. No fsync: losing a spill on crash is an
    /// accepted cache-tier outcome.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> io::Result<()> {
        let rel = self.relative_path(key);
        let path = self.root.join(&rel);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, value)?;
        self.index.insert(key.to_vec(), rel);
        Ok(())
    }

    /// Read back a spilled value. Any read failure is logged and surfaces
    /// as `None`, which callers treat as a miss.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let rel = self.index.get(key)?;
        match fs::read(self.root.join(rel)) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %rel, error = %e, "failed to read spilled value");
                None
            }
        }
    }

    /// Drop the index entry and delete the data file (best-effort).
    pub fn remove(&mut self, key: &[u8]) {
        if let Some(rel) = self.index.remove(key)
            && let Err(e) = fs::remove_file(self.root.join(&rel))
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %rel, error = %e, "failed to remove spilled value");
        }
    }

    /// Index lookup only; never stats the filesystem.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rewrite `index.dat` truncated: a sequence of
    /// `{u64 key_len, key, u64 path_len, path}` records, little-endian
    /// lengths.
    pub fn persist_index(&self) -> io::Result<()> {
        let file = fs::File::create(self.root.join(INDEX_FILE))?;
        let mut out = io::BufWriter::new(file);
        for (key, rel) in &self.index {
            out.write_all(&(key.len() as u64).to_le_bytes())?;
            out.write_all(key)?;
            out.write_all(&(rel.len() as u64).to_le_bytes())?;
            out.write_all(rel.as_bytes())?;
        }
        out.flush()
    }

    fn load_index(&mut self) -> io::Result<()> {
        let data = match fs::read(self.root.join(INDEX_FILE)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut pos = 0;
        while pos < data.len() {
            let Some((key, after_key)) = read_field(&data, pos) else {
                warn!("truncated index record; ignoring remainder");
                break;
            };
            let Some((path, after_path)) = read_field(&data, after_key) else {
                warn!("truncated index record; ignoring remainder");
                break;
            };
            match std::str::from_utf8(path) {
                Ok(rel) => {
                    self.index.insert(key.to_vec(), rel.to_string());
                }
                Err(_) => warn!("non-UTF-8 path in index record; skipping"),
            }
            pos = after_path;
        }
        Ok(())
    }

    fn relative_path(&self, key: &[u8]) -> String {
        let shard = self.shard_state.hash_one(key) % SHARD_COUNT;
        format!("{}/{}.data", shard, self.file_stem(key))
    }

    fn file_stem(&self, key: &[u8]) -> String {
        if key.len() <= MAX_LITERAL_KEY {
            hex_encode(key)
        } else {
            format!(
                "{}-{:016x}{:016x}",
                hex_encode(&key[..32]),
                self.tail_state_a.hash_one(key),
                self.tail_state_b.hash_one(key)
            )
        }
    }
}

fn seeded(seeds: [u64; 4]) -> RandomState {
    RandomState::with_seeds(seeds[0], seeds[1], seeds[2], seeds[3])
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

/// Read one length-prefixed field at `pos`; `None` when the buffer ends
/// mid-record.
fn read_field(data: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let len_end = pos.checked_add(8)?;
    if len_end > data.len() {
        return None;
    }
    let len = u64::from_le_bytes(data[pos..len_end].try_into().ok()?) as usize;
    let end = len_end.checked_add(len)?;
    if end > data.len() {
        return None;
    }
    Some((&data[len_end..end], end))
}
