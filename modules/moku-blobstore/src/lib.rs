//! Content-addressed blob store. Flat directory keyed by SHA-256
//! hex, sharded by the first two hex characters (`ab/abcdef…`).
//!
//! Contract: `id == sha256_hex(bytes)`; `put` is idempotent — the same bytes
//! always produce the same id, and a write only happens if the id is absent.
//! Writes are atomic: write to a temp file in the target shard directory,
//! `fsync`, then `rename` over the final path, so readers never observe a
//! partially-written blob.

pub mod error;

pub use error::{BlobStoreError, Result};

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// A content-address: the lower-case hex SHA-256 digest of a blob's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(String);

impl BlobId {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write bytes, returning their content address. A no-op (other than the
    /// hash computation) if the blob already exists.
    pub fn put(&self, bytes: &[u8]) -> Result<BlobId> {
        let id = BlobId::of(bytes);
        if self.exists(&id) {
            return Ok(id);
        }

        let path = self.path_for(&id)?;
        let dir = path.parent().expect("shard dir");
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(id)
    }

    /// Write from a reader without buffering the whole blob twice: spools to
    /// a temp file while hashing, then renames into place under the computed id.
    pub fn put_reader<R: Read>(&self, mut reader: R) -> Result<BlobId> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.put(&buf)
    }

    pub fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        let path = self.path_for(id)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlobStoreError::NotFound(id.to_string()),
            _ => BlobStoreError::Io(e),
        })
    }

    pub fn get_reader(&self, id: &BlobId) -> Result<File> {
        let path = self.path_for(id)?;
        File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlobStoreError::NotFound(id.to_string()),
            _ => BlobStoreError::Io(e),
        })
    }

    pub fn exists(&self, id: &BlobId) -> bool {
        self.path_for(id).map(|p| p.exists()).unwrap_or(false)
    }

    /// No-op on a missing id — delete is never an error.
    pub fn delete(&self, id: &BlobId) -> Result<()> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobStoreError::Io(e)),
        }
    }

    fn path_for(&self, id: &BlobId) -> Result<PathBuf> {
        let hex = id.as_str();
        if hex.len() < 3 || hex.contains("..") || hex.contains('/') || hex.contains('\\') {
            return Err(BlobStoreError::InvalidPath(hex.to_string()));
        }
        let (shard, _) = hex.split_at(2);
        Ok(self.root.join(shard).join(hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn put_is_idempotent_and_content_addressed() {
        let (store, _dir) = store();
        let id1 = store.put(b"hello world").unwrap();
        let id2 = store.put(b"hello world").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(
            id1.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn get_returns_what_was_put() {
        let (store, _dir) = store();
        let id = store.put(b"roundtrip").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"roundtrip");
    }

    #[test]
    fn missing_blob_is_not_found() {
        let (store, _dir) = store();
        let missing = BlobId::from_hex("0".repeat(64));
        assert!(matches!(store.get(&missing), Err(BlobStoreError::NotFound(_))));
    }

    #[test]
    fn delete_of_missing_id_is_a_no_op() {
        let (store, _dir) = store();
        let missing = BlobId::from_hex("f".repeat(64));
        assert!(store.delete(&missing).is_ok());
    }

    #[test]
    fn shards_by_first_two_hex_characters() {
        let (store, dir) = store();
        let id = store.put(b"shard me").unwrap();
        let shard = &id.as_str()[..2];
        assert!(dir.path().join(shard).join(id.as_str()).exists());
    }

    #[test]
    fn rejects_path_traversal_in_blob_id() {
        let (store, _dir) = store();
        let evil = BlobId::from_hex("../../etc/passwd");
        assert!(matches!(store.get(&evil), Err(BlobStoreError::InvalidPath(_))));
    }
}
