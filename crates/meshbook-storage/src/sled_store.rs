//! On-disk storage engine backed by sled.

use std::path::Path;

use meshbook_types::{MeshbookError, Result};
use tracing::info;

use crate::Storage;

/// Node database in a single sled tree.
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(storage_err)?;
        info!(path = %path.display(), keys = db.len(), "opened node database");
        Ok(Self { db })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(err: sled::Error) -> MeshbookError {
    MeshbookError::Storage(err.to_string())
}

impl Storage for SledStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key).map_err(storage_err)?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value).map_err(storage_err)?;
        self.flush()
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.remove(key).map_err(storage_err)?;
        self.flush()
    }

    fn get_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) = item.map_err(storage_err)?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn delete_all(&self) -> Result<()> {
        self.db.clear().map_err(storage_err)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use tempfile::tempdir;

    #[test]
    fn put_get_delete() {
        let dir = tempdir().unwrap();
        conformance::put_get_delete(&SledStorage::open(dir.path()).unwrap());
    }

    #[test]
    fn delete_absent_is_ok() {
        let dir = tempdir().unwrap();
        conformance::delete_absent_is_ok(&SledStorage::open(dir.path()).unwrap());
    }

    #[test]
    fn prefix_scan() {
        let dir = tempdir().unwrap();
        conformance::prefix_scan(&SledStorage::open(dir.path()).unwrap());
    }

    #[test]
    fn delete_all() {
        let dir = tempdir().unwrap();
        conformance::delete_all(&SledStorage::open(dir.path()).unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SledStorage::open(dir.path()).unwrap();
            store.put(b"order:1", b"persisted").unwrap();
        }
        let store = SledStorage::open(dir.path()).unwrap();
        assert_eq!(store.get(b"order:1").unwrap(), Some(b"persisted".to_vec()));
    }
}
