//! In-memory storage engine.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use meshbook_types::Result;

use crate::Storage;

/// Ordered in-memory map. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn get_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete_all(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[test]
    fn put_get_delete() {
        conformance::put_get_delete(&MemoryStorage::new());
    }

    #[test]
    fn delete_absent_is_ok() {
        conformance::delete_absent_is_ok(&MemoryStorage::new());
    }

    #[test]
    fn prefix_scan() {
        conformance::prefix_scan(&MemoryStorage::new());
    }

    #[test]
    fn delete_all() {
        let store = MemoryStorage::new();
        conformance::delete_all(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_writers() {
        let store = std::sync::Arc::new(MemoryStorage::new());
        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100u8 {
                        store.put(&[b'k', t, i], &[i]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 800);
    }
}
