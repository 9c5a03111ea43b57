//! # meshbook-storage
//!
//! Durable key-value storage behind the [`Storage`] trait.
//!
//! Orders, joined channels, and the node identity all live in one keyspace,
//! separated by key prefix (see `meshbook_types::constants`). Two engines:
//!
//! - [`MemoryStorage`]: ordered map behind a lock, for tests and ephemeral nodes
//! - [`SledStorage`]: embedded `sled` database, flushed on every write

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStorage;
pub use sled_store::SledStorage;

use meshbook_types::Result;

/// Prefix-aware key-value store shared by the API path and the receive path.
///
/// Implementations must be safe to call concurrently. Writes to a single key
/// are last-writer-wins.
pub trait Storage: Send + Sync {
    /// Value under `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Every `(key, value)` whose key starts with `prefix`, in key order.
    fn get_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Remove every key.
    fn delete_all(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every engine must share.

    use super::Storage;

    pub fn put_get_delete(store: &dyn Storage) {
        assert_eq!(store.get(b"order:1").unwrap(), None);
        store.put(b"order:1", b"one").unwrap();
        assert_eq!(store.get(b"order:1").unwrap(), Some(b"one".to_vec()));
        store.put(b"order:1", b"uno").unwrap();
        assert_eq!(store.get(b"order:1").unwrap(), Some(b"uno".to_vec()));
        store.delete(b"order:1").unwrap();
        assert_eq!(store.get(b"order:1").unwrap(), None);
    }

    pub fn delete_absent_is_ok(store: &dyn Storage) {
        store.delete(b"never-written").unwrap();
    }

    pub fn prefix_scan(store: &dyn Storage) {
        store.put(b"order:b", b"2").unwrap();
        store.put(b"order:a", b"1").unwrap();
        store.put(b"channel:x", b"c").unwrap();
        store.put(b"orders", b"not an order").unwrap();
        store.put(b"private_key", b"k").unwrap();

        let orders = store.get_all_with_prefix(b"order:").unwrap();
        assert_eq!(
            orders,
            vec![
                (b"order:a".to_vec(), b"1".to_vec()),
                (b"order:b".to_vec(), b"2".to_vec()),
            ]
        );
        assert_eq!(store.get_all_with_prefix(b"channel:").unwrap().len(), 1);
        assert!(store.get_all_with_prefix(b"nothing:").unwrap().is_empty());
    }

    pub fn delete_all(store: &dyn Storage) {
        store.put(b"order:a", b"1").unwrap();
        store.put(b"channel:x", b"c").unwrap();
        store.delete_all().unwrap();
        assert!(store.get_all_with_prefix(b"").unwrap().is_empty());
    }
}
