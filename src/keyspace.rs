use crate::value_entry::ValueEntry;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type Db = Arc<RwLock<Keyspace>>;

/// The single in-memory database. All access goes through one coarse
/// `RwLock`; no caller holds the lock across socket or file I/O.
#[derive(Default)]
pub struct Keyspace {
    entries: HashMap<Bytes, ValueEntry>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn shared() -> Db {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn set(&mut self, key: Bytes, entry: ValueEntry) {
        self.entries.insert(key, entry);
    }

    /// Lookup with passive expiry: an entry observed past its expiration is
    /// removed and reported as missing.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// All present keys. Expired-but-unread keys may still appear; callers
    /// treat them as ephemeral.
    pub fn keys(&self) -> Vec<Bytes> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter_for_snapshot(&self) -> impl Iterator<Item = (&Bytes, &ValueEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expiring_len(&self) -> usize {
        self.entries.values().filter(|e| e.expires_at().is_some()).count()
    }
}
