//! In-memory engine backed by a hash map

use ahash::AHashMap;
use parking_lot::RwLock;

/// In-memory key/value engine.
///
/// Safe under concurrent callers: reads take the shared side of the
/// lock, mutations the exclusive side. The engine never logs and knows
/// nothing about durability; that is the storage coordinator's job.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    kv: RwLock<AHashMap<String, String>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            kv: RwLock::new(AHashMap::new()),
        }
    }

    /// Insert or overwrite a value.
    pub fn set(&self, key: &str, value: &str) {
        self.kv.write().insert(key.to_string(), value.to_string());
    }

    /// Look up a value. `None` means the key is absent.
    pub fn get(&self, key: &str) -> Option<String> {
        self.kv.read().get(key).cloned()
    }

    /// Remove a key. Removing an absent key is a no-op.
    pub fn del(&self, key: &str) {
        self.kv.write().remove(key);
    }
}
