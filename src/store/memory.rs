use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::store::BlobStore;

/// In-memory store, used in tests and as the fallback when the data
/// directory cannot be opened. Writes can be made to fail on demand so
/// callers' storage-failure handling is testable.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.failing_writes
            .store(if fail { u32::MAX } else { 0 }, Ordering::SeqCst);
    }

    /// Makes exactly the next `n` writes fail, after which writes recover.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        if self.take_failure() {
            return Err(anyhow!("store full"));
        }
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
