use anyhow::{Context, Result};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::debug;

use crate::store::BlobStore;

/// Durable key-value store on top of a fjall keyspace.
pub struct DiskStore {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        let partition = keyspace
            .open_partition("state", PartitionCreateOptions::default())
            .context("Failed to open state partition")?;
        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }
}

impl BlobStore for DiskStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.partition.get(key)?;
        debug!(
            "Store GET {}: {}",
            key,
            if value.is_some() { "hit" } else { "miss" }
        );
        Ok(value.map(|slice| slice.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.partition.insert(key, value)?;
        debug!("Store SET {} ({} bytes)", key, value.len());
        Ok(())
    }
}
