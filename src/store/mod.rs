pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use anyhow::Result;

/// Opaque get/set-by-key persistence port. The engine serializes its state
/// (`config`, `price_cache`, `history`) into blobs and never assumes anything
/// about the medium behind them.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

pub const CONFIG_KEY: &str = "config";
pub const PRICE_CACHE_KEY: &str = "price_cache";
pub const HISTORY_KEY: &str = "history";
