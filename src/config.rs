//! Configuration for a content store instance
//!
//! Per-instance tunables with sensible defaults. Format-level constants
//! (block size, compression factors) are not configurable; they live in
//! [`crate::block`].

/// Default number of bytes mapped past the end of the TOC file while writing
pub const DEFAULT_WRITE_MAP_RESERVE: usize = 1_000_000;

/// Default number of pooled compressors / decompressors / scratch buffers
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Configuration for opening a content store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // TOC Configuration
    // -------------------------------------------------------------------------
    /// Extra bytes mapped beyond the TOC file length when writing the TOC.
    /// Larger reserves mean fewer remaps; it does not affect the file format.
    pub write_map_reserve: usize,

    // -------------------------------------------------------------------------
    // Resource Configuration
    // -------------------------------------------------------------------------
    /// Maximum number of pooled (de)compressors and scratch buffers.
    /// Callers block once this many are checked out.
    pub pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            write_map_reserve: DEFAULT_WRITE_MAP_RESERVE,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the TOC write reserve (in bytes, minimum 1)
    pub fn write_map_reserve(mut self, bytes: usize) -> Self {
        self.config.write_map_reserve = bytes.max(1);
        self
    }

    /// Set the resource pool size (minimum 1)
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size.max(1);
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
