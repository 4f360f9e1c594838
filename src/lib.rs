//! # contentstore
//!
//! A document content store for corpus search engines:
//! - Documents stored as runs of fixed-size, zlib-compressed blocks
//! - Character-range retrieval that only reads the blocks it needs
//! - Deletion with block reuse
//! - Memory-mapped table of contents (TOC)
//! - Single writer, or many concurrent readers
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ContentStore                            │
//! │              (open / version check / dispatch)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Writer    │          │   Reader    │
//!   │ (&mut self) │          │  (&self)    │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ├────────────┬───────────┤
//!          ▼            ▼           ▼
//!   ┌─────────────┐ ┌─────────┐ ┌─────────────┐
//!   │    TOC      │ │  Block  │ │  Resource   │
//!   │  (mmap)     │ │ codec   │ │   pools     │
//!   └─────────────┘ └─────────┘ └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod toc;
pub mod block;
pub mod store;
pub mod compact;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::StoreConfig;
pub use store::{ContentStore, ContentStoreReader, ContentStoreWriter, StoreStats};
pub use compact::{compact, CompactionReport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of contentstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
