//! Table of Contents Module
//!
//! Maps content ids to the blocks holding each document.
//!
//! ## Responsibilities
//! - In-memory ordered map id → [`TocEntry`]
//! - Record codec for `toc.dat`
//! - Loading through a read-only memory map
//! - Writing through a growable memory map with a write reserve
//! - Deriving the free-block set from the loaded entries
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Entry Count: i32                                         │
//! ├──────────────────────────────────────────────────────────┤
//! │ Entry (repeated Entry Count times)                       │
//! │ ┌────────┬───────────┬────────────┬─────────────┐        │
//! │ │ Id (4) │ Bytes (4) │ Chars (4)  │ Blocks (4)  │        │
//! │ └────────┴───────────┴────────────┴─────────────┘        │
//! │   block_indices:      [i32; Blocks]                      │
//! │   block_char_offsets: [i32; Blocks]                      │
//! │   (Chars < 0 means the entry was deleted)                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! All integers are big-endian.

mod allocator;
mod entry;
mod file;

use std::collections::BTreeMap;

use crate::error::Result;

pub use allocator::BlockAllocator;
pub use entry::{TocEntry, BLOCK_INDEX_LIMIT, DELETED_MARKER, ENTRY_HEADER_SIZE};
pub use file::{read_toc, write_toc, TocWriteSummary};

/// Size of the leading entry count
pub const TOC_HEADER_SIZE: usize = 4;

/// In-memory table of contents, ordered by id
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Toc {
    entries: BTreeMap<i32, TocEntry>,
}

impl Toc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i32) -> Option<&TocEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut TocEntry> {
        self.entries.get_mut(&id)
    }

    /// Insert an entry, replacing any entry with the same id
    pub fn insert(&mut self, entry: TocEntry) -> Option<TocEntry> {
        self.entries.insert(entry.id, entry)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All ids, deleted ones included, ascending
    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TocEntry> {
        self.entries.values()
    }

    /// The id the next stored document receives
    pub fn next_id(&self) -> i32 {
        self.entries
            .keys()
            .next_back()
            .map_or(1, |&id| id.saturating_add(1).max(1))
    }

    /// Serialized size of the whole TOC
    pub fn encoded_len(&self) -> usize {
        TOC_HEADER_SIZE + self.entries.values().map(TocEntry::encoded_len).sum::<usize>()
    }

    /// Derive block allocation state (total blocks + free set) from the entries
    pub fn allocator(&self) -> Result<BlockAllocator> {
        BlockAllocator::from_entries(self.entries.values())
    }
}
