//! Block allocation for the contents file
//!
//! Free blocks are always derived from the loaded entries in one pass
//! ([`BlockAllocator::from_entries`]); afterwards only `allocate` and
//! `release` change them.

use std::collections::BTreeSet;

use super::{TocEntry, BLOCK_INDEX_LIMIT};
use crate::error::{Result, StoreError};

/// Tracks the size of the contents file (in blocks) and which blocks are free
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockAllocator {
    /// Number of block slots in the contents file
    total_blocks: i32,
    /// Reclaimed slots, smallest reused first
    free: BTreeSet<i32>,
}

impl BlockAllocator {
    /// Derive the allocation state from a set of TOC entries.
    ///
    /// Every block referenced by any entry is occupied, deleted entries
    /// included; every other slot below the highest referenced one is free.
    /// A block index outside `0..BLOCK_INDEX_LIMIT` is a corrupt TOC.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a TocEntry>) -> Result<Self> {
        let entries: Vec<&TocEntry> = entries.into_iter().collect();
        let blocks = || entries.iter().flat_map(|e| e.block_indices.iter().copied());

        if let Some(bad) = blocks().find(|b| !(0..BLOCK_INDEX_LIMIT).contains(b)) {
            return Err(StoreError::Corruption(format!(
                "block index {} out of range",
                bad
            )));
        }

        let total_blocks = blocks().max().map_or(0, |max| max + 1);

        let mut occupied = vec![false; total_blocks as usize];
        for block in blocks() {
            occupied[block as usize] = true;
        }

        let free = occupied
            .iter()
            .enumerate()
            .filter(|(_, &used)| !used)
            .map(|(i, _)| i as i32)
            .collect();

        Ok(Self { total_blocks, free })
    }

    /// Hand out a block slot: the smallest free one, else a new one at the end
    pub fn allocate(&mut self) -> i32 {
        match self.free.pop_first() {
            Some(block) => block,
            None => {
                self.total_blocks += 1;
                self.total_blocks - 1
            }
        }
    }

    /// Return blocks to the free set
    pub fn release(&mut self, blocks: &[i32]) {
        self.free.extend(blocks.iter().copied());
    }

    /// Forget all blocks (store cleared)
    pub fn reset(&mut self) {
        self.total_blocks = 0;
        self.free.clear();
    }

    pub fn total_blocks(&self) -> i32 {
        self.total_blocks
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn is_free(&self, block: i32) -> bool {
        self.free.contains(&block)
    }

    /// Free blocks in ascending order
    pub fn free_blocks(&self) -> impl Iterator<Item = i32> + '_ {
        self.free.iter().copied()
    }
}
