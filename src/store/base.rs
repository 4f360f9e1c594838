//! State shared by the writer and the reader
//!
//! Directory layout, the loaded TOC, id assignment, block allocation and
//! the scratch buffer pool.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::block::{ResourcePool, SCRATCH_BUFFER_SIZE};
use crate::error::Result;
use crate::toc::{read_toc, BlockAllocator, Toc, TocEntry};

use super::{StoreStats, CONTENTS_FILE_NAME, TOC_FILE_NAME};

pub(crate) struct StoreBase {
    /// Store directory
    pub(crate) dir: PathBuf,
    pub(crate) toc: Toc,
    /// Id handed to the next stored document
    pub(crate) next_id: i32,
    pub(crate) allocator: BlockAllocator,
    /// Scratch buffers for (de)compression, one per concurrent operation
    pub(crate) scratch: ResourcePool<Vec<u8>>,
}

impl StoreBase {
    pub(crate) fn new(dir: &Path, pool_size: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            toc: Toc::new(),
            next_id: 1,
            allocator: BlockAllocator::default(),
            scratch: ResourcePool::new("scratch buffers", pool_size, || {
                vec![0u8; SCRATCH_BUFFER_SIZE]
            }),
        }
    }

    pub(crate) fn toc_path(&self) -> PathBuf {
        self.dir.join(TOC_FILE_NAME)
    }

    pub(crate) fn contents_path(&self) -> PathBuf {
        self.dir.join(CONTENTS_FILE_NAME)
    }

    /// Load the TOC and derive next id and free blocks from it
    pub(crate) fn load_toc(&mut self) -> Result<()> {
        self.toc = read_toc(&self.toc_path())?;
        self.allocator = self.toc.allocator()?;
        self.next_id = self.toc.next_id();
        Ok(())
    }

    pub(crate) fn entry(&self, id: i32) -> Option<&TocEntry> {
        self.toc.get(id)
    }

    pub(crate) fn id_set(&self) -> BTreeSet<i32> {
        self.toc.ids().collect()
    }

    pub(crate) fn is_deleted(&self, id: i32) -> bool {
        self.toc.get(id).is_some_and(|e| e.deleted)
    }

    pub(crate) fn doc_length(&self, id: i32) -> Option<i32> {
        self.toc
            .get(id)
            .filter(|e| !e.deleted)
            .map(|e| e.entry_length_chars)
    }

    pub(crate) fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total_blocks: self.allocator.total_blocks(),
            free_blocks: self.allocator.free_count(),
            ..StoreStats::default()
        };
        for entry in self.toc.entries() {
            stats.entries += 1;
            if entry.deleted {
                stats.deleted_entries += 1;
            } else {
                stats.stored_bytes += entry.entry_length_bytes as u64;
                stats.stored_chars += entry.entry_length_chars as u64;
            }
        }
        stats
    }
}
