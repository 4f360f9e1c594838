//! Content store reader
//!
//! Read-only view over a store. The TOC is loaded once at open and never
//! changes, so a reader can be shared between threads (`&self` API); each
//! retrieval opens its own handle on the contents file and checks out a
//! decompressor and scratch buffer from the pools.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::Decompress;
use tracing::{debug, info, trace};

use crate::block::{decode_block, Pooled, ResourcePool, BLOCK_SIZE};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::toc::TocEntry;

use super::base::StoreBase;
use super::StoreStats;

/// Reads documents from a fixed-block content store
pub struct ContentStoreReader {
    base: StoreBase,
    decompressors: ResourcePool<Decompress>,
    blocks_read: AtomicU64,
}

impl ContentStoreReader {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(dir, StoreConfig::default())
    }

    pub fn open_with_config(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StoreError::Format(format!(
                "Content store directory doesn't exist: {}",
                dir.display()
            )));
        }

        let mut base = StoreBase::new(dir, config.pool_size);
        if !base.toc_path().exists() {
            return Err(StoreError::Format(format!(
                "TOC file doesn't exist: {}",
                base.toc_path().display()
            )));
        }
        base.load_toc()?;

        info!(
            dir = %dir.display(),
            entries = base.toc.len(),
            total_blocks = base.allocator.total_blocks(),
            "Opened content store for reading"
        );

        Ok(Self {
            base,
            decompressors: ResourcePool::new("decompressors", config.pool_size, || {
                Decompress::new(true)
            }),
            blocks_read: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Whole document, or `None` for unknown and deleted ids
    pub fn retrieve(&self, id: i32) -> Result<Option<String>> {
        Ok(self
            .retrieve_parts(id, &[-1], &[-1])?
            .and_then(|mut parts| parts.pop()))
    }

    /// Characters `[start, end)` of a document; -1 means document start /
    /// document end.
    pub fn retrieve_part(&self, id: i32, start: i32, end: i32) -> Result<Option<String>> {
        Ok(self
            .retrieve_parts(id, &[start], &[end])?
            .and_then(|mut parts| parts.pop()))
    }

    /// Several character ranges of one document, in request order.
    ///
    /// `starts[i]` / `ends[i]` delimit range i; -1 means document start /
    /// document end. Only the blocks covering each range are read.
    pub fn retrieve_parts(
        &self,
        id: i32,
        starts: &[i32],
        ends: &[i32],
    ) -> Result<Option<Vec<String>>> {
        let entry = match self.base.entry(id) {
            Some(entry) if !entry.deleted => entry,
            _ => return Ok(None),
        };
        if starts.len() != ends.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} start offsets but {} end offsets",
                starts.len(),
                ends.len()
            )));
        }

        let mut parts = Vec::with_capacity(starts.len());
        let mut session = if entry.block_indices.is_empty() {
            None
        } else {
            Some(self.begin_read()?)
        };

        for (&start, &end) in starts.iter().zip(ends) {
            let (start, end) = resolve_range(entry, start, end)?;
            if start == end {
                parts.push(String::new());
                continue;
            }
            let Some(session) = session.as_mut() else {
                return Err(StoreError::Corruption(format!(
                    "document {} has {} characters but no blocks",
                    id, entry.entry_length_chars
                )));
            };

            let (first, last) = entry.covering_blocks(start, end);
            let mut decoded = String::new();
            for &block in &entry.block_indices[first..=last] {
                decoded.push_str(&self.read_block(session, block)?);
            }

            let from = start
                .checked_sub(entry.block_char_offsets[first])
                .filter(|from| *from >= 0)
                .ok_or_else(|| {
                    StoreError::Corruption(format!(
                        "document {}: block {} starts after character {}",
                        id, first, start
                    ))
                })? as usize;
            let count = (end - start) as usize;
            let part = slice_chars(&decoded, from, count).ok_or_else(|| {
                StoreError::Corruption(format!(
                    "blocks {}..={} of document {} hold fewer characters than the TOC records",
                    first, last, id
                ))
            })?;
            trace!(id, start, end, blocks = last - first + 1, "Retrieved part");
            parts.push(part);
        }

        Ok(Some(parts))
    }

    fn begin_read(&self) -> Result<ReadSession<'_>> {
        Ok(ReadSession {
            file: File::open(self.base.contents_path())?,
            decompressor: self.decompressors.acquire()?,
            scratch: self.base.scratch.acquire()?,
            block: vec![0u8; BLOCK_SIZE],
        })
    }

    fn read_block(&self, session: &mut ReadSession<'_>, block: i32) -> Result<String> {
        let offset = block as u64 * BLOCK_SIZE as u64;
        session.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match session.file.read(&mut session.block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < BLOCK_SIZE {
            return Err(StoreError::Corruption(format!(
                "Not enough bytes read for block {}: {} < {}",
                block, filled, BLOCK_SIZE
            )));
        }
        self.blocks_read.fetch_add(1, Ordering::Relaxed);

        decode_block(
            &session.block,
            &mut session.decompressor,
            session.scratch.as_mut_slice(),
        )
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Length in characters, or `None` for unknown and deleted ids
    pub fn doc_length(&self, id: i32) -> Option<i32> {
        self.base.doc_length(id)
    }

    pub fn is_deleted(&self, id: i32) -> bool {
        self.base.is_deleted(id)
    }

    /// Every id in the TOC, deleted ones included
    pub fn id_set(&self) -> BTreeSet<i32> {
        self.base.id_set()
    }

    pub fn toc_entry(&self, id: i32) -> Option<&TocEntry> {
        self.base.entry(id)
    }

    pub fn stats(&self) -> StoreStats {
        self.base.stats()
    }

    /// Blocks read from disk since open
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read.load(Ordering::Relaxed)
    }

    pub fn dir(&self) -> &Path {
        &self.base.dir
    }

    /// Release pooled resources. Retrievals still in flight on other
    /// threads finish; later ones fail with [`StoreError::PoolClosed`].
    pub fn close(self) -> Result<()> {
        self.shutdown();
        debug!(blocks_read = self.blocks_read(), "Reader statistics");
        info!(dir = %self.base.dir.display(), "Closed content store reader");
        Ok(())
    }

    /// Close the pools without consuming the reader
    pub fn shutdown(&self) {
        self.decompressors.close();
        self.base.scratch.close();
    }
}

/// Resources checked out for one retrieval call
struct ReadSession<'a> {
    file: File,
    decompressor: Pooled<'a, Decompress>,
    scratch: Pooled<'a, Vec<u8>>,
    block: Vec<u8>,
}

/// Apply the -1 sentinels and validate a character range.
///
/// The whole of an empty document resolves to `(0, 0)`; every other range
/// must be non-empty and lie within the document.
fn resolve_range(entry: &TocEntry, start: i32, end: i32) -> Result<(i32, i32)> {
    let length = entry.entry_length_chars;
    let whole = start == -1 && end == -1;
    let start = if start == -1 { 0 } else { start };
    let end = if end == -1 { length } else { end };

    if whole && length == 0 {
        return Ok((0, 0));
    }
    if start < 0 || end < 0 {
        return Err(StoreError::InvalidArgument(format!(
            "Illegal values, start = {}, end = {}",
            start, end
        )));
    }
    if start > length || end > length {
        return Err(StoreError::InvalidArgument(format!(
            "Value(s) out of range, start = {}, end = {}, content length = {}",
            start, end, length
        )));
    }
    if end <= start {
        return Err(StoreError::InvalidArgument(format!(
            "Tried to read empty or negative length snippet (from {} to {})",
            start, end
        )));
    }
    Ok((start, end))
}

/// `count` characters of `text` starting at character `from`
fn slice_chars(text: &str, from: usize, count: usize) -> Option<String> {
    let mut boundaries = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()));
    let begin = boundaries.nth(from)?;
    let finish = if count == 0 {
        begin
    } else {
        boundaries.nth(count - 1)?
    };
    Some(text[begin..finish].to_string())
}
