//! Content store writer
//!
//! Appends documents as runs of compressed blocks and keeps the TOC in
//! memory until close.
//!
//! ## Write Path
//! ```text
//! store_part(text) ──► pending buffer ──► encode_block ──► free block slot
//!                                           (whenever enough characters
//!                                            are pending, or on store())
//! store(text)      ──► flush remaining pending chars ──► TOC entry, new id
//! store_part_bytes ──► UTF-8 decode (split characters carried over) ──► store_part
//! close()          ──► toc.dat (memory-mapped write)
//! ```

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::mem;
use std::path::Path;

use flate2::{Compress, Compression};
use tracing::{debug, error, info, trace, warn};

use crate::block::{encode_block, ResourcePool, BLOCK_SIZE, MAX_BLOCK_SIZE_BYTES};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::toc::{write_toc, TocEntry};

use super::base::StoreBase;
use super::version::{StoreFormat, VersionFile, VERSION_FILE_NAME};
use super::{StoreStats, CONTENTS_FILE_NAME, TOC_FILE_NAME};

/// Encode a block once this many characters are waiting
pub const WRITE_BLOCK_WHEN_CHARACTERS_AVAILABLE: usize = MAX_BLOCK_SIZE_BYTES;

/// Drop already-written text from the front of the pending buffer once it
/// grows past this many bytes
const MAX_UNWRITTEN_BYTES: usize = BLOCK_SIZE * 8096;

/// Writes documents to a fixed-block content store
pub struct ContentStoreWriter {
    base: StoreBase,
    config: StoreConfig,

    /// Contents file, opened on first block write
    contents: Option<File>,
    compressors: ResourcePool<Compress>,
    /// One block plus zero padding, reused for every write
    block_buf: Vec<u8>,

    // -------------------------------------------------------------------------
    // Document being stored
    // -------------------------------------------------------------------------
    pending: String,
    /// Bytes at the front of `pending` already written to blocks
    pending_offset: usize,
    /// Characters in `pending` after `pending_offset`
    pending_chars: usize,
    chars_written: i32,
    bytes_written: i32,
    block_indices: Vec<i32>,
    block_char_offsets: Vec<i32>,
    /// Leading bytes of a UTF-8 character split across `store_part_bytes` calls
    partial_char: Vec<u8>,

    toc_modified: bool,
    blocks_written: u64,
    closed: bool,
}

impl ContentStoreWriter {
    /// Open a store for writing with the default configuration.
    ///
    /// With `create` set, any existing store in `dir` is wiped first.
    pub fn open(dir: impl AsRef<Path>, create: bool) -> Result<Self> {
        Self::open_with_config(dir, create, StoreConfig::default())
    }

    pub fn open_with_config(
        dir: impl AsRef<Path>,
        create: bool,
        config: StoreConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut writer = Self {
            base: StoreBase::new(dir, config.pool_size),
            compressors: ResourcePool::new("compressors", config.pool_size, || {
                Compress::new(Compression::default(), true)
            }),
            config,
            contents: None,
            block_buf: vec![0u8; BLOCK_SIZE],
            pending: String::new(),
            pending_offset: 0,
            pending_chars: 0,
            chars_written: 0,
            bytes_written: 0,
            block_indices: Vec::new(),
            block_char_offsets: Vec::new(),
            partial_char: Vec::new(),
            toc_modified: false,
            blocks_written: 0,
            closed: false,
        };

        if create {
            remove_store_files(dir)?;
            writer.clear()?;
            VersionFile::write(dir, StoreFormat::FixedBlock)?;
            info!(dir = %dir.display(), "Created content store");
        } else {
            if dir.join(VERSION_FILE_NAME).exists() {
                StoreFormat::detect(dir)?;
            } else {
                VersionFile::write(dir, StoreFormat::FixedBlock)?;
            }
            if writer.base.toc_path().exists() {
                writer.base.load_toc()?;
            }
            info!(
                dir = %dir.display(),
                entries = writer.base.toc.len(),
                total_blocks = writer.base.allocator.total_blocks(),
                free_blocks = writer.base.allocator.free_count(),
                "Opened content store for writing"
            );
        }

        Ok(writer)
    }

    // =========================================================================
    // Storing
    // =========================================================================

    /// Append text to the document being stored.
    ///
    /// Blocks are written as soon as enough characters are pending, so a
    /// large document never has to be held in memory whole.
    pub fn store_part(&mut self, text: &str) -> Result<()> {
        if !self.partial_char.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "{} bytes of a split UTF-8 character still pending",
                self.partial_char.len()
            )));
        }
        self.append_text(text)
    }

    /// Append `text` and finish the current document. Returns its id.
    pub fn store(&mut self, text: &str) -> Result<i32> {
        self.store_part(text)?;
        self.finish_document()
    }

    /// Append UTF-8 encoded text to the document being stored.
    ///
    /// Chunks may split a character; its leading bytes are held until the
    /// next call. Invalid UTF-8 is rejected with the offending byte offset
    /// and nothing from the chunk is stored.
    pub fn store_part_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.partial_char.is_empty() {
            return self.append_utf8(bytes);
        }
        let mut joined = mem::take(&mut self.partial_char);
        joined.extend_from_slice(bytes);
        self.append_utf8(&joined)
    }

    /// Append UTF-8 encoded text and finish the current document. Returns
    /// its id.
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<i32> {
        self.store_part_bytes(bytes)?;
        if !self.partial_char.is_empty() {
            let dangling = mem::take(&mut self.partial_char).len();
            return Err(StoreError::InvalidArgument(format!(
                "document ends inside a UTF-8 character ({} trailing bytes)",
                dangling
            )));
        }
        self.finish_document()
    }

    fn append_utf8(&mut self, bytes: &[u8]) -> Result<()> {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            // incomplete sequence at the very end: keep it for the next chunk
            Err(e) if e.error_len().is_none() => {
                let (complete, rest) = bytes.split_at(e.valid_up_to());
                self.partial_char = rest.to_vec();
                std::str::from_utf8(complete).map_err(|e| invalid_utf8(&e))?
            }
            Err(e) => return Err(invalid_utf8(&e)),
        };
        self.append_text(text)
    }

    fn append_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.pending.push_str(text);
        self.pending_chars += text.chars().count();
        self.write_blocks(false)
    }

    /// Mark a document as deleted and release its blocks for reuse.
    ///
    /// Returns `false` (and changes nothing) for unknown or already deleted
    /// ids.
    pub fn delete(&mut self, id: i32) -> Result<bool> {
        match self.base.toc.get_mut(id) {
            Some(entry) if !entry.deleted => {
                entry.deleted = true;
                self.base.allocator.release(&entry.block_indices);
                debug!(id, blocks = entry.block_indices.len(), "Deleted document");
                self.toc_modified = true;
                Ok(true)
            }
            Some(_) => {
                warn!(id, "Document already deleted");
                Ok(false)
            }
            None => {
                warn!(id, "Cannot delete unknown document");
                Ok(false)
            }
        }
    }

    /// Remove every document and the contents file
    pub fn clear(&mut self) -> Result<()> {
        self.contents = None;
        remove_if_exists(&self.base.contents_path())?;

        self.base.toc.clear();
        self.base.allocator.reset();
        self.base.next_id = 1;
        self.reset_document();
        self.toc_modified = true;
        debug!(dir = %self.base.dir.display(), "Cleared content store");
        Ok(())
    }

    /// Store `text` under a specific id. `id` must be above every id in use.
    pub(crate) fn store_as(&mut self, id: i32, text: &str) -> Result<i32> {
        self.claim_id(id)?;
        self.store(text)
    }

    /// Record `id` as deleted without storing anything for it
    pub(crate) fn insert_tombstone(&mut self, id: i32) -> Result<()> {
        self.claim_id(id)?;
        self.base.toc.insert(TocEntry::tombstone(id));
        self.base.next_id = next_id_after(id)?;
        self.toc_modified = true;
        Ok(())
    }

    fn claim_id(&mut self, id: i32) -> Result<()> {
        if !self.pending.is_empty() || !self.partial_char.is_empty() {
            return Err(StoreError::InvalidArgument(
                "cannot assign an id while a document is being stored".to_string(),
            ));
        }
        if id < self.base.next_id {
            return Err(StoreError::InvalidArgument(format!(
                "id {} is not above the ids already in use (next id {})",
                id, self.base.next_id
            )));
        }
        self.base.next_id = id;
        Ok(())
    }

    fn finish_document(&mut self) -> Result<i32> {
        if self.pending_chars > 0 {
            self.write_blocks(true)?;
        }

        let id = self.base.next_id;
        self.base.next_id = next_id_after(id)?;

        let entry = TocEntry::new(
            id,
            self.bytes_written,
            self.chars_written,
            mem::take(&mut self.block_indices),
            mem::take(&mut self.block_char_offsets),
        );
        trace!(
            id,
            chars = entry.entry_length_chars,
            bytes = entry.entry_length_bytes,
            blocks = entry.block_count(),
            "Stored document"
        );
        self.base.toc.insert(entry);
        self.toc_modified = true;
        self.reset_document();
        Ok(id)
    }

    fn reset_document(&mut self) {
        self.pending.clear();
        if self.pending.capacity() > MAX_UNWRITTEN_BYTES {
            self.pending = String::new();
        }
        self.pending_offset = 0;
        self.pending_chars = 0;
        self.chars_written = 0;
        self.bytes_written = 0;
        self.block_indices.clear();
        self.block_char_offsets.clear();
        self.partial_char.clear();
    }

    /// Write blocks while enough characters are pending, or until nothing is
    /// pending when `flush` is set.
    fn write_blocks(&mut self, flush: bool) -> Result<()> {
        while (flush && self.pending_chars > 0)
            || self.pending_chars >= WRITE_BLOCK_WHEN_CHARACTERS_AVAILABLE
        {
            let encoded = {
                let mut compressor = self.compressors.acquire()?;
                let mut scratch = self.base.scratch.acquire()?;
                encode_block(
                    &self.pending[self.pending_offset..],
                    self.pending_chars,
                    &mut compressor,
                    scratch.as_mut_slice(),
                )?
            };

            let block = self.write_to_free_block(&encoded.data)?;
            self.block_indices.push(block);
            self.block_char_offsets.push(self.chars_written);
            self.chars_written = checked_length(self.chars_written, encoded.chars)?;
            self.bytes_written = checked_length(self.bytes_written, encoded.data.len())?;

            self.pending_offset += encoded.raw_bytes;
            self.pending_chars -= encoded.chars;
            if self.pending_offset > MAX_UNWRITTEN_BYTES {
                self.pending.drain(..self.pending_offset);
                self.pending_offset = 0;
            }
        }
        Ok(())
    }

    /// Write one compressed block (zero padded) to the lowest free slot
    fn write_to_free_block(&mut self, data: &[u8]) -> Result<i32> {
        let block = self.base.allocator.allocate();
        let offset = block as u64 * BLOCK_SIZE as u64;

        self.block_buf[..data.len()].copy_from_slice(data);
        self.block_buf[data.len()..].fill(0);

        let file = match self.contents.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.base.contents_path())?,
        };
        let file = self.contents.insert(file);
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&self.block_buf)?;

        self.blocks_written += 1;
        trace!(block, compressed = data.len(), "Wrote block");
        Ok(block)
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

    pub fn total_blocks(&self) -> i32 {
        self.base.allocator.total_blocks()
    }

    pub fn free_block_count(&self) -> usize {
        self.base.allocator.free_count()
    }

    /// Blocks written since open
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    pub fn dir(&self) -> &Path {
        &self.base.dir
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush the contents file and write the TOC if it changed
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.pending.is_empty() || !self.partial_char.is_empty() {
            warn!(
                chars_written = self.chars_written,
                "Discarding unfinished document on close"
            );
            self.reset_document();
        }

        self.compressors.close();
        self.base.scratch.close();

        if let Some(file) = self.contents.take() {
            file.sync_all()?;
        }

        if self.toc_modified {
            let summary = write_toc(
                &self.base.toc_path(),
                &self.base.toc,
                self.config.write_map_reserve,
            )?;
            self.toc_modified = false;
            debug!(
                entries = summary.entries,
                bytes = summary.bytes_written,
                remaps = summary.remaps,
                "Wrote TOC"
            );
        }

        info!(
            dir = %self.base.dir.display(),
            blocks_written = self.blocks_written,
            "Closed content store writer"
        );
        Ok(())
    }
}

impl Drop for ContentStoreWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!(dir = %self.base.dir.display(), "Writer dropped without close, flushing");
            if let Err(e) = self.shutdown() {
                error!(error = %e, "Failed to flush content store on drop");
            }
        }
    }
}

fn next_id_after(id: i32) -> Result<i32> {
    id.checked_add(1)
        .ok_or_else(|| StoreError::InvalidArgument("content store id space exhausted".to_string()))
}

fn checked_length(current: i32, add: usize) -> Result<i32> {
    i32::try_from(add)
        .ok()
        .and_then(|add| current.checked_add(add))
        .ok_or_else(|| {
            StoreError::InvalidArgument("document too large for a content store entry".to_string())
        })
}

fn invalid_utf8(e: &std::str::Utf8Error) -> StoreError {
    StoreError::InvalidArgument(format!("invalid UTF-8 at byte {}", e.valid_up_to()))
}

/// Remove the TOC, version and contents files plus legacy `data<N>.dat` files
fn remove_store_files(dir: &Path) -> Result<()> {
    for name in [TOC_FILE_NAME, VERSION_FILE_NAME, CONTENTS_FILE_NAME] {
        remove_if_exists(&dir.join(name))?;
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_str().is_some_and(is_legacy_data_file) {
            debug!(path = %entry.path().display(), "Removing legacy data file");
            remove_if_exists(&entry.path())?;
        }
    }
    Ok(())
}

/// `data<digits>.dat`
fn is_legacy_data_file(name: &str) -> bool {
    name.strip_prefix("data")
        .and_then(|rest| rest.strip_suffix(".dat"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
