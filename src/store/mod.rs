//! Store Module
//!
//! Directory-level API of the content store.
//!
//! ## Responsibilities
//! - Create / open a store directory and check its type and version
//! - Writing: append documents, delete them, reuse their blocks
//! - Reading: whole documents or character ranges, from many threads
//!
//! ## Directory Layout
//! ```text
//! <dir>/
//! ├── version.dat         "fixedblock||1"
//! ├── toc.dat             table of contents (see `toc`)
//! └── file-contents.dat   fixed-size compressed blocks (see `block`)
//! ```
//!
//! ## Access Model
//! A store is opened either for writing ([`ContentStoreWriter`], `&mut self`)
//! or for reading ([`ContentStoreReader`], `&self`, shareable across
//! threads). The TOC a reader sees is the one on disk when it was opened.

mod base;
mod reader;
mod version;
mod writer;

use std::collections::BTreeSet;
use std::path::Path;

pub use reader::ContentStoreReader;
pub use version::{StoreFormat, VersionFile, VERSION_FILE_NAME};
pub use writer::{ContentStoreWriter, WRITE_BLOCK_WHEN_CHARACTERS_AVAILABLE};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::toc::TocEntry;

/// Name of the table of contents file
pub const TOC_FILE_NAME: &str = "toc.dat";

/// Name of the block file
pub const CONTENTS_FILE_NAME: &str = "file-contents.dat";

/// Summary of a store's TOC and block usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// TOC entries, deleted ones included
    pub entries: usize,
    pub deleted_entries: usize,
    /// Block slots in the contents file
    pub total_blocks: i32,
    pub free_blocks: usize,
    /// Compressed bytes of live documents
    pub stored_bytes: u64,
    /// Characters of live documents
    pub stored_chars: u64,
}

/// A content store opened for writing or for reading.
///
/// Operations that do not fit the mode the store was opened in return
/// [`StoreError::Unsupported`].
pub enum ContentStore {
    Writer(ContentStoreWriter),
    Reader(ContentStoreReader),
}

impl ContentStore {
    /// Open the store in `dir`.
    ///
    /// `create` starts a new, empty store (wiping any existing one) and
    /// requires `write_mode`. Otherwise the store type is read from
    /// `version.dat`.
    pub fn open(dir: impl AsRef<Path>, write_mode: bool, create: bool) -> Result<Self> {
        Self::open_with_config(dir, write_mode, create, StoreConfig::default())
    }

    pub fn open_with_config(
        dir: impl AsRef<Path>,
        write_mode: bool,
        create: bool,
        config: StoreConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        if create {
            if !write_mode {
                return Err(StoreError::InvalidArgument(
                    "Can't create a content store in read-only mode".to_string(),
                ));
            }
            return Ok(Self::Writer(ContentStoreWriter::open_with_config(
                dir, true, config,
            )?));
        }

        match StoreFormat::detect(dir)? {
            StoreFormat::FixedBlock => {
                if write_mode {
                    Ok(Self::Writer(ContentStoreWriter::open_with_config(
                        dir, false, config,
                    )?))
                } else {
                    Ok(Self::Reader(ContentStoreReader::open_with_config(
                        dir, config,
                    )?))
                }
            }
        }
    }

    pub fn is_writer(&self) -> bool {
        matches!(self, Self::Writer(_))
    }

    pub fn as_writer(&mut self) -> Option<&mut ContentStoreWriter> {
        match self {
            Self::Writer(writer) => Some(writer),
            Self::Reader(_) => None,
        }
    }

    pub fn as_reader(&self) -> Option<&ContentStoreReader> {
        match self {
            Self::Reader(reader) => Some(reader),
            Self::Writer(_) => None,
        }
    }

    // =========================================================================
    // Write mode
    // =========================================================================

    pub fn store(&mut self, text: &str) -> Result<i32> {
        self.writer("store")?.store(text)
    }

    pub fn store_part(&mut self, text: &str) -> Result<()> {
        self.writer("store_part")?.store_part(text)
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<i32> {
        self.writer("store_bytes")?.store_bytes(bytes)
    }

    pub fn store_part_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer("store_part_bytes")?.store_part_bytes(bytes)
    }

    pub fn delete(&mut self, id: i32) -> Result<bool> {
        self.writer("delete")?.delete(id)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.writer("clear")?.clear()
    }

    // =========================================================================
    // Read mode
    // =========================================================================

    pub fn retrieve(&self, id: i32) -> Result<Option<String>> {
        self.reader("retrieve")?.retrieve(id)
    }

    pub fn retrieve_part(&self, id: i32, start: i32, end: i32) -> Result<Option<String>> {
        self.reader("retrieve_part")?.retrieve_part(id, start, end)
    }

    pub fn retrieve_parts(
        &self,
        id: i32,
        starts: &[i32],
        ends: &[i32],
    ) -> Result<Option<Vec<String>>> {
        self.reader("retrieve_parts")?.retrieve_parts(id, starts, ends)
    }

    // =========================================================================
    // Either mode
    // =========================================================================

    pub fn doc_length(&self, id: i32) -> Option<i32> {
        match self {
            Self::Writer(w) => w.doc_length(id),
            Self::Reader(r) => r.doc_length(id),
        }
    }

    pub fn is_deleted(&self, id: i32) -> bool {
        match self {
            Self::Writer(w) => w.is_deleted(id),
            Self::Reader(r) => r.is_deleted(id),
        }
    }

    pub fn id_set(&self) -> BTreeSet<i32> {
        match self {
            Self::Writer(w) => w.id_set(),
            Self::Reader(r) => r.id_set(),
        }
    }

    pub fn toc_entry(&self, id: i32) -> Option<&TocEntry> {
        match self {
            Self::Writer(w) => w.toc_entry(id),
            Self::Reader(r) => r.toc_entry(id),
        }
    }

    pub fn stats(&self) -> StoreStats {
        match self {
            Self::Writer(w) => w.stats(),
            Self::Reader(r) => r.stats(),
        }
    }

    pub fn close(self) -> Result<()> {
        match self {
            Self::Writer(w) => w.close(),
            Self::Reader(r) => r.close(),
        }
    }

    fn writer(&mut self, op: &str) -> Result<&mut ContentStoreWriter> {
        match self {
            Self::Writer(writer) => Ok(writer),
            Self::Reader(_) => Err(StoreError::Unsupported(format!(
                "{} on a content store opened for reading",
                op
            ))),
        }
    }

    fn reader(&self, op: &str) -> Result<&ContentStoreReader> {
        match self {
            Self::Reader(reader) => Ok(reader),
            Self::Writer(_) => Err(StoreError::Unsupported(format!(
                "{} on a content store opened for writing",
                op
            ))),
        }
    }
}
