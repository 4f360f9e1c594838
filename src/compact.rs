//! Offline compaction
//!
//! Deleted documents leave their blocks free for reuse, but the contents
//! file never shrinks. Compaction rewrites a closed store with only the
//! live documents packed from block 0.
//!
//! ## Process
//! ```text
//! 1. Open <dir> for reading
//! 2. Create <dir>/.compacting as a fresh store
//! 3. Copy live documents under their original ids;
//!    deleted ids become tombstones (no blocks) so they are never reused
//! 4. Rename the new file-contents.dat and toc.dat over the old ones
//! 5. Remove <dir>/.compacting
//! ```
//!
//! The store must not be open elsewhere while it is compacted.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{
    ContentStoreReader, ContentStoreWriter, StoreFormat, CONTENTS_FILE_NAME, TOC_FILE_NAME,
};

/// Staging directory, inside the store directory
pub const STAGING_DIR_NAME: &str = ".compacting";

/// Outcome of a compaction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Live documents copied
    pub documents: usize,
    /// Deleted ids kept as tombstones
    pub tombstones: usize,
    pub blocks_before: i32,
    pub blocks_after: i32,
}

impl CompactionReport {
    pub fn blocks_reclaimed(&self) -> i32 {
        self.blocks_before - self.blocks_after
    }
}

/// Compact the store in `dir`
pub fn compact(dir: impl AsRef<Path>, config: &StoreConfig) -> Result<CompactionReport> {
    let dir = dir.as_ref();
    StoreFormat::detect(dir)?;

    let staging = dir.join(STAGING_DIR_NAME);
    if staging.exists() {
        debug!(path = %staging.display(), "Removing stale staging directory");
        fs::remove_dir_all(&staging)?;
    }

    let reader = ContentStoreReader::open_with_config(dir, config.clone())?;
    let mut writer = ContentStoreWriter::open_with_config(&staging, true, config.clone())?;

    let mut report = CompactionReport {
        blocks_before: reader.stats().total_blocks,
        ..CompactionReport::default()
    };

    for id in reader.id_set() {
        if reader.is_deleted(id) {
            writer.insert_tombstone(id)?;
            report.tombstones += 1;
            continue;
        }
        let text = reader.retrieve(id)?.ok_or_else(|| {
            StoreError::Corruption(format!("document {} vanished during compaction", id))
        })?;
        writer.store_as(id, &text)?;
        report.documents += 1;
    }

    report.blocks_after = writer.total_blocks();
    writer.close()?;
    reader.close()?;

    replace_file(&staging, dir, CONTENTS_FILE_NAME)?;
    replace_file(&staging, dir, TOC_FILE_NAME)?;
    fs::remove_dir_all(&staging)?;

    info!(
        dir = %dir.display(),
        documents = report.documents,
        tombstones = report.tombstones,
        blocks_before = report.blocks_before,
        blocks_after = report.blocks_after,
        "Compacted content store"
    );
    Ok(report)
}

/// Move `from/name` over `to/name`; a missing source removes the target
fn replace_file(from: &Path, to: &Path, name: &str) -> Result<()> {
    let source = from.join(name);
    let target = to.join(name);
    if source.exists() {
        fs::rename(&source, &target)?;
    } else if target.exists() {
        fs::remove_file(&target)?;
    }
    Ok(())
}
