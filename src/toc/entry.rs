//! TOC entry definition and record codec
//!
//! One entry per stored document. Integers are big-endian `i32`.

use bytes::{Buf, BufMut};

use crate::error::{Result, StoreError};

/// Size of an entry's fixed header: id, byte length, char length, block count
pub const ENTRY_HEADER_SIZE: usize = 16;

/// Value written in the char length field of a deleted entry
pub const DELETED_MARKER: i32 = -1;

const BYTES_PER_INT: usize = 4;

/// Block indices are below this, so the block count always fits an `i32`
pub const BLOCK_INDEX_LIMIT: i32 = i32::MAX;

/// Table of contents entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Content id for this document
    pub id: i32,

    /// Total compressed size across all blocks
    pub entry_length_bytes: i32,

    /// Length of the document in characters.
    /// Not recoverable for entries read back as deleted (holds `DELETED_MARKER`).
    pub entry_length_chars: i32,

    /// Was this entry deleted? Only deleted entries are ever mutated.
    pub deleted: bool,

    /// Blocks this document is stored in, in document order
    pub block_indices: Vec<i32>,

    /// Character offset of the first character stored in each block
    pub block_char_offsets: Vec<i32>,
}

impl TocEntry {
    pub fn new(
        id: i32,
        entry_length_bytes: i32,
        entry_length_chars: i32,
        block_indices: Vec<i32>,
        block_char_offsets: Vec<i32>,
    ) -> Self {
        debug_assert_eq!(block_indices.len(), block_char_offsets.len());
        Self {
            id,
            entry_length_bytes,
            entry_length_chars,
            deleted: false,
            block_indices,
            block_char_offsets,
        }
    }

    /// A deleted entry without blocks; keeps an id reserved after compaction
    pub fn tombstone(id: i32) -> Self {
        Self {
            id,
            entry_length_bytes: 0,
            entry_length_chars: DELETED_MARKER,
            deleted: true,
            block_indices: Vec::new(),
            block_char_offsets: Vec::new(),
        }
    }

    pub fn block_count(&self) -> usize {
        self.block_indices.len()
    }

    /// Size of this entry serialized
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.block_indices.len() * BYTES_PER_INT * 2
    }

    /// Indices (into `block_indices`) of the first and last block covering
    /// the character range `[start, end)`.
    ///
    /// Caller guarantees `0 <= start < end <= entry_length_chars` and that the
    /// entry has at least one block.
    pub fn covering_blocks(&self, start: i32, end: i32) -> (usize, usize) {
        let offsets = &self.block_char_offsets;
        // last block starting at or before `start`
        let first = offsets.partition_point(|&o| o <= start).saturating_sub(1);
        // last block starting before `end`
        let last = offsets.partition_point(|&o| o < end).saturating_sub(1);
        (first, last.max(first))
    }

    /// Serialize into a TOC buffer
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.id);
        buf.put_i32(self.entry_length_bytes);
        buf.put_i32(if self.deleted {
            DELETED_MARKER
        } else {
            self.entry_length_chars
        });
        buf.put_i32(self.block_indices.len() as i32);
        for &block in &self.block_indices {
            buf.put_i32(block);
        }
        for &offset in &self.block_char_offsets {
            buf.put_i32(offset);
        }
    }

    /// Read one entry from a TOC buffer
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < ENTRY_HEADER_SIZE {
            return Err(StoreError::Corruption(format!(
                "TOC entry header truncated: {} bytes left, need {}",
                buf.remaining(),
                ENTRY_HEADER_SIZE
            )));
        }

        let id = buf.get_i32();
        let entry_length_bytes = buf.get_i32();
        let char_length = buf.get_i32();
        let deleted = char_length < 0;
        let block_count = buf.get_i32();

        if block_count < 0 {
            return Err(StoreError::Corruption(format!(
                "TOC entry {}: negative block count {}",
                id, block_count
            )));
        }
        let block_count = block_count as usize;
        let needed = block_count * BYTES_PER_INT * 2;
        if buf.remaining() < needed {
            return Err(StoreError::Corruption(format!(
                "TOC entry {}: block arrays truncated ({} bytes left, need {})",
                id,
                buf.remaining(),
                needed
            )));
        }

        let block_indices: Vec<i32> = (0..block_count).map(|_| buf.get_i32()).collect();
        let block_char_offsets: Vec<i32> = (0..block_count).map(|_| buf.get_i32()).collect();

        let entry = Self {
            id,
            entry_length_bytes,
            entry_length_chars: if deleted { DELETED_MARKER } else { char_length },
            deleted,
            block_indices,
            block_char_offsets,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Check that the block arrays describe a readable document.
    ///
    /// Block indices must lie in `0..BLOCK_INDEX_LIMIT`. Offsets start at 0
    /// and strictly increase (every block holds at least one character);
    /// for live entries the last offset is below the character length.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |what: String| -> Result<()> {
            Err(StoreError::Corruption(format!("TOC entry {}: {}", self.id, what)))
        };

        if self.entry_length_bytes < 0 {
            return corrupt(format!("negative byte length {}", self.entry_length_bytes));
        }
        if self.block_indices.len() != self.block_char_offsets.len() {
            return corrupt(format!(
                "{} block indices but {} offsets",
                self.block_indices.len(),
                self.block_char_offsets.len()
            ));
        }
        if let Some(bad) = self
            .block_indices
            .iter()
            .find(|&&b| !(0..BLOCK_INDEX_LIMIT).contains(&b))
        {
            return corrupt(format!("block index {} out of range", bad));
        }

        if let Some(&first) = self.block_char_offsets.first() {
            if first != 0 {
                return corrupt(format!("first block starts at character {}", first));
            }
        }
        if let Some(pair) = self.block_char_offsets.windows(2).find(|w| w[1] <= w[0]) {
            return corrupt(format!("block offsets not increasing ({} then {})", pair[0], pair[1]));
        }

        if !self.deleted {
            if self.entry_length_chars < 0 {
                return corrupt(format!("negative length {}", self.entry_length_chars));
            }
            match self.block_char_offsets.last() {
                Some(&last) if last >= self.entry_length_chars => {
                    return corrupt(format!(
                        "block offset {} beyond length {}",
                        last, self.entry_length_chars
                    ));
                }
                None if self.entry_length_chars > 0 => {
                    return corrupt(format!(
                        "{} characters but no blocks",
                        self.entry_length_chars
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
