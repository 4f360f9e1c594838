//! TOC file I/O
//!
//! Reads `toc.dat` through a read-only map and writes it through a writable
//! map that extends past the data by a write reserve, so a long run of
//! entries needs only an occasional remap.

use std::fs::{File, OpenOptions};
use std::path::Path;

use bytes::Buf;
use memmap2::{Mmap, MmapMut};
use tracing::debug;

use crate::error::{Result, StoreError};

use super::{Toc, TocEntry, TOC_HEADER_SIZE};

/// Outcome of a TOC write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocWriteSummary {
    /// Entries written
    pub entries: usize,
    /// Final size of the TOC file
    pub bytes_written: usize,
    /// Times the map ran out of reserve and was re-established
    pub remaps: usize,
}

/// Read the table of contents from a file
pub fn read_toc(path: &Path) -> Result<Toc> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len == 0 {
        debug!(path = %path.display(), "empty TOC file");
        return Ok(Toc::new());
    }

    // SAFETY: the TOC file is only rewritten by a writer, and writers and
    // readers never have the same store open at the same time.
    let map = unsafe { Mmap::map(&file)? };
    let mut buf: &[u8] = &map[..];

    if buf.remaining() < TOC_HEADER_SIZE {
        return Err(StoreError::Corruption(format!(
            "TOC file too short: {} bytes",
            file_len
        )));
    }
    let count = buf.get_i32();
    if count < 0 {
        return Err(StoreError::Corruption(format!(
            "TOC entry count is negative: {}",
            count
        )));
    }

    let mut toc = Toc::new();
    for _ in 0..count {
        let entry = TocEntry::decode(&mut buf)?;
        toc.insert(entry);
    }

    debug!(path = %path.display(), entries = toc.len(), "TOC loaded");
    Ok(toc)
}

/// Write the whole table of contents, replacing the file's contents
pub fn write_toc(path: &Path, toc: &Toc, write_map_reserve: usize) -> Result<TocWriteSummary> {
    let mut writer = TocMapWriter::open(path, write_map_reserve)?;

    writer.ensure_room(TOC_HEADER_SIZE)?;
    writer.put_i32(toc.len() as i32);

    for entry in toc.entries() {
        writer.ensure_room(entry.encoded_len())?;
        writer.put_entry(entry);
    }

    let summary = writer.finish(toc.len())?;
    debug!(
        path = %path.display(),
        entries = summary.entries,
        bytes = summary.bytes_written,
        remaps = summary.remaps,
        "TOC written"
    );
    Ok(summary)
}

/// Sequential writer over a memory-mapped TOC file
struct TocMapWriter {
    file: File,
    /// None only while being remapped
    map: Option<MmapMut>,
    position: usize,
    reserve: usize,
    remaps: usize,
}

impl TocMapWriter {
    fn open(path: &Path, reserve: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let reserve = reserve.max(1);
        let file_len = file.metadata()?.len() as usize;
        let map = Self::map(&file, file_len + reserve)?;

        Ok(Self {
            file,
            map: Some(map),
            position: 0,
            reserve,
            remaps: 0,
        })
    }

    /// Grow the file to `len` bytes and map all of it
    fn map(file: &File, len: usize) -> Result<MmapMut> {
        file.set_len(len as u64)?;
        // SAFETY: the file is exclusively owned by this writer for the
        // duration of the TOC write.
        let map = unsafe { MmapMut::map_mut(file)? };
        Ok(map)
    }

    fn mapped_len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    /// Make sure `needed` more bytes fit, remapping with a fresh reserve if not
    fn ensure_room(&mut self, needed: usize) -> Result<()> {
        let mapped = self.mapped_len();
        if self.position + needed <= mapped {
            return Ok(());
        }

        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        let new_len = mapped.max(self.position + needed) + self.reserve;
        debug!(
            position = self.position,
            old_len = mapped,
            new_len,
            "TOC write reserve exhausted, remapping"
        );
        self.map = Some(Self::map(&self.file, new_len)?);
        self.remaps += 1;
        Ok(())
    }

    fn window(&mut self, len: usize) -> &mut [u8] {
        let start = self.position;
        self.position += len;
        match self.map.as_mut() {
            Some(map) => &mut map[start..start + len],
            None => &mut [],
        }
    }

    fn put_i32(&mut self, value: i32) {
        self.window(4).copy_from_slice(&value.to_be_bytes());
    }

    fn put_entry(&mut self, entry: &TocEntry) {
        let mut dst = self.window(entry.encoded_len());
        entry.encode(&mut dst);
    }

    /// Flush, unmap and cut the file back to the bytes actually written
    fn finish(mut self, entries: usize) -> Result<TocWriteSummary> {
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        self.file.set_len(self.position as u64)?;
        self.file.sync_all()?;

        Ok(TocWriteSummary {
            entries,
            bytes_written: self.position,
            remaps: self.remaps,
        })
    }
}
