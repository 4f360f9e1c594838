//! Tests for ContentStoreReader
//!
//! These tests verify:
//! - Whole-document and ranged retrieval
//! - Only covering blocks are read for a range
//! - Range validation and -1 sentinels
//! - Unknown and deleted ids
//! - Corrupt contents files and TOC entries

use std::fs::{self, OpenOptions};

use contentstore::store::{CONTENTS_FILE_NAME, TOC_FILE_NAME};
use contentstore::toc::{write_toc, Toc, TocEntry};
use contentstore::{ContentStoreReader, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{char_slice, reopen_for_reading, setup_temp_store, wide_text, word_text};

// =============================================================================
// Retrieval Tests
// =============================================================================

#[test]
fn test_retrieve_whole_documents() {
    let (temp, mut writer) = setup_temp_store();
    let mut rng = StdRng::seed_from_u64(20);
    let docs: Vec<String> = (0..10)
        .map(|i| {
            if i % 2 == 0 {
                word_text(&mut rng, 1000 * (i + 1))
            } else {
                wide_text(&mut rng, 700 * (i + 1))
            }
        })
        .collect();
    let ids: Vec<i32> = docs.iter().map(|d| writer.store(d).unwrap()).collect();

    let reader = reopen_for_reading(&temp, writer);
    for (id, doc) in ids.iter().zip(&docs) {
        assert_eq!(reader.retrieve(*id).unwrap().as_deref(), Some(doc.as_str()));
        assert_eq!(reader.doc_length(*id), Some(doc.chars().count() as i32));
    }
}

#[test]
fn test_retrieve_equals_sentinel_range() {
    let (temp, mut writer) = setup_temp_store();
    let mut rng = StdRng::seed_from_u64(21);
    let id = writer.store(&wide_text(&mut rng, 12_345)).unwrap();

    let reader = reopen_for_reading(&temp, writer);
    let whole = reader.retrieve(id).unwrap().unwrap();
    let parts = reader.retrieve_parts(id, &[-1], &[-1]).unwrap().unwrap();
    assert_eq!(parts, vec![whole]);
}

#[test]
fn test_random_ranges_roundtrip() {
    let (temp, mut writer) = setup_temp_store();
    let mut rng = StdRng::seed_from_u64(22);
    let text = wide_text(&mut rng, 30_000);
    let id = writer.store(&text).unwrap();
    let chars: Vec<char> = text.chars().collect();

    let reader = reopen_for_reading(&temp, writer);
    for _ in 0..200 {
        let start = rng.gen_range(0..chars.len() - 1);
        let end = rng.gen_range(start + 1..=chars.len());
        let expected: String = chars[start..end].iter().collect();
        let got = reader.retrieve_part(id, start as i32, end as i32).unwrap().unwrap();
        assert_eq!(got, expected, "range [{}, {})", start, end);
    }
}

#[test]
fn test_multiple_ranges_in_request_order() {
    let (temp, mut writer) = setup_temp_store();
    let mut rng = StdRng::seed_from_u64(23);
    let text = word_text(&mut rng, 200_000);
    let id = writer.store(&text).unwrap();

    let reader = reopen_for_reading(&temp, writer);
    let starts = [150_000, 10, -1, 99_990];
    let ends = [150_020, 20, 5, -1];
    let parts = reader.retrieve_parts(id, &starts, &ends).unwrap().unwrap();

    assert_eq!(parts[0], char_slice(&text, 150_000, 150_020));
    assert_eq!(parts[1], char_slice(&text, 10, 20));
    assert_eq!(parts[2], char_slice(&text, 0, 5));
    assert_eq!(parts[3], char_slice(&text, 99_990, 200_000));
}

#[test]
fn test_no_ranges_requested() {
    let (temp, mut writer) = setup_temp_store();
    let id = writer.store("something").unwrap();

    let reader = reopen_for_reading(&temp, writer);
    assert_eq!(reader.retrieve_parts(id, &[], &[]).unwrap(), Some(vec![]));
}

#[test]
fn test_empty_document() {
    let (temp, mut writer) = setup_temp_store();
    let id = writer.store("").unwrap();

    let reader = reopen_for_reading(&temp, writer);
    assert_eq!(reader.retrieve(id).unwrap(), Some(String::new()));
    assert_eq!(reader.doc_length(id), Some(0));
    assert!(matches!(
        reader.retrieve_part(id, 0, 0),
        Err(StoreError::InvalidArgument(_))
    ));
}

#[test]
fn test_store_of_only_empty_documents() {
    let (temp, mut writer) = setup_temp_store();
    let id = writer.store("").unwrap();

    let reader = reopen_for_reading(&temp, writer);
    assert!(!temp.path().join(CONTENTS_FILE_NAME).exists());
    assert_eq!(reader.retrieve(id).unwrap(), Some(String::new()));
}

// =============================================================================
// Block Access Tests
// =============================================================================

#[test]
fn test_incompressible_document_reads_only_covering_blocks() {
    let (temp, mut writer) = setup_temp_store();
    let mut rng = StdRng::seed_from_u64(24);
    let text = wide_text(&mut rng, 9000);
    let id = writer.store(&text).unwrap();

    let reader = reopen_for_reading(&temp, writer);
    let entry = reader.toc_entry(id).unwrap().clone();
    assert!(entry.block_count() >= 3);

    let whole = reader.retrieve_part(id, 0, 9000).unwrap().unwrap();
    assert_eq!(whole, text);
    assert_eq!(reader.blocks_read(), entry.block_count() as u64);

    let before = reader.blocks_read();
    let snippet = reader.retrieve_part(id, 4000, 4010).unwrap().unwrap();
    assert_eq!(snippet, char_slice(&text, 4000, 4010));

    let (first, last) = entry.covering_blocks(4000, 4010);
    let read = reader.blocks_read() - before;
    assert_eq!(read, (last - first + 1) as u64);
    assert!(read <= 2);
}

#[test]
fn test_range_on_block_boundary() {
    let (temp, mut writer) = setup_temp_store();
    let mut rng = StdRng::seed_from_u64(25);
    let text = wide_text(&mut rng, 9000);
    let id = writer.store(&text).unwrap();

    let reader = reopen_for_reading(&temp, writer);
    let boundary = reader.toc_entry(id).unwrap().block_char_offsets[1];

    let before = reader.blocks_read();
    let got = reader.retrieve_part(id, boundary, boundary + 1).unwrap().unwrap();
    assert_eq!(got, char_slice(&text, boundary as usize, boundary as usize + 1));
    assert_eq!(reader.blocks_read() - before, 1);

    let before = reader.blocks_read();
    let got = reader.retrieve_part(id, boundary - 1, boundary).unwrap().unwrap();
    assert_eq!(got, char_slice(&text, boundary as usize - 1, boundary as usize));
    assert_eq!(reader.blocks_read() - before, 1);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_unknown_and_deleted_ids() {
    let (temp, mut writer) = setup_temp_store();
    let id = writer.store("gone").unwrap();
    writer.delete(id).unwrap();

    let reader = reopen_for_reading(&temp, writer);
    assert_eq!(reader.retrieve(id).unwrap(), None);
    assert_eq!(reader.retrieve(1234).unwrap(), None);
    assert_eq!(reader.retrieve_parts(id, &[0], &[1]).unwrap(), None);
    assert_eq!(reader.doc_length(1234), None);
    assert!(!reader.is_deleted(1234));
}

#[test]
fn test_boundary_rejection() {
    let (temp, mut writer) = setup_temp_store();
    let id = writer.store("0123456789").unwrap();

    let reader = reopen_for_reading(&temp, writer);
    let invalid = |start: i32, end: i32| {
        matches!(
            reader.retrieve_part(id, start, end),
            Err(StoreError::InvalidArgument(_))
        )
    };

    assert!(invalid(-2, 5));
    assert!(invalid(0, 11));
    assert!(invalid(11, -1));
    assert!(invalid(5, 5));
    assert!(invalid(6, 5));
    assert!(invalid(10, -1));

    assert_eq!(reader.retrieve_part(id, 9, -1).unwrap().unwrap(), "9");
    assert_eq!(reader.retrieve_part(id, 0, 10).unwrap().unwrap(), "0123456789");
}

#[test]
fn test_mismatched_range_lengths() {
    let (temp, mut writer) = setup_temp_store();
    let id = writer.store("abc").unwrap();

    let reader = reopen_for_reading(&temp, writer);
    let result = reader.retrieve_parts(id, &[0, 1], &[1]);
    assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
}

#[test]
fn test_truncated_contents_file_is_corruption() {
    let (temp, mut writer) = setup_temp_store();
    writer.store("first block").unwrap();
    let id = writer.store("second block").unwrap();
    writer.close().unwrap();

    let path = temp.path().join(CONTENTS_FILE_NAME);
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 100)
        .unwrap();

    let reader = ContentStoreReader::open(temp.path()).unwrap();
    assert!(matches!(reader.retrieve(id), Err(StoreError::Corruption(_))));
    assert_eq!(reader.retrieve(1).unwrap().unwrap(), "first block");
}

#[test]
fn test_corrupt_toc_entries_rejected_on_open() {
    let corrupt_entries = [
        TocEntry::new(1, 20, 11, vec![i32::MAX], vec![0]),
        TocEntry::new(1, 20, 11, vec![0], vec![i32::MIN]),
        TocEntry::new(1, 20, 11, vec![0, 1], vec![0, 40]),
        TocEntry::new(1, 20, 11, vec![], vec![]),
    ];

    for entry in corrupt_entries {
        let (temp, mut writer) = setup_temp_store();
        writer.store("first block").unwrap();
        writer.close().unwrap();

        let mut toc = Toc::new();
        toc.insert(entry.clone());
        write_toc(&temp.path().join(TOC_FILE_NAME), &toc, 64).unwrap();

        let result = ContentStoreReader::open(temp.path());
        assert!(
            matches!(result, Err(StoreError::Corruption(_))),
            "opened with {:?}",
            entry
        );
    }
}

#[test]
fn test_closed_reader_pools() {
    let (temp, mut writer) = setup_temp_store();
    let id = writer.store("text").unwrap();

    let reader = reopen_for_reading(&temp, writer);
    reader.shutdown();
    assert!(matches!(reader.retrieve(id), Err(StoreError::PoolClosed(_))));
}
