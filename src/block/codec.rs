//! Block codec
//!
//! The compression ratio of a run of text is unknown until it has been
//! compressed, so encoding is an iterative size search: guess a character
//! count, compress, then shrink or grow the guess until the output lands
//! between `MINIMUM_ACCEPTABLE_BLOCK_SIZE` and `BLOCK_SIZE`.

use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::trace;

use crate::error::{Result, StoreError};

use super::{
    BLOCK_SIZE, MAX_BLOCK_SIZE_BYTES, MINIMUM_ACCEPTABLE_BLOCK_SIZE,
    TYPICAL_BLOCK_SIZE_CHARACTERS,
};

/// One compressed block ready to be written
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    /// Compressed bytes, at most `BLOCK_SIZE` long
    pub data: Vec<u8>,
    /// Characters packed into this block
    pub chars: usize,
    /// UTF-8 bytes of input consumed
    pub raw_bytes: usize,
    /// Compression attempts needed to settle on `chars`
    pub attempts: usize,
}

/// Encode characters from the front of `pending` into one block.
///
/// `available` is the number of characters in `pending`. Takes as many
/// characters as fit: the result is smaller than
/// `MINIMUM_ACCEPTABLE_BLOCK_SIZE` only when all of `pending` was used or
/// the search already had to back off once.
pub fn encode_block(
    pending: &str,
    available: usize,
    compressor: &mut Compress,
    scratch: &mut [u8],
) -> Result<EncodedBlock> {
    if available == 0 {
        return Err(StoreError::InvalidArgument(
            "encode_block called without pending characters".to_string(),
        ));
    }

    let mut length = TYPICAL_BLOCK_SIZE_CHARACTERS.min(available);
    // Once we had to shrink, never grow again (prevents oscillation)
    let mut grow_allowed = true;
    let mut attempts = 0;

    loop {
        attempts += 1;

        // Keep the raw input within what the scratch buffer is sized for
        let mut raw_len = prefix_len(pending, length);
        while raw_len > MAX_BLOCK_SIZE_BYTES {
            let factor =
                1.0 + (1.05 * (raw_len - MAX_BLOCK_SIZE_BYTES) as f32) / BLOCK_SIZE as f32;
            length = shrink(length, factor);
            grow_allowed = false;
            raw_len = prefix_len(pending, length);
        }

        let compressed = compress_into(&pending.as_bytes()[..raw_len], compressor, scratch)?;

        if compressed > BLOCK_SIZE {
            // Aim 5% below what should fit
            let factor = 1.0 + (1.05 * (compressed - BLOCK_SIZE) as f32) / BLOCK_SIZE as f32;
            trace!(length, compressed, factor, "block too large, shrinking");
            length = shrink(length, factor);
            grow_allowed = false;
        } else if grow_allowed && length < available && compressed < MINIMUM_ACCEPTABLE_BLOCK_SIZE
        {
            // Aim 5% below what should be possible
            let factor = 1.0 + (0.95 * (BLOCK_SIZE - compressed) as f32) / compressed as f32;
            trace!(length, compressed, factor, "block too small, growing");
            length = ((length as f32 * factor) as usize)
                .max(length + 1)
                .min(available);
        } else {
            trace!(length, compressed, attempts, "block accepted");
            return Ok(EncodedBlock {
                data: scratch[..compressed].to_vec(),
                chars: length,
                raw_bytes: raw_len,
                attempts,
            });
        }
    }
}

/// zlib-compress `input` into `out` as one complete stream.
///
/// Returns the compressed length. Empty output or output that does not fit
/// in `out` is an error.
pub fn compress_into(input: &[u8], compressor: &mut Compress, out: &mut [u8]) -> Result<usize> {
    compressor.reset();
    let status = compressor
        .compress(input, out, FlushCompress::Finish)
        .map_err(|e| StoreError::Compression(format!("deflate failed: {}", e)))?;

    let written = compressor.total_out() as usize;
    if written == 0 {
        return Err(StoreError::Compression(
            "deflate returned 0 bytes".to_string(),
        ));
    }
    if status != Status::StreamEnd || written >= out.len() {
        return Err(StoreError::Compression(format!(
            "deflate output of {} input bytes does not fit in {} byte buffer",
            input.len(),
            out.len()
        )));
    }
    Ok(written)
}

/// Decompress one block (trailing padding is ignored) and decode it as UTF-8
pub fn decode_block(
    block: &[u8],
    decompressor: &mut Decompress,
    scratch: &mut [u8],
) -> Result<String> {
    decompressor.reset(true);
    let status = decompressor
        .decompress(block, scratch, FlushDecompress::Finish)
        .map_err(|e| StoreError::Corruption(format!("inflate failed: {}", e)))?;

    let produced = decompressor.total_out() as usize;
    if produced == 0 {
        return Err(StoreError::Corruption(
            "inflate returned 0 bytes".to_string(),
        ));
    }
    if status != Status::StreamEnd {
        return Err(StoreError::Corruption(format!(
            "block did not inflate to a complete stream within {} bytes",
            scratch.len()
        )));
    }

    std::str::from_utf8(&scratch[..produced])
        .map(str::to_owned)
        .map_err(|e| StoreError::Corruption(format!("block is not valid UTF-8: {}", e)))
}

/// Byte length of the first `chars` characters of `text`
fn prefix_len(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(offset, _)| offset)
}

fn shrink(length: usize, factor: f32) -> usize {
    ((length as f32 / factor) as usize).max(1)
}
