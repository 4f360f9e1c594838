//! Block Module
//!
//! Fixed physical size, variable logical content.
//!
//! ## Responsibilities
//! - Format constants for the contents file
//! - Adaptive encoding: pack as many characters as possible into a zlib
//!   stream that still fits in one block
//! - Block decoding
//! - Bounded pools for the (de)compressors and scratch buffers
//!
//! ## Contents File Layout
//! ```text
//! ┌──────────────────────┬──────────────────────┬─────┐
//! │ Block 0 (4096 bytes) │ Block 1 (4096 bytes) │ ... │
//! │ ┌──────────┬───────┐ │                      │     │
//! │ │ zlib     │ pad   │ │                      │     │
//! │ └──────────┴───────┘ │                      │     │
//! └──────────────────────┴──────────────────────┴─────┘
//! byte offset of block i = i * BLOCK_SIZE
//! ```
//!
//! Every block holds one complete zlib stream of UTF-8 text. Padding after
//! the end of the stream is never interpreted.

mod codec;
mod pool;

pub use codec::{compress_into, decode_block, encode_block, EncodedBlock};
pub use pool::{Pooled, ResourcePool};

/// Size of every block in the contents file.
///
/// Larger blocks compress better and mean fewer reads per document; smaller
/// blocks decompress faster and make it more likely a short snippet costs a
/// single disk block.
pub const BLOCK_SIZE: usize = 4096;

/// How small a compressed block can get without a retry with more characters
pub const MINIMUM_ACCEPTABLE_BLOCK_SIZE: usize = BLOCK_SIZE * 9 / 10;

/// Expected average compression factor for text is 4; the first guess
/// assumes 7/8 of that (3.5) to stay under the block size.
///
/// How many characters usually fit in one block (first guess when encoding)
pub const TYPICAL_BLOCK_SIZE_CHARACTERS: usize = BLOCK_SIZE * 7 / 2;

/// Expected maximum compression factor
pub const MAX_COMPRESSION_FACTOR: usize = 20;

/// Maximum size of the uncompressed (UTF-8) input for one block
pub const MAX_BLOCK_SIZE_BYTES: usize = BLOCK_SIZE * MAX_COMPRESSION_FACTOR;

/// Scratch buffer size: zlib's worst-case bound for `MAX_BLOCK_SIZE_BYTES`
/// of input, plus slack so a full buffer always means overflow.
pub const SCRATCH_BUFFER_SIZE: usize =
    MAX_BLOCK_SIZE_BYTES + (MAX_BLOCK_SIZE_BYTES >> 12) + (MAX_BLOCK_SIZE_BYTES >> 14) + 64;
