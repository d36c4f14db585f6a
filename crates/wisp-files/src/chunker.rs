//! Payload chunking.

use crate::DEFAULT_CHUNK_SIZE;

/// Split a payload into fixed-size pieces
#[derive(Debug, Clone, Copy)]
pub struct FileChunker {
    chunk_size: usize,
}

impl FileChunker {
    /// Create a new chunker with default chunk size
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a new chunker with custom chunk size
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn with_chunk_size(size: usize) -> Self {
        assert!(size > 0, "chunk size must be non-zero");
        Self { chunk_size: size }
    }

    /// Calculate number of chunks for a payload
    pub fn chunk_count(&self, len: u64) -> u64 {
        len.div_ceil(self.chunk_size as u64)
    }

    /// Returns true if a payload of `len` bytes has to be split
    pub fn needs_chunking(&self, len: usize) -> bool {
        len > self.chunk_size
    }

    /// Iterate over the chunks of `data`; the final chunk may be shorter
    pub fn split<'a>(&self, data: &'a [u8]) -> impl ExactSizeIterator<Item = &'a [u8]> + 'a {
        data.chunks(self.chunk_size)
    }
}

impl Default for FileChunker {
    fn default() -> Self {
        Self::new()
    }
}
