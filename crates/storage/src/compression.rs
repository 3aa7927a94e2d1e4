//! zlib compression of cached response bodies.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use tablemap_common::{TableError, TableResult};

/// Compress a response body.
pub fn compress(text: &str) -> TableResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(text.len() / 4), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| TableError::Cache(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| TableError::Cache(format!("compression failed: {}", e)))
}

/// Decompress a cached body back to text.
///
/// Corrupt, truncated or non-UTF-8 input is an error; a stream that ends
/// before its zlib trailer never yields partial text.
pub fn decompress(bytes: &[u8]) -> TableResult<String> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(bytes.len().saturating_mul(4).max(64));

    loop {
        let consumed = decoder.total_in() as usize;
        let produced = decoder.total_out();
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }

        let status = decoder
            .decompress_vec(&bytes[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|e| TableError::Decompression(e.to_string()))?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let stalled =
                    decoder.total_in() as usize == consumed && decoder.total_out() == produced;
                let input_done = decoder.total_in() as usize == bytes.len();
                if out.len() < out.capacity() && (input_done || stalled) {
                    return Err(TableError::Decompression(
                        "compressed stream ended unexpectedly".to_string(),
                    ));
                }
            }
        }
    }

    String::from_utf8(out).map_err(|e| TableError::Decompression(e.to_string()))
}
