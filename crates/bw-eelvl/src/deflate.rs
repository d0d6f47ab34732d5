use std::io::Write;

use flate2::write::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;

/// Barebone DEFLATE: no zlib header, no Adler-32 trailer. `.eelvl` files
/// wrap their whole body in exactly this framing, matching the reference's
/// `Compressor`/`Decompressor` with `setBarebone()` selected.
pub fn compress_barebone(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn decompress_barebone(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(Vec::new());
    decoder.write_all(data)?;
    decoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_decompress_round_trips() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = compress_barebone(&original).unwrap();
        assert!(compressed.len() < original.len());
        let restored = decompress_barebone(&compressed).unwrap();
        assert_eq!(restored, original);
    }
}
