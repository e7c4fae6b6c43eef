//! Deflate codec.

use std::io::Cursor;

use flate2::bufread::DeflateDecoder as FlateDecoder;

use super::{method, read_exact_output, single_input, Codec};
use crate::Result;

/// Raw-deflate decoder.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec;

impl Codec for DeflateCodec {
    fn id(&self) -> &'static [u8] {
        method::DEFLATE
    }

    fn decode(
        &self,
        _properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::DEFLATE, inputs)?;
        let out_size = out_sizes.first().copied().unwrap_or(0);

        let decoder = FlateDecoder::new(Cursor::new(input));
        read_exact_output(decoder, out_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_deflate_roundtrip() {
        let data = b"Hello, World! This is a test of Deflate decompression.";

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = DeflateCodec
            .decode(&[], &[&compressed], &[data.len() as u64])
            .unwrap();
        assert_eq!(out, vec![data.to_vec()]);
    }

    #[test]
    fn test_deflate_garbage_input() {
        let garbage = [0x07u8; 32]; // BTYPE=11 is reserved
        assert!(DeflateCodec.decode(&[], &[&garbage], &[10]).is_err());
    }
}
