//! BZip2 codec.

use std::io::Cursor;

use bzip2::read::BzDecoder;

use super::{method, read_exact_output, single_input, Codec};
use crate::Result;

/// BZip2 decoder.
#[derive(Debug, Clone, Copy)]
pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn id(&self) -> &'static [u8] {
        method::BZIP2
    }

    fn decode(
        &self,
        _properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::BZIP2, inputs)?;
        let out_size = out_sizes.first().copied().unwrap_or(0);

        let decoder = BzDecoder::new(Cursor::new(input));
        read_exact_output(decoder, out_size)
    }
}
