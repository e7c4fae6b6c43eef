//! Pre-processing filter codecs (Delta, BCJ).
//!
//! Filters do not compress; they reverse transformations applied
//! before compression (branch-target rewriting for executables,
//! byte-distance deltas for sampled data).

use std::io::Cursor;

use lzma_rust2::filter::bcj::BcjReader;
use lzma_rust2::filter::delta::DeltaReader;

use super::{method, read_exact_output, single_input, Codec};
use crate::Result;

/// Delta filter decoder.
///
/// The single property byte stores `distance - 1`; no properties means
/// distance 1.
#[derive(Debug, Clone, Copy)]
pub struct DeltaCodec;

impl Codec for DeltaCodec {
    fn id(&self) -> &'static [u8] {
        method::DELTA
    }

    fn decode(
        &self,
        properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::DELTA, inputs)?;
        let out_size = out_sizes.first().copied().unwrap_or(input.len() as u64);

        let distance = properties.first().map(|b| *b as usize + 1).unwrap_or(1);
        let reader = DeltaReader::new(Cursor::new(input), distance);
        read_exact_output(reader, out_size)
    }
}

/// BCJ x86 filter decoder.
///
/// Converts the absolute call/jump targets produced by the encoder
/// back to the original relative form.
#[derive(Debug, Clone, Copy)]
pub struct BcjX86Codec;

impl Codec for BcjX86Codec {
    fn id(&self) -> &'static [u8] {
        method::BCJ_X86
    }

    fn decode(
        &self,
        _properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::BCJ_X86, inputs)?;
        let out_size = out_sizes.first().copied().unwrap_or(input.len() as u64);

        let reader = BcjReader::new_x86(Cursor::new(input), 0);
        read_exact_output(reader, out_size)
    }
}
