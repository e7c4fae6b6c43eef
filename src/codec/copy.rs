//! Copy codec (no compression).

use crate::{Error, Result};

use super::{method, single_input, Codec};

/// Passes data through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct CopyCodec;

impl Codec for CopyCodec {
    fn id(&self) -> &'static [u8] {
        method::COPY
    }

    fn decode(
        &self,
        _properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::COPY, inputs)?;
        let size = out_sizes.first().copied().unwrap_or(input.len() as u64);

        if (input.len() as u64) < size {
            return Err(Error::Truncated);
        }

        Ok(vec![input[..size as usize].to_vec()])
    }
}
