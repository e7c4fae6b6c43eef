//! LZMA and LZMA2 codecs.

use std::io::Cursor;

use crate::{Error, Result};

use super::{method, read_exact_output, single_input, Codec};

/// LZMA decoder.
///
/// Properties are 5 bytes: one packed `lc/lp/pb` byte followed by the
/// dictionary size as a little-endian u32. The raw 7z LZMA stream has
/// no end marker, so decoding is bounded by the declared output size.
#[derive(Debug, Clone, Copy)]
pub struct LzmaCodec;

impl Codec for LzmaCodec {
    fn id(&self) -> &'static [u8] {
        method::LZMA
    }

    fn decode(
        &self,
        properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::LZMA, inputs)?;
        let out_size = out_sizes.first().copied().unwrap_or(0);

        if properties.len() < 5 {
            return Err(Error::InvalidFormat(
                "LZMA properties too short (need 5 bytes)".into(),
            ));
        }

        let props_byte = properties[0];
        let dict_size = u32::from_le_bytes(properties[1..5].try_into().expect("5-byte slice"));

        let reader = lzma_rust2::LzmaReader::new_with_props(
            Cursor::new(input),
            out_size,
            props_byte,
            dict_size,
            None,
        )
        .map_err(|e| Error::InvalidFormat(format!("invalid LZMA properties: {}", e)))?;

        read_exact_output(reader, out_size)
    }
}

/// LZMA2 decoder.
///
/// Properties are 1 byte encoding the dictionary size.
#[derive(Debug, Clone, Copy)]
pub struct Lzma2Codec;

impl Codec for Lzma2Codec {
    fn id(&self) -> &'static [u8] {
        method::LZMA2
    }

    fn decode(
        &self,
        properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::LZMA2, inputs)?;
        let out_size = out_sizes.first().copied().unwrap_or(0);

        let dict_byte = *properties
            .first()
            .ok_or_else(|| Error::InvalidFormat("LZMA2 properties missing".into()))?;
        let dict_size = decode_lzma2_dict_size(dict_byte)?;

        let reader = lzma_rust2::Lzma2Reader::new(Cursor::new(input), dict_size, None);
        read_exact_output(reader, out_size)
    }
}

/// Decodes the LZMA2 dictionary-size property byte.
///
/// Values 0-39 encode `(2 | (v & 1)) << (v / 2 + 11)`; 40 means 4 GiB - 1.
pub(crate) fn decode_lzma2_dict_size(byte: u8) -> Result<u32> {
    match byte {
        0..=39 => Ok((2 | (u32::from(byte) & 1)) << (byte / 2 + 11)),
        40 => Ok(u32::MAX),
        _ => Err(Error::InvalidFormat(format!(
            "invalid LZMA2 dictionary size byte {:#04x}",
            byte
        ))),
    }
}
