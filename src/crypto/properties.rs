//! AES coder property blob parsing.

use crate::{Error, Result};

/// Marker value of `num_cycles_power` meaning "no hashing": the key is
/// `salt || UTF-16LE(password)` truncated or zero-padded to 32 bytes.
pub const NO_KDF_SENTINEL: u8 = 0x3F;

/// Parsed AES coder properties.
///
/// The blob is 1 byte when neither salt nor IV is present, otherwise
/// `2 + salt_size + iv_size` bytes:
///
/// - Byte 0: `(salt_flag << 7) | (iv_flag << 6) | num_cycles_power`
/// - Byte 1: `(salt_extra << 4) | iv_extra`
/// - `salt_size = salt_flag + salt_extra`, `iv_size = iv_flag + iv_extra`
/// - Salt bytes, then IV bytes.
#[derive(Debug, Clone)]
pub struct AesProperties {
    /// SHA-256 iteration count exponent; iterations = 2^num_cycles_power.
    pub num_cycles_power: u8,
    /// Salt for key derivation (0-16 bytes).
    pub salt: Vec<u8>,
    /// Initialization vector, zero-padded to 16 bytes.
    pub iv: [u8; 16],
}

impl AesProperties {
    /// Parses AES properties from the coder property bytes.
    pub fn parse(properties: &[u8]) -> Result<Self> {
        let first = *properties
            .first()
            .ok_or_else(|| Error::InvalidFormat("AES properties empty".into()))?;

        let num_cycles_power = first & 0x3F;

        if first & 0xC0 == 0 {
            if properties.len() != 1 {
                return Err(Error::InvalidFormat(
                    "AES properties without salt/IV must be a single byte".into(),
                ));
            }
            return Ok(Self {
                num_cycles_power,
                salt: Vec::new(),
                iv: [0u8; 16],
            });
        }

        let second = *properties.get(1).ok_or_else(|| {
            Error::InvalidFormat("AES properties missing size byte".into())
        })?;

        let salt_size = (((first >> 7) & 1) + (second >> 4)) as usize;
        let iv_size = (((first >> 6) & 1) + (second & 0x0F)) as usize;

        if properties.len() != 2 + salt_size + iv_size {
            return Err(Error::InvalidFormat(format!(
                "AES properties length {} does not match declared {} salt + {} IV bytes",
                properties.len(),
                salt_size,
                iv_size
            )));
        }

        let salt = properties[2..2 + salt_size].to_vec();

        let mut iv = [0u8; 16];
        iv[..iv_size].copy_from_slice(&properties[2 + salt_size..]);

        Ok(Self {
            num_cycles_power,
            salt,
            iv,
        })
    }

    /// Encodes properties to bytes; used for building test fixtures.
    pub fn encode(num_cycles_power: u8, salt: &[u8], iv: &[u8]) -> Vec<u8> {
        debug_assert!(salt.len() <= 16 && iv.len() <= 16);

        if salt.is_empty() && iv.is_empty() {
            return vec![num_cycles_power & 0x3F];
        }

        let salt_flag = u8::from(!salt.is_empty());
        let iv_flag = u8::from(!iv.is_empty());
        let salt_extra = salt.len() as u8 - salt_flag;
        let iv_extra = iv.len() as u8 - iv_flag;

        let mut result = vec![
            (salt_flag << 7) | (iv_flag << 6) | (num_cycles_power & 0x3F),
            (salt_extra << 4) | iv_extra,
        ];
        result.extend_from_slice(salt);
        result.extend_from_slice(iv);
        result
    }
}
