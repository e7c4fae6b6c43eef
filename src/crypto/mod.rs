//! AES-256 decryption for 7z archives.
//!
//! The 7z AES coder combines:
//! - an iterated SHA-256 key derivation from the UTF-16LE password
//! - AES-256-CBC over the packed stream, without padding
//!
//! Key derivation is expensive (the common `num_cycles_power` of 19
//! means 524,288 SHA-256 updates), so derived keys are cached per
//! (salt, cycles) pair through [`KeyCache`].

mod password;
mod properties;

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use zeroize::Zeroizing;

use crate::{Error, Result};

pub use password::Password;
pub use properties::{AesProperties, NO_KDF_SENTINEL};

type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Maximum accepted `num_cycles_power` for key derivation.
///
/// Caps derivation at 2^30 (~1 billion) iterations, several seconds on
/// current hardware. Archives demanding more are rejected rather than
/// letting a hostile header buy unbounded CPU. The no-hashing sentinel
/// (63) is exempt.
pub const MAX_NUM_CYCLES_POWER: u8 = 30;

/// Derives the AES-256 key for a password / salt / iteration-count triple.
///
/// For `num_cycles_power < 63` the key is the SHA-256 over
/// `2^num_cycles_power` concatenations of
/// `salt || UTF-16LE(password) || counter`, where the counter is the
/// round number as 8 little-endian bytes. The sentinel 63 skips
/// hashing: the key is `salt || UTF-16LE(password)` truncated or
/// zero-padded to 32 bytes.
///
/// # Errors
///
/// Returns [`Error::ResourceLimitExceeded`] when `num_cycles_power`
/// exceeds [`MAX_NUM_CYCLES_POWER`] (and is not the sentinel).
pub fn derive_key(
    password: &Password,
    salt: &[u8],
    num_cycles_power: u8,
) -> Result<Zeroizing<[u8; 32]>> {
    let password_bytes = password.as_utf16_le();

    if num_cycles_power == NO_KDF_SENTINEL {
        let mut key = Zeroizing::new([0u8; 32]);
        let mut written = 0;
        for &b in salt.iter().chain(password_bytes.iter()).take(32) {
            key[written] = b;
            written += 1;
        }
        return Ok(key);
    }

    if num_cycles_power > MAX_NUM_CYCLES_POWER {
        log::warn!(
            "key derivation cycles_power {} exceeds maximum {}, rejecting",
            num_cycles_power,
            MAX_NUM_CYCLES_POWER
        );
        return Err(Error::ResourceLimitExceeded(format!(
            "key derivation cycles_power {} exceeds maximum {}",
            num_cycles_power, MAX_NUM_CYCLES_POWER
        )));
    }

    let iterations = 1u64 << num_cycles_power;

    let mut hash_input =
        Zeroizing::new(Vec::with_capacity(salt.len() + password_bytes.len() + 8));
    hash_input.extend_from_slice(salt);
    hash_input.extend_from_slice(&password_bytes);
    hash_input.extend_from_slice(&[0u8; 8]);
    let counter_offset = salt.len() + password_bytes.len();

    let mut sha = Sha256::new();
    for round in 0..iterations {
        hash_input[counter_offset..].copy_from_slice(&round.to_le_bytes());
        sha.update(&hash_input[..]);
    }

    Ok(Zeroizing::new(sha.finalize().into()))
}

/// Decrypts AES-256-CBC data in one call.
///
/// No padding is applied or removed; the caller trims the plaintext to
/// the logical length recorded in the container.
///
/// # Errors
///
/// Returns [`Error::InvalidBlockLength`] unless the input length is a
/// positive multiple of 16.
pub fn decrypt_cbc(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidBlockLength { len: data.len() });
    }

    let mut buf = data.to_vec();
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| Error::InvalidFormat(format!("AES decryption failed: {}", e)))?;

    Ok(buf)
}

/// Cache of derived keys for a single password.
///
/// An archive normally uses one (salt, cycles) pair for every
/// encrypted folder, so repeated extraction pays the derivation cost
/// once.
pub struct KeyCache {
    keys: Mutex<HashMap<(Vec<u8>, u8), Zeroizing<[u8; 32]>>>,
}

impl KeyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Derives a key, reusing a cached value when available.
    pub fn derive(
        &self,
        password: &Password,
        salt: &[u8],
        num_cycles_power: u8,
    ) -> Result<Zeroizing<[u8; 32]>> {
        let cache_key = (salt.to_vec(), num_cycles_power);

        let mut keys = self.keys.lock().unwrap_or_else(|poisoned| {
            // Cached keys are pure functions of their inputs, so a
            // poisoned map is still consistent.
            log::warn!("key cache mutex was poisoned, recovering");
            poisoned.into_inner()
        });

        if let Some(key) = keys.get(&cache_key) {
            return Ok(key.clone());
        }

        let key = derive_key(password, salt, num_cycles_power)?;
        keys.insert(cache_key, key.clone());
        Ok(key)
    }

    /// Returns the number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.lock().map(|k| k.len()).unwrap_or(0)
    }

    /// Returns true if no keys are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache").field("len", &self.len()).finish()
    }
}
