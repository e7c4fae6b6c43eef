//! Codec infrastructure: the decode contract, the coder-ID registry,
//! and the built-in codecs.
//!
//! Every coder appearing in a folder is resolved through a
//! [`CoderRegistry`]. The registry created by
//! [`CoderRegistry::with_defaults`] carries Copy and the feature-gated
//! decompression codecs; the AES codec is inserted by the archive
//! reader itself (it needs the password) and is therefore always
//! available. Hosts integrating additional codecs implement [`Codec`]
//! and register them.

#[cfg(feature = "bzip2")]
pub mod bzip2;
mod copy;
#[cfg(feature = "deflate")]
pub mod deflate;
#[cfg(feature = "lzma")]
pub mod filters;
#[cfg(feature = "lzma")]
pub mod lzma;

use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::{AesProperties, KeyCache, Password};
use crate::{Error, Result};

pub use copy::CopyCodec;

#[cfg(feature = "bzip2")]
pub use bzip2::Bzip2Codec;
#[cfg(feature = "deflate")]
pub use deflate::DeflateCodec;
#[cfg(feature = "lzma")]
pub use filters::{BcjX86Codec, DeltaCodec};
#[cfg(feature = "lzma")]
pub use lzma::{Lzma2Codec, LzmaCodec};

/// Coder IDs defined by the 7z format.
pub mod method {
    /// Copy (no compression).
    pub const COPY: &[u8] = &[0x00];
    /// Delta filter.
    pub const DELTA: &[u8] = &[0x03];
    /// LZMA compression.
    pub const LZMA: &[u8] = &[0x03, 0x01, 0x01];
    /// LZMA2 compression.
    pub const LZMA2: &[u8] = &[0x21];
    /// Deflate compression.
    pub const DEFLATE: &[u8] = &[0x04, 0x01, 0x08];
    /// BZip2 compression.
    pub const BZIP2: &[u8] = &[0x04, 0x02, 0x02];
    /// BCJ (x86) filter.
    pub const BCJ_X86: &[u8] = &[0x03, 0x03, 0x01, 0x03];
    /// BCJ2 (4-stream x86) filter.
    pub const BCJ2: &[u8] = &[0x03, 0x03, 0x01, 0x1B];
    /// AES-256-CBC with SHA-256 key derivation.
    pub const AES: &[u8] = &[0x06, 0xF1, 0x07, 0x01];

    /// Returns a human-readable name for a coder ID.
    pub fn name(id: &[u8]) -> &'static str {
        match id {
            COPY => "Copy",
            DELTA => "Delta",
            LZMA => "LZMA",
            LZMA2 => "LZMA2",
            DEFLATE => "Deflate",
            BZIP2 => "BZip2",
            BCJ_X86 => "BCJ (x86)",
            BCJ2 => "BCJ2",
            AES => "AES-256",
            _ => "Unknown",
        }
    }
}

/// An executable decoding unit resolved from a coder ID.
///
/// `decode` receives the coder's property blob, its ordered input
/// streams, and the declared size of each output stream, and returns
/// the ordered outputs. An output may come back longer than declared
/// (AES block padding); trimming is the container's job, not the
/// codec's.
pub trait Codec: Send + Sync {
    /// The coder ID this codec handles.
    fn id(&self) -> &'static [u8];

    /// Declared (input, output) stream counts.
    fn num_streams(&self) -> (usize, usize) {
        (1, 1)
    }

    /// Decodes `inputs` into the declared outputs.
    fn decode(
        &self,
        properties: &[u8],
        inputs: &[&[u8]],
        out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>>;
}

/// Drains a decoder into a buffer of exactly `out_size` bytes.
#[allow(dead_code)]
fn read_exact_output<R: std::io::Read>(mut reader: R, out_size: u64) -> Result<Vec<Vec<u8>>> {
    let mut output = vec![0u8; out_size as usize];
    reader
        .read_exact(&mut output)
        .map_err(crate::error::map_codec_error)?;
    Ok(vec![output])
}

/// Helper for single-input single-output codecs.
fn single_input<'a>(id: &[u8], inputs: &[&'a [u8]]) -> Result<&'a [u8]> {
    match inputs {
        &[input] => Ok(input),
        _ => Err(Error::InvalidFormat(format!(
            "{} coder expects 1 input stream, got {}",
            method::name(id),
            inputs.len()
        ))),
    }
}

/// The 7z AES-256 coder.
///
/// Holds the archive's password (if any) and a key cache so multiple
/// folders sharing a salt derive their key once. Created by the
/// archive reader at open time.
pub struct AesCodec {
    password: Option<Password>,
    keys: KeyCache,
}

impl AesCodec {
    /// Creates the AES codec for the given (optional) password.
    pub fn new(password: Option<Password>) -> Self {
        Self {
            password,
            keys: KeyCache::new(),
        }
    }
}

impl std::fmt::Debug for AesCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCodec")
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

impl Codec for AesCodec {
    fn id(&self) -> &'static [u8] {
        method::AES
    }

    fn decode(
        &self,
        properties: &[u8],
        inputs: &[&[u8]],
        _out_sizes: &[u64],
    ) -> Result<Vec<Vec<u8>>> {
        let input = single_input(method::AES, inputs)?;
        let props = AesProperties::parse(properties)?;
        let password = self.password.as_ref().ok_or(Error::PasswordRequired)?;

        let key = self.keys.derive(password, &props.salt, props.num_cycles_power)?;
        let plaintext = crate::crypto::decrypt_cbc(&key, &props.iv, input)?;
        Ok(vec![plaintext])
    }
}

/// Maps coder IDs to codec implementations.
#[derive(Clone, Default)]
pub struct CoderRegistry {
    codecs: HashMap<Vec<u8>, Arc<dyn Codec>>,
}

impl CoderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in codecs registered.
    ///
    /// Copy is always present; LZMA, LZMA2, Delta, BCJ (x86), Deflate,
    /// and BZip2 are included when the corresponding feature is
    /// enabled.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CopyCodec));

        #[cfg(feature = "lzma")]
        {
            registry.register(Arc::new(LzmaCodec));
            registry.register(Arc::new(Lzma2Codec));
            registry.register(Arc::new(DeltaCodec));
            registry.register(Arc::new(BcjX86Codec));
        }

        #[cfg(feature = "deflate")]
        registry.register(Arc::new(DeflateCodec));

        #[cfg(feature = "bzip2")]
        registry.register(Arc::new(Bzip2Codec));

        registry
    }

    /// Registers a codec under its coder ID, replacing any previous one.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.id().to_vec(), codec);
    }

    /// Looks up the codec for a coder ID.
    pub fn get(&self, id: &[u8]) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(id)
    }

    /// Returns true if a codec is registered for the given ID.
    pub fn contains(&self, id: &[u8]) -> bool {
        self.codecs.contains_key(id)
    }

    /// Returns the number of registered codecs.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Returns true if no codecs are registered.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl std::fmt::Debug for CoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&'static str> = self
            .codecs
            .keys()
            .map(|id| method::name(id))
            .collect();
        ids.sort_unstable();
        f.debug_struct("CoderRegistry").field("codecs", &ids).finish()
    }
}
