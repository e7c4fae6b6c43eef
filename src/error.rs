//! Error types for 7z archive reading.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias
//! for `std::result::Result<T, Error>`. Structural errors encountered
//! while opening an archive are fatal to the reader; errors reported by
//! [`Archive::extract`](crate::read::Archive::extract) affect only the
//! requested entry and leave the reader usable.

/// Helper struct for formatting WrongPassword error messages.
struct WrongPasswordDisplay<'a> {
    entry_index: Option<usize>,
    entry_name: Option<&'a str>,
}

impl std::fmt::Display for WrongPasswordDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wrong password")?;
        match (self.entry_index, self.entry_name) {
            (Some(idx), Some(name)) => write!(f, " for entry {} ({})", idx, name),
            (Some(idx), None) => write!(f, " for entry {}", idx),
            (None, Some(name)) => write!(f, " for entry '{}'", name),
            (None, None) => Ok(()),
        }
    }
}

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_index: Option<usize>,
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch")?;
        if let Some(idx) = self.entry_index {
            write!(f, " for entry {}", idx)?;
        }
        if let Some(name) = self.entry_name {
            write!(f, " ({})", name)?;
        }
        write!(f, ": expected {:#010x}, got {:#010x}", self.expected, self.actual)
    }
}

/// The error type for 7z archive operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The archive data violates the 7z format.
    ///
    /// Returned for structural problems: a bad signature, inconsistent
    /// stream counts, invalid bind pairs, malformed coder properties,
    /// unexpected property tags, and similar.
    #[error("invalid 7z format: {0}")]
    InvalidFormat(String),

    /// A header failed its CRC-32 check.
    ///
    /// The offset is relative to the start of the archive data and
    /// points at the region whose checksum did not match.
    #[error("corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// Byte offset of the corrupt region.
        offset: u64,
        /// Description of the mismatch.
        reason: String,
    },

    /// The archive declares a format version this reader does not know.
    #[error("unsupported archive version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version byte from the signature header.
        major: u8,
        /// Minor version byte from the signature header.
        minor: u8,
    },

    /// A folder references a coder ID with no registered codec.
    ///
    /// Listing still works for such archives; only extraction of the
    /// affected entries fails.
    #[error("unsupported coder {id:#x}")]
    UnsupportedCoder {
        /// The coder ID folded into a little-endian u64.
        id: u64,
    },

    /// A feature required by the archive is not supported.
    #[error("unsupported feature: {feature}")]
    UnsupportedFeature {
        /// Name of the unsupported feature.
        feature: &'static str,
    },

    /// The archive data ended before a structure was complete.
    #[error("unexpected end of archive data")]
    Truncated,

    /// Decoded data failed its declared CRC-32 check.
    #[error("{}", CrcMismatchDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// Index of the affected entry, when the failure is per-file.
        entry_index: Option<usize>,
        /// Name of the affected entry, when known.
        entry_name: Option<String>,
        /// CRC declared in the archive.
        expected: u32,
        /// CRC computed over the decoded bytes.
        actual: u32,
    },

    /// Decrypted data failed the integrity check that follows it.
    ///
    /// The AES coder cannot detect a bad password by itself; the
    /// mismatch surfaces at the first CRC gate downstream of the
    /// decryption (the decoded header or a substream digest).
    #[error("{}", WrongPasswordDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref() })]
    WrongPassword {
        /// Index of the affected entry, when the failure is per-file.
        entry_index: Option<usize>,
        /// Name of the affected entry, when known.
        entry_name: Option<String>,
    },

    /// The archive contains an AES coder but no password was supplied.
    #[error("password required for encrypted archive")]
    PasswordRequired,

    /// AES ciphertext length is not a positive multiple of the block size.
    #[error("ciphertext length {len} is not a positive multiple of 16")]
    InvalidBlockLength {
        /// The offending input length.
        len: usize,
    },

    /// A configured resource limit was exceeded.
    ///
    /// Protects against hostile archives: oversized folders, absurd
    /// entry counts, or key-derivation iteration counts chosen to burn
    /// CPU.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

impl Error {
    /// Returns `true` if this error indicates corrupt archive data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptHeader { .. } | Error::CrcMismatch { .. })
    }

    /// Returns `true` if this error is password-related.
    pub fn is_password_error(&self) -> bool {
        matches!(self, Error::WrongPassword { .. } | Error::PasswordRequired)
    }
}

/// A specialized result type for 7z operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maps an I/O error produced by a codec adapter onto the crate error.
///
/// The decompressors operate over in-memory cursors, so the only I/O
/// failures they can produce describe the compressed payload itself.
pub(crate) fn map_codec_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::Truncated,
        _ => Error::InvalidFormat(e.to_string()),
    }
}
