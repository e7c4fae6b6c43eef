//! CRC-32 checksum computation.
//!
//! 7z archives checksum headers, pack streams, and file contents with
//! CRC-32 using the reflected IEEE 802.3 polynomial (the same variant
//! as ZIP and Ethernet). Both a one-shot function and an incremental
//! hasher are provided.

/// Computes the CRC-32 of a byte slice in one call.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Incremental CRC-32 calculator.
///
/// # Example
///
/// ```rust
/// use sevz::checksum::{crc32, Crc32};
///
/// let mut crc = Crc32::new();
/// crc.update(b"Hello, ");
/// crc.update(b"World!");
/// assert_eq!(crc.finalize(), 0xEC4AC3D0);
/// assert_eq!(crc32(b"Hello, World!"), 0xEC4AC3D0);
/// ```
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    /// Creates a new calculator in its initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more data into the checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Returns the checksum of all data fed so far.
    pub fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.finalize())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"hello"), 0x3610A686);
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut crc = Crc32::new();
        for chunk in data.chunks(7) {
            crc.update(chunk);
        }
        assert_eq!(crc.finalize(), crc32(data));
    }

    #[test]
    fn test_finalize_is_not_destructive() {
        let mut crc = Crc32::new();
        crc.update(b"abc");
        let first = crc.finalize();
        crc.update(b"def");
        assert_eq!(crc.finalize(), crc32(b"abcdef"));
        assert_ne!(first, crc.finalize());
    }
}
