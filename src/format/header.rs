//! The fixed 32-byte signature header at the start of every archive.

use crate::checksum::crc32;
use crate::format::reader::ByteReader;
use crate::{Error, Result};

use super::{SIGNATURE, SIGNATURE_HEADER_SIZE, VERSION_MAJOR, VERSION_MINOR};

/// The start header of a 7z archive.
///
/// Located at the very beginning of the file; everything after its 32
/// bytes is located through `next_header_offset` / `next_header_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartHeader {
    /// Archive format version - major number.
    pub version_major: u8,
    /// Archive format version - minor number.
    pub version_minor: u8,
    /// CRC of the following 20 bytes (offset, size, crc).
    pub start_header_crc: u32,
    /// Offset from the end of the signature header to the next header.
    pub next_header_offset: u64,
    /// Size of the next header (compressed if encoded).
    pub next_header_size: u64,
    /// CRC of the next header bytes.
    pub next_header_crc: u32,
}

impl StartHeader {
    /// Parses and validates the signature header.
    ///
    /// # Errors
    ///
    /// - [`Error::Truncated`] if fewer than 32 bytes are available
    /// - [`Error::InvalidFormat`] if the signature does not match
    /// - [`Error::UnsupportedVersion`] for unknown format versions
    /// - [`Error::CorruptHeader`] if the start-header CRC fails
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);

        let sig = r.read_bytes(6)?;
        if sig != SIGNATURE {
            return Err(Error::InvalidFormat("invalid 7z signature".into()));
        }

        let version_major = r.read_u8()?;
        let version_minor = r.read_u8()?;

        if version_major > VERSION_MAJOR
            || (version_major == VERSION_MAJOR && version_minor > VERSION_MINOR)
        {
            return Err(Error::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let start_header_crc = r.read_u32_le()?;

        // The remaining 20 bytes (offset, size, crc) are covered by the
        // start header CRC.
        let covered = r.read_bytes(20)?;
        let calculated = crc32(covered);
        if calculated != start_header_crc {
            return Err(Error::CorruptHeader {
                offset: 12,
                reason: format!(
                    "start header CRC mismatch: expected {:#010x}, got {:#010x}",
                    start_header_crc, calculated
                ),
            });
        }

        let next_header_offset = u64::from_le_bytes(covered[0..8].try_into().expect("20-byte slice"));
        let next_header_size = u64::from_le_bytes(covered[8..16].try_into().expect("20-byte slice"));
        let next_header_crc = u32::from_le_bytes(covered[16..20].try_into().expect("20-byte slice"));

        Ok(Self {
            version_major,
            version_minor,
            start_header_crc,
            next_header_offset,
            next_header_size,
            next_header_crc,
        })
    }

    /// Returns the byte position where the next header starts.
    pub fn next_header_position(&self) -> u64 {
        SIGNATURE_HEADER_SIZE + self.next_header_offset
    }
}
