//! Top-level header parsing, including encoded headers.
//!
//! The metadata of a 7z archive may itself be stored as an encoded
//! substream: a `kEncodedHeader` carries a StreamsInfo describing a
//! folder whose decoded output is the real `kHeader`. The parser here
//! runs that folder through the same coder-graph executor used for
//! file extraction, then re-parses the produced bytes.

use crate::checksum::crc32;
use crate::codec::CoderRegistry;
use crate::format::reader::ByteReader;
use crate::read::graph::{decode_folder, slice_pack_streams};
use crate::{Error, Result};

use super::files::{ArchiveEntry, FilesInfo};
use super::header::StartHeader;
use super::property_id;
use super::streams::{Folder, PackInfo, ResourceLimits, SubStreamsInfo, UnpackInfo};

/// Maximum nesting of encoded headers.
const MAX_ENCODED_HEADER_DEPTH: u32 = 4;

/// Parsed archive header data.
#[derive(Debug, Clone, Default)]
pub struct ArchiveHeader {
    /// Pack info (packed stream locations).
    pub pack_info: Option<PackInfo>,
    /// Unpack info (folder definitions).
    pub unpack_info: Option<UnpackInfo>,
    /// Substreams info (per-file partitioning of folders).
    pub substreams_info: Option<SubStreamsInfo>,
    /// Files info (per-entry metadata).
    pub files_info: Option<FilesInfo>,
    /// Whether reading the metadata required decryption.
    pub header_encrypted: bool,
}

impl ArchiveHeader {
    /// Returns all file entries.
    pub fn entries(&self) -> &[ArchiveEntry] {
        self.files_info.as_ref().map_or(&[], |f| &f.entries)
    }

    /// Returns all folders.
    pub fn folders(&self) -> &[Folder] {
        self.unpack_info.as_ref().map_or(&[], |u| &u.folders)
    }
}

/// Header parser, carrying limits and the codec registry needed to
/// decode encoded headers.
pub(crate) struct HeaderParser<'r> {
    limits: &'r ResourceLimits,
    registry: &'r CoderRegistry,
    recursion_depth: u32,
}

impl<'r> HeaderParser<'r> {
    pub fn new(limits: &'r ResourceLimits, registry: &'r CoderRegistry) -> Self {
        Self {
            limits,
            registry,
            recursion_depth: 0,
        }
    }

    /// Parses a header buffer, dispatching on its first tag.
    ///
    /// `archive` is the whole archive; the encoded-header path needs
    /// it to reach the pack region.
    pub fn parse(&mut self, archive: &[u8], header_bytes: &[u8]) -> Result<ArchiveHeader> {
        let mut r = ByteReader::new(header_bytes);

        match r.read_u8()? {
            property_id::HEADER => self.parse_main_header(&mut r),
            property_id::ENCODED_HEADER => self.parse_encoded_header(archive, &mut r),
            other => Err(Error::InvalidFormat(format!(
                "expected header marker, got {:#04x}",
                other
            ))),
        }
    }

    /// Parses the body of a plain `kHeader`.
    fn parse_main_header(&mut self, r: &mut ByteReader<'_>) -> Result<ArchiveHeader> {
        let mut header = ArchiveHeader::default();

        loop {
            let prop_id = r.read_u8()?;

            match prop_id {
                property_id::END => break,

                property_id::ARCHIVE_PROPERTIES => {
                    skip_archive_properties(r, self.limits)?;
                }

                property_id::MAIN_STREAMS_INFO => {
                    self.parse_streams_info(r, &mut header)?;
                }

                property_id::FILES_INFO => {
                    let (sizes, crcs) = file_sizes_and_crcs(&header);
                    header.files_info =
                        Some(FilesInfo::parse(r, &sizes, &crcs, self.limits)?);
                }

                property_id::ADDITIONAL_STREAMS_INFO => {
                    return Err(Error::UnsupportedFeature {
                        feature: "additional streams",
                    });
                }

                _ => {
                    return Err(Error::InvalidFormat(format!(
                        "unexpected property {:#04x} in header",
                        prop_id
                    )));
                }
            }
        }

        Ok(header)
    }

    /// Parses a StreamsInfo section into `header`.
    fn parse_streams_info(
        &mut self,
        r: &mut ByteReader<'_>,
        header: &mut ArchiveHeader,
    ) -> Result<()> {
        loop {
            let prop_id = r.read_u8()?;

            match prop_id {
                property_id::END => break,

                property_id::PACK_INFO => {
                    header.pack_info = Some(PackInfo::parse(r, self.limits)?);
                }

                property_id::UNPACK_INFO => {
                    header.unpack_info = Some(UnpackInfo::parse(r, self.limits)?);
                }

                property_id::SUBSTREAMS_INFO => {
                    let folders = header
                        .unpack_info
                        .as_ref()
                        .map_or(&[] as &[Folder], |u| &u.folders);
                    header.substreams_info =
                        Some(SubStreamsInfo::parse(r, folders, self.limits)?);
                }

                _ => {
                    return Err(Error::InvalidFormat(format!(
                        "unexpected property {:#04x} in streams info",
                        prop_id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Decodes a `kEncodedHeader` and re-parses the result.
    fn parse_encoded_header(
        &mut self,
        archive: &[u8],
        r: &mut ByteReader<'_>,
    ) -> Result<ArchiveHeader> {
        self.recursion_depth += 1;
        if self.recursion_depth > MAX_ENCODED_HEADER_DEPTH {
            return Err(Error::ResourceLimitExceeded(
                "encoded header recursion too deep".into(),
            ));
        }

        let mut streams = ArchiveHeader::default();
        self.parse_streams_info(r, &mut streams)?;

        let pack_info = streams
            .pack_info
            .as_ref()
            .ok_or_else(|| Error::InvalidFormat("encoded header missing pack info".into()))?;
        let unpack_info = streams
            .unpack_info
            .as_ref()
            .ok_or_else(|| Error::InvalidFormat("encoded header missing unpack info".into()))?;

        let folder = unpack_info
            .folders
            .first()
            .ok_or_else(|| Error::InvalidFormat("encoded header has no folders".into()))?;

        let pack_streams = slice_pack_streams(
            archive,
            pack_info.pack_pos,
            &pack_info.pack_sizes,
            0,
            folder.packed_streams.len(),
        )?;

        let encrypted = folder.uses_encryption();
        let decoded = decode_folder(folder, self.registry, &pack_streams, self.limits)?;

        if let Some(expected) = folder.unpack_crc {
            let actual = crc32(&decoded);
            if actual != expected {
                // The folder CRC is the first integrity gate after the
                // AES coder; a mismatch there means a bad password.
                if encrypted {
                    return Err(Error::WrongPassword {
                        entry_index: None,
                        entry_name: None,
                    });
                }
                return Err(Error::CorruptHeader {
                    offset: super::SIGNATURE_HEADER_SIZE + pack_info.pack_pos,
                    reason: format!(
                        "encoded header CRC mismatch: expected {:#010x}, got {:#010x}",
                        expected, actual
                    ),
                });
            }
        }

        let mut header = self.parse(archive, &decoded)?;
        header.header_encrypted |= encrypted;
        Ok(header)
    }
}

/// Skips the kArchiveProperties section (id + size-prefixed payload
/// pairs, terminated by kEnd).
fn skip_archive_properties(r: &mut ByteReader<'_>, limits: &ResourceLimits) -> Result<()> {
    loop {
        let prop_id = r.read_u8()?;
        if prop_id == property_id::END {
            return Ok(());
        }
        let size = r.read_number()?;
        if size > limits.max_header_bytes {
            return Err(Error::ResourceLimitExceeded(
                "archive property too large".into(),
            ));
        }
        r.skip(size as usize)?;
    }
}

/// Collects per-file sizes and digests for FilesInfo assignment.
fn file_sizes_and_crcs(header: &ArchiveHeader) -> (Vec<u64>, Vec<Option<u32>>) {
    if let Some(ref substreams) = header.substreams_info {
        (substreams.unpack_sizes.clone(), substreams.digests.clone())
    } else if let Some(ref unpack_info) = header.unpack_info {
        // One file per folder.
        let sizes = unpack_info
            .folders
            .iter()
            .filter_map(|f| f.final_unpack_size())
            .collect();
        let crcs = unpack_info.folders.iter().map(|f| f.unpack_crc).collect();
        (sizes, crcs)
    } else {
        (Vec::new(), Vec::new())
    }
}

/// Reads and validates a complete archive header.
///
/// This is the entry point for parsing: it checks the signature
/// header, locates and CRC-checks the next header, and parses it
/// (decoding it first if encoded).
pub(crate) fn read_archive_header(
    data: &[u8],
    limits: &ResourceLimits,
    registry: &CoderRegistry,
) -> Result<(StartHeader, ArchiveHeader)> {
    let start_header = StartHeader::parse(data)?;

    // An archive with no next header is valid and empty.
    if start_header.next_header_size == 0 {
        return Ok((start_header, ArchiveHeader::default()));
    }

    let header_pos = start_header.next_header_position();
    let header_end = header_pos
        .checked_add(start_header.next_header_size)
        .ok_or(Error::Truncated)?;
    if header_end > data.len() as u64 {
        return Err(Error::Truncated);
    }

    let header_bytes = &data[header_pos as usize..header_end as usize];

    let actual_crc = crc32(header_bytes);
    if actual_crc != start_header.next_header_crc {
        return Err(Error::CorruptHeader {
            offset: header_pos,
            reason: format!(
                "next header CRC mismatch: expected {:#010x}, got {:#010x}",
                start_header.next_header_crc, actual_crc
            ),
        });
    }

    let mut parser = HeaderParser::new(limits, registry);
    let header = parser.parse(data, header_bytes)?;

    Ok((start_header, header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::reader::write_number;

    fn parse_header_bytes(bytes: &[u8]) -> Result<ArchiveHeader> {
        let limits = ResourceLimits::default();
        let registry = CoderRegistry::with_defaults();
        HeaderParser::new(&limits, &registry).parse(&[], bytes)
    }

    #[test]
    fn test_empty_header() {
        let header = parse_header_bytes(&[property_id::HEADER, property_id::END]).unwrap();
        assert!(header.pack_info.is_none());
        assert!(header.files_info.is_none());
        assert!(!header.header_encrypted);
    }

    #[test]
    fn test_invalid_first_tag() {
        let err = parse_header_bytes(&[0x99]).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_header_with_pack_info() {
        let mut data = vec![property_id::HEADER, property_id::MAIN_STREAMS_INFO];

        data.push(property_id::PACK_INFO);
        write_number(&mut data, 0); // pack_pos
        write_number(&mut data, 1); // one stream
        data.push(property_id::SIZE);
        write_number(&mut data, 1000);
        data.push(property_id::END);

        data.push(property_id::END); // streams info
        data.push(property_id::END); // header

        let header = parse_header_bytes(&data).unwrap();
        assert_eq!(header.pack_info.unwrap().pack_sizes, vec![1000]);
    }

    #[test]
    fn test_archive_properties_skipped() {
        let mut data = vec![property_id::HEADER, property_id::ARCHIVE_PROPERTIES];
        data.push(0x20); // some property id
        write_number(&mut data, 3);
        data.extend_from_slice(&[1, 2, 3]);
        data.push(property_id::END); // end of archive properties
        data.push(property_id::END); // end of header

        assert!(parse_header_bytes(&data).is_ok());
    }

    #[test]
    fn test_unexpected_tag_in_header() {
        let data = vec![property_id::HEADER, property_id::SIZE];
        let err = parse_header_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_additional_streams_unsupported() {
        let data = vec![property_id::HEADER, property_id::ADDITIONAL_STREAMS_INFO];
        let err = parse_header_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature { .. }));
    }
}
