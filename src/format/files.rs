//! FilesInfo: the per-entry metadata section of the header.

use crate::format::reader::ByteReader;
use crate::{Error, Result};

use super::attributes;
use super::property_id;
use super::streams::ResourceLimits;

/// Maximum length for UTF-16LE strings read from archives, in code
/// units. Bounds what a hostile name or comment can allocate.
const MAX_UTF16_STRING_LENGTH: usize = 32768;

/// A single file entry in the archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveEntry {
    /// File name (path within the archive, `/`-separated).
    pub name: String,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Whether this is an anti-item (deletion marker in incremental backups).
    pub is_anti: bool,
    /// Whether this entry has an associated data stream.
    pub has_stream: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC-32 of the uncompressed data, when recorded.
    pub crc: Option<u32>,
    /// Creation time (Windows FILETIME, 100 ns ticks since 1601-01-01).
    pub ctime: Option<u64>,
    /// Last access time (Windows FILETIME).
    pub atime: Option<u64>,
    /// Last modification time (Windows FILETIME).
    pub mtime: Option<u64>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
}

impl ArchiveEntry {
    /// Returns true if this entry represents a file (not a directory).
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Returns true if the attributes mark this entry read-only.
    pub fn is_readonly(&self) -> bool {
        self.attributes
            .is_some_and(|a| a & attributes::READONLY != 0)
    }
}

/// Files info from the archive header.
#[derive(Debug, Clone, Default)]
pub struct FilesInfo {
    /// List of file entries.
    pub entries: Vec<ArchiveEntry>,
    /// Archive comment, if present.
    pub comment: Option<String>,
}

impl FilesInfo {
    /// Parses FilesInfo positioned after the `kFilesInfo` tag.
    ///
    /// `unpack_sizes` and `digests` carry the per-substream metadata
    /// already collected from SubStreamsInfo; they are assigned to the
    /// entries that own a data stream, in order.
    pub fn parse(
        r: &mut ByteReader<'_>,
        unpack_sizes: &[u64],
        digests: &[Option<u32>],
        limits: &ResourceLimits,
    ) -> Result<Self> {
        let num_files = r.read_number()?;

        if num_files > limits.max_entries as u64 {
            return Err(Error::ResourceLimitExceeded(format!(
                "too many files: {}",
                num_files
            )));
        }

        let num_files = num_files as usize;
        let mut entries: Vec<ArchiveEntry> =
            (0..num_files).map(|_| ArchiveEntry::default()).collect();

        let mut empty_streams = vec![false; num_files];
        let mut empty_files = Vec::new();
        let mut anti_items = Vec::new();
        let mut comment: Option<String> = None;

        loop {
            let prop_id = r.read_u8()?;
            if prop_id == property_id::END {
                break;
            }

            let prop_size = r.read_number()?;
            if prop_size > limits.max_header_bytes {
                return Err(Error::ResourceLimitExceeded(
                    "file property too large".into(),
                ));
            }
            let after = r
                .position()
                .checked_add(prop_size as usize)
                .ok_or(Error::Truncated)?;

            match prop_id {
                property_id::NAME => {
                    let external = r.read_u8()?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external file names",
                        });
                    }
                    for entry in &mut entries {
                        entry.name = r.read_utf16le_string(MAX_UTF16_STRING_LENGTH)?;
                    }
                }

                property_id::EMPTY_STREAM => {
                    empty_streams = r.read_bool_vector(num_files)?;
                }

                property_id::EMPTY_FILE => {
                    let num_empty = empty_streams.iter().filter(|&&x| x).count();
                    empty_files = r.read_bool_vector(num_empty)?;
                }

                property_id::ANTI => {
                    let num_empty = empty_streams.iter().filter(|&&x| x).count();
                    anti_items = r.read_bool_vector(num_empty)?;
                }

                property_id::CTIME => {
                    parse_timestamps(r, &mut entries, |e, t| e.ctime = Some(t))?;
                }

                property_id::ATIME => {
                    parse_timestamps(r, &mut entries, |e, t| e.atime = Some(t))?;
                }

                property_id::MTIME => {
                    parse_timestamps(r, &mut entries, |e, t| e.mtime = Some(t))?;
                }

                property_id::WIN_ATTRIBUTES => {
                    let defined = r.read_all_or_bits(num_files)?;
                    let external = r.read_u8()?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external attributes",
                        });
                    }
                    for (entry, &has_attr) in entries.iter_mut().zip(defined.iter()) {
                        if has_attr {
                            entry.attributes = Some(r.read_u32_le()?);
                        }
                    }
                }

                property_id::COMMENT => {
                    let external = r.read_u8()?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external comments",
                        });
                    }
                    comment = Some(r.read_utf16le_string(MAX_UTF16_STRING_LENGTH)?);
                }

                _ => {
                    // kDummy, kStartPos, and anything newer: skip the
                    // size-prefixed payload.
                    r.skip(prop_size as usize)?;
                }
            }

            // Properties are size-prefixed; tolerate padding after the
            // ones we parse field-by-field.
            if r.position() > after {
                return Err(Error::InvalidFormat(format!(
                    "file property {:#04x} overran its declared size",
                    prop_id
                )));
            }
            r.skip(after - r.position())?;
        }

        // Resolve the empty-stream / empty-file / anti vectors.
        let mut empty_idx = 0;
        for (i, &is_empty_stream) in empty_streams.iter().enumerate() {
            if is_empty_stream {
                entries[i].has_stream = false;

                // Without an empty-file bit, an empty-stream entry is a
                // directory.
                if empty_idx < empty_files.len() {
                    entries[i].is_directory = !empty_files[empty_idx];
                } else {
                    entries[i].is_directory = true;
                }

                if empty_idx < anti_items.len() {
                    entries[i].is_anti = anti_items[empty_idx];
                }

                empty_idx += 1;
            } else {
                entries[i].has_stream = true;
            }
        }

        // Assign substream sizes and digests to stream-bearing entries.
        let mut stream_idx = 0;
        for entry in &mut entries {
            if entry.has_stream {
                if stream_idx < unpack_sizes.len() {
                    entry.size = unpack_sizes[stream_idx];
                }
                if stream_idx < digests.len() {
                    entry.crc = digests[stream_idx];
                }
                stream_idx += 1;
            }
        }

        Ok(Self { entries, comment })
    }

    /// Returns the number of entries.
    pub fn num_files(&self) -> usize {
        self.entries.len()
    }

    /// Returns the archive comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns entries that own a data stream.
    pub fn files_with_streams(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(|e| e.has_stream)
    }
}

/// Parses a defined-vector + external flag + FILETIME list.
fn parse_timestamps<F>(
    r: &mut ByteReader<'_>,
    entries: &mut [ArchiveEntry],
    mut setter: F,
) -> Result<()>
where
    F: FnMut(&mut ArchiveEntry, u64),
{
    let defined = r.read_all_or_bits(entries.len())?;

    let external = r.read_u8()?;
    if external != 0 {
        return Err(Error::UnsupportedFeature {
            feature: "external timestamps",
        });
    }

    for (entry, &has_time) in entries.iter_mut().zip(defined.iter()) {
        if has_time {
            setter(entry, r.read_u64_le()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::reader::write_number;

    fn write_utf16le_string(buf: &mut Vec<u8>, s: &str) {
        for c in s.encode_utf16() {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        buf.extend_from_slice(&[0x00, 0x00]);
    }

    fn push_property(data: &mut Vec<u8>, id: u8, payload: &[u8]) {
        data.push(id);
        write_number(data, payload.len() as u64);
        data.extend_from_slice(payload);
    }

    #[test]
    fn test_files_info_basic() {
        let mut data = Vec::new();
        write_number(&mut data, 2);

        let mut names = vec![0x00];
        write_utf16le_string(&mut names, "file1.txt");
        write_utf16le_string(&mut names, "dir/file2.txt");
        push_property(&mut data, property_id::NAME, &names);

        data.push(property_id::END);

        let mut r = ByteReader::new(&data);
        let sizes = [100, 200];
        let crcs = [Some(0x11111111), Some(0x22222222)];
        let info =
            FilesInfo::parse(&mut r, &sizes, &crcs, &ResourceLimits::default()).unwrap();

        assert_eq!(info.num_files(), 2);
        assert_eq!(info.entries[0].name, "file1.txt");
        assert_eq!(info.entries[1].name, "dir/file2.txt");
        assert_eq!(info.entries[0].size, 100);
        assert_eq!(info.entries[1].size, 200);
        assert_eq!(info.entries[0].crc, Some(0x11111111));
        assert!(info.entries.iter().all(|e| e.has_stream));
    }

    #[test]
    fn test_files_info_with_directory() {
        let mut data = Vec::new();
        write_number(&mut data, 2);

        let mut names = vec![0x00];
        write_utf16le_string(&mut names, "mydir");
        write_utf16le_string(&mut names, "mydir/file.txt");
        push_property(&mut data, property_id::NAME, &names);

        // First entry has no stream (directory)
        push_property(&mut data, property_id::EMPTY_STREAM, &[0b10000000]);

        data.push(property_id::END);

        let mut r = ByteReader::new(&data);
        let sizes = [500];
        let crcs = [Some(0xABCDEF01)];
        let info =
            FilesInfo::parse(&mut r, &sizes, &crcs, &ResourceLimits::default()).unwrap();

        assert!(info.entries[0].is_directory);
        assert!(!info.entries[0].has_stream);
        assert!(!info.entries[1].is_directory);
        assert!(info.entries[1].has_stream);
        assert_eq!(info.entries[1].size, 500);
    }

    #[test]
    fn test_files_info_empty_file_and_anti() {
        let mut data = Vec::new();
        write_number(&mut data, 3);

        let mut names = vec![0x00];
        write_utf16le_string(&mut names, "keep.txt");
        write_utf16le_string(&mut names, "delete.txt");
        write_utf16le_string(&mut names, "mydir");
        push_property(&mut data, property_id::NAME, &names);

        // Entries 1 and 2 are empty streams
        push_property(&mut data, property_id::EMPTY_STREAM, &[0b01100000]);
        // Of the empty ones, the first is an empty file (not a dir)
        push_property(&mut data, property_id::EMPTY_FILE, &[0b10000000]);
        // ... and an anti-item
        push_property(&mut data, property_id::ANTI, &[0b10000000]);

        data.push(property_id::END);

        let mut r = ByteReader::new(&data);
        let sizes = [100];
        let crcs = [Some(0x12345678)];
        let info =
            FilesInfo::parse(&mut r, &sizes, &crcs, &ResourceLimits::default()).unwrap();

        assert!(info.entries[0].has_stream && !info.entries[0].is_anti);
        assert!(!info.entries[1].is_directory && !info.entries[1].has_stream);
        assert!(info.entries[1].is_anti);
        assert_eq!(info.entries[1].size, 0);
        assert!(info.entries[2].is_directory && !info.entries[2].is_anti);
    }

    #[test]
    fn test_files_info_timestamps_and_attributes() {
        let mut data = Vec::new();
        write_number(&mut data, 1);

        let mut names = vec![0x00];
        write_utf16le_string(&mut names, "a.bin");
        push_property(&mut data, property_id::NAME, &names);

        let mut mtimes = vec![0x01, 0x00]; // all defined, not external
        mtimes.extend_from_slice(&0x01D9_0000_0000_0000u64.to_le_bytes());
        push_property(&mut data, property_id::MTIME, &mtimes);

        let mut attrs = vec![0x01, 0x00];
        attrs.extend_from_slice(&attributes::READONLY.to_le_bytes());
        push_property(&mut data, property_id::WIN_ATTRIBUTES, &attrs);

        data.push(property_id::END);

        let mut r = ByteReader::new(&data);
        let info = FilesInfo::parse(&mut r, &[10], &[None], &ResourceLimits::default()).unwrap();

        assert_eq!(info.entries[0].mtime, Some(0x01D9_0000_0000_0000));
        assert_eq!(info.entries[0].attributes, Some(attributes::READONLY));
        assert!(info.entries[0].is_readonly());
    }

    #[test]
    fn test_files_info_skips_unknown_property() {
        let mut data = Vec::new();
        write_number(&mut data, 1);

        // kDummy padding before the names
        push_property(&mut data, property_id::DUMMY, &[0x00; 7]);

        let mut names = vec![0x00];
        write_utf16le_string(&mut names, "x");
        push_property(&mut data, property_id::NAME, &names);

        data.push(property_id::END);

        let mut r = ByteReader::new(&data);
        let info = FilesInfo::parse(&mut r, &[1], &[None], &ResourceLimits::default()).unwrap();
        assert_eq!(info.entries[0].name, "x");
    }

    #[test]
    fn test_files_info_comment() {
        let mut data = Vec::new();
        write_number(&mut data, 1);

        let mut names = vec![0x00];
        write_utf16le_string(&mut names, "file.txt");
        push_property(&mut data, property_id::NAME, &names);

        let mut comment = vec![0x00];
        write_utf16le_string(&mut comment, "hello archive");
        push_property(&mut data, property_id::COMMENT, &comment);

        data.push(property_id::END);

        let mut r = ByteReader::new(&data);
        let info = FilesInfo::parse(&mut r, &[1], &[None], &ResourceLimits::default()).unwrap();
        assert_eq!(info.comment(), Some("hello archive"));
    }
}
