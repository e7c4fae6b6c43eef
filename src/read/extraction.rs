//! Per-file extraction.
//!
//! Folders are decoded at most once per reader; file bytes are sliced
//! out of the memoized folder output. Integrity failures are reported
//! per entry and do not poison the reader.

use crate::checksum::crc32;
use crate::{Error, Result};

use super::graph::{decode_folder, slice_pack_streams};
use super::Archive;

/// Result of extracting one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedEntry {
    /// File contents. Empty files yield an empty vector.
    Data(Vec<u8>),
    /// The entry is a directory and has no contents.
    Directory,
}

impl ExtractedEntry {
    /// Returns the contained bytes, or `None` for a directory.
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Self::Data(data) => Some(data),
            Self::Directory => None,
        }
    }

    /// Returns true if this is a directory marker.
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

impl<'a> Archive<'a> {
    /// Extracts the entry at `index`.
    ///
    /// The owning folder is decoded on first use and kept for later
    /// extractions. If the entry declares a CRC it is verified; a
    /// mismatch is reported for this entry only, and other entries
    /// remain extractable.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedCoder`] if the folder uses an unregistered coder
    /// - [`Error::PasswordRequired`] for encrypted content without a password
    /// - [`Error::WrongPassword`] when decrypted data fails its CRC
    /// - [`Error::CrcMismatch`] for plain integrity failures
    pub fn extract(&mut self, index: usize) -> Result<ExtractedEntry> {
        let entry = self
            .entry(index)
            .ok_or_else(|| Error::InvalidFormat(format!("no entry at index {}", index)))?;

        if !entry.has_stream {
            if entry.is_directory {
                return Ok(ExtractedEntry::Directory);
            }
            // Empty file (or anti-item): no folder backs it.
            return Ok(ExtractedEntry::Data(Vec::new()));
        }

        let location = self.entry_streams[index]
            .ok_or_else(|| Error::InvalidFormat("stream-bearing entry unmapped".into()))?;

        self.ensure_folder_decoded(location.folder)?;
        let folder_output = &self.folder_cache[&location.folder];

        let start = location.offset as usize;
        let end = start + location.size as usize;
        let bytes = folder_output
            .get(start..end)
            .ok_or_else(|| Error::InvalidFormat("substream span outside folder output".into()))?;

        if let Some(expected) = location.crc {
            let actual = crc32(bytes);
            if actual != expected {
                let entry = &self.header.entries()[index];
                let encrypted = self.header.folders()[location.folder].uses_encryption();
                if encrypted {
                    return Err(Error::WrongPassword {
                        entry_index: Some(index),
                        entry_name: Some(entry.name.clone()),
                    });
                }
                return Err(Error::CrcMismatch {
                    entry_index: Some(index),
                    entry_name: Some(entry.name.clone()),
                    expected,
                    actual,
                });
            }
        }

        Ok(ExtractedEntry::Data(bytes.to_vec()))
    }

    /// Extracts the entry with the given name.
    pub fn extract_by_name(&mut self, name: &str) -> Result<ExtractedEntry> {
        let index = self
            .find(name)
            .ok_or_else(|| Error::InvalidFormat(format!("no entry named '{}'", name)))?;
        self.extract(index)
    }

    /// Decodes folder `folder_idx` into the cache if not already there.
    fn ensure_folder_decoded(&mut self, folder_idx: usize) -> Result<()> {
        if self.folder_cache.contains_key(&folder_idx) {
            return Ok(());
        }

        let folder = self
            .header
            .folders()
            .get(folder_idx)
            .ok_or_else(|| Error::InvalidFormat(format!("no folder {}", folder_idx)))?;

        let pack_info = self
            .header
            .pack_info
            .as_ref()
            .ok_or_else(|| Error::InvalidFormat("missing pack info".into()))?;

        let pack_streams = slice_pack_streams(
            self.data,
            pack_info.pack_pos,
            &pack_info.pack_sizes,
            self.folder_pack_base[folder_idx],
            folder.packed_streams.len(),
        )?;

        let output = decode_folder(folder, &self.registry, &pack_streams, &self.limits)?;

        // The folder CRC is the first integrity gate past the coders;
        // on an encrypted folder a mismatch means a bad password.
        if let Some(expected) = folder.unpack_crc {
            let actual = crc32(&output);
            if actual != expected {
                if folder.uses_encryption() {
                    return Err(Error::WrongPassword {
                        entry_index: None,
                        entry_name: None,
                    });
                }
                return Err(Error::CrcMismatch {
                    entry_index: None,
                    entry_name: None,
                    expected,
                    actual,
                });
            }
        }

        self.folder_cache.insert(folder_idx, output);
        Ok(())
    }

    /// Drops all memoized folder outputs.
    pub fn clear_cache(&mut self) {
        self.folder_cache.clear();
    }
}
