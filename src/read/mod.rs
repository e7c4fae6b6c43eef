//! Archive reading API.
//!
//! [`Archive`] borrows the whole archive as a byte slice, parses its
//! metadata at open time, and decodes folders lazily as entries are
//! extracted.
//!
//! ```rust,no_run
//! use sevz::{Archive, ExtractedEntry};
//!
//! # fn main() -> sevz::Result<()> {
//! let bytes = std::fs::read("archive.7z").unwrap();
//! let mut archive = Archive::open(&bytes)?;
//!
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.name, entry.size);
//! }
//!
//! if let ExtractedEntry::Data(data) = archive.extract(0)? {
//!     println!("first entry holds {} bytes", data.len());
//! }
//! # Ok(())
//! # }
//! ```

mod extraction;
pub(crate) mod graph;

use std::collections::HashMap;

use crate::codec::{AesCodec, CoderRegistry};
use crate::crypto::Password;
use crate::format::files::ArchiveEntry;
use crate::format::header::StartHeader;
use crate::format::parser::{read_archive_header, ArchiveHeader};
use crate::format::streams::ResourceLimits;
use crate::{Error, Result};

use std::sync::Arc;

pub use extraction::ExtractedEntry;

/// Options controlling how an archive is opened.
#[derive(Debug, Default)]
pub struct OpenOptions {
    password: Option<Password>,
    limits: ResourceLimits,
    registry: Option<CoderRegistry>,
}

impl OpenOptions {
    /// Creates options with defaults: no password, default limits,
    /// the default codec registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password used for AES-encrypted content.
    pub fn password(mut self, password: Password) -> Self {
        self.password = Some(password);
        self
    }

    /// Sets the resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the codec registry.
    ///
    /// The AES codec is always (re-)inserted by the reader, carrying
    /// the configured password.
    pub fn registry(mut self, registry: CoderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// Location of one entry's bytes inside a folder's decoded output.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamLocation {
    /// Folder index.
    pub folder: usize,
    /// Byte offset within the folder output.
    pub offset: u64,
    /// Substream length.
    pub size: u64,
    /// Declared substream CRC.
    pub crc: Option<u32>,
}

/// A 7z archive reader over a borrowed byte slice.
pub struct Archive<'a> {
    pub(crate) data: &'a [u8],
    start_header: StartHeader,
    pub(crate) header: ArchiveHeader,
    /// Per-entry stream location; `None` for empty files and directories.
    pub(crate) entry_streams: Vec<Option<StreamLocation>>,
    /// First pack-stream ordinal of each folder.
    pub(crate) folder_pack_base: Vec<usize>,
    pub(crate) registry: CoderRegistry,
    pub(crate) limits: ResourceLimits,
    /// Decoded folder outputs, kept for the reader's lifetime.
    pub(crate) folder_cache: HashMap<usize, Vec<u8>>,
}

impl<'a> Archive<'a> {
    /// Opens an archive without a password.
    pub fn open(data: &'a [u8]) -> Result<Self> {
        Self::open_with_options(data, OpenOptions::new())
    }

    /// Opens an archive, supplying a password for AES-encrypted content.
    pub fn open_with_password(data: &'a [u8], password: Password) -> Result<Self> {
        Self::open_with_options(data, OpenOptions::new().password(password))
    }

    /// Opens an archive with explicit options.
    pub fn open_with_options(data: &'a [u8], options: OpenOptions) -> Result<Self> {
        let mut registry = options
            .registry
            .unwrap_or_else(CoderRegistry::with_defaults);
        registry.register(Arc::new(AesCodec::new(options.password)));

        let limits = options.limits;
        let (start_header, header) = read_archive_header(data, &limits, &registry)?;

        let (entry_streams, folder_pack_base) = map_entry_streams(&header, &limits)?;

        Ok(Self {
            data,
            start_header,
            header,
            entry_streams,
            folder_pack_base,
            registry,
            limits,
            folder_cache: HashMap::new(),
        })
    }

    /// Returns all entries.
    pub fn entries(&self) -> &[ArchiveEntry] {
        self.header.entries()
    }

    /// Returns the entry at `index`, if it exists.
    pub fn entry(&self, index: usize) -> Option<&ArchiveEntry> {
        self.header.entries().get(index)
    }

    /// Returns the index of the entry with the given name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.header.entries().iter().position(|e| e.name == name)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.header.entries().len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.header.entries().is_empty()
    }

    /// Returns the archive comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.header.files_info.as_ref().and_then(|f| f.comment())
    }

    /// Returns true if reading the metadata required decryption.
    pub fn header_encrypted(&self) -> bool {
        self.header.header_encrypted
    }

    /// Returns the archive format version as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        (
            self.start_header.version_major,
            self.start_header.version_minor,
        )
    }
}

impl std::fmt::Debug for Archive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.len())
            .field("header_encrypted", &self.header.header_encrypted)
            .finish_non_exhaustive()
    }
}

/// Maps every stream-bearing entry to its folder and byte span, and
/// computes each folder's first pack-stream ordinal.
fn map_entry_streams(
    header: &ArchiveHeader,
    limits: &ResourceLimits,
) -> Result<(Vec<Option<StreamLocation>>, Vec<usize>)> {
    let folders = header.folders();

    let mut folder_pack_base = Vec::with_capacity(folders.len());
    let mut base = 0usize;
    for folder in folders {
        folder_pack_base.push(base);
        base += folder.packed_streams.len();
    }

    if let Some(pack_info) = &header.pack_info {
        if base > pack_info.num_streams() {
            return Err(Error::InvalidFormat(format!(
                "folders consume {} pack streams but only {} are declared",
                base,
                pack_info.num_streams()
            )));
        }
    } else if base > 0 {
        return Err(Error::InvalidFormat(
            "folders declared without pack info".into(),
        ));
    }

    // One substream per folder unless SubStreamsInfo says otherwise.
    let (default_streams, default_sizes, default_digests);
    let (per_folder, sizes, digests): (&[u64], &[u64], &[Option<u32>]) =
        match &header.substreams_info {
            Some(subs) => (
                &subs.num_unpack_streams_in_folders,
                &subs.unpack_sizes,
                &subs.digests,
            ),
            None => {
                default_streams = vec![1u64; folders.len()];
                default_sizes = folders
                    .iter()
                    .map(|f| f.final_unpack_size().unwrap_or(0))
                    .collect::<Vec<_>>();
                default_digests = folders.iter().map(|f| f.unpack_crc).collect::<Vec<_>>();
                (&default_streams, &default_sizes, &default_digests)
            }
        };

    // Flatten (folder, substream) into per-substream locations.
    let total_streams: u64 = per_folder.iter().sum();
    if total_streams > limits.max_entries as u64 {
        return Err(Error::ResourceLimitExceeded(format!(
            "too many substreams: {}",
            total_streams
        )));
    }

    let mut locations = Vec::with_capacity(total_streams as usize);
    let mut stream_idx = 0usize;
    for (folder_idx, &num_streams) in per_folder.iter().enumerate() {
        let folder_size = folders
            .get(folder_idx)
            .and_then(|f| f.final_unpack_size())
            .unwrap_or(0);
        let mut offset = 0u64;

        for _ in 0..num_streams {
            let size = if stream_idx < sizes.len() {
                sizes[stream_idx]
            } else {
                folder_size
            };
            let crc = digests.get(stream_idx).copied().flatten();

            if offset.checked_add(size).is_none_or(|end| end > folder_size) {
                return Err(Error::InvalidFormat(
                    "substream spans exceed folder output".into(),
                ));
            }

            locations.push(StreamLocation {
                folder: folder_idx,
                offset,
                size,
                crc,
            });
            offset += size;
            stream_idx += 1;
        }
    }

    // Hand the locations out to stream-bearing entries in order.
    let mut entry_streams = Vec::with_capacity(header.entries().len());
    let mut next_location = 0usize;
    for entry in header.entries() {
        if entry.has_stream {
            let loc = locations.get(next_location).copied().ok_or_else(|| {
                Error::InvalidFormat("more stream-bearing files than substreams".into())
            })?;
            entry_streams.push(Some(loc));
            next_location += 1;
        } else {
            entry_streams.push(None);
        }
    }

    Ok((entry_streams, folder_pack_base))
}
