//! Streams info structures: where the packed bytes live and how they
//! decode.
//!
//! `PackInfo` locates the packed streams in the pack region,
//! `UnpackInfo` describes the folders (coder graphs) that consume
//! them, and `SubStreamsInfo` partitions each folder's output into
//! per-file substreams.

use crate::format::reader::ByteReader;
use crate::{Error, Result};

use super::property_id;

/// Resource limits applied while parsing and extracting.
///
/// Defaults are chosen to let any reasonable archive through while
/// bounding what a hostile one can cost.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum number of entries (files, folders, streams).
    pub max_entries: usize,
    /// Maximum size of a header property payload in bytes.
    pub max_header_bytes: u64,
    /// Maximum declared unpacked size for a single folder.
    pub max_folder_unpacked: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_entries: 1_000_000,
            max_header_bytes: 64 << 20,      // 64 MiB
            max_folder_unpacked: 16 << 30,   // 16 GiB
        }
    }
}

impl ResourceLimits {
    /// Creates limits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates limits with no restrictions.
    pub fn unlimited() -> Self {
        Self {
            max_entries: usize::MAX,
            max_header_bytes: u64::MAX,
            max_folder_unpacked: u64::MAX,
        }
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Sets the maximum header property payload size.
    pub fn max_header_bytes(mut self, max: u64) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Sets the maximum declared unpacked size for a single folder.
    pub fn max_folder_unpacked(mut self, max: u64) -> Self {
        self.max_folder_unpacked = max;
        self
    }
}

/// Information about the packed (compressed) streams.
#[derive(Debug, Clone, Default)]
pub struct PackInfo {
    /// Position of the first pack stream, relative to the pack region
    /// (which begins right after the 32-byte signature header).
    pub pack_pos: u64,
    /// Sizes of each packed stream.
    pub pack_sizes: Vec<u64>,
    /// Optional CRC values for each packed stream.
    pub pack_crcs: Vec<Option<u32>>,
}

impl PackInfo {
    /// Parses PackInfo positioned after the `kPackInfo` tag.
    pub fn parse(r: &mut ByteReader<'_>, limits: &ResourceLimits) -> Result<Self> {
        let pack_pos = r.read_number()?;
        let num_pack_streams = r.read_number()?;

        if num_pack_streams > limits.max_entries as u64 {
            return Err(Error::ResourceLimitExceeded(format!(
                "too many pack streams: {}",
                num_pack_streams
            )));
        }

        let num_streams = num_pack_streams as usize;
        let mut pack_sizes = Vec::new();
        let mut pack_crcs = vec![None; num_streams];

        loop {
            let prop_id = r.read_u8()?;

            match prop_id {
                property_id::END => break,

                property_id::SIZE => {
                    pack_sizes.reserve(num_streams);
                    for _ in 0..num_streams {
                        pack_sizes.push(r.read_number()?);
                    }
                }

                property_id::CRC => {
                    let defined = r.read_all_or_bits(num_streams)?;
                    for (i, &has_crc) in defined.iter().enumerate() {
                        if has_crc {
                            pack_crcs[i] = Some(r.read_u32_le()?);
                        }
                    }
                }

                _ => {
                    return Err(Error::InvalidFormat(format!(
                        "unexpected property {:#04x} in PackInfo",
                        prop_id
                    )));
                }
            }
        }

        // Sizes are mandatory when streams are declared.
        if pack_sizes.len() != num_streams {
            return Err(Error::InvalidFormat(format!(
                "PackInfo declares {} streams but carries {} sizes",
                num_streams,
                pack_sizes.len()
            )));
        }

        Ok(Self {
            pack_pos,
            pack_sizes,
            pack_crcs,
        })
    }

    /// Returns the number of pack streams.
    pub fn num_streams(&self) -> usize {
        self.pack_sizes.len()
    }

    /// Returns the total packed size.
    pub fn total_packed_size(&self) -> u64 {
        self.pack_sizes.iter().sum()
    }
}

/// A compression, filter, or encryption coder within a folder.
#[derive(Debug, Clone)]
pub struct Coder {
    /// Coder ID bytes (1-15 bytes).
    pub id: Vec<u8>,
    /// Number of input streams.
    pub num_in_streams: u64,
    /// Number of output streams.
    pub num_out_streams: u64,
    /// Optional coder properties (e.g. LZMA dictionary size, AES salt/IV).
    pub properties: Option<Vec<u8>>,
}

impl Coder {
    /// Returns the coder ID folded into a little-endian u64.
    pub fn id_u64(&self) -> u64 {
        let mut result = 0u64;
        for (i, &byte) in self.id.iter().take(8).enumerate() {
            result |= (byte as u64) << (8 * i);
        }
        result
    }
}

/// An edge in the coder graph connecting one coder's output stream to
/// another coder's input stream.
#[derive(Debug, Clone, Copy)]
pub struct BindPair {
    /// Global index of the consuming input stream.
    pub in_index: u64,
    /// Global index of the producing output stream.
    pub out_index: u64,
}

/// A folder: one decoding pipeline producing one logical output stream.
#[derive(Debug, Clone)]
pub struct Folder {
    /// Coders in declaration order.
    pub coders: Vec<Coder>,
    /// Edges between coder streams.
    pub bind_pairs: Vec<BindPair>,
    /// For the k-th pack stream consumed by this folder, the global
    /// input stream index it feeds.
    pub packed_streams: Vec<u64>,
    /// Declared unpacked sizes, one per output stream in declaration order.
    pub unpack_sizes: Vec<u64>,
    /// Optional CRC of the folder's final output.
    pub unpack_crc: Option<u32>,
}

impl Folder {
    /// Parses a single folder description.
    fn parse(r: &mut ByteReader<'_>, limits: &ResourceLimits) -> Result<Self> {
        let num_coders = r.read_number()?;

        if num_coders == 0 {
            return Err(Error::InvalidFormat("folder has no coders".into()));
        }
        if num_coders > 64 {
            return Err(Error::ResourceLimitExceeded(format!(
                "too many coders in folder: {}",
                num_coders
            )));
        }

        let mut coders = Vec::with_capacity(num_coders as usize);
        let mut total_in_streams = 0u64;
        let mut total_out_streams = 0u64;

        for _ in 0..num_coders {
            let flags = r.read_u8()?;

            let id_size = (flags & 0x0F) as usize;
            let is_complex = (flags & 0x10) != 0;
            let has_attributes = (flags & 0x20) != 0;

            if id_size == 0 {
                return Err(Error::InvalidFormat("coder ID must not be empty".into()));
            }

            let id = r.read_bytes(id_size)?.to_vec();

            let (num_in_streams, num_out_streams) = if is_complex {
                (r.read_number()?, r.read_number()?)
            } else {
                (1, 1)
            };

            if num_in_streams == 0 || num_out_streams == 0 {
                return Err(Error::InvalidFormat(
                    "coder declares zero input or output streams".into(),
                ));
            }

            let properties = if has_attributes {
                let props_size = r.read_number()?;
                if props_size > limits.max_header_bytes {
                    return Err(Error::ResourceLimitExceeded(
                        "coder properties too large".into(),
                    ));
                }
                Some(r.read_bytes(props_size as usize)?.to_vec())
            } else {
                None
            };

            total_in_streams += num_in_streams;
            total_out_streams += num_out_streams;

            coders.push(Coder {
                id,
                num_in_streams,
                num_out_streams,
                properties,
            });
        }

        // One bind pair per output stream except the folder output.
        let num_bind_pairs = total_out_streams - 1;
        let mut bind_pairs = Vec::with_capacity(num_bind_pairs as usize);

        for i in 0..num_bind_pairs {
            let in_index = r.read_number()?;
            let out_index = r.read_number()?;

            if in_index >= total_in_streams {
                return Err(Error::InvalidFormat(format!(
                    "bind_pair[{}].in_index {} exceeds total input streams {}",
                    i, in_index, total_in_streams
                )));
            }
            if out_index >= total_out_streams {
                return Err(Error::InvalidFormat(format!(
                    "bind_pair[{}].out_index {} exceeds total output streams {}",
                    i, out_index, total_out_streams
                )));
            }

            bind_pairs.push(BindPair { in_index, out_index });
        }

        let num_packed = total_in_streams - num_bind_pairs;
        let mut packed_streams = Vec::with_capacity(num_packed as usize);

        if num_packed == 1 {
            // The single packed input is the one not covered by a bind pair.
            let mut bound = vec![false; total_in_streams as usize];
            for bp in &bind_pairs {
                bound[bp.in_index as usize] = true;
            }
            match bound.iter().position(|&b| !b) {
                Some(idx) => packed_streams.push(idx as u64),
                None => {
                    return Err(Error::InvalidFormat(
                        "folder has no unbound input stream".into(),
                    ));
                }
            }
        } else {
            for _ in 0..num_packed {
                let idx = r.read_number()?;
                if idx >= total_in_streams {
                    return Err(Error::InvalidFormat(format!(
                        "packed stream index {} exceeds total input streams {}",
                        idx, total_in_streams
                    )));
                }
                packed_streams.push(idx);
            }
        }

        Ok(Self {
            coders,
            bind_pairs,
            packed_streams,
            unpack_sizes: Vec::new(),
            unpack_crc: None,
        })
    }

    /// Returns the total number of input streams across all coders.
    pub fn total_in_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_in_streams).sum()
    }

    /// Returns the total number of output streams across all coders.
    pub fn total_out_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_out_streams).sum()
    }

    /// Returns the declared size of the folder's final output stream.
    ///
    /// The final output is the single output stream not consumed by
    /// any bind pair.
    pub fn final_unpack_size(&self) -> Option<u64> {
        self.unpack_sizes
            .get(self.final_out_stream_index()? as usize)
            .copied()
    }

    /// Returns the global index of the folder's output stream.
    pub fn final_out_stream_index(&self) -> Option<u64> {
        let total_out = self.total_out_streams();
        let mut consumed = vec![false; total_out as usize];
        for bp in &self.bind_pairs {
            if let Some(slot) = consumed.get_mut(bp.out_index as usize) {
                *slot = true;
            }
        }
        consumed.iter().position(|&c| !c).map(|i| i as u64)
    }

    /// Returns per-coder (first input stream, first output stream) offsets.
    pub fn coder_stream_offsets(&self) -> Vec<(usize, usize)> {
        let mut result = Vec::with_capacity(self.coders.len());
        let mut in_offset = 0;
        let mut out_offset = 0;

        for coder in &self.coders {
            result.push((in_offset, out_offset));
            in_offset += coder.num_in_streams as usize;
            out_offset += coder.num_out_streams as usize;
        }

        result
    }

    /// Finds the bind pair feeding the given global input stream index.
    pub fn find_bind_pair_for_in_stream(&self, in_stream_idx: u64) -> Option<&BindPair> {
        self.bind_pairs.iter().find(|bp| bp.in_index == in_stream_idx)
    }

    /// Returns the pack-stream ordinal feeding the given input stream.
    pub fn find_packed_stream_index(&self, in_stream_idx: u64) -> Option<usize> {
        self.packed_streams.iter().position(|&ps| ps == in_stream_idx)
    }

    /// Returns true if any coder in this folder is the 7z AES coder.
    pub fn uses_encryption(&self) -> bool {
        self.coders
            .iter()
            .any(|c| c.id.as_slice() == crate::codec::method::AES)
    }
}

/// Unpack info containing folder definitions.
#[derive(Debug, Clone, Default)]
pub struct UnpackInfo {
    /// List of folders.
    pub folders: Vec<Folder>,
}

impl UnpackInfo {
    /// Parses UnpackInfo positioned after the `kUnPackInfo` tag.
    pub fn parse(r: &mut ByteReader<'_>, limits: &ResourceLimits) -> Result<Self> {
        let mut folders = Vec::new();
        let mut saw_sizes = false;

        loop {
            let prop_id = r.read_u8()?;

            match prop_id {
                property_id::END => break,

                property_id::FOLDER => {
                    let num_folders = r.read_number()?;

                    if num_folders > limits.max_entries as u64 {
                        return Err(Error::ResourceLimitExceeded(format!(
                            "too many folders: {}",
                            num_folders
                        )));
                    }

                    let external = r.read_u8()?;
                    if external != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external folder definitions",
                        });
                    }

                    folders.reserve(num_folders as usize);
                    for _ in 0..num_folders {
                        folders.push(Folder::parse(r, limits)?);
                    }
                }

                property_id::CODERS_UNPACK_SIZE => {
                    for folder in &mut folders {
                        let num_sizes = folder.total_out_streams() as usize;
                        folder.unpack_sizes = Vec::with_capacity(num_sizes);
                        for _ in 0..num_sizes {
                            folder.unpack_sizes.push(r.read_number()?);
                        }
                    }
                    saw_sizes = true;
                }

                property_id::CRC => {
                    let defined = r.read_all_or_bits(folders.len())?;
                    for (folder, &has_crc) in folders.iter_mut().zip(defined.iter()) {
                        if has_crc {
                            folder.unpack_crc = Some(r.read_u32_le()?);
                        }
                    }
                }

                _ => {
                    return Err(Error::InvalidFormat(format!(
                        "unexpected property {:#04x} in UnpackInfo",
                        prop_id
                    )));
                }
            }
        }

        if !folders.is_empty() && !saw_sizes {
            return Err(Error::InvalidFormat(
                "UnpackInfo missing coder unpack sizes".into(),
            ));
        }

        Ok(Self { folders })
    }

    /// Returns the number of folders.
    pub fn num_folders(&self) -> usize {
        self.folders.len()
    }
}

/// Per-file partitioning of folder outputs.
///
/// In solid archives a single folder holds several files back to back;
/// SubStreamsInfo records how many files each folder carries, their
/// sizes, and their digests.
#[derive(Debug, Clone, Default)]
pub struct SubStreamsInfo {
    /// Number of substreams (files) in each folder.
    pub num_unpack_streams_in_folders: Vec<u64>,
    /// Unpacked sizes of each substream, in folder order.
    pub unpack_sizes: Vec<u64>,
    /// Optional CRC values for each substream.
    pub digests: Vec<Option<u32>>,
}

impl SubStreamsInfo {
    /// Parses SubStreamsInfo positioned after the `kSubStreamsInfo` tag.
    pub fn parse(
        r: &mut ByteReader<'_>,
        folders: &[Folder],
        limits: &ResourceLimits,
    ) -> Result<Self> {
        let num_folders = folders.len();

        // Default: one stream per folder.
        let mut num_unpack_streams_in_folders = vec![1u64; num_folders];
        let mut unpack_sizes = Vec::new();
        let mut digests = Vec::new();

        loop {
            let prop_id = r.read_u8()?;

            match prop_id {
                property_id::END => break,

                property_id::NUM_UNPACK_STREAM => {
                    for streams in num_unpack_streams_in_folders.iter_mut() {
                        *streams = r.read_number()?;
                    }
                    let total: u64 = num_unpack_streams_in_folders.iter().sum();
                    if total > limits.max_entries as u64 {
                        return Err(Error::ResourceLimitExceeded(format!(
                            "too many substreams: {}",
                            total
                        )));
                    }
                }

                property_id::SIZE => {
                    // n-1 sizes per folder; the last is the remainder of
                    // the folder's declared output.
                    for (folder_idx, &num_streams) in
                        num_unpack_streams_in_folders.iter().enumerate()
                    {
                        if num_streams == 0 {
                            continue;
                        }

                        let folder_size = folders[folder_idx].final_unpack_size().unwrap_or(0);
                        let mut remaining = folder_size;

                        for _ in 0..num_streams - 1 {
                            let size = r.read_number()?;
                            if size > remaining {
                                return Err(Error::InvalidFormat(
                                    "substream sizes exceed folder output size".into(),
                                ));
                            }
                            unpack_sizes.push(size);
                            remaining -= size;
                        }

                        unpack_sizes.push(remaining);
                    }
                }

                property_id::CRC => {
                    // Folders with a single substream and a folder-level
                    // CRC inherit it; everything else reads a digest here.
                    let mut streams_needing_crc = 0usize;
                    for (folder_idx, &num_streams) in
                        num_unpack_streams_in_folders.iter().enumerate()
                    {
                        if folders[folder_idx].unpack_crc.is_none() || num_streams != 1 {
                            streams_needing_crc += num_streams as usize;
                        }
                    }

                    let defined = r.read_all_or_bits(streams_needing_crc)?;
                    let mut defined_iter = defined.iter();

                    for (folder_idx, &num_streams) in
                        num_unpack_streams_in_folders.iter().enumerate()
                    {
                        let folder = &folders[folder_idx];

                        if folder.unpack_crc.is_some() && num_streams == 1 {
                            digests.push(folder.unpack_crc);
                        } else {
                            for _ in 0..num_streams {
                                match defined_iter.next() {
                                    Some(&true) => digests.push(Some(r.read_u32_le()?)),
                                    _ => digests.push(None),
                                }
                            }
                        }
                    }
                }

                _ => {
                    return Err(Error::InvalidFormat(format!(
                        "unexpected property {:#04x} in SubStreamsInfo",
                        prop_id
                    )));
                }
            }
        }

        // Sizes omitted: single-stream folders use the folder size.
        if unpack_sizes.is_empty() {
            for (folder_idx, &num_streams) in num_unpack_streams_in_folders.iter().enumerate() {
                if num_streams == 1 {
                    if let Some(size) = folders[folder_idx].final_unpack_size() {
                        unpack_sizes.push(size);
                    }
                } else if num_streams > 1 {
                    return Err(Error::InvalidFormat(
                        "solid folder missing substream sizes".into(),
                    ));
                }
            }
        }

        // Digests omitted: inherit folder CRCs where possible.
        if digests.is_empty() {
            for (folder_idx, &num_streams) in num_unpack_streams_in_folders.iter().enumerate() {
                if num_streams == 1 {
                    digests.push(folders[folder_idx].unpack_crc);
                } else {
                    for _ in 0..num_streams {
                        digests.push(None);
                    }
                }
            }
        }

        Ok(Self {
            num_unpack_streams_in_folders,
            unpack_sizes,
            digests,
        })
    }

    /// Returns the total number of substreams.
    pub fn total_streams(&self) -> u64 {
        self.num_unpack_streams_in_folders.iter().sum()
    }
}
