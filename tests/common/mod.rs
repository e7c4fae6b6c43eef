//! In-memory archive builders shared by the scenario tests.
//!
//! These construct byte-exact 7z archives: a signature header with
//! valid CRCs, a pack region, and a header section assembled from the
//! pieces each test needs.

#![allow(dead_code)]

use sevz::checksum::crc32;
use sevz::format::property_id;
use sevz::format::reader::write_number;

/// A coder description for [`folder_section`].
pub struct TestCoder {
    pub id: Vec<u8>,
    pub num_in: u64,
    pub num_out: u64,
    pub props: Option<Vec<u8>>,
}

impl TestCoder {
    pub fn simple(id: &[u8]) -> Self {
        Self {
            id: id.to_vec(),
            num_in: 1,
            num_out: 1,
            props: None,
        }
    }

    pub fn with_props(id: &[u8], props: Vec<u8>) -> Self {
        Self {
            props: Some(props),
            ..Self::simple(id)
        }
    }
}

/// A folder description for [`unpack_info_section`].
pub struct TestFolder {
    pub coders: Vec<TestCoder>,
    /// (in_index, out_index) pairs; must number total outputs - 1.
    pub bind_pairs: Vec<(u64, u64)>,
    /// Explicit packed-stream indices; required when a folder consumes
    /// more than one pack stream.
    pub packed_streams: Vec<u64>,
    /// One size per output stream, in declaration order.
    pub unpack_sizes: Vec<u64>,
    pub crc: Option<u32>,
}

impl TestFolder {
    /// Single 1-in/1-out coder folder.
    pub fn single(coder: TestCoder, unpack_size: u64, crc: Option<u32>) -> Self {
        Self {
            coders: vec![coder],
            bind_pairs: Vec::new(),
            packed_streams: Vec::new(),
            unpack_sizes: vec![unpack_size],
            crc,
        }
    }
}

/// Writes the kFolder body of one folder.
fn write_folder(buf: &mut Vec<u8>, folder: &TestFolder) {
    write_number(buf, folder.coders.len() as u64);

    for coder in &folder.coders {
        let complex = coder.num_in != 1 || coder.num_out != 1;
        let mut flags = coder.id.len() as u8;
        if complex {
            flags |= 0x10;
        }
        if coder.props.is_some() {
            flags |= 0x20;
        }
        buf.push(flags);
        buf.extend_from_slice(&coder.id);
        if complex {
            write_number(buf, coder.num_in);
            write_number(buf, coder.num_out);
        }
        if let Some(props) = &coder.props {
            write_number(buf, props.len() as u64);
            buf.extend_from_slice(props);
        }
    }

    for &(in_idx, out_idx) in &folder.bind_pairs {
        write_number(buf, in_idx);
        write_number(buf, out_idx);
    }

    // A single packed stream is implicit (the unbound input); more
    // than one is written explicitly.
    let total_in: u64 = folder.coders.iter().map(|c| c.num_in).sum();
    let num_packed = total_in - folder.bind_pairs.len() as u64;
    if num_packed > 1 {
        assert_eq!(folder.packed_streams.len() as u64, num_packed);
        for &idx in &folder.packed_streams {
            write_number(buf, idx);
        }
    }
}

/// Writes a complete kUnpackInfo section (tag included).
pub fn unpack_info_section(folders: &[TestFolder]) -> Vec<u8> {
    let mut buf = vec![property_id::UNPACK_INFO, property_id::FOLDER];
    write_number(&mut buf, folders.len() as u64);
    buf.push(0x00); // not external

    for folder in folders {
        write_folder(&mut buf, folder);
    }

    buf.push(property_id::CODERS_UNPACK_SIZE);
    for folder in folders {
        for &size in &folder.unpack_sizes {
            write_number(&mut buf, size);
        }
    }

    if folders.iter().any(|f| f.crc.is_some()) {
        buf.push(property_id::CRC);
        if folders.iter().all(|f| f.crc.is_some()) {
            buf.push(0x01);
        } else {
            buf.push(0x00);
            let mut bits = vec![0u8; folders.len().div_ceil(8)];
            for (i, folder) in folders.iter().enumerate() {
                if folder.crc.is_some() {
                    bits[i / 8] |= 0x80 >> (i % 8);
                }
            }
            buf.extend_from_slice(&bits);
        }
        for folder in folders {
            if let Some(crc) = folder.crc {
                buf.extend_from_slice(&crc.to_le_bytes());
            }
        }
    }

    buf.push(property_id::END);
    buf
}

/// Writes a complete kPackInfo section (tag included).
pub fn pack_info_section(pack_pos: u64, pack_sizes: &[u64]) -> Vec<u8> {
    let mut buf = vec![property_id::PACK_INFO];
    write_number(&mut buf, pack_pos);
    write_number(&mut buf, pack_sizes.len() as u64);
    buf.push(property_id::SIZE);
    for &size in pack_sizes {
        write_number(&mut buf, size);
    }
    buf.push(property_id::END);
    buf
}

/// Per-folder substream layout for [`substreams_section`].
pub struct TestSubStreams {
    /// Files per folder.
    pub counts: Vec<u64>,
    /// Sizes, n-1 per folder (the last is implicit).
    pub sizes: Vec<u64>,
    /// One digest per substream, in order.
    pub crcs: Vec<Option<u32>>,
}

/// Writes a complete kSubStreamsInfo section (tag included).
pub fn substreams_section(subs: &TestSubStreams) -> Vec<u8> {
    let mut buf = vec![property_id::SUBSTREAMS_INFO, property_id::NUM_UNPACK_STREAM];
    for &count in &subs.counts {
        write_number(&mut buf, count);
    }

    if !subs.sizes.is_empty() {
        buf.push(property_id::SIZE);
        for &size in &subs.sizes {
            write_number(&mut buf, size);
        }
    }

    if subs.crcs.iter().any(|c| c.is_some()) {
        buf.push(property_id::CRC);
        if subs.crcs.iter().all(|c| c.is_some()) {
            buf.push(0x01);
        } else {
            buf.push(0x00);
            let mut bits = vec![0u8; subs.crcs.len().div_ceil(8)];
            for (i, crc) in subs.crcs.iter().enumerate() {
                if crc.is_some() {
                    bits[i / 8] |= 0x80 >> (i % 8);
                }
            }
            buf.extend_from_slice(&bits);
        }
        for crc in subs.crcs.iter().flatten() {
            buf.extend_from_slice(&crc.to_le_bytes());
        }
    }

    buf.push(property_id::END);
    buf
}

/// Writes a UTF-16LE NUL-terminated string.
pub fn utf16z(buf: &mut Vec<u8>, s: &str) {
    for c in s.encode_utf16() {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    buf.extend_from_slice(&[0x00, 0x00]);
}

/// Writes a size-prefixed FilesInfo property.
fn push_file_property(buf: &mut Vec<u8>, id: u8, payload: &[u8]) {
    buf.push(id);
    write_number(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}

/// Writes a complete kFilesInfo section (tag included).
///
/// `empty_stream_bits` marks entries without a data stream;
/// `empty_file_bits` distinguishes empty files from directories among
/// those (absent means all empties are directories).
pub fn files_info_section(
    names: &[&str],
    empty_stream_bits: Option<&[bool]>,
    empty_file_bits: Option<&[bool]>,
) -> Vec<u8> {
    let mut buf = vec![property_id::FILES_INFO];
    write_number(&mut buf, names.len() as u64);

    if let Some(bits) = empty_stream_bits {
        assert_eq!(bits.len(), names.len());
        let mut payload = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                payload[i / 8] |= 0x80 >> (i % 8);
            }
        }
        push_file_property(&mut buf, property_id::EMPTY_STREAM, &payload);
    }

    if let Some(bits) = empty_file_bits {
        let mut payload = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                payload[i / 8] |= 0x80 >> (i % 8);
            }
        }
        push_file_property(&mut buf, property_id::EMPTY_FILE, &payload);
    }

    let mut name_payload = vec![0x00]; // not external
    for name in names {
        utf16z(&mut name_payload, name);
    }
    push_file_property(&mut buf, property_id::NAME, &name_payload);

    buf.push(property_id::END);
    buf
}

/// Assembles a plain-header archive: signature header, pack region,
/// then the header built from the given sections.
pub fn assemble_archive(pack_region: &[u8], header_sections: &[&[u8]]) -> Vec<u8> {
    let mut header = vec![property_id::HEADER];
    for section in header_sections {
        header.extend_from_slice(section);
    }
    header.push(property_id::END);

    assemble_raw(pack_region, &header)
}

/// Wraps an already-built streams info into a kEncodedHeader archive.
pub fn assemble_encoded_header_archive(
    pack_region: &[u8],
    streams_sections: &[&[u8]],
) -> Vec<u8> {
    let mut header = vec![property_id::ENCODED_HEADER];
    for section in streams_sections {
        header.extend_from_slice(section);
    }
    header.push(property_id::END);

    assemble_raw(pack_region, &header)
}

/// Assembles signature header + pack region + raw next-header bytes.
pub fn assemble_raw(pack_region: &[u8], header: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]);
    data.extend_from_slice(&[0x00, 0x04]);

    let mut covered = Vec::new();
    covered.extend_from_slice(&(pack_region.len() as u64).to_le_bytes());
    covered.extend_from_slice(&(header.len() as u64).to_le_bytes());
    covered.extend_from_slice(&crc32(header).to_le_bytes());

    data.extend_from_slice(&crc32(&covered).to_le_bytes());
    data.extend_from_slice(&covered);
    data.extend_from_slice(pack_region);
    data.extend_from_slice(header);

    data
}

/// Writes a "main streams info" wrapper around the given sections.
pub fn main_streams_info(sections: &[&[u8]]) -> Vec<u8> {
    let mut buf = vec![property_id::MAIN_STREAMS_INFO];
    for section in sections {
        buf.extend_from_slice(section);
    }
    buf.push(property_id::END);
    buf
}

/// Builds the canonical one-file archive: a single Copy folder holding
/// `content` under `name`, with folder CRC.
pub fn single_copy_archive(name: &str, content: &[u8]) -> Vec<u8> {
    let folder = TestFolder::single(
        TestCoder::simple(&[0x00]),
        content.len() as u64,
        Some(crc32(content)),
    );

    let pack = pack_info_section(0, &[content.len() as u64]);
    let unpack = unpack_info_section(&[folder]);
    let streams = main_streams_info(&[&pack, &unpack]);
    let files = files_info_section(&[name], None, None);

    assemble_archive(content, &[&streams, &files])
}
