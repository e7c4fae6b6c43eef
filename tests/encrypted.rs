//! Encrypted archive scenarios: key derivation vectors, AES folders,
//! and encrypted encoded headers.

mod common;

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

use common::*;
use sevz::checksum::crc32;
use sevz::crypto::{derive_key, AesProperties, Password};
use sevz::format::property_id;
use sevz::{Archive, Error};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Encrypts with zero-padding to the AES block size.
fn encrypt_padded(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    let padded_len = buf.len().div_ceil(16) * 16;
    buf.resize(padded_len, 0);

    let len = buf.len();
    Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .unwrap();
    buf
}

#[test]
fn test_kdf_reference_vector_2_pow_19() {
    // The standard 7z iteration count: SHA-256 over 2^19 rounds of
    // UTF-16LE("password") || counter, computed independently here.
    let password = Password::new("password");
    let pw_utf16: &[u8] = &[
        0x70, 0x00, 0x61, 0x00, 0x73, 0x00, 0x73, 0x00, 0x77, 0x00, 0x6F, 0x00, 0x72, 0x00,
        0x64, 0x00,
    ];
    assert_eq!(password.as_utf16_le().as_slice(), pw_utf16);

    let mut sha = Sha256::new();
    for round in 0u64..(1 << 19) {
        sha.update(pw_utf16);
        sha.update(round.to_le_bytes());
    }
    let expected: [u8; 32] = sha.finalize().into();

    let key = derive_key(&password, &[], 19).unwrap();
    assert_eq!(*key, expected);

    // Decrypting a zero block with this key and a zero IV is the
    // inverse of encrypting it; pin the scheme end to end.
    let block = encrypt_padded(&key, &[0u8; 16], &[0u8; 16]);
    let back = sevz::crypto::decrypt_cbc(&key, &[0u8; 16], &block).unwrap();
    assert_eq!(back, vec![0u8; 16]);
}

/// Folder with a single AES coder over zero-padded Copy data.
fn aes_only_archive(
    password: &Password,
    content: &[u8],
    cycles: u8,
    salt: &[u8],
    iv16: [u8; 16],
) -> Vec<u8> {
    let key = derive_key(password, salt, cycles).unwrap();
    let ciphertext = encrypt_padded(&key, &iv16, content);

    let props = AesProperties::encode(cycles, salt, &iv16);
    let folder = TestFolder::single(
        TestCoder::with_props(&[0x06, 0xF1, 0x07, 0x01], props),
        content.len() as u64,
        Some(crc32(content)),
    );

    let pack = pack_info_section(0, &[ciphertext.len() as u64]);
    let unpack = unpack_info_section(&[folder]);
    let streams = main_streams_info(&[&pack, &unpack]);
    let files = files_info_section(&["secret.txt"], None, None);

    assemble_archive(&ciphertext, &[&streams, &files])
}

#[test]
fn test_aes_only_folder_roundtrip() {
    let password = Password::new("hunter2");
    let content = b"secret data"; // 11 bytes: exercises block-padding trim
    let data = aes_only_archive(&password, content, 3, &[1, 2, 3, 4], [7u8; 16]);

    let mut archive = Archive::open_with_password(&data, password).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(
        archive.extract(0).unwrap().into_data().unwrap(),
        content
    );
}

#[test]
fn test_aes_wrong_password() {
    let content = b"secret data";
    let data = aes_only_archive(&Password::new("right"), content, 3, &[9, 9], [0u8; 16]);

    let mut archive = Archive::open_with_password(&data, Password::new("wrong")).unwrap();
    let err = archive.extract(0).unwrap_err();
    assert!(matches!(err, Error::WrongPassword { .. }));
}

#[test]
fn test_aes_no_password_listing_then_extract_fails() {
    let content = b"secret data";
    let data = aes_only_archive(&Password::new("pw"), content, 3, &[], [0u8; 16]);

    // The header is plain, so listing works without a password.
    let mut archive = Archive::open(&data).unwrap();
    assert_eq!(archive.entry(0).unwrap().name, "secret.txt");

    let err = archive.extract(0).unwrap_err();
    assert!(matches!(err, Error::PasswordRequired));
}

#[test]
fn test_empty_password_is_a_password() {
    let password = Password::new("");
    let content = b"locked with nothing";
    let data = aes_only_archive(&password, content, 2, &[5, 5, 5], [3u8; 16]);

    // Absent password fails...
    let mut archive = Archive::open(&data).unwrap();
    assert!(matches!(
        archive.extract(0),
        Err(Error::PasswordRequired)
    ));

    // ...but an explicitly empty one decrypts.
    let mut archive = Archive::open_with_password(&data, Password::new("")).unwrap();
    assert_eq!(
        archive.extract(0).unwrap().into_data().unwrap(),
        content
    );
}

#[test]
fn test_raw_key_sentinel_folder() {
    // numCyclesPower 63: the key is salt || password, zero-padded.
    let password = Password::new("k");
    let salt = [0xAAu8; 4];
    let content = b"sentinel keyed!!";

    let data = aes_only_archive(&password, content, 63, &salt, [0u8; 16]);
    let mut archive = Archive::open_with_password(&data, password).unwrap();
    assert_eq!(
        archive.extract(0).unwrap().into_data().unwrap(),
        content
    );
}

#[test]
fn test_excessive_kdf_cycles_rejected() {
    // cycles 40 is structurally valid but over the derivation ceiling.
    let key = [0u8; 32];
    let ciphertext = encrypt_padded(&key, &[0u8; 16], b"whatever data!!!");

    let props = AesProperties::encode(40, &[], &[0u8; 16]);
    let folder = TestFolder::single(
        TestCoder::with_props(&[0x06, 0xF1, 0x07, 0x01], props),
        16,
        None,
    );

    let pack = pack_info_section(0, &[ciphertext.len() as u64]);
    let unpack = unpack_info_section(&[folder]);
    let streams = main_streams_info(&[&pack, &unpack]);
    let files = files_info_section(&["x"], None, None);
    let data = assemble_archive(&ciphertext, &[&streams, &files]);

    let mut archive = Archive::open_with_password(&data, Password::new("pw")).unwrap();
    let err = archive.extract(0).unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)));
}

/// AES feeding a Copy coder through a bind pair: packed bytes are
/// decrypted, trimmed to the declared size, then copied through.
#[test]
fn test_aes_copy_bind_pair_chain() {
    let password = Password::new("chain");
    let content = b"chained payload"; // 15 bytes
    let iv = [0x11u8; 16];

    let key = derive_key(&password, &[], 4).unwrap();
    let ciphertext = encrypt_padded(&key, &iv, content);
    let props = AesProperties::encode(4, &[], &iv);

    let folder = TestFolder {
        coders: vec![
            TestCoder::simple(&[0x00]), // Copy: folder output
            TestCoder::with_props(&[0x06, 0xF1, 0x07, 0x01], props),
        ],
        bind_pairs: vec![(0, 1)], // Copy input <- AES output
        packed_streams: Vec::new(),
        unpack_sizes: vec![content.len() as u64, content.len() as u64],
        crc: Some(crc32(content)),
    };

    let pack = pack_info_section(0, &[ciphertext.len() as u64]);
    let unpack = unpack_info_section(&[folder]);
    let streams = main_streams_info(&[&pack, &unpack]);
    let files = files_info_section(&["chained.bin"], None, None);
    let data = assemble_archive(&ciphertext, &[&streams, &files]);

    let mut archive = Archive::open_with_password(&data, password).unwrap();
    assert_eq!(
        archive.extract(0).unwrap().into_data().unwrap(),
        content
    );
}

/// Builds an archive whose header is itself AES-encrypted: the next
/// header is a kEncodedHeader whose single folder decrypts to the real
/// kHeader.
fn encrypted_header_archive(password: &Password, content: &[u8]) -> Vec<u8> {
    // Inner plain header describing one Copy-coded file.
    let inner_folder = TestFolder::single(
        TestCoder::simple(&[0x00]),
        content.len() as u64,
        Some(crc32(content)),
    );
    let inner_pack = pack_info_section(0, &[content.len() as u64]);
    let inner_unpack = unpack_info_section(&[inner_folder]);
    let inner_streams = main_streams_info(&[&inner_pack, &inner_unpack]);
    let inner_files = files_info_section(&["a.txt"], None, None);

    let mut inner_header = vec![property_id::HEADER];
    inner_header.extend_from_slice(&inner_streams);
    inner_header.extend_from_slice(&inner_files);
    inner_header.push(property_id::END);

    // Encrypt the inner header; it lands in the pack region after the
    // file content.
    let cycles = 5;
    let salt = [0x42u8; 8];
    let iv = [0x24u8; 16];
    let key = derive_key(password, &salt, cycles).unwrap();
    let encrypted_header = encrypt_padded(&key, &iv, &inner_header);

    let mut pack_region = content.to_vec();
    pack_region.extend_from_slice(&encrypted_header);

    let props = AesProperties::encode(cycles, &salt, &iv);
    let header_folder = TestFolder::single(
        TestCoder::with_props(&[0x06, 0xF1, 0x07, 0x01], props),
        inner_header.len() as u64,
        Some(crc32(&inner_header)),
    );

    let outer_pack =
        pack_info_section(content.len() as u64, &[encrypted_header.len() as u64]);
    let outer_unpack = unpack_info_section(&[header_folder]);

    assemble_encoded_header_archive(&pack_region, &[&outer_pack, &outer_unpack])
}

#[test]
fn test_encrypted_encoded_header_roundtrip() {
    let password = Password::new("header-secret");
    let data = encrypted_header_archive(&password, b"hello");

    let mut archive = Archive::open_with_password(&data, password).unwrap();
    assert!(archive.header_encrypted());
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.entry(0).unwrap().name, "a.txt");
    assert_eq!(archive.entry(0).unwrap().crc, Some(0x3610A686));

    assert_eq!(
        archive.extract(0).unwrap().into_data().unwrap(),
        b"hello"
    );
}

#[test]
fn test_encrypted_header_requires_password() {
    let data = encrypted_header_archive(&Password::new("pw"), b"hello");

    let err = Archive::open(&data).unwrap_err();
    assert!(matches!(err, Error::PasswordRequired));
}

#[test]
fn test_encrypted_header_wrong_password() {
    let data = encrypted_header_archive(&Password::new("right"), b"hello");

    let err = Archive::open_with_password(&data, Password::new("wrong")).unwrap_err();
    assert!(matches!(
        err,
        Error::WrongPassword {
            entry_index: None,
            ..
        }
    ));
}

#[test]
fn test_wrong_password_detected_by_substream_digest() {
    // Folder without a folder-level CRC: the per-file digest is the
    // first integrity gate, so the failure carries the entry context.
    let password = Password::new("right");
    let content = b"digest-guarded data";
    let iv = [0u8; 16];
    let key = derive_key(&password, &[], 3).unwrap();
    let ciphertext = encrypt_padded(&key, &iv, content);

    let props = AesProperties::encode(3, &[], &iv);
    let folder = TestFolder::single(
        TestCoder::with_props(&[0x06, 0xF1, 0x07, 0x01], props),
        content.len() as u64,
        None,
    );

    let pack = pack_info_section(0, &[ciphertext.len() as u64]);
    let unpack = unpack_info_section(&[folder]);
    let subs = substreams_section(&TestSubStreams {
        counts: vec![1],
        sizes: vec![],
        crcs: vec![Some(crc32(content))],
    });
    let streams = main_streams_info(&[&pack, &unpack, &subs]);
    let files = files_info_section(&["guarded.bin"], None, None);
    let data = assemble_archive(&ciphertext, &[&streams, &files]);

    let mut archive = Archive::open_with_password(&data, Password::new("wrong")).unwrap();
    let err = archive.extract(0).unwrap_err();
    assert!(matches!(
        err,
        Error::WrongPassword {
            entry_index: Some(0),
            ..
        }
    ));
}
