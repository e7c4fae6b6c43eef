//! # sevz
//!
//! A pure-Rust reader for 7z archives.
//!
//! The crate parses the 7z container (signature header, encoded
//! headers, folder/coder graphs), decrypts AES-256 protected content
//! using 7z's SHA-256 key derivation, and extracts files with CRC-32
//! verification. Decompression codecs (LZMA, LZMA2, Deflate, BZip2,
//! Delta, BCJ) ship as feature-gated built-ins and can be replaced or
//! extended through the [`codec::CoderRegistry`].
//!
//! ## Reading an archive
//!
//! ```rust,no_run
//! use sevz::{Archive, ExtractedEntry, Result};
//!
//! fn main() -> Result<()> {
//!     let bytes = std::fs::read("archive.7z").unwrap();
//!     let mut archive = Archive::open(&bytes)?;
//!
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.name, entry.size);
//!     }
//!
//!     match archive.extract(0)? {
//!         ExtractedEntry::Data(data) => println!("{} bytes", data.len()),
//!         ExtractedEntry::Directory => println!("directory"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Encrypted archives
//!
//! ```rust,no_run
//! use sevz::{Archive, Password, Result};
//!
//! fn main() -> Result<()> {
//!     let bytes = std::fs::read("secret.7z").unwrap();
//!     let mut archive = Archive::open_with_password(&bytes, Password::new("secret"))?;
//!     let data = archive.extract_by_name("notes.txt")?;
//!     Ok(())
//! }
//! ```
//!
//! Archives whose *header* is encrypted require the password at open
//! time; archives with only encrypted content can be listed without
//! one, and [`Error::PasswordRequired`] surfaces on extraction.
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | LZMA, LZMA2, Delta, and BCJ support |
//! | `deflate` | Yes | Deflate support |
//! | `bzip2` | Yes | BZip2 support |
//!
//! AES-256 decryption is always available; the 7z AES coder is part of
//! the container core, not an optional codec.
//!
//! ## Scope
//!
//! This crate reads archives. It does not create or modify them, and
//! it decodes folders whole: the format interleaves files inside
//! folder-level compression and encryption state, so sub-folder
//! streaming is not possible. Memory use is bounded by the largest
//! folder's declared output size, capped by
//! [`format::streams::ResourceLimits`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod format;
pub mod read;

pub use error::{Error, Result};

pub use crypto::Password;

pub use codec::{Codec, CoderRegistry};

pub use format::streams::ResourceLimits;

pub use read::{Archive, ExtractedEntry, OpenOptions};
