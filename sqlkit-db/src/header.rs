//! Decoder for the 100-byte database file header.
//!
//! See <https://www.sqlite.org/fileformat.html#the_database_header>. Every
//! multi-byte field is stored big-endian on disk; decoding goes through
//! `from_be_bytes`, so the result is the same on any host.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;

use crate::error::{DbError, DbResult};

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 100;

/// Signature every database file starts with.
pub const MAGIC: [u8; 16] = *b"SQLite format 3\0";

/// How much checking [`read_header_with`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderPolicy {
    /// Reject files whose first 16 bytes are not [`MAGIC`]. Field ranges
    /// are left to [`FileHeader::validate`].
    #[default]
    Strict,
    /// Decode whatever is there.
    Lenient,
}

/// Text encoding of the database, from header offset 56.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    /// Code 1.
    Utf8,
    /// Code 2.
    Utf16Le,
    /// Code 3.
    Utf16Be,
}

impl TextEncoding {
    /// Maps a header code, failing for anything but 1, 2 or 3.
    pub fn from_code(code: u32) -> DbResult<Self> {
        match code {
            1 => Ok(Self::Utf8),
            2 => Ok(Self::Utf16Le),
            3 => Ok(Self::Utf16Be),
            other => Err(DbError::UnsupportedEncoding(other)),
        }
    }
}

/// Journal mode implied by the file format read/write version bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Version 1: rollback journal.
    Legacy,
    /// Version 2: write-ahead log.
    Wal,
    /// Anything else.
    Unknown(u8),
}

impl From<u8> for JournalMode {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Legacy,
            2 => Self::Wal,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Wal => f.write_str("WAL"),
            Self::Unknown(_) => f.write_str("unknown"),
        }
    }
}

/// A documented header invariant that does not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderViolation {
    /// Not a power of two in `[512, 32768]` and not the sentinel 1.
    PageSize(u16),
    /// Write version outside `{1, 2}`.
    WriteVersion(u8),
    /// Read version outside `{1, 2}`.
    ReadVersion(u8),
    /// Maximum embedded payload fraction is not 64.
    MaxEmbedPayloadFraction(u8),
    /// Minimum embedded payload fraction is not 32.
    MinEmbedPayloadFraction(u8),
    /// Leaf payload fraction is not 32.
    LeafPayloadFraction(u8),
    /// Page size minus reserved bytes is below 480.
    UsableSize(u32),
    /// Schema format outside `1..=4`.
    SchemaFormat(u32),
    /// Text encoding outside `{1, 2, 3}`.
    TextEncoding(u32),
    /// Reserved expansion area is not all zero.
    ReservedNotZero,
}

impl fmt::Display for HeaderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageSize(v) => {
                write!(f, "page size {v} is not a power of two in [512, 32768] or 1")
            }
            Self::WriteVersion(v) => write!(f, "write version {v} is not 1 or 2"),
            Self::ReadVersion(v) => write!(f, "read version {v} is not 1 or 2"),
            Self::MaxEmbedPayloadFraction(v) => {
                write!(f, "max embedded payload fraction {v} != 64")
            }
            Self::MinEmbedPayloadFraction(v) => {
                write!(f, "min embedded payload fraction {v} != 32")
            }
            Self::LeafPayloadFraction(v) => write!(f, "leaf payload fraction {v} != 32"),
            Self::UsableSize(v) => write!(f, "usable page size {v} is below 480"),
            Self::SchemaFormat(v) => write!(f, "schema format {v} is not in 1..=4"),
            Self::TextEncoding(v) => write!(f, "text encoding {v} is not 1, 2 or 3"),
            Self::ReservedNotZero => f.write_str("reserved expansion bytes are not zero"),
        }
    }
}

/// The database file header, decoded to host byte order.
///
/// A read-only snapshot: it is built once and never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    /// Offset 0: should be [`MAGIC`].
    #[serde(serialize_with = "serialize_magic")]
    pub magic: [u8; 16],
    /// Offset 16: page size, or 1 meaning 65536.
    pub page_size: u16,
    /// Offset 18: 1 = legacy, 2 = WAL.
    pub write_version: u8,
    /// Offset 19: 1 = legacy, 2 = WAL.
    pub read_version: u8,
    /// Offset 20: bytes reserved at the end of each page.
    pub reserved_bytes_per_page: u8,
    /// Offset 21: must be 64.
    pub max_embed_payload_fraction: u8,
    /// Offset 22: must be 32.
    pub min_embed_payload_fraction: u8,
    /// Offset 23: must be 32.
    pub leaf_payload_fraction: u8,
    /// Offset 24.
    pub file_change_counter: u32,
    /// Offset 28: database size in pages.
    pub page_count: u32,
    /// Offset 32: first freelist trunk page.
    pub first_freelist_page: u32,
    /// Offset 36.
    pub freelist_page_count: u32,
    /// Offset 40.
    pub schema_cookie: u32,
    /// Offset 44: 1..=4.
    pub schema_format: u32,
    /// Offset 48.
    pub default_page_cache_size: u32,
    /// Offset 52: non-zero in auto/incremental vacuum modes.
    pub largest_root_page_for_vacuum: u32,
    /// Offset 56: 1 = UTF-8, 2 = UTF-16le, 3 = UTF-16be.
    pub text_encoding: u32,
    /// Offset 60: `PRAGMA user_version`.
    pub user_version: u32,
    /// Offset 64: non-zero for incremental vacuum.
    pub incremental_vacuum_mode: u32,
    /// Offset 68: `PRAGMA application_id`.
    pub application_id: u32,
    /// Offset 72: reserved for expansion, expected zero.
    #[serde(skip)]
    pub reserved: [u8; 20],
    /// Offset 92.
    pub version_valid_for_number: u32,
    /// Offset 96: `SQLITE_VERSION_NUMBER` of the last writer.
    pub sqlite_version_number: u32,
}

fn serialize_magic<S: serde::Serializer>(magic: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&magic_str(magic))
}

fn magic_str(magic: &[u8; 16]) -> String {
    let end = magic.iter().position(|&b| b == 0).unwrap_or(magic.len());
    String::from_utf8_lossy(&magic[..end]).into_owned()
}

fn be_u16(buf: &[u8; HEADER_SIZE], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_u32(buf: &[u8; HEADER_SIZE], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn array<const N: usize>(buf: &[u8; HEADER_SIZE], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

impl FileHeader {
    /// Decodes a raw header without any validation.
    #[must_use]
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: array(buf, 0),
            page_size: be_u16(buf, 16),
            write_version: buf[18],
            read_version: buf[19],
            reserved_bytes_per_page: buf[20],
            max_embed_payload_fraction: buf[21],
            min_embed_payload_fraction: buf[22],
            leaf_payload_fraction: buf[23],
            file_change_counter: be_u32(buf, 24),
            page_count: be_u32(buf, 28),
            first_freelist_page: be_u32(buf, 32),
            freelist_page_count: be_u32(buf, 36),
            schema_cookie: be_u32(buf, 40),
            schema_format: be_u32(buf, 44),
            default_page_cache_size: be_u32(buf, 48),
            largest_root_page_for_vacuum: be_u32(buf, 52),
            text_encoding: be_u32(buf, 56),
            user_version: be_u32(buf, 60),
            incremental_vacuum_mode: be_u32(buf, 64),
            application_id: be_u32(buf, 68),
            reserved: array(buf, 72),
            version_valid_for_number: be_u32(buf, 92),
            sqlite_version_number: be_u32(buf, 96),
        }
    }

    /// Decodes a raw header, rejecting a wrong signature.
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> DbResult<Self> {
        let header = Self::decode(buf);
        if !header.has_valid_magic() {
            return Err(DbError::NotASqliteFile);
        }
        Ok(header)
    }

    /// Encodes the header back to its on-disk form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..16].copy_from_slice(&self.magic);
        buf[16..18].copy_from_slice(&self.page_size.to_be_bytes());
        buf[18] = self.write_version;
        buf[19] = self.read_version;
        buf[20] = self.reserved_bytes_per_page;
        buf[21] = self.max_embed_payload_fraction;
        buf[22] = self.min_embed_payload_fraction;
        buf[23] = self.leaf_payload_fraction;
        let words = [
            (24, self.file_change_counter),
            (28, self.page_count),
            (32, self.first_freelist_page),
            (36, self.freelist_page_count),
            (40, self.schema_cookie),
            (44, self.schema_format),
            (48, self.default_page_cache_size),
            (52, self.largest_root_page_for_vacuum),
            (56, self.text_encoding),
            (60, self.user_version),
            (64, self.incremental_vacuum_mode),
            (68, self.application_id),
            (92, self.version_valid_for_number),
            (96, self.sqlite_version_number),
        ];
        for (at, v) in words {
            buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
        }
        buf[72..92].copy_from_slice(&self.reserved);
        buf
    }

    /// Whether the first 16 bytes are `"SQLite format 3\0"`.
    #[must_use]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == MAGIC
    }

    /// Page size in bytes, with the sentinel 1 mapped to 65536.
    #[must_use]
    pub fn page_size_bytes(&self) -> u32 {
        if self.page_size == 1 {
            65_536
        } else {
            u32::from(self.page_size)
        }
    }

    /// Decoded text encoding.
    pub fn encoding(&self) -> DbResult<TextEncoding> {
        TextEncoding::from_code(self.text_encoding)
    }

    /// Journal mode of the write version byte.
    #[must_use]
    pub fn write_mode(&self) -> JournalMode {
        JournalMode::from(self.write_version)
    }

    /// Journal mode of the read version byte.
    #[must_use]
    pub fn read_mode(&self) -> JournalMode {
        JournalMode::from(self.read_version)
    }

    /// Checks the field-range invariants of the file format.
    ///
    /// Decoding never does this on its own; callers that want to reject
    /// malformed files call it explicitly.
    pub fn validate(&self) -> Result<(), HeaderViolation> {
        let ps = self.page_size;
        if !(ps == 1 || (ps.is_power_of_two() && (512..=32_768).contains(&ps))) {
            return Err(HeaderViolation::PageSize(ps));
        }
        if !matches!(self.write_version, 1 | 2) {
            return Err(HeaderViolation::WriteVersion(self.write_version));
        }
        if !matches!(self.read_version, 1 | 2) {
            return Err(HeaderViolation::ReadVersion(self.read_version));
        }
        if self.max_embed_payload_fraction != 64 {
            return Err(HeaderViolation::MaxEmbedPayloadFraction(self.max_embed_payload_fraction));
        }
        if self.min_embed_payload_fraction != 32 {
            return Err(HeaderViolation::MinEmbedPayloadFraction(self.min_embed_payload_fraction));
        }
        if self.leaf_payload_fraction != 32 {
            return Err(HeaderViolation::LeafPayloadFraction(self.leaf_payload_fraction));
        }
        let usable = self.page_size_bytes() - u32::from(self.reserved_bytes_per_page);
        if usable < 480 {
            return Err(HeaderViolation::UsableSize(usable));
        }
        if !(1..=4).contains(&self.schema_format) {
            return Err(HeaderViolation::SchemaFormat(self.schema_format));
        }
        if !matches!(self.text_encoding, 1..=3) {
            return Err(HeaderViolation::TextEncoding(self.text_encoding));
        }
        if self.reserved.iter().any(|&b| b != 0) {
            return Err(HeaderViolation::ReservedNotZero);
        }
        Ok(())
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeaderString={}; ", magic_str(&self.magic))?;
        write!(f, "PageSize={}; ", self.page_size)?;
        write!(f, "WriteVersion={}({}); ", self.write_version, self.write_mode())?;
        write!(f, "ReadVersion={}({}); ", self.read_version, self.read_mode())?;
        write!(f, "ReservedBytesPerPage={}; ", self.reserved_bytes_per_page)?;
        write!(f, "MaxEmbedPayloadFraction={}; ", self.max_embed_payload_fraction)?;
        write!(f, "MinEmbedPayloadFraction={}; ", self.min_embed_payload_fraction)?;
        write!(f, "LeafPayloadFraction={}; ", self.leaf_payload_fraction)?;
        write!(f, "FileChangeCounter={}; ", self.file_change_counter)?;
        write!(f, "PageCount={}; ", self.page_count)?;
        write!(f, "FirstFreelistPage={}; ", self.first_freelist_page)?;
        write!(f, "FreelistPageCount={}; ", self.freelist_page_count)?;
        write!(f, "SchemaCookie={}; ", self.schema_cookie)?;
        write!(f, "SchemaFormat={}; ", self.schema_format)?;
        write!(f, "DefaultPageCacheSize={}; ", self.default_page_cache_size)?;
        write!(f, "LargestRootPageForVacuum={}; ", self.largest_root_page_for_vacuum)?;
        write!(f, "TextEncoding={}; ", self.text_encoding)?;
        write!(f, "UserVersion={}; ", self.user_version)?;
        write!(f, "IncrementalVacuumMode={}; ", self.incremental_vacuum_mode)?;
        write!(f, "ApplicationId={}; ", self.application_id)?;
        write!(f, "VersionValidForNumber={}; ", self.version_valid_for_number)?;
        write!(f, "SqliteVersionNumber={};", self.sqlite_version_number)
    }
}

/// Reads and decodes the header of the database at `path`, rejecting files
/// without the `SQLite` signature.
pub fn read_header(path: impl AsRef<Path>) -> DbResult<FileHeader> {
    read_header_with(path, HeaderPolicy::Strict)
}

/// Reads and decodes the header of the database at `path`.
///
/// Reads exactly the first 100 bytes; the file handle is dropped before
/// decoding starts.
pub fn read_header_with(path: impl AsRef<Path>, policy: HeaderPolicy) -> DbResult<FileHeader> {
    let path = path.as_ref();
    let buf = {
        let file = File::open(path)?;
        let mut buf = [0u8; HEADER_SIZE];
        let mut read = 0;
        let mut limited = file.take(HEADER_SIZE as u64);
        while read < HEADER_SIZE {
            match limited.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if read < HEADER_SIZE {
            return Err(DbError::TooSmallFile { read });
        }
        buf
    };
    log::debug!("read {HEADER_SIZE}-byte header from {}", path.display());

    match policy {
        HeaderPolicy::Strict => FileHeader::parse(&buf),
        HeaderPolicy::Lenient => Ok(FileHeader::decode(&buf)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    fn sample() -> FileHeader {
        FileHeader {
            magic: MAGIC,
            page_size: 4096,
            write_version: 1,
            read_version: 1,
            reserved_bytes_per_page: 0,
            max_embed_payload_fraction: 64,
            min_embed_payload_fraction: 32,
            leaf_payload_fraction: 32,
            file_change_counter: 0x0102_0304,
            page_count: 7,
            first_freelist_page: 0,
            freelist_page_count: 0,
            schema_cookie: 3,
            schema_format: 4,
            default_page_cache_size: 0,
            largest_root_page_for_vacuum: 0,
            text_encoding: 1,
            user_version: 0xDEAD_BEEF,
            incremental_vacuum_mode: 0,
            application_id: 0x0A0B_0C0D,
            reserved: [0; 20],
            version_valid_for_number: 0x0102_0304,
            sqlite_version_number: 3_046_000,
        }
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file.flush().expect("flush");
        file
    }

    #[test]
    fn test_fields_are_big_endian() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[16..18], &[0x10, 0x00]);
        assert_eq!(&bytes[24..28], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[68..72], &[0x0A, 0x0B, 0x0C, 0x0D]);

        let decoded = FileHeader::decode(&bytes);
        assert_eq!(decoded.page_size, 4096);
        assert_eq!(decoded.file_change_counter, 0x0102_0304);
        assert_eq!(decoded.user_version, 0xDEAD_BEEF);
    }

    #[test]
    fn test_decode_encode_round_trip() {
        let mut bytes = sample().to_bytes();
        // Arbitrary, non-palindromic values in every multi-byte field.
        for (i, b) in bytes.iter_mut().enumerate().skip(24).take(48) {
            *b = u8::try_from(i).expect("small");
        }
        for (i, b) in bytes.iter_mut().enumerate().skip(92) {
            *b = u8::try_from(i * 3 % 251).expect("small");
        }
        assert_eq!(FileHeader::decode(&bytes).to_bytes(), bytes);
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b's';
        assert!(matches!(FileHeader::parse(&bytes), Err(DbError::NotASqliteFile)));
        // Lenient decoding still works.
        assert!(!FileHeader::decode(&bytes).has_valid_magic());
    }

    #[test]
    fn test_read_header_from_file() {
        let file = write_temp(&sample().to_bytes());
        let header = read_header(file.path()).expect("read header");
        assert_eq!(header, sample());
    }

    #[test]
    fn test_read_header_ignores_trailing_pages() {
        let mut bytes = sample().to_bytes().to_vec();
        bytes.extend(std::iter::repeat_n(0xFF, 4096));
        let file = write_temp(&bytes);
        assert_eq!(read_header(file.path()).expect("read header"), sample());
    }

    #[test]
    fn test_too_small_file() {
        let file = write_temp(&[0u8; 50]);
        let err = read_header(file.path()).expect_err("too small");
        assert!(matches!(err, DbError::TooSmallFile { read: 50 }));
    }

    #[test]
    fn test_lenient_policy_accepts_garbage() {
        let file = write_temp(&[0x41u8; 100]);
        assert!(matches!(read_header(file.path()), Err(DbError::NotASqliteFile)));
        let header = read_header_with(file.path(), HeaderPolicy::Lenient).expect("lenient");
        assert_eq!(header.page_size, 0x4141);
    }

    #[test]
    fn test_strict_policy_checks_magic_only() {
        let header = FileHeader { page_size: 1000, min_embed_payload_fraction: 0, ..sample() };
        let file = write_temp(&header.to_bytes());
        let read = read_header_with(file.path(), HeaderPolicy::Strict).expect("strict read");
        assert_eq!(read, header);
        assert_eq!(read.validate(), Err(HeaderViolation::PageSize(1000)));
        assert_eq!(
            HeaderViolation::PageSize(1000).to_string(),
            "page size 1000 is not a power of two in [512, 32768] or 1"
        );
        assert_eq!(
            HeaderViolation::MinEmbedPayloadFraction(0).to_string(),
            "min embedded payload fraction 0 != 32"
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = read_header(dir.path().join("absent.db")).expect_err("missing");
        assert!(matches!(err, DbError::Io(_)));
    }

    #[test_case(1 => Ok(TextEncoding::Utf8); "utf8")]
    #[test_case(2 => Ok(TextEncoding::Utf16Le); "utf16le")]
    #[test_case(3 => Ok(TextEncoding::Utf16Be); "utf16be")]
    #[test_case(0 => Err(0); "zero")]
    #[test_case(4 => Err(4); "four")]
    fn test_text_encoding(code: u32) -> Result<TextEncoding, u32> {
        let header = FileHeader { text_encoding: code, ..sample() };
        header.encoding().map_err(|e| match e {
            DbError::UnsupportedEncoding(v) => v,
            other => panic!("unexpected error: {other}"),
        })
    }

    #[test_case(512; "min")]
    #[test_case(4096; "typical")]
    #[test_case(32_768; "max")]
    #[test_case(1; "sentinel 65536")]
    fn test_valid_page_sizes(page_size: u16) {
        let header = FileHeader { page_size, ..sample() };
        assert_eq!(header.validate(), Ok(()));
    }

    #[test_case(0; "zero")]
    #[test_case(256; "too small")]
    #[test_case(1000; "not a power of two")]
    #[test_case(3; "odd")]
    fn test_invalid_page_sizes_flagged_but_decoded(page_size: u16) {
        let header = FileHeader { page_size, ..sample() };
        // Decoding keeps whatever is on disk; only validation complains.
        assert_eq!(FileHeader::parse(&header.to_bytes()).expect("parse").page_size, page_size);
        assert_eq!(header.validate(), Err(HeaderViolation::PageSize(page_size)));
    }

    #[test]
    fn test_validate_payload_fractions_and_usable_size() {
        let header = FileHeader { max_embed_payload_fraction: 63, ..sample() };
        assert_eq!(header.validate(), Err(HeaderViolation::MaxEmbedPayloadFraction(63)));

        let header = FileHeader { leaf_payload_fraction: 0, ..sample() };
        assert_eq!(header.validate(), Err(HeaderViolation::LeafPayloadFraction(0)));

        let header = FileHeader { page_size: 512, reserved_bytes_per_page: 40, ..sample() };
        assert_eq!(header.validate(), Err(HeaderViolation::UsableSize(472)));

        let mut reserved = [0u8; 20];
        reserved[5] = 1;
        let header = FileHeader { reserved, ..sample() };
        assert_eq!(header.validate(), Err(HeaderViolation::ReservedNotZero));
    }

    #[test]
    fn test_page_size_sentinel() {
        let header = FileHeader { page_size: 1, ..sample() };
        assert_eq!(header.page_size_bytes(), 65_536);
        assert_eq!(sample().page_size_bytes(), 4096);
    }

    #[test]
    fn test_display_lists_every_field() {
        let text = FileHeader { write_version: 2, ..sample() }.to_string();
        assert!(text.starts_with("HeaderString=SQLite format 3; PageSize=4096; "));
        assert!(text.contains("WriteVersion=2(WAL); ReadVersion=1(legacy); "));
        assert!(text.contains("UserVersion=3735928559; "));
        assert!(text.ends_with("SqliteVersionNumber=3046000;"));
        assert_eq!(text.matches('=').count(), 22);
    }
}
