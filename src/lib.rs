//! Sequential, entry-aware reader for record-blocked tar archives.
//!
//! A tar archive is a linear stream of fixed-size records (512 bytes by
//! default) that are themselves grouped into larger physical blocks. Each
//! logical entry starts with a header record, followed by as many data
//! records as are needed to hold the entry's declared size. Writers end the
//! archive with two all-zero records; reading stops at the first one.
//!
//! The crate has two layers. This module decodes a single header record:
//! [`Header`] is a zero-copy view produced with [`zerocopy`], [`EntryType`]
//! classifies the typeflag byte, and [`parse_numeric`] handles both octal and
//! GNU base-256 number fields. The [`stream`] module builds on it to read
//! whole archives.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use tarstream::stream::TarReader;
//!
//! let mut reader = TarReader::new(File::open("layer.tar").unwrap());
//!
//! while let Some(entry) = reader.next_entry().unwrap() {
//!     let mut content = Vec::new();
//!     reader.read_to_end(&mut content).unwrap();
//!     println!("{} ({} bytes)", entry.name(), content.len());
//! }
//! ```

pub mod stream;

use std::fmt;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of a header record in bytes.
pub const HEADER_SIZE: usize = 512;

/// Record size used unless the stream is configured otherwise.
pub const DEFAULT_RECORD_SIZE: usize = HEADER_SIZE;

/// Records per physical block used unless configured otherwise.
pub const DEFAULT_BLOCKING_FACTOR: usize = 20;

/// `DEFAULT_RECORD_SIZE * DEFAULT_BLOCKING_FACTOR`, i.e. 10240 bytes.
pub const DEFAULT_BLOCK_SIZE: usize = DEFAULT_RECORD_SIZE * DEFAULT_BLOCKING_FACTOR;

/// `magic` of a POSIX UStar header.
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// `version` of a POSIX UStar header.
pub const USTAR_VERSION: &[u8; 2] = b"00";

/// `magic` of a GNU tar header.
pub const GNU_MAGIC: &[u8; 6] = b"ustar ";

/// `version` of a GNU tar header.
pub const GNU_VERSION: &[u8; 2] = b" \0";

/// A header record that cannot be decoded.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Fewer than [`HEADER_SIZE`] bytes were supplied.
    #[error("header record truncated to {0} bytes")]
    InsufficientData(usize),

    /// A numeric field holds something other than octal digits or a
    /// base-256 value that fits in 64 bits.
    #[error("malformed numeric field {0:?}")]
    InvalidOctal(Vec<u8>),
}

pub type Result<T> = std::result::Result<T, HeaderError>;

/// Byte layout of a header record.
///
/// | Offset | Size | Field                   |
/// |--------|------|-------------------------|
/// | 0      | 100  | `name`                  |
/// | 100    | 8    | `mode`                  |
/// | 108    | 8    | `uid`                   |
/// | 116    | 8    | `gid`                   |
/// | 124    | 12   | `size`                  |
/// | 136    | 12   | `mtime`                 |
/// | 148    | 8    | `checksum`              |
/// | 156    | 1    | `typeflag`              |
/// | 157    | 100  | `linkname`              |
/// | 257    | 6    | `magic`                 |
/// | 263    | 2    | `version`               |
/// | 265    | 32   | `uname`                 |
/// | 297    | 32   | `gname`                 |
/// | 329    | 8    | `devmajor`              |
/// | 337    | 8    | `devminor`              |
/// | 345    | 155  | `prefix`                |
/// | 500    | 12   | padding                 |
///
/// Old-style and GNU headers agree with UStar up to `devminor`. Past that,
/// GNU stores access/change times and a sparse map where UStar has `prefix`,
/// so `prefix` only means something when [`Header::format`] is
/// [`HeaderFormat::Ustar`].
///
/// Text fields are NUL-padded. Numeric fields are octal ASCII or, for GNU,
/// base-256 (see [`parse_numeric`]).
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct UstarHeader {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub prefix: [u8; 155],
    pub pad: [u8; 12],
}

/// Header dialect, as told by the `magic` and `version` fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderFormat {
    /// Pre-POSIX header: no owner names, device numbers or prefix.
    Old,
    /// GNU tar header.
    Gnu,
    /// POSIX UStar header.
    Ustar,
}

/// Kind of object an entry describes, from the header `typeflag` byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// `'0'`, or NUL in pre-POSIX archives.
    Regular,
    /// `'1'`: hard link to an earlier entry.
    Link,
    /// `'2'`
    Symlink,
    /// `'3'`
    Char,
    /// `'4'`
    Block,
    /// `'5'`
    Directory,
    /// `'6'`
    Fifo,
    /// `'7'`: contiguous file, treated as regular.
    Continuous,
    /// `'L'`: the payload is the name of the next entry.
    GnuLongName,
    /// `'K'`: the payload is the link target of the next entry.
    GnuLongLink,
    /// `'S'`
    GnuSparse,
    /// `'V'`: volume label of a multi-volume archive.
    GnuVolumeHeader,
    /// `'x'`: PAX records for the next entry.
    XHeader,
    /// `'g'`: PAX records for the rest of the archive.
    XGlobalHeader,
    /// Any other byte.
    Other(u8),
}

impl EntryType {
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' | b'\0' => Self::Regular,
            b'1' => Self::Link,
            b'2' => Self::Symlink,
            b'3' => Self::Char,
            b'4' => Self::Block,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            b'7' => Self::Continuous,
            b'L' => Self::GnuLongName,
            b'K' => Self::GnuLongLink,
            b'S' => Self::GnuSparse,
            b'V' => Self::GnuVolumeHeader,
            b'x' => Self::XHeader,
            b'g' => Self::XGlobalHeader,
            byte => Self::Other(byte),
        }
    }

    /// The typeflag byte for this type. `Regular` maps to `'0'`.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::Link => b'1',
            Self::Symlink => b'2',
            Self::Char => b'3',
            Self::Block => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Continuous => b'7',
            Self::GnuLongName => b'L',
            Self::GnuLongLink => b'K',
            Self::GnuSparse => b'S',
            Self::GnuVolumeHeader => b'V',
            Self::XHeader => b'x',
            Self::XGlobalHeader => b'g',
            Self::Other(byte) => byte,
        }
    }

    #[must_use]
    pub fn is_file(self) -> bool {
        matches!(self, Self::Regular | Self::Continuous)
    }

    #[must_use]
    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }

    #[must_use]
    pub fn is_symlink(self) -> bool {
        self == Self::Symlink
    }

    #[must_use]
    pub fn is_hard_link(self) -> bool {
        self == Self::Link
    }

    /// Metadata entries whose payload describes the entry that follows them
    /// rather than a file system object of their own.
    #[must_use]
    pub fn is_extension(self) -> bool {
        matches!(
            self,
            Self::GnuLongName | Self::GnuLongLink | Self::XHeader | Self::XGlobalHeader
        )
    }

    /// Entries that carry nothing a reader should surface.
    #[must_use]
    pub fn is_ignorable(self) -> bool {
        self == Self::GnuVolumeHeader
    }
}

/// Zero-copy view over one header record.
#[derive(Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub struct Header {
    raw: UstarHeader,
}

impl Header {
    /// View the first [`HEADER_SIZE`] bytes of `record` as a header.
    ///
    /// Records larger than a header are accepted; the tail is ignored.
    ///
    /// # Errors
    ///
    /// [`HeaderError::InsufficientData`] if `record` is shorter than a header.
    pub fn from_bytes(record: &[u8]) -> Result<&Header> {
        record
            .get(..HEADER_SIZE)
            .and_then(|bytes| Header::ref_from_bytes(bytes).ok())
            .ok_or(HeaderError::InsufficientData(record.len()))
    }

    #[must_use]
    pub fn as_ustar(&self) -> &UstarHeader {
        &self.raw
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.raw.as_bytes()
    }

    #[must_use]
    pub fn format(&self) -> HeaderFormat {
        if self.raw.magic == *USTAR_MAGIC && self.raw.version == *USTAR_VERSION {
            HeaderFormat::Ustar
        } else if self.raw.magic == *GNU_MAGIC && self.raw.version == *GNU_VERSION {
            HeaderFormat::Gnu
        } else {
            HeaderFormat::Old
        }
    }

    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        EntryType::from_byte(self.raw.typeflag)
    }

    /// Declared size of the entry's data.
    ///
    /// # Errors
    ///
    /// [`HeaderError::InvalidOctal`] for a malformed `size` field. The same
    /// holds for the other numeric accessors.
    pub fn entry_size(&self) -> Result<u64> {
        parse_numeric(&self.raw.size)
    }

    /// Permission and mode bits.
    pub fn mode(&self) -> Result<u32> {
        narrow(&self.raw.mode, parse_numeric(&self.raw.mode)?)
    }

    pub fn uid(&self) -> Result<u64> {
        parse_numeric(&self.raw.uid)
    }

    pub fn gid(&self) -> Result<u64> {
        parse_numeric(&self.raw.gid)
    }

    /// Modification time in seconds since the Unix epoch. GNU tar stores
    /// times before 1970 as negative base-256 numbers.
    pub fn mtime(&self) -> Result<i64> {
        parse_signed_numeric(&self.raw.mtime)
    }

    /// Contents of the `name` field. UStar headers may keep leading path
    /// components in [`Header::prefix`].
    #[must_use]
    pub fn path_bytes(&self) -> &[u8] {
        truncate_null(&self.raw.name)
    }

    #[must_use]
    pub fn link_name_bytes(&self) -> &[u8] {
        truncate_null(&self.raw.linkname)
    }

    /// Device major number; `None` for old-style headers.
    pub fn device_major(&self) -> Result<Option<u32>> {
        self.device_number(&self.raw.devmajor)
    }

    /// Device minor number; `None` for old-style headers.
    pub fn device_minor(&self) -> Result<Option<u32>> {
        self.device_number(&self.raw.devminor)
    }

    /// Owner user name; `None` for old-style headers.
    #[must_use]
    pub fn username(&self) -> Option<&[u8]> {
        self.has_owner_fields()
            .then(|| truncate_null(&self.raw.uname))
    }

    /// Owner group name; `None` for old-style headers.
    #[must_use]
    pub fn groupname(&self) -> Option<&[u8]> {
        self.has_owner_fields()
            .then(|| truncate_null(&self.raw.gname))
    }

    /// Path prefix; only UStar headers have one.
    #[must_use]
    pub fn prefix(&self) -> Option<&[u8]> {
        (self.format() == HeaderFormat::Ustar).then(|| truncate_null(&self.raw.prefix))
    }

    fn has_owner_fields(&self) -> bool {
        self.format() != HeaderFormat::Old
    }

    fn device_number(&self, field: &[u8]) -> Result<Option<u32>> {
        if !self.has_owner_fields() {
            return Ok(None);
        }
        narrow(field, parse_octal(field)?).map(Some)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("format", &self.format())
            .field("entry_type", &self.entry_type())
            .field("name", &String::from_utf8_lossy(self.path_bytes()))
            .field("size", &self.entry_size().ok())
            .finish_non_exhaustive()
    }
}

/// Parse an octal ASCII number field.
///
/// The value ends at the first NUL; surrounding spaces are ignored, and an
/// empty field is 0. So both `"0000644\0"` and `"   644 "` give `0o644`.
///
/// # Errors
///
/// [`HeaderError::InvalidOctal`] on a non-octal character or on overflow.
pub fn parse_octal(field: &[u8]) -> Result<u64> {
    truncate_null(field)
        .trim_ascii()
        .iter()
        .try_fold(0u64, |value, &c| {
            let digit = c.wrapping_sub(b'0');
            if digit > 7 {
                return None;
            }
            value.checked_mul(8)?.checked_add(u64::from(digit))
        })
        .ok_or_else(|| HeaderError::InvalidOctal(field.to_vec()))
}

/// Parse a number field that is either octal ASCII or GNU base-256.
///
/// GNU tar marks base-256 by setting the high bit of the first byte; the
/// field is then a big-endian binary number with that bit cleared.
///
/// # Errors
///
/// [`HeaderError::InvalidOctal`] on a bad octal field or a base-256 value
/// wider than 64 bits.
pub fn parse_numeric(field: &[u8]) -> Result<u64> {
    let Some((&first, rest)) = field.split_first() else {
        return Ok(0);
    };
    if first & 0x80 == 0 {
        return parse_octal(field);
    }

    std::iter::once(first & 0x7f)
        .chain(rest.iter().copied())
        .try_fold(0u64, |value, byte| {
            value.checked_mul(256)?.checked_add(u64::from(byte))
        })
        .ok_or_else(|| HeaderError::InvalidOctal(field.to_vec()))
}

/// Parse a number field that may hold a negative GNU base-256 value.
///
/// In base-256 form the bits after the marker bit are a big-endian two's
/// complement number, so a first byte of `0xff` means a negative value.
/// Octal fields are always non-negative.
///
/// # Errors
///
/// [`HeaderError::InvalidOctal`] if the value does not fit in an `i64`.
pub fn parse_signed_numeric(field: &[u8]) -> Result<i64> {
    let invalid = || HeaderError::InvalidOctal(field.to_vec());
    match field.first() {
        Some(&first) if first & 0xc0 == 0xc0 => field
            .iter()
            .try_fold(-1i64, |value, &byte| {
                value.checked_mul(256)?.checked_add(i64::from(byte))
            })
            .ok_or_else(invalid),
        _ => i64::try_from(parse_numeric(field)?).map_err(|_| invalid()),
    }
}

/// Convert a parsed value to `u32`, rejecting values that do not fit.
fn narrow(field: &[u8], value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| HeaderError::InvalidOctal(field.to_vec()))
}

/// The part of a NUL-padded field before its first NUL.
///
/// ```
/// use tarstream::truncate_null;
///
/// assert_eq!(truncate_null(b"etc/passwd\0\0\0"), b"etc/passwd");
/// assert_eq!(truncate_null(b"full"), b"full");
/// ```
#[must_use]
pub fn truncate_null(field: &[u8]) -> &[u8] {
    field
        .iter()
        .position(|&b| b == 0)
        .map_or(field, |end| &field[..end])
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn record_with(f: impl FnOnce(&mut [u8; HEADER_SIZE])) -> [u8; HEADER_SIZE] {
        let mut record = [0u8; HEADER_SIZE];
        f(&mut record);
        record
    }

    #[test]
    fn test_layout() {
        assert_eq!(size_of::<UstarHeader>(), HEADER_SIZE);
        assert_eq!(size_of::<Header>(), HEADER_SIZE);
        assert_eq!(std::mem::offset_of!(UstarHeader, typeflag), 156);
        assert_eq!(std::mem::offset_of!(UstarHeader, prefix), 345);
    }

    #[test]
    fn test_from_bytes_too_short() {
        let err = Header::from_bytes(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, HeaderError::InsufficientData(100)));
    }

    #[test]
    fn test_from_bytes_longer_record() {
        let mut record = vec![0u8; 1024];
        record[..5].copy_from_slice(b"hello");
        record[600] = 1;
        let header = Header::from_bytes(&record).unwrap();
        assert_eq!(header.path_bytes(), b"hello");
        assert_eq!(header.as_bytes().len(), HEADER_SIZE);
    }

    #[test]
    fn test_fields() {
        let record = record_with(|r| {
            r[..9].copy_from_slice(b"file.txt\0");
            r[100..108].copy_from_slice(b"0000644\0");
            r[108..116].copy_from_slice(b"0001750\0");
            r[116..124].copy_from_slice(b"0001750\0");
            r[124..136].copy_from_slice(b"00000000015\0");
            r[136..148].copy_from_slice(b"11145401322\0");
            r[156] = b'0';
            r[257..263].copy_from_slice(USTAR_MAGIC);
            r[263..265].copy_from_slice(USTAR_VERSION);
            r[265..269].copy_from_slice(b"user");
            r[329..337].copy_from_slice(b"0000010\0");
            r[345..348].copy_from_slice(b"dir");
        });
        let header = Header::from_bytes(&record).unwrap();

        assert_eq!(header.format(), HeaderFormat::Ustar);
        assert_eq!(header.entry_type(), EntryType::Regular);
        assert_eq!(header.path_bytes(), b"file.txt");
        assert_eq!(header.mode().unwrap(), 0o644);
        assert_eq!(header.uid().unwrap(), 1000);
        assert_eq!(header.gid().unwrap(), 1000);
        assert_eq!(header.entry_size().unwrap(), 13);
        assert_eq!(header.mtime().unwrap(), 1234567890);
        assert_eq!(header.username(), Some(b"user".as_slice()));
        assert_eq!(header.groupname(), Some(b"".as_slice()));
        assert_eq!(header.device_major().unwrap(), Some(8));
        assert_eq!(header.prefix(), Some(b"dir".as_slice()));
    }

    #[test]
    fn test_gnu_header_has_no_prefix() {
        let record = record_with(|r| {
            r[..4].copy_from_slice(b"name");
            r[257..263].copy_from_slice(GNU_MAGIC);
            r[263..265].copy_from_slice(GNU_VERSION);
            r[345..349].copy_from_slice(b"1234");
        });
        let header = Header::from_bytes(&record).unwrap();
        assert_eq!(header.format(), HeaderFormat::Gnu);
        assert_eq!(header.prefix(), None);
        assert_eq!(header.username(), Some(b"".as_slice()));
    }

    #[test]
    fn test_old_header_has_no_names() {
        let record = record_with(|r| r[..3].copy_from_slice(b"old"));
        let header = Header::from_bytes(&record).unwrap();
        assert_eq!(header.format(), HeaderFormat::Old);
        assert_eq!(header.username(), None);
        assert_eq!(header.prefix(), None);
        assert_eq!(header.device_major().unwrap(), None);
    }

    #[test]
    fn test_empty_record() {
        let record = [0u8; HEADER_SIZE];
        let header = Header::from_bytes(&record).unwrap();
        assert_eq!(header.entry_size().unwrap(), 0);
        assert_eq!(header.mtime().unwrap(), 0);
    }

    #[test]
    fn test_negative_mtime() {
        let record = record_with(|r| {
            r[..3].copy_from_slice(b"old");
            r[136..148].fill(0xff);
        });
        let header = Header::from_bytes(&record).unwrap();
        assert_eq!(header.mtime().unwrap(), -1);
    }

    #[test]
    fn test_parse_signed_numeric() {
        assert_eq!(parse_signed_numeric(b"11145401322\0").unwrap(), 1234567890);

        // -86400: one day before the epoch
        let mut field = [0xffu8; 12];
        field[9..].copy_from_slice(&[0xfe, 0xae, 0x80]);
        assert_eq!(parse_signed_numeric(&field).unwrap(), -86400);

        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[11] = 0x2a;
        assert_eq!(parse_signed_numeric(&field).unwrap(), 42);

        // below i64::MIN
        let mut field = [0u8; 12];
        field[0] = 0xff;
        field[3] = 0x7f;
        assert!(parse_signed_numeric(&field).is_err());

        // above i64::MAX
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[4] = 0x80;
        assert!(parse_signed_numeric(&field).is_err());
    }

    #[test]
    fn test_oversized_mode_is_rejected() {
        let record = record_with(|r| {
            r[..3].copy_from_slice(b"big");
            r[100] = 0x80;
            r[102] = 0x01;
        });
        let header = Header::from_bytes(&record).unwrap();
        assert!(matches!(header.mode(), Err(HeaderError::InvalidOctal(_))));
    }

    #[test]
    fn test_parse_octal() {
        assert_eq!(parse_octal(b"0000644\0").unwrap(), 0o644);
        assert_eq!(parse_octal(b"   644 ").unwrap(), 0o644);
        assert_eq!(parse_octal(b"00000000015\0").unwrap(), 13);
        assert_eq!(parse_octal(b"\0\0\0\0").unwrap(), 0);
        assert_eq!(parse_octal(b"   ").unwrap(), 0);
        assert!(matches!(
            parse_octal(b"0000899\0"),
            Err(HeaderError::InvalidOctal(_))
        ));
        assert!(parse_octal(b"12 34").is_err());
        assert!(parse_octal(b"77777777777777777777777").is_err());
    }

    #[test]
    fn test_parse_numeric_base256() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[7] = 0x01;
        assert_eq!(parse_numeric(&field).unwrap(), 1 << 32);

        let mut field = [0u8; 8];
        field[0] = 0x80;
        field[6] = 0x01;
        field[7] = 0x02;
        assert_eq!(parse_numeric(&field).unwrap(), 0x0102);

        assert!(parse_numeric(&[0xffu8; 12]).is_err());
        assert_eq!(parse_numeric(b"").unwrap(), 0);
    }

    #[test]
    fn test_entry_type_bytes() {
        for byte in *b"01234567LKSVxgZ" {
            assert_eq!(EntryType::from_byte(byte).to_byte(), byte);
        }
        assert_eq!(EntryType::from_byte(b'\0'), EntryType::Regular);
        assert_eq!(EntryType::from_byte(b'Z'), EntryType::Other(b'Z'));
    }

    #[test]
    fn test_entry_type_classification() {
        for extension in [
            EntryType::GnuLongName,
            EntryType::GnuLongLink,
            EntryType::XHeader,
            EntryType::XGlobalHeader,
        ] {
            assert!(extension.is_extension());
            assert!(!extension.is_ignorable());
        }
        assert!(!EntryType::Regular.is_extension());
        assert!(!EntryType::GnuSparse.is_extension());
        assert!(EntryType::GnuVolumeHeader.is_ignorable());
        assert!(!EntryType::Directory.is_ignorable());
        assert!(EntryType::Continuous.is_file());
        assert!(EntryType::Link.is_hard_link());
    }
}
