//! Entry descriptor produced from a header record.

use crate::{EntryType, Header, HeaderError, HEADER_SIZE};

/// Metadata for one entry of a tar archive.
///
/// A `TarEntry` is built from a single header record and is read-only
/// afterwards, with one exception: [`TarEntry::with_name`] replaces the name
/// when a preceding GNU long name entry supplied the real one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    name: String,
    entry_type: EntryType,
    size: u64,
    mode: u32,
    uid: u64,
    gid: u64,
    mtime: i64,
    link_name: String,
    uname: Option<String>,
    gname: Option<String>,
    dev_major: Option<u32>,
    dev_minor: Option<u32>,
}

impl TarEntry {
    /// Build an entry from a parsed header.
    ///
    /// For UStar headers the `prefix` field is joined in front of the name.
    /// Names are decoded as UTF-8, replacing invalid sequences.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::InvalidOctal`] if any numeric field is malformed.
    pub fn from_header(header: &Header) -> Result<Self, HeaderError> {
        let name = match header.prefix() {
            Some(prefix) if !prefix.is_empty() => {
                let mut full = prefix.to_vec();
                full.push(b'/');
                full.extend_from_slice(header.path_bytes());
                String::from_utf8_lossy(&full).into_owned()
            }
            _ => lossy(header.path_bytes()),
        };

        Ok(Self {
            name,
            entry_type: header.entry_type(),
            size: header.entry_size()?,
            mode: header.mode()?,
            uid: header.uid()?,
            gid: header.gid()?,
            mtime: header.mtime()?,
            link_name: lossy(header.link_name_bytes()),
            uname: header.username().map(lossy),
            gname: header.groupname().map(lossy),
            dev_major: header.device_major()?,
            dev_minor: header.device_minor()?,
        })
    }

    /// Replace the entry name.
    #[must_use]
    pub fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    /// The entry name (path within the archive).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entry type (Regular, Directory, Symlink, etc.).
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Declared content size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// File mode/permissions.
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Owner UID.
    #[must_use]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Owner GID.
    #[must_use]
    pub fn gid(&self) -> u64 {
        self.gid
    }

    /// Modification time as a Unix timestamp; negative before 1970.
    #[must_use]
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    /// Link target for hard and symbolic links; empty otherwise.
    #[must_use]
    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// Owner user name, if the header format carries one.
    #[must_use]
    pub fn uname(&self) -> Option<&str> {
        self.uname.as_deref()
    }

    /// Owner group name, if the header format carries one.
    #[must_use]
    pub fn gname(&self) -> Option<&str> {
        self.gname.as_deref()
    }

    /// Device major number (for block/char devices).
    #[must_use]
    pub fn dev_major(&self) -> Option<u32> {
        self.dev_major
    }

    /// Device minor number (for block/char devices).
    #[must_use]
    pub fn dev_minor(&self) -> Option<u32> {
        self.dev_minor
    }

    /// Check if this is a regular file entry.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.entry_type.is_file()
    }

    /// Check if this is a directory entry.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    /// Check if this is a symbolic link entry.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.entry_type.is_symlink()
    }

    /// Check if this is a hard link entry.
    #[must_use]
    pub fn is_hard_link(&self) -> bool {
        self.entry_type.is_hard_link()
    }

    /// Get the padded size (rounded up to a 512-byte boundary).
    ///
    /// This is the number of bytes that follow the header in the tar stream.
    #[must_use]
    pub fn padded_size(&self) -> u64 {
        self.size.next_multiple_of(HEADER_SIZE as u64)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
