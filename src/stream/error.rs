//! Error types for reading tar archives.

use std::io;

use thiserror::Error;

use crate::HeaderError;

/// Errors that can occur while reading a tar archive.
///
/// Reaching the end of an entry or the end of the archive is not an error;
/// those are reported through `Option` return values instead.
#[derive(Debug, Error)]
pub enum TarError {
    /// I/O error from the underlying reader.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A header record could not be parsed.
    #[error("bad header in block {block} record {record}")]
    InvalidHeader {
        /// Block holding the offending record.
        block: u64,
        /// Index of the offending record within its block.
        record: u64,
        /// The underlying parse failure.
        #[source]
        source: HeaderError,
    },

    /// The archive ended while an entry still owed data.
    #[error("unexpected EOF with {missing} bytes unread")]
    UnexpectedEof {
        /// Bytes of the current read that could not be satisfied.
        missing: u64,
    },

    /// GNU long name payload exceeds the configured maximum size.
    #[error("GNU long name exceeds limit: {size} bytes > {limit} bytes")]
    LongNameTooLarge {
        /// Declared size of the long name entry.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Block and record sizes that cannot describe a record-blocked stream.
    #[error("invalid block size {block_size} for record size {record_size}")]
    InvalidBlockSize {
        /// Requested block size.
        block_size: usize,
        /// Requested record size.
        record_size: usize,
    },

    /// A previous operation failed and left the reader in an unknown position.
    #[error("reader is unusable after an earlier error")]
    Poisoned,
}

impl From<TarError> for io::Error {
    fn from(err: TarError) -> Self {
        match err {
            TarError::Io(err) => err,
            err @ TarError::UnexpectedEof { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            err => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}

/// Result type for tar reading operations.
pub type Result<T> = std::result::Result<T, TarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_io_error() {
        let err: io::Error = TarError::Io(io::ErrorKind::NetworkDown.into()).into();
        assert_eq!(err.kind(), io::ErrorKind::NetworkDown);

        let err: io::Error = TarError::UnexpectedEof { missing: 3 }.into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(err.to_string(), "unexpected EOF with 3 bytes unread");

        let err: io::Error = TarError::Poisoned.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_invalid_header_message() {
        let err = TarError::InvalidHeader {
            block: 2,
            record: 7,
            source: HeaderError::InvalidOctal(b"9".to_vec()),
        };
        assert_eq!(err.to_string(), "bad header in block 2 record 7");
        assert!(std::error::Error::source(&err).is_some());
    }
}
