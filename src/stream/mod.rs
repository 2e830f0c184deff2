//! Streaming tar reader with transparent GNU long name handling.
//!
//! This module turns a record-blocked byte stream into a sequence of
//! per-entry byte streams:
//!
//! - [`RecordSource`] supplies fixed-size physical records and reports the
//!   current block and record number. [`RecordBuffer`] implements it on top
//!   of any [`std::io::Read`].
//! - [`TarReader`] parses each header record into a [`TarEntry`], bounds
//!   reads to the entry's declared size, skips unread data when advancing,
//!   and merges GNU long name ('L') entries into the entry that follows.
//!
//! # Security
//!
//! A long name payload is buffered in memory, so its size is capped by
//! [`Limits::max_long_name_size`].
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use tarstream::stream::{Limits, TarReader};
//!
//! let file = File::open("archive.tar").unwrap();
//! let mut reader = TarReader::with_limits(file, Limits::strict());
//!
//! while let Some(entry) = reader.next_entry().unwrap() {
//!     if entry.is_file() {
//!         reader.copy_entry_contents(&mut std::io::stdout()).unwrap();
//!     }
//! }
//! ```

mod buffer;
mod entry;
mod error;
mod limits;
mod reader;

pub use buffer::{RecordBuffer, RecordSource};
pub use entry::TarEntry;
pub use error::{Result, TarError};
pub use limits::{Limits, DEFAULT_MAX_LONG_NAME_SIZE};
pub use reader::TarReader;
