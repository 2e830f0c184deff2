//! Physical record transport.
//!
//! Tar archives are written in blocks of several fixed-size records (by
//! default 20 records of 512 bytes). [`RecordBuffer`] reads whole blocks from
//! the underlying reader and hands them out one record at a time, keeping
//! track of which block and record it is on.

use std::io::{self, ErrorKind, Read};

use log::{debug, trace};

use crate::{DEFAULT_BLOCK_SIZE, DEFAULT_RECORD_SIZE};

use super::error::{Result, TarError};

/// A source of fixed-size physical records.
///
/// This is the seam between [`TarReader`](super::TarReader) and the byte
/// stream it reads from. Implementations own their position counters; the
/// reader only looks at them.
pub trait RecordSource {
    /// Read the next record.
    ///
    /// Returns `Ok(None)` once the physical stream is exhausted. Every
    /// returned record is exactly [`RecordSource::record_size`] bytes long.
    fn read_record(&mut self) -> io::Result<Option<&[u8]>>;

    /// Returns true if `record` marks the end of the archive.
    ///
    /// Only header positions are checked; an all-zero data record is data.
    fn is_end_of_archive(record: &[u8]) -> bool
    where
        Self: Sized,
    {
        record.iter().all(|&b| b == 0)
    }

    /// Size of one record in bytes.
    fn record_size(&self) -> usize;

    /// Size of one physical block in bytes.
    fn block_size(&self) -> usize;

    /// Index of the block holding the most recently read record.
    fn current_block(&self) -> u64;

    /// Index of the most recently read record within its block.
    fn current_record(&self) -> u64;

    /// Release the underlying stream.
    fn close(&mut self) -> io::Result<()>;
}

/// Block-buffered [`RecordSource`] over any [`Read`] implementation.
#[derive(Debug)]
pub struct RecordBuffer<R> {
    reader: Option<R>,
    block: Vec<u8>,
    record_size: usize,
    /// Number of records available in `block`.
    records_in_block: usize,
    /// Index of the next record to hand out from `block`.
    next_record: usize,
    /// Number of blocks read so far.
    blocks_read: u64,
    /// The reader returned EOF; no further blocks will be read.
    exhausted: bool,
}

impl<R: Read> RecordBuffer<R> {
    /// Create a record buffer with the default 512-byte records and a
    /// blocking factor of 20.
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            block: vec![0u8; DEFAULT_BLOCK_SIZE],
            record_size: DEFAULT_RECORD_SIZE,
            records_in_block: 0,
            next_record: 0,
            blocks_read: 0,
            exhausted: false,
        }
    }

    /// Create a record buffer with custom block and record sizes.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::InvalidBlockSize`] unless both sizes are non-zero
    /// and `block_size` is a multiple of `record_size`.
    pub fn with_sizes(reader: R, block_size: usize, record_size: usize) -> Result<Self> {
        if record_size == 0 || block_size == 0 || block_size % record_size != 0 {
            return Err(TarError::InvalidBlockSize {
                block_size,
                record_size,
            });
        }
        Ok(Self {
            reader: Some(reader),
            block: vec![0u8; block_size],
            record_size,
            records_in_block: 0,
            next_record: 0,
            blocks_read: 0,
            exhausted: false,
        })
    }

    /// Consume the buffer and return the underlying reader.
    ///
    /// Returns `None` if the buffer was closed. Any data read ahead into the
    /// current block is lost.
    pub fn into_inner(self) -> Option<R> {
        self.reader
    }

    /// Refill `block` from the reader.
    ///
    /// Returns false once no complete record is left. A short final block
    /// keeps only its complete records; a trailing partial record counts as
    /// the end of the stream.
    fn read_block(&mut self) -> io::Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(closed());
        };

        let filled = read_fully(reader, &mut self.block)?;
        self.exhausted = filled < self.block.len();

        let partial = filled % self.record_size;
        if partial != 0 {
            debug!("dropping trailing partial record of {partial} bytes");
        }
        if filled < self.record_size {
            return Ok(false);
        }

        self.records_in_block = filled / self.record_size;
        self.next_record = 0;
        self.blocks_read += 1;
        trace!(
            "read block {}: {} records",
            self.blocks_read - 1,
            self.records_in_block
        );
        Ok(true)
    }
}

impl<R: Read> RecordSource for RecordBuffer<R> {
    fn read_record(&mut self) -> io::Result<Option<&[u8]>> {
        if self.reader.is_none() {
            return Err(closed());
        }
        if self.next_record >= self.records_in_block && (self.exhausted || !self.read_block()?) {
            return Ok(None);
        }

        let start = self.next_record * self.record_size;
        self.next_record += 1;
        Ok(Some(&self.block[start..start + self.record_size]))
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    fn block_size(&self) -> usize {
        self.block.len()
    }

    fn current_block(&self) -> u64 {
        self.blocks_read.saturating_sub(1)
    }

    fn current_record(&self) -> u64 {
        self.next_record.saturating_sub(1) as u64
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }
}

fn closed() -> io::Error {
    io::Error::other("record source is closed")
}

/// Fill as much of `buf` as the reader allows, retrying on EINTR.
///
/// Unlike [`Read::read_exact`], a short read is not an error: the number of
/// bytes actually read is returned, and 0 means a clean EOF.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}
