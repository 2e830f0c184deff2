//! Entry-aware reader over a record source.

use std::io::{self, Read, Write};

use log::{debug, warn};

use crate::{EntryType, Header, HEADER_SIZE};

use super::buffer::{RecordBuffer, RecordSource};
use super::entry::TarEntry;
use super::error::{Result, TarError};
use super::limits::Limits;

/// Scratch buffer size used when skipping entry data.
const SKIP_BUFFER_SIZE: usize = 8 * 1024;

/// Chunk size used by [`TarReader::copy_entry_contents`].
const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Where the reader is in the archive.
#[derive(Debug)]
enum State {
    /// No header has been read yet.
    BeforeFirstEntry,
    /// Positioned inside the data of this entry.
    OnEntry(TarEntry),
    /// The archive ended. Terminal: the source is never touched again.
    EndOfArchive,
    /// A fatal error left the source at an unknown position. Terminal.
    Poisoned,
}

/// Bytes of the last record pulled from the source that the caller has not
/// consumed yet.
///
/// Holds the remainder of at most one record. Filling it replaces whatever
/// was there before.
#[derive(Debug, Default)]
struct Carryover {
    buf: Vec<u8>,
    pos: usize,
}

impl Carryover {
    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Move as many pending bytes as fit into `out`.
    fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let pending = &self.buf[self.pos..];
        let n = pending.len().min(out.len());
        out[..n].copy_from_slice(&pending[..n]);
        self.pos += n;
        if self.is_empty() {
            self.clear();
        }
        n
    }

    fn replace(&mut self, bytes: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.pos = 0;
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }
}

/// Sequential reader that exposes each entry of a tar archive as a bounded
/// byte stream.
///
/// Call [`next_entry`] to advance to the next entry, then read its data
/// through [`Read`] (or [`read_entry`]) until it reports the end of the
/// entry. Any data left unread is skipped automatically by the following
/// `next_entry` call. GNU long name entries are resolved transparently: the
/// caller sees a single entry carrying the long name.
///
/// # Example
///
/// ```
/// use std::io::Read;
/// use tarstream::stream::TarReader;
///
/// # let archive: Vec<u8> = vec![0; 1024];
/// let mut reader = TarReader::new(archive.as_slice());
/// while let Some(entry) = reader.next_entry().unwrap() {
///     let mut content = String::new();
///     reader.read_to_string(&mut content).unwrap();
///     println!("{}: {content}", entry.name());
/// }
/// ```
///
/// # Errors
///
/// Every error is fatal. After one is returned, further calls to
/// [`next_entry`], [`read_entry`], [`skip`] and [`copy_entry_contents`]
/// return [`TarError::Poisoned`] without touching the source.
///
/// [`next_entry`]: TarReader::next_entry
/// [`read_entry`]: TarReader::read_entry
/// [`skip`]: TarReader::skip
/// [`copy_entry_contents`]: TarReader::copy_entry_contents
#[derive(Debug)]
pub struct TarReader<S> {
    source: S,
    limits: Limits,
    state: State,
    entry_size: u64,
    entry_offset: u64,
    carryover: Carryover,
}

impl<R: Read> TarReader<RecordBuffer<R>> {
    /// Create a reader with default block size and limits.
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, Limits::default())
    }

    /// Create a reader with default block size and the given limits.
    pub fn with_limits(reader: R, limits: Limits) -> Self {
        Self::with_source(RecordBuffer::new(reader), limits)
    }
}

impl<S: RecordSource> TarReader<S> {
    /// Create a reader on top of an arbitrary record source.
    pub fn with_source(source: S, limits: Limits) -> Self {
        Self {
            source,
            limits,
            state: State::BeforeFirstEntry,
            entry_size: 0,
            entry_offset: 0,
            carryover: Carryover::default(),
        }
    }

    /// Advance to the next entry of the archive.
    ///
    /// Skips whatever is left of the current entry first. GNU long name
    /// entries are applied to the entry that follows them, and ignorable
    /// entries (volume labels) are dropped. Other extension entries are
    /// returned as they are.
    ///
    /// Returns `Ok(None)` at the end of the archive, and keeps doing so on
    /// every later call without reading from the source.
    pub fn next_entry(&mut self) -> Result<Option<TarEntry>> {
        let result = self.advance();
        self.poison_on_error(result)
    }

    /// Read data of the current entry into `buf`.
    ///
    /// Returns `Ok(None)` once the entry is exhausted. Otherwise returns the
    /// number of bytes read, which is `min(buf.len(), available())`; an empty
    /// `buf` yields `Ok(Some(0))`. A read never crosses into the next entry.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::UnexpectedEof`] if the archive ends before the
    /// entry's declared size is reached.
    pub fn read_entry(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.check_usable()?;
        let result = self.read_bounded(buf);
        self.poison_on_error(result)
    }

    /// Skip up to `n` bytes of the current entry.
    ///
    /// Stops early at the end of the entry; returns the number of bytes that
    /// were actually skipped.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        self.check_usable()?;
        let result = self.skip_bounded(n);
        self.poison_on_error(result)
    }

    /// Write the rest of the current entry to `out`.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_entry_contents<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0;
        while let Some(n) = self.read_entry(&mut buf)? {
            if n != 0 {
                out.write_all(&buf[..n])?;
                copied += n as u64;
            }
        }
        Ok(copied)
    }

    /// The entry returned by the last [`next_entry`](TarReader::next_entry)
    /// call, if any.
    #[must_use]
    pub fn current_entry(&self) -> Option<&TarEntry> {
        match &self.state {
            State::OnEntry(entry) => Some(entry),
            _ => None,
        }
    }

    /// Number of bytes of the current entry read so far.
    #[must_use]
    pub fn entry_position(&self) -> u64 {
        self.entry_offset
    }

    /// Number of bytes of the current entry not read yet.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.entry_size - self.entry_offset
    }

    /// Physical position in the archive, as reported by the record source:
    /// `block_size * current_block + current_record`.
    #[must_use]
    pub fn stream_position(&self) -> u64 {
        self.source.block_size() as u64 * self.source.current_block()
            + self.source.current_record()
    }

    /// Size of the records the source hands out.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.source.record_size()
    }

    /// Get the current limits.
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Consume the reader and return the record source.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Close the reader and the record source beneath it.
    pub fn close(mut self) -> Result<()> {
        self.source.close()?;
        Ok(())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn check_usable(&self) -> Result<()> {
        match self.state {
            State::Poisoned => Err(TarError::Poisoned),
            _ => Ok(()),
        }
    }

    fn poison_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = State::Poisoned;
            self.carryover.clear();
        }
        result
    }

    fn advance(&mut self) -> Result<Option<TarEntry>> {
        loop {
            let Some(mut entry) = self.next_raw_entry()? else {
                return Ok(None);
            };

            if entry.entry_type().is_extension() {
                match self.resolve_extension(entry)? {
                    Some(resolved) => entry = resolved,
                    None => return Ok(None),
                }
            }

            if entry.entry_type().is_ignorable() {
                debug!(
                    "ignoring {:?} entry '{}'",
                    entry.entry_type(),
                    entry.name()
                );
                continue;
            }

            return Ok(Some(entry));
        }
    }

    fn next_raw_entry(&mut self) -> Result<Option<TarEntry>> {
        Ok(self.read_header()?.map(|entry| self.install(entry)))
    }

    /// Move past the current entry and parse the next header record.
    ///
    /// The parsed entry is not made current; see [`TarReader::install`].
    fn read_header(&mut self) -> Result<Option<TarEntry>> {
        match self.state {
            State::EndOfArchive => return Ok(None),
            State::Poisoned => return Err(TarError::Poisoned),
            State::BeforeFirstEntry | State::OnEntry(_) => {}
        }

        let remaining = self.available();
        if remaining > 0 {
            if let State::OnEntry(entry) = &self.state {
                debug!(
                    "skipping {remaining} unread bytes of '{}' (size {}, offset {})",
                    entry.name(),
                    self.entry_size,
                    self.entry_offset
                );
            }
            self.skip_bounded(remaining)?;
        }
        self.carryover.clear();

        let parsed = match self.source.read_record()? {
            None => {
                debug!("end of archive: record source exhausted");
                None
            }
            Some(record) if S::is_end_of_archive(record) => {
                debug!("end of archive: end-of-archive record");
                None
            }
            Some(record) => Some(Header::from_bytes(record).and_then(TarEntry::from_header)),
        };

        let Some(parsed) = parsed else {
            self.state = State::EndOfArchive;
            self.entry_size = 0;
            self.entry_offset = 0;
            return Ok(None);
        };

        let entry = parsed.map_err(|source| TarError::InvalidHeader {
            block: self.source.current_block(),
            record: self.source.current_record(),
            source,
        })?;
        Ok(Some(entry))
    }

    /// Make `entry` the current entry and return a copy of it.
    fn install(&mut self, entry: TarEntry) -> TarEntry {
        debug!(
            "current entry '{}' ({:?}) size = {}",
            entry.name(),
            entry.entry_type(),
            entry.size()
        );
        self.entry_size = entry.size();
        self.entry_offset = 0;
        self.carryover.clear();
        self.state = State::OnEntry(entry.clone());
        entry
    }

    /// Apply an extension entry, which is already current, to what follows.
    fn resolve_extension(&mut self, entry: TarEntry) -> Result<Option<TarEntry>> {
        match entry.entry_type() {
            EntryType::GnuLongName => {
                let name = self.read_long_name(entry.size())?;
                let Some(next) = self.read_header()? else {
                    debug!("GNU long name '{name}' is not followed by an entry");
                    return Ok(None);
                };
                debug!("applying GNU long name '{name}'");
                Ok(Some(self.install(next.with_name(name))))
            }
            other => {
                warn!(
                    "passing through unresolved {other:?} extension entry '{}'",
                    entry.name()
                );
                Ok(Some(entry))
            }
        }
    }

    /// Read the payload of the current long name entry.
    ///
    /// One trailing NUL is dropped; invalid UTF-8 is replaced.
    fn read_long_name(&mut self, size: u64) -> Result<String> {
        if size > self.limits.max_long_name_size {
            return Err(TarError::LongNameTooLarge {
                size,
                limit: self.limits.max_long_name_size,
            });
        }

        let mut data = Vec::new();
        let mut chunk = [0u8; HEADER_SIZE];
        while let Some(n) = self.read_bounded(&mut chunk)? {
            data.extend_from_slice(&chunk[..n]);
        }

        if data.last() == Some(&0) {
            data.pop();
        }
        Ok(String::from_utf8(data)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned()))
    }

    fn read_bounded(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.entry_offset >= self.entry_size {
            return Ok(None);
        }

        let wanted = buf.len().min(usize::try_from(self.available()).unwrap_or(usize::MAX));
        let buf = &mut buf[..wanted];

        let mut filled = self.carryover.drain_into(buf);

        while filled < wanted {
            let Some(record) = self.source.read_record()? else {
                return Err(TarError::UnexpectedEof {
                    missing: (wanted - filled) as u64,
                });
            };

            let needed = wanted - filled;
            if record.len() > needed {
                buf[filled..].copy_from_slice(&record[..needed]);
                self.carryover.replace(&record[needed..]);
                filled = wanted;
            } else {
                buf[filled..filled + record.len()].copy_from_slice(record);
                filled += record.len();
            }
        }

        self.entry_offset += filled as u64;
        Ok(Some(filled))
    }

    fn skip_bounded(&mut self, n: u64) -> Result<u64> {
        let mut scratch = [0u8; SKIP_BUFFER_SIZE];
        let mut remaining = n;
        while remaining > 0 {
            let step = remaining.min(SKIP_BUFFER_SIZE as u64) as usize;
            match self.read_bounded(&mut scratch[..step])? {
                Some(read) => remaining -= read as u64,
                None => break,
            }
        }
        Ok(n - remaining)
    }
}

impl<S: RecordSource> Read for TarReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_entry(buf)?.unwrap_or(0))
    }
}
