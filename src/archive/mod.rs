//! # Archive Sinks
//!
//! This module defines where normalized entries go. [`EntrySink`] is the
//! narrow interface the tree walker writes through; [`TarSink`] is the tar
//! implementation, optionally wrapped in a gzip compressor.
//!
//! Every tar header written here has owner and group `0`, empty owner and
//! group names and the same mtime, so the bytes of an archive depend only on
//! entry names, modes, contents and the chosen build instant.

pub mod tree;

pub use tree::{serialize, ChildOrder, TreeSerializer, WalkStats};

use crate::common::{ArchiveEntry, EntryKind};
use crate::IpkError;

use flate2::write::GzEncoder;
use flate2::GzBuilder;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};

/// Receives archive entries in walk order.
pub trait EntrySink {
    /// Writes a header-only directory entry.
    fn put_directory(&mut self, entry: &ArchiveEntry) -> Result<(), IpkError>;

    /// Writes a file entry whose content is exactly `size` bytes read from
    /// `content`.
    fn put_file(&mut self, entry: &ArchiveEntry, size: u64, content: &mut dyn Read) -> Result<(), IpkError>;
}

/// Stream compression applied around the tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar, used for the outer `.ipk` container.
    None,
    /// gzip with the given level (0-9), used for `control.tar.gz` and `data.tar.gz`.
    Gzip { level: u32 },
}

impl Compression {
    /// gzip at flate2's default level.
    pub const GZIP_DEFAULT: Compression = Compression::Gzip { level: 6 };
}

/// The file an archive is written to, possibly behind a compressor.
pub enum ArchiveOutput {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl ArchiveOutput {
    /// Creates (or truncates) `path` and wraps it according to `compression`.
    pub fn create(path: &Path, compression: Compression) -> io::Result<Self> {
        let writer = BufWriter::new(File::create(path)?);
        Ok(match compression {
            Compression::None => ArchiveOutput::Plain(writer),
            // mtime 0 keeps the gzip header independent of the build clock
            Compression::Gzip { level } => ArchiveOutput::Gzip(
                GzBuilder::new()
                    .mtime(0)
                    .write(writer, flate2::Compression::new(level.min(9))),
            ),
        })
    }

    /// Writes the compressor trailer, if any, and flushes everything to disk.
    pub fn finish(self) -> io::Result<()> {
        let writer = match self {
            ArchiveOutput::Plain(writer) => writer,
            ArchiveOutput::Gzip(encoder) => encoder.finish()?,
        };
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

impl Write for ArchiveOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveOutput::Plain(w) => w.write(buf),
            ArchiveOutput::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveOutput::Plain(w) => w.flush(),
            ArchiveOutput::Gzip(w) => w.flush(),
        }
    }
}

/// Tar writer implementing [`EntrySink`].
pub struct TarSink<W: Write> {
    builder: tar::Builder<W>,
    /// Where the archive goes; used for error reporting only.
    target: PathBuf,
    mtime: u64,
    entries: u64,
}

impl TarSink<ArchiveOutput> {
    /// Opens a new archive file at `path`.
    pub fn create(path: &Path, compression: Compression, mtime: u64) -> Result<Self, IpkError> {
        let output = ArchiveOutput::create(path, compression).map_err(|e| IpkError::io(path, e))?;
        tracing::debug!(archive = %path.display(), ?compression, "opened archive");
        Ok(Self::new(output, path, mtime))
    }

    /// Writes the end-of-archive marker and closes the file.
    pub fn finish(self) -> Result<u64, IpkError> {
        let target = self.target;
        let entries = self.entries;
        let output = self.builder.into_inner().map_err(|e| IpkError::io(&target, e))?;
        output.finish().map_err(|e| IpkError::io(&target, e))?;
        tracing::debug!(archive = %target.display(), entries, "closed archive");
        Ok(entries)
    }
}

impl<W: Write> TarSink<W> {
    /// Wraps an arbitrary writer. `target` only labels errors.
    pub fn new(writer: W, target: impl Into<PathBuf>, mtime: u64) -> Self {
        let builder = tar::Builder::new(writer);
        Self { builder, target: target.into(), mtime, entries: 0 }
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    /// Writes the end-of-archive marker and hands back the writer.
    pub fn into_inner(self) -> Result<W, IpkError> {
        let target = self.target;
        self.builder.into_inner().map_err(|e| IpkError::io(target, e))
    }

    fn header(&self, entry: &ArchiveEntry, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(match entry.kind {
            EntryKind::File => EntryType::Regular,
            EntryKind::Directory => EntryType::Directory,
        });
        header.set_mode(entry.mode);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(self.mtime);
        header.set_size(size);
        header
    }

    fn entry_error(&self, entry: &ArchiveEntry, source: io::Error) -> IpkError {
        IpkError::Entry { archive: self.target.clone(), entry: entry.name.clone(), source }
    }
}

impl<W: Write> EntrySink for TarSink<W> {
    fn put_directory(&mut self, entry: &ArchiveEntry) -> Result<(), IpkError> {
        let mut header = self.header(entry, 0);
        self.builder
            .append_data(&mut header, &entry.name, io::empty())
            .map_err(|e| self.entry_error(entry, e))?;
        self.entries += 1;
        Ok(())
    }

    fn put_file(&mut self, entry: &ArchiveEntry, size: u64, content: &mut dyn Read) -> Result<(), IpkError> {
        let mut header = self.header(entry, size);
        let exact = ExactReader::new(content, size);
        self.builder
            .append_data(&mut header, &entry.name, exact)
            .map_err(|e| self.entry_error(entry, e))?;
        self.entries += 1;
        Ok(())
    }
}

/// Yields exactly `remaining` bytes from `inner`: surplus bytes are cut off
/// and running dry early is an `UnexpectedEof` error, so the content written
/// always matches the size recorded in the header.
struct ExactReader<'a> {
    inner: &'a mut dyn Read,
    remaining: u64,
}

impl<'a> ExactReader<'a> {
    fn new(inner: &'a mut dyn Read, remaining: u64) -> Self {
        Self { inner, remaining }
    }
}

impl Read for ExactReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("content ended {} bytes short of the recorded size", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
