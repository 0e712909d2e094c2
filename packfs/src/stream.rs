//! Byte streams handed out by packages.
//!
//! Container packages own a single underlying handle wrapped in a
//! [`SharedSource`]. Entries are served as [`SegmentStream`] range views:
//! each view keeps its own cursor and only touches the shared handle inside
//! the mutex (seek, then read), so sibling views never observe each other's
//! position.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

/// A readable, seekable byte stream.
pub trait PackageStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> PackageStream for T {}

/// An owned, type-erased [`PackageStream`].
pub type BoxedStream = Box<dyn PackageStream>;

/// The underlying handle of a container package, shared with its range views.
///
/// The handle is released when the package and every view over it are dropped.
pub type SharedSource = Arc<Mutex<BoxedStream>>;

/// Wrap a stream so that range views can be created over it.
pub fn share(stream: BoxedStream) -> SharedSource {
    Arc::new(Mutex::new(stream))
}

/// A read-only view of `len` bytes starting at `start` in a shared source.
pub struct SegmentStream {
    source: SharedSource,
    start: u64,
    len: u64,
    pos: u64,
}

impl SegmentStream {
    pub fn new(source: SharedSource, start: u64, len: u64) -> Self {
        Self {
            source,
            start,
            len,
            pos: 0,
        }
    }

    /// Length of the segment in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute offset of the segment in the shared source.
    pub fn start(&self) -> u64 {
        self.start
    }
}

impl Read for SegmentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let wanted = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = {
            let mut source = self.source.lock();
            source.seek(SeekFrom::Start(self.start + self.pos))?;
            source.read(&mut buf[..wanted])?
        };

        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for SegmentStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the segment",
            )),
        }
    }
}

/// Read `buf.len()` bytes at `offset` and restore the stream position.
///
/// Returns `Ok(false)` when the stream ends before `buf` is filled.
pub fn peek(stream: &mut dyn PackageStream, offset: u64, buf: &mut [u8]) -> io::Result<bool> {
    let saved = stream.stream_position()?;
    let result = stream
        .seek(SeekFrom::Start(offset))
        .and_then(|_| stream.read_exact(buf));
    stream.seek(SeekFrom::Start(saved))?;

    match result {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}

/// Total length of a stream, leaving its position untouched.
pub fn stream_length(stream: &mut dyn PackageStream) -> io::Result<u64> {
    let saved = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(saved))?;
    Ok(len)
}
