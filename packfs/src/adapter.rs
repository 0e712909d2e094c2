//! Forward-only buffering over sources that decode in uneven chunks.
//!
//! An [`AdapterStream`] owns its upstream reader and a [`BufferData`]
//! refill step. Reads drain queued bytes first and refill only when the
//! queue is empty; once the refill step reports that upstream is exhausted
//! it is never called again, and end-of-stream is reported after the queue
//! has been drained.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};

use flate2::{Decompress, FlushDecompress, Status};

/// Refill step of an [`AdapterStream`].
pub trait BufferData {
    /// Decode more bytes from `base` and append them to `data`.
    ///
    /// Must not remove bytes from `data`. Returns `true` once `base` has been
    /// fully consumed.
    fn buffer_data(&mut self, base: &mut dyn Read, data: &mut VecDeque<u8>) -> io::Result<bool>;
}

/// Pull-based, non-seekable stream fed by a [`BufferData`] refill step.
///
/// Seeking always fails with [`io::ErrorKind::Unsupported`]. Dropping the
/// adapter drops the upstream reader.
pub struct AdapterStream<R, B> {
    base: R,
    buffer: B,
    data: VecDeque<u8>,
    base_empty: bool,
}

impl<R: Read, B: BufferData> AdapterStream<R, B> {
    pub fn new(base: R, buffer: B) -> Self {
        Self {
            base,
            buffer,
            data: VecDeque::with_capacity(1024),
            base_empty: false,
        }
    }

    /// Read a single byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(byte) = self.data.pop_front() {
            return Ok(Some(byte));
        }

        while !self.base_empty {
            self.base_empty = self.buffer.buffer_data(&mut self.base, &mut self.data)?;
            if let Some(byte) = self.data.pop_front() {
                return Ok(Some(byte));
            }
        }

        Ok(None)
    }

    /// Whether every byte has been handed out and upstream is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.base_empty && self.data.is_empty()
    }

    fn consume(&mut self, buf: &mut [u8], copied: &mut usize) {
        let count = (buf.len() - *copied).min(self.data.len());
        for (dst, src) in buf[*copied..*copied + count]
            .iter_mut()
            .zip(self.data.drain(..count))
        {
            *dst = src;
        }
        *copied += count;
    }
}

impl<R: Read, B: BufferData> Read for AdapterStream<R, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;
        self.consume(buf, &mut copied);

        while copied < buf.len() && !self.base_empty {
            self.base_empty = self.buffer.buffer_data(&mut self.base, &mut self.data)?;
            self.consume(buf, &mut copied);
        }

        Ok(copied)
    }
}

impl<R, B> Seek for AdapterStream<R, B> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "adapter streams cannot seek",
        ))
    }
}

/// Raw deflate (RFC 1951) refill step.
pub struct Inflate {
    decompress: Decompress,
    input: Box<[u8]>,
    start: usize,
    end: usize,
    output: Box<[u8]>,
}

impl Inflate {
    pub fn new() -> Self {
        Self {
            decompress: Decompress::new(false),
            input: vec![0; 8 * 1024].into_boxed_slice(),
            start: 0,
            end: 0,
            output: vec![0; 16 * 1024].into_boxed_slice(),
        }
    }
}

impl Default for Inflate {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferData for Inflate {
    fn buffer_data(&mut self, base: &mut dyn Read, data: &mut VecDeque<u8>) -> io::Result<bool> {
        let mut base_empty = false;
        if self.start == self.end {
            self.start = 0;
            self.end = base.read(&mut self.input)?;
            base_empty = self.end == 0;
        }

        let flush = if base_empty {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };

        let total_in = self.decompress.total_in();
        let total_out = self.decompress.total_out();
        let status = self
            .decompress
            .decompress(&self.input[self.start..self.end], &mut self.output, flush)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        let consumed = (self.decompress.total_in() - total_in) as usize;
        let produced = (self.decompress.total_out() - total_out) as usize;
        self.start += consumed;
        data.extend(&self.output[..produced]);

        match status {
            Status::StreamEnd => Ok(true),
            _ if base_empty && produced == 0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated deflate stream",
            )),
            _ => Ok(false),
        }
    }
}

/// Streaming raw-deflate decoder.
pub type InflateStream<R> = AdapterStream<R, Inflate>;

/// Decode the raw deflate data read from `base`.
pub fn inflate<R: Read>(base: R) -> InflateStream<R> {
    AdapterStream::new(base, Inflate::new())
}
