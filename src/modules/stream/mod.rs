// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::raise_error;
use std::sync::Arc;

/// Chunk size used when copying between streams.
pub const COPY_BLOCK_SIZE: usize = 16384;

/// A readable byte stream. Unlike `std::io::Read`, EOF is an explicit
/// query so protocol code can distinguish "no data yet" from "done".
pub trait InputStream: Send {
    fn eof(&self) -> bool;

    /// Read up to `buf.len()` bytes, returning the number read. Zero is
    /// only returned at EOF.
    fn read(&mut self, buf: &mut [u8]) -> MailForgeResult<usize>;

    /// Skip up to `count` bytes, returning the number skipped.
    fn skip(&mut self, count: usize) -> MailForgeResult<usize> {
        let mut remaining = count;
        let mut scratch = [0u8; 1024];
        while remaining > 0 && !self.eof() {
            let take = remaining.min(scratch.len());
            let read = self.read(&mut scratch[..take])?;
            if read == 0 {
                break;
            }
            remaining -= read;
        }
        Ok(count - remaining)
    }
}

/// A writable byte stream.
pub trait OutputStream: Send {
    fn write(&mut self, data: &[u8]) -> MailForgeResult<()>;

    fn flush(&mut self) -> MailForgeResult<()> {
        Ok(())
    }
}

/// An input stream with a known length and random access position.
pub trait SeekableInputStream: InputStream {
    fn position(&self) -> u64;
    fn seek(&mut self, position: u64) -> MailForgeResult<()>;
    fn length(&self) -> u64;

    fn reset(&mut self) -> MailForgeResult<()> {
        self.seek(0)
    }
}

/// Receives progress notifications during long extract/copy operations.
/// Implementations must be cheap; they are called once per copied block.
pub trait ProgressListener: Send {
    fn start(&mut self, predicted_total: usize);
    fn progress(&mut self, current: usize, total: usize);
    fn stop(&mut self, total: usize);
}

/// In-memory seekable stream over shared bytes. Cloning the underlying
/// buffer is avoided so that many region views can alias one parse
/// buffer.
pub struct MemoryInputStream {
    data: Arc<Vec<u8>>,
    position: usize,
}

impl MemoryInputStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            position: 0,
        }
    }

    pub fn shared(data: Arc<Vec<u8>>) -> Self {
        Self { data, position: 0 }
    }
}

impl InputStream for MemoryInputStream {
    fn eof(&self) -> bool {
        self.position >= self.data.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> MailForgeResult<usize> {
        let available = self.data.len().saturating_sub(self.position);
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}

impl SeekableInputStream for MemoryInputStream {
    fn position(&self) -> u64 {
        self.position as u64
    }

    fn seek(&mut self, position: u64) -> MailForgeResult<()> {
        if position > self.data.len() as u64 {
            return Err(raise_error!(
                format!(
                    "seek position {} past end of stream ({} bytes)",
                    position,
                    self.data.len()
                ),
                ErrorCode::InvalidParameter
            ));
        }
        self.position = position as usize;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A bounded view `[start, start+length)` over another seekable stream.
/// Used to hand body-part content out of a parsed message without
/// copying it.
pub struct RegionInputStream<S: SeekableInputStream> {
    inner: S,
    start: u64,
    region_length: u64,
    position: u64,
}

impl<S: SeekableInputStream> RegionInputStream<S> {
    pub fn new(mut inner: S, start: u64, region_length: u64) -> MailForgeResult<Self> {
        inner.seek(start)?;
        Ok(Self {
            inner,
            start,
            region_length,
            position: 0,
        })
    }
}

impl<S: SeekableInputStream> InputStream for RegionInputStream<S> {
    fn eof(&self) -> bool {
        self.position >= self.region_length
    }

    fn read(&mut self, buf: &mut [u8]) -> MailForgeResult<usize> {
        let remaining = (self.region_length - self.position) as usize;
        let take = remaining.min(buf.len());
        if take == 0 {
            return Ok(0);
        }
        let read = self.inner.read(&mut buf[..take])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<S: SeekableInputStream> SeekableInputStream for RegionInputStream<S> {
    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> MailForgeResult<()> {
        if position > self.region_length {
            return Err(raise_error!(
                format!("seek position {} past end of region", position),
                ErrorCode::InvalidParameter
            ));
        }
        self.inner.seek(self.start + position)?;
        self.position = position;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.region_length
    }
}

/// Output stream collecting into an owned buffer.
#[derive(Default)]
pub struct VecOutputStream {
    data: Vec<u8>,
}

impl VecOutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl OutputStream for VecOutputStream {
    fn write(&mut self, data: &[u8]) -> MailForgeResult<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }
}

/// Counts bytes while discarding them, for size estimation passes.
#[derive(Default)]
pub struct CountingOutputStream {
    count: usize,
}

impl CountingOutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl OutputStream for CountingOutputStream {
    fn write(&mut self, data: &[u8]) -> MailForgeResult<()> {
        self.count += data.len();
        Ok(())
    }
}

/// Adapter writing into any `std::io::Write`.
pub struct IoWriteOutputStream<W: std::io::Write + Send> {
    writer: W,
}

impl<W: std::io::Write + Send> IoWriteOutputStream<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: std::io::Write + Send> OutputStream for IoWriteOutputStream<W> {
    fn write(&mut self, data: &[u8]) -> MailForgeResult<()> {
        self.writer
            .write_all(data)
            .map_err(|e| raise_error!(format!("write failed: {}", e), ErrorCode::SystemError))
    }

    fn flush(&mut self) -> MailForgeResult<()> {
        self.writer
            .flush()
            .map_err(|e| raise_error!(format!("flush failed: {}", e), ErrorCode::SystemError))
    }
}

/// Copy `input` to `output` until EOF, notifying `progress` per block.
/// Returns the number of bytes copied.
pub fn copy_stream(
    input: &mut dyn InputStream,
    output: &mut dyn OutputStream,
    mut progress: Option<&mut dyn ProgressListener>,
) -> MailForgeResult<usize> {
    let mut block = vec![0u8; COPY_BLOCK_SIZE];
    let mut total = 0usize;

    if let Some(listener) = progress.as_deref_mut() {
        listener.start(0);
    }

    loop {
        let read = input.read(&mut block)?;
        if read == 0 {
            break;
        }
        output.write(&block[..read])?;
        total += read;
        if let Some(listener) = progress.as_deref_mut() {
            listener.progress(total, total);
        }
    }

    output.flush()?;

    if let Some(listener) = progress.as_deref_mut() {
        listener.stop(total);
    }

    Ok(total)
}

/// Drain an input stream into a buffer.
pub fn read_to_end(input: &mut dyn InputStream) -> MailForgeResult<Vec<u8>> {
    let mut sink = VecOutputStream::new();
    copy_stream(input, &mut sink, None)?;
    Ok(sink.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stream_read_and_seek() {
        let mut stream = MemoryInputStream::new(b"hello world".to_vec());
        let mut buf = [0u8; 5];
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        stream.seek(6).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert!(stream.eof());
    }

    #[test]
    fn region_stream_bounds_reads() {
        let inner = MemoryInputStream::new(b"aaPAYLOADzz".to_vec());
        let mut region = RegionInputStream::new(inner, 2, 7).unwrap();
        assert_eq!(read_to_end(&mut region).unwrap(), b"PAYLOAD");
        region.reset().unwrap();
        assert_eq!(read_to_end(&mut region).unwrap(), b"PAYLOAD");
    }

    #[test]
    fn copy_reports_progress() {
        struct Recorder(Vec<usize>);
        impl ProgressListener for Recorder {
            fn start(&mut self, _predicted: usize) {}
            fn progress(&mut self, current: usize, _total: usize) {
                self.0.push(current);
            }
            fn stop(&mut self, total: usize) {
                self.0.push(total);
            }
        }

        let mut input = MemoryInputStream::new(vec![7u8; 100]);
        let mut output = VecOutputStream::new();
        let mut recorder = Recorder(Vec::new());
        let copied = copy_stream(&mut input, &mut output, Some(&mut recorder)).unwrap();
        assert_eq!(copied, 100);
        assert_eq!(output.len(), 100);
        assert_eq!(recorder.0.last(), Some(&100));
    }

    #[test]
    fn skip_advances_past_bytes() {
        let mut stream = MemoryInputStream::new(b"0123456789".to_vec());
        assert_eq!(stream.skip(4).unwrap(), 4);
        let mut buf = [0u8; 2];
        stream.read(&mut buf).unwrap();
        assert_eq!(&buf, b"45");
        assert_eq!(stream.skip(100).unwrap(), 4);
        assert!(stream.eof());
    }
}
