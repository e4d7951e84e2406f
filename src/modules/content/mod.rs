// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Content handlers: the blobs behind body parts. A handler either owns
//! bytes in memory, proxies a region of a shared parse buffer, or wraps
//! a caller-supplied input stream.

use crate::modules::encoding::Encoding;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::stream::{
    copy_stream, InputStream, MemoryInputStream, OutputStream, ProgressListener,
    SeekableInputStream, VecOutputStream,
};
use crate::raise_error;
use std::sync::{Arc, Mutex};

/// An abstract content blob with an optional transfer encoding
/// describing the state of its bytes.
pub trait ContentHandler: Send + Sync {
    /// Length of the handler's bytes in their current (possibly
    /// encoded) form.
    fn length(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Whether the bytes are stored in an encoded form.
    fn is_encoded(&self) -> bool {
        !self.encoding().is_identity()
    }

    /// The encoding the bytes are currently in.
    fn encoding(&self) -> Encoding;

    /// Whether the data can be read more than once.
    fn is_buffered(&self) -> bool {
        true
    }

    /// Decode to raw bytes.
    fn extract(
        &self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()>;

    /// Copy the bytes verbatim, still encoded.
    fn extract_raw(
        &self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()>;

    /// Emit the bytes in `target` encoding, re-encoding when the
    /// current encoding differs.
    fn generate(
        &self,
        out: &mut dyn OutputStream,
        target: &Encoding,
        max_line_length: usize,
    ) -> MailForgeResult<()>;

    /// An advisory media type for this content, when one is known
    /// (e.g. guessed from a file name).
    fn content_type_hint(&self) -> Option<String> {
        None
    }
}

/// The decoded bytes of any handler.
pub fn extract_to_vec(handler: &dyn ContentHandler) -> MailForgeResult<Vec<u8>> {
    let mut out = VecOutputStream::new();
    handler.extract(&mut out, None)?;
    Ok(out.into_bytes())
}

/// Shared re-encoding path: decode `data` from `source`, encode to
/// `target`, write to `out`.
fn transcode(
    data: &[u8],
    source: &Encoding,
    target: &Encoding,
    max_line_length: usize,
    out: &mut dyn OutputStream,
) -> MailForgeResult<()> {
    let raw = if source.is_identity() {
        data.to_vec()
    } else {
        let decoder = source.to_encoder()?;
        let mut decoded = VecOutputStream::new();
        decoder.decode(&mut MemoryInputStream::new(data.to_vec()), &mut decoded)?;
        decoded.into_bytes()
    };

    if target.is_identity() {
        out.write(&raw)
    } else {
        let mut encoder = target.to_encoder()?;
        if max_line_length > 0 {
            encoder.properties_mut().set("maxlinelength", max_line_length);
        }
        encoder.encode(&mut MemoryInputStream::new(raw), out)?;
        Ok(())
    }
}

/// The zero-length handler.
#[derive(Default, Clone, Copy)]
pub struct EmptyContentHandler;

impl ContentHandler for EmptyContentHandler {
    fn length(&self) -> u64 {
        0
    }

    fn encoding(&self) -> Encoding {
        Encoding::seven_bit()
    }

    fn extract(
        &self,
        _out: &mut dyn OutputStream,
        _progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        Ok(())
    }

    fn extract_raw(
        &self,
        _out: &mut dyn OutputStream,
        _progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        Ok(())
    }

    fn generate(
        &self,
        _out: &mut dyn OutputStream,
        _target: &Encoding,
        _max_line_length: usize,
    ) -> MailForgeResult<()> {
        Ok(())
    }
}

/// In-memory handler: an owned or shared byte buffer plus the encoding
/// tag describing its current state.
pub struct StringContentHandler {
    data: Arc<Vec<u8>>,
    /// region within `data`, so parse buffers can be shared
    offset: usize,
    region_length: usize,
    encoding: Encoding,
    content_type_hint: Option<String>,
}

impl StringContentHandler {
    /// Raw (unencoded) bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        let region_length = data.len();
        Self {
            data: Arc::new(data),
            offset: 0,
            region_length,
            encoding: Encoding::seven_bit(),
            content_type_hint: None,
        }
    }

    /// Bytes already in `encoding` form.
    pub fn encoded(data: impl Into<Vec<u8>>, encoding: Encoding) -> Self {
        let data: Vec<u8> = data.into();
        let region_length = data.len();
        Self {
            data: Arc::new(data),
            offset: 0,
            region_length,
            encoding,
            content_type_hint: None,
        }
    }

    /// A proxy over `[offset, offset+length)` of a shared buffer,
    /// tagged with the encoding the region is currently in.
    pub fn region(
        data: Arc<Vec<u8>>,
        offset: usize,
        length: usize,
        encoding: Encoding,
    ) -> Self {
        Self {
            data,
            offset,
            region_length: length,
            encoding,
            content_type_hint: None,
        }
    }

    pub fn with_content_type_hint(mut self, hint: &str) -> Self {
        self.content_type_hint = Some(hint.to_string());
        self
    }

    fn bytes(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.region_length]
    }
}

impl ContentHandler for StringContentHandler {
    fn length(&self) -> u64 {
        self.region_length as u64
    }

    fn encoding(&self) -> Encoding {
        self.encoding.clone()
    }

    fn extract(
        &self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        if self.encoding.is_identity() {
            return self.extract_raw(out, progress);
        }
        let decoder = self.encoding.to_encoder()?;
        let mut decoded = VecOutputStream::new();
        decoder.decode(
            &mut MemoryInputStream::new(self.bytes().to_vec()),
            &mut decoded,
        )?;
        let mut stream = MemoryInputStream::new(decoded.into_bytes());
        copy_stream(&mut stream, out, progress)?;
        Ok(())
    }

    fn extract_raw(
        &self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let mut stream = MemoryInputStream::shared(self.data.clone());
        stream.seek(self.offset as u64)?;
        let mut region =
            crate::modules::stream::RegionInputStream::new(stream, self.offset as u64, self.region_length as u64)?;
        copy_stream(&mut region, out, progress)?;
        Ok(())
    }

    fn generate(
        &self,
        out: &mut dyn OutputStream,
        target: &Encoding,
        max_line_length: usize,
    ) -> MailForgeResult<()> {
        if &self.encoding == target {
            return self.extract_raw(out, None);
        }
        transcode(self.bytes(), &self.encoding, target, max_line_length, out)
    }

    fn content_type_hint(&self) -> Option<String> {
        self.content_type_hint.clone()
    }
}

/// Stream-backed handler. Seekable streams reset before every
/// operation; a non-seekable stream is consumed exactly once, after
/// which the handler is spent.
pub struct StreamContentHandler {
    stream: Mutex<StreamState>,
    declared_length: u64,
    encoding: Encoding,
    seekable: bool,
}

enum StreamState {
    Seekable(Box<dyn SeekableInputStream>),
    OneShot(Option<Box<dyn InputStream>>),
}

impl StreamContentHandler {
    pub fn seekable(stream: Box<dyn SeekableInputStream>, encoding: Encoding) -> Self {
        let declared_length = stream.length();
        Self {
            stream: Mutex::new(StreamState::Seekable(stream)),
            declared_length,
            encoding,
            seekable: true,
        }
    }

    pub fn one_shot(
        stream: Box<dyn InputStream>,
        declared_length: u64,
        encoding: Encoding,
    ) -> Self {
        Self {
            stream: Mutex::new(StreamState::OneShot(Some(stream))),
            declared_length,
            encoding,
            seekable: false,
        }
    }

    fn read_all(&self) -> MailForgeResult<Vec<u8>> {
        let mut guard = self.stream.lock().expect("stream lock poisoned");
        match &mut *guard {
            StreamState::Seekable(stream) => {
                stream.reset()?;
                crate::modules::stream::read_to_end(stream.as_mut())
            }
            StreamState::OneShot(slot) => {
                let mut stream = slot.take().ok_or_else(|| {
                    raise_error!(
                        "non-seekable content stream was already consumed".into(),
                        ErrorCode::IllegalState
                    )
                })?;
                crate::modules::stream::read_to_end(stream.as_mut())
            }
        }
    }
}

impl ContentHandler for StreamContentHandler {
    fn length(&self) -> u64 {
        self.declared_length
    }

    fn encoding(&self) -> Encoding {
        self.encoding.clone()
    }

    fn is_buffered(&self) -> bool {
        self.seekable
    }

    fn extract(
        &self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let data = self.read_all()?;
        let raw = if self.encoding.is_identity() {
            data
        } else {
            let decoder = self.encoding.to_encoder()?;
            let mut decoded = VecOutputStream::new();
            decoder.decode(&mut MemoryInputStream::new(data), &mut decoded)?;
            decoded.into_bytes()
        };
        copy_stream(&mut MemoryInputStream::new(raw), out, progress)?;
        Ok(())
    }

    fn extract_raw(
        &self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let data = self.read_all()?;
        copy_stream(&mut MemoryInputStream::new(data), out, progress)?;
        Ok(())
    }

    fn generate(
        &self,
        out: &mut dyn OutputStream,
        target: &Encoding,
        max_line_length: usize,
    ) -> MailForgeResult<()> {
        let data = self.read_all()?;
        if &self.encoding == target {
            out.write(&data)
        } else {
            transcode(&data, &self.encoding, target, max_line_length, out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_handler_produces_nothing() {
        let handler = EmptyContentHandler;
        assert!(handler.is_empty());
        assert_eq!(extract_to_vec(&handler).unwrap(), b"");
    }

    #[test]
    fn string_handler_round_trips_raw_bytes() {
        let handler = StringContentHandler::new(b"payload".to_vec());
        assert_eq!(handler.length(), 7);
        assert!(!handler.is_encoded());
        assert_eq!(extract_to_vec(&handler).unwrap(), b"payload");
    }

    #[test]
    fn encoded_handler_decodes_on_extract() {
        let handler =
            StringContentHandler::encoded(b"UEFZTE9BRA==".to_vec(), Encoding::base64());
        assert!(handler.is_encoded());
        assert_eq!(extract_to_vec(&handler).unwrap(), b"PAYLOAD");

        let mut raw = VecOutputStream::new();
        handler.extract_raw(&mut raw, None).unwrap();
        assert_eq!(raw.as_bytes(), b"UEFZTE9BRA==");
    }

    #[test]
    fn generate_reencodes_between_encodings() {
        let handler =
            StringContentHandler::encoded(b"UEFZTE9BRA==".to_vec(), Encoding::base64());
        let mut out = VecOutputStream::new();
        handler
            .generate(&mut out, &Encoding::quoted_printable(), 76)
            .unwrap();
        assert_eq!(out.as_bytes(), b"PAYLOAD");

        // same encoding copies through verbatim
        let mut same = VecOutputStream::new();
        handler.generate(&mut same, &Encoding::base64(), 76).unwrap();
        assert_eq!(same.as_bytes(), b"UEFZTE9BRA==");
    }

    #[test]
    fn region_handler_views_shared_buffer() {
        let buffer = Arc::new(b"xxPAYLOADyy".to_vec());
        let handler =
            StringContentHandler::region(buffer, 2, 7, Encoding::seven_bit());
        assert_eq!(extract_to_vec(&handler).unwrap(), b"PAYLOAD");
    }

    #[test]
    fn seekable_stream_handler_rereads() {
        let stream = MemoryInputStream::new(b"stream data".to_vec());
        let handler =
            StreamContentHandler::seekable(Box::new(stream), Encoding::seven_bit());
        assert!(handler.is_buffered());
        assert_eq!(extract_to_vec(&handler).unwrap(), b"stream data");
        assert_eq!(extract_to_vec(&handler).unwrap(), b"stream data");
    }

    #[test]
    fn one_shot_stream_handler_is_spent_after_use() {
        let stream = MemoryInputStream::new(b"once".to_vec());
        let handler = StreamContentHandler::one_shot(Box::new(stream), 4, Encoding::seven_bit());
        assert!(!handler.is_buffered());
        assert_eq!(extract_to_vec(&handler).unwrap(), b"once");
        let error = extract_to_vec(&handler).unwrap_err();
        assert_eq!(error.code(), ErrorCode::IllegalState);
    }
}
