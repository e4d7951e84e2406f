// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::encoding::{Encoder, EncoderProperties};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::stream::{read_to_end, InputStream, OutputStream};
use crate::raise_error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const DEFAULT_MAX_LINE_LENGTH: usize = 76;

pub struct Base64Encoder {
    properties: EncoderProperties,
}

impl Base64Encoder {
    pub fn construct() -> Box<dyn Encoder> {
        Box::new(Self {
            properties: EncoderProperties::default(),
        })
    }
}

impl Encoder for Base64Encoder {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn properties(&self) -> &EncoderProperties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut EncoderProperties {
        &mut self.properties
    }

    fn encode(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> MailForgeResult<usize> {
        let max_line_length = self
            .properties
            .get_usize("maxlinelength", DEFAULT_MAX_LINE_LENGTH);
        let data = read_to_end(input)?;
        let encoded = STANDARD.encode(&data);

        let mut written = 0usize;
        if max_line_length == 0 {
            output.write(encoded.as_bytes())?;
            written += encoded.len();
        } else {
            let bytes = encoded.as_bytes();
            let mut offset = 0;
            while offset < bytes.len() {
                let end = (offset + max_line_length).min(bytes.len());
                output.write(&bytes[offset..end])?;
                written += end - offset;
                offset = end;
                if offset < bytes.len() {
                    output.write(b"\r\n")?;
                    written += 2;
                }
            }
        }
        Ok(written)
    }

    fn decode(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> MailForgeResult<usize> {
        let data = read_to_end(input)?;
        let decoded = try_decode(&data).ok_or_else(|| {
            raise_error!("invalid base64 payload".into(), ErrorCode::ParseError)
        })?;
        output.write(&decoded)?;
        Ok(decoded.len())
    }

    fn encoded_size(&self, decoded_length: usize) -> usize {
        let encoded = decoded_length.div_ceil(3) * 4;
        // line breaks every 76 characters
        encoded + (encoded / DEFAULT_MAX_LINE_LENGTH + 1) * 2
    }

    fn decoded_size(&self, encoded_length: usize) -> usize {
        encoded_length / 4 * 3 + 3
    }
}

/// Tolerant base64 decode: line breaks and surrounding whitespace are
/// skipped, missing padding is repaired. Returns `None` when the payload
/// contains characters outside the alphabet or has an impossible length.
pub fn try_decode(data: &[u8]) -> Option<Vec<u8>> {
    let mut filtered = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' | b'=' => filtered.push(byte),
            b' ' | b'\t' | b'\r' | b'\n' => {}
            _ => return None,
        }
    }

    // Strip padding, then re-pad to a canonical length.
    while filtered.last() == Some(&b'=') {
        filtered.pop();
    }
    if filtered.iter().any(|&b| b == b'=') {
        return None;
    }
    match filtered.len() % 4 {
        0 => {}
        1 => return None,
        n => filtered.extend(std::iter::repeat_n(b'=', 4 - n)),
    }

    STANDARD.decode(&filtered).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::encoding::Encoding;
    use crate::modules::stream::{MemoryInputStream, VecOutputStream};

    #[test]
    fn encode_wraps_lines() {
        let encoder = Encoding::base64().to_encoder().unwrap();
        let mut output = VecOutputStream::new();
        encoder
            .encode(&mut MemoryInputStream::new(vec![b'x'; 100]), &mut output)
            .unwrap();
        let text = String::from_utf8(output.into_bytes()).unwrap();
        let mut lines = text.split("\r\n");
        assert_eq!(lines.next().unwrap().len(), 76);
        assert!(lines.next().unwrap().len() <= 76);
    }

    #[test]
    fn custom_line_length_honoured() {
        let mut encoder = Encoding::base64().to_encoder().unwrap();
        encoder.properties_mut().set("maxlinelength", 20);
        let mut output = VecOutputStream::new();
        encoder
            .encode(&mut MemoryInputStream::new(vec![b'x'; 60]), &mut output)
            .unwrap();
        let text = String::from_utf8(output.into_bytes()).unwrap();
        assert!(text.split("\r\n").all(|line| line.len() <= 20));
    }

    #[test]
    fn tolerant_decode_repairs_padding() {
        assert_eq!(try_decode(b"UEFZTE9BRA==").unwrap(), b"PAYLOAD");
        assert_eq!(try_decode(b"UEFZTE9BRA").unwrap(), b"PAYLOAD");
        assert_eq!(try_decode(b"UEFZ\r\nTE9BRA==").unwrap(), b"PAYLOAD");
        assert!(try_decode(b"not*base64").is_none());
    }
}
