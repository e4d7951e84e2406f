// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::encoding::{Encoder, EncoderProperties};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::stream::{read_to_end, InputStream, OutputStream};
use crate::raise_error;

const BYTES_PER_LINE: usize = 45;

pub struct UuencodeEncoder {
    properties: EncoderProperties,
}

impl UuencodeEncoder {
    pub fn construct() -> Box<dyn Encoder> {
        Box::new(Self {
            properties: EncoderProperties::default(),
        })
    }
}

#[inline]
fn uu_char(value: u8) -> u8 {
    if value == 0 {
        b'`'
    } else {
        value + 0x20
    }
}

#[inline]
fn uu_value(ch: u8) -> u8 {
    if ch == b'`' {
        0
    } else {
        ch.wrapping_sub(0x20) & 0x3f
    }
}

impl Encoder for UuencodeEncoder {
    fn name(&self) -> &'static str {
        "uuencode"
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
        let filename = self.properties.get("filename").unwrap_or("file").to_string();
        let mode = self.properties.get("mode").unwrap_or("644").to_string();
        let data = read_to_end(input)?;

        let mut out = Vec::with_capacity(data.len() * 4 / 3 + 64);
        out.extend_from_slice(format!("begin {} {}\r\n", mode, filename).as_bytes());

        for chunk in data.chunks(BYTES_PER_LINE) {
            out.push(uu_char(chunk.len() as u8));
            for group in chunk.chunks(3) {
                let b0 = group[0];
                let b1 = group.get(1).copied().unwrap_or(0);
                let b2 = group.get(2).copied().unwrap_or(0);
                out.push(uu_char(b0 >> 2));
                out.push(uu_char(((b0 << 4) | (b1 >> 4)) & 0x3f));
                out.push(uu_char(((b1 << 2) | (b2 >> 6)) & 0x3f));
                out.push(uu_char(b2 & 0x3f));
            }
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"`\r\nend\r\n");
        output.write(&out)?;
        Ok(out.len())
    }

    fn decode(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> MailForgeResult<usize> {
        let data = read_to_end(input)?;
        let mut written = 0usize;
        let mut in_body = false;

        for line in data.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !in_body {
                if line.starts_with(b"begin ") {
                    in_body = true;
                }
                continue;
            }
            if line == b"end" {
                return Ok(written);
            }
            if line.is_empty() || line == b"`" {
                continue;
            }

            let count = uu_value(line[0]) as usize;
            let mut decoded = Vec::with_capacity(count);
            for group in line[1..].chunks(4) {
                if group.len() < 4 {
                    break;
                }
                let v: Vec<u8> = group.iter().map(|&c| uu_value(c)).collect();
                decoded.push((v[0] << 2) | (v[1] >> 4));
                decoded.push((v[1] << 4) | (v[2] >> 2));
                decoded.push((v[2] << 6) | v[3]);
            }
            decoded.truncate(count);
            output.write(&decoded)?;
            written += decoded.len();
        }

        if !in_body {
            return Err(raise_error!(
                "uuencoded payload has no 'begin' line".into(),
                ErrorCode::ParseError
            ));
        }
        Ok(written)
    }

    fn encoded_size(&self, decoded_length: usize) -> usize {
        decoded_length * 4 / 3 + decoded_length / BYTES_PER_LINE * 3 + 64
    }

    fn decoded_size(&self, encoded_length: usize) -> usize {
        encoded_length * 3 / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::encoding::Encoding;
    use crate::modules::stream::{MemoryInputStream, VecOutputStream};

    fn encode_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = Encoding::uuencode().to_encoder().unwrap();
        encoder.properties_mut().set("filename", "a.bin");
        let mut out = VecOutputStream::new();
        encoder
            .encode(&mut MemoryInputStream::new(data.to_vec()), &mut out)
            .unwrap();
        out.into_bytes()
    }

    #[test]
    fn encode_emits_begin_and_end() {
        let text = String::from_utf8(encode_bytes(b"Cat")).unwrap();
        assert!(text.starts_with("begin 644 a.bin\r\n"));
        assert!(text.ends_with("`\r\nend\r\n"));
    }

    #[test]
    fn decode_inverts_encode() {
        let data: Vec<u8> = (0..=255u8).cycle().take(300).collect();
        let encoded = encode_bytes(&data);
        let encoder = Encoding::uuencode().to_encoder().unwrap();
        let mut decoded = VecOutputStream::new();
        encoder
            .decode(&mut MemoryInputStream::new(encoded), &mut decoded)
            .unwrap();
        assert_eq!(decoded.into_bytes(), data);
    }

    #[test]
    fn decode_without_begin_fails() {
        let encoder = Encoding::uuencode().to_encoder().unwrap();
        let mut decoded = VecOutputStream::new();
        assert!(encoder
            .decode(&mut MemoryInputStream::new(b"plain".to_vec()), &mut decoded)
            .is_err());
    }
}
