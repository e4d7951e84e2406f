// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::encoding::{Encoder, EncoderProperties};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::stream::{read_to_end, InputStream, OutputStream};
use crate::raise_error;

const DEFAULT_MAX_LINE_LENGTH: usize = 76;
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

pub struct QuotedPrintableEncoder {
    properties: EncoderProperties,
}

impl QuotedPrintableEncoder {
    pub fn construct() -> Box<dyn Encoder> {
        Box::new(Self {
            properties: EncoderProperties::default(),
        })
    }
}

impl Encoder for QuotedPrintableEncoder {
    fn name(&self) -> &'static str {
        "quoted-printable"
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
        let text_mode = self.properties.get_bool("text", false);
        let data = read_to_end(input)?;
        let encoded = encode(&data, max_line_length, text_mode);
        output.write(&encoded)?;
        Ok(encoded.len())
    }

    fn decode(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> MailForgeResult<usize> {
        let data = read_to_end(input)?;
        let decoded = try_decode(&data).ok_or_else(|| {
            raise_error!(
                "invalid quoted-printable payload".into(),
                ErrorCode::ParseError
            )
        })?;
        output.write(&decoded)?;
        Ok(decoded.len())
    }

    fn encoded_size(&self, decoded_length: usize) -> usize {
        decoded_length * 3 + decoded_length / DEFAULT_MAX_LINE_LENGTH * 3 + 3
    }

    fn decoded_size(&self, encoded_length: usize) -> usize {
        encoded_length
    }
}

fn is_literal(byte: u8) -> bool {
    (33..=126).contains(&byte) && byte != b'='
}

/// Quoted-printable encode. In text mode CR LF (or bare LF) pairs are
/// emitted as hard line breaks; otherwise line terminators are encoded
/// like any other control byte. Soft breaks keep every output line at or
/// under `max_line_length`.
pub fn encode(data: &[u8], max_line_length: usize, text_mode: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    let mut column = 0usize;
    // one column reserved for a soft-break '='
    let limit = max_line_length.max(4) - 1;

    let mut emit = |token: &[u8], out: &mut Vec<u8>, column: &mut usize| {
        if *column + token.len() > limit {
            out.extend_from_slice(b"=\r\n");
            *column = 0;
        }
        out.extend_from_slice(token);
        *column += token.len();
    };

    let mut index = 0;
    while index < data.len() {
        let byte = data[index];

        if text_mode && (byte == b'\n' || (byte == b'\r' && data.get(index + 1) == Some(&b'\n'))) {
            // whitespace may not precede a hard break
            if let Some(&last) = out.last() {
                if (last == b' ' || last == b'\t') && column >= 1 {
                    out.pop();
                    column -= 1;
                    emit(&[b'=', HEX_DIGITS[(last >> 4) as usize], HEX_DIGITS[(last & 15) as usize]], &mut out, &mut column);
                }
            }
            out.extend_from_slice(b"\r\n");
            column = 0;
            index += if byte == b'\r' { 2 } else { 1 };
            continue;
        }

        let at_line_end = if text_mode {
            matches!(data.get(index + 1), None | Some(b'\n'))
                || (data.get(index + 1) == Some(&b'\r') && data.get(index + 2) == Some(&b'\n'))
        } else {
            index + 1 == data.len()
        };

        if is_literal(byte) || ((byte == b' ' || byte == b'\t') && !at_line_end) {
            emit(&[byte], &mut out, &mut column);
        } else {
            emit(
                &[b'=', HEX_DIGITS[(byte >> 4) as usize], HEX_DIGITS[(byte & 15) as usize]],
                &mut out,
                &mut column,
            );
        }
        index += 1;
    }

    out
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

/// Tolerant quoted-printable decode. Soft breaks disappear, `=XX`
/// sequences become bytes, trailing whitespace before a line break is
/// dropped. Returns `None` for malformed escape sequences, which callers
/// use to fall back to the raw payload.
pub fn try_decode(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut trailing_ws = 0usize;
    let mut index = 0;

    while index < data.len() {
        match data[index] {
            b'=' => {
                // soft break: '=' CR? LF
                let mut lookahead = index + 1;
                if data.get(lookahead) == Some(&b'\r') {
                    lookahead += 1;
                }
                if data.get(lookahead) == Some(&b'\n') {
                    index = lookahead + 1;
                    trailing_ws = 0;
                    continue;
                }
                let high = hex_value(*data.get(index + 1)?)?;
                let low = hex_value(*data.get(index + 2)?)?;
                out.push((high << 4) | low);
                trailing_ws = 0;
                index += 3;
            }
            b'\r' => {
                index += 1;
            }
            b'\n' => {
                out.truncate(out.len() - trailing_ws);
                out.extend_from_slice(b"\r\n");
                trailing_ws = 0;
                index += 1;
            }
            byte => {
                if byte == b' ' || byte == b'\t' {
                    trailing_ws += 1;
                } else {
                    trailing_ws = 0;
                }
                out.push(byte);
                index += 1;
            }
        }
    }

    Some(out)
}

/// Decode the RFC 2047 "Q" variant: underscores are spaces and there are
/// no line breaks inside a single encoded word.
pub fn try_decode_q(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut index = 0;
    while index < data.len() {
        match data[index] {
            b'=' => {
                let high = hex_value(*data.get(index + 1)?)?;
                let low = hex_value(*data.get(index + 2)?)?;
                out.push((high << 4) | low);
                index += 3;
            }
            b'_' => {
                out.push(b' ');
                index += 1;
            }
            byte => {
                out.push(byte);
                index += 1;
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_non_ascii() {
        let encoded = encode("caf\u{e9}".as_bytes(), 76, true);
        // UTF-8 é is C3 A9
        assert_eq!(encoded, b"caf=C3=A9");
    }

    #[test]
    fn equals_sign_is_escaped() {
        assert_eq!(encode(b"a=b", 76, false), b"a=3Db");
    }

    #[test]
    fn text_mode_keeps_hard_breaks() {
        let encoded = encode(b"line one\r\nline two", 76, true);
        assert_eq!(encoded, b"line one\r\nline two");
    }

    #[test]
    fn binary_mode_encodes_line_breaks() {
        let encoded = encode(b"a\r\nb", 76, false);
        assert_eq!(encoded, b"a=0D=0Ab");
    }

    #[test]
    fn soft_breaks_bound_line_length() {
        let encoded = encode(&[b'x'; 200], 76, false);
        for line in encoded.split(|&b| b == b'\n') {
            assert!(line.len() <= 76);
        }
        assert_eq!(try_decode(&encoded).unwrap(), vec![b'x'; 200]);
    }

    #[test]
    fn trailing_whitespace_encoded_before_break() {
        let encoded = encode(b"word \r\nnext", 76, true);
        assert_eq!(encoded, b"word=20\r\nnext");
    }

    #[test]
    fn decode_handles_soft_break_and_escapes() {
        assert_eq!(try_decode(b"foo=\r\nbar").unwrap(), b"foobar");
        assert_eq!(try_decode(b"=48=65=6C=6Co").unwrap(), b"Hello");
        assert!(try_decode(b"bad=GG").is_none());
        assert!(try_decode(b"truncated=4").is_none());
    }

    #[test]
    fn q_variant_decodes_underscores() {
        assert_eq!(try_decode_q(b"Hello_=E9").unwrap(), b"Hello \xe9");
    }
}
