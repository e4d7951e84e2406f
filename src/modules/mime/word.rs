// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::charset::{convert, Charset};
use crate::modules::encoding::{base64 as base64_codec, quoted_printable};
use crate::modules::error::MailForgeResult;
use crate::modules::mime::{
    Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Maximum length of one `=?..?=` encoded word, including delimiters
/// (RFC 2047 §2).
pub const MAX_ENCODED_WORD_LENGTH: usize = 75;

/// One atom of header text: a byte buffer tagged with its charset.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Word {
    buffer: Vec<u8>,
    charset: Charset,
    bounds: ParsedBounds,
}

impl Word {
    pub fn new(charset: Charset, buffer: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: buffer.into(),
            charset,
            bounds: ParsedBounds::default(),
        }
    }

    pub fn ascii(text: &str) -> Self {
        Self::new(Charset::us_ascii(), text.as_bytes().to_vec())
    }

    pub fn utf8(text: &str) -> Self {
        Self::new(Charset::utf_8(), text.as_bytes().to_vec())
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    pub fn set_buffer(&mut self, buffer: Vec<u8>) {
        self.buffer = buffer;
    }

    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether this word must be emitted as an encoded word: any byte
    /// outside printable ASCII, not counting CR, LF, TAB and DEL.
    pub fn needs_encoding(&self) -> bool {
        self.buffer
            .iter()
            .any(|&b| b >= 0x7f || (b < 0x20 && !matches!(b, b'\r' | b'\n' | b'\t')))
    }

    /// The buffer converted to `dest`. The `unknown-8bit` sentinel and
    /// unknown charsets pass bytes through unchanged.
    pub fn converted_buffer(&self, dest: &Charset) -> Vec<u8> {
        if &self.charset == dest || !self.charset.is_recognized() {
            return self.buffer.clone();
        }
        convert(&self.buffer, &self.charset, dest).unwrap_or_else(|_| self.buffer.clone())
    }

    /// Decode one `=?charset?Q|B?payload?=` form starting at `start`.
    /// Returns the decoded word and the position one past the closing
    /// `?=`. The decoder is tolerant: an unknown charset or invalid
    /// payload yields the raw payload tagged `unknown-8bit`.
    pub(crate) fn parse_encoded_word(
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> Option<(Word, usize)> {
        let bytes = &buffer[start..end];
        if !bytes.starts_with(b"=?") {
            return None;
        }

        let charset_end = bytes[2..].iter().position(|&b| b == b'?')? + 2;
        let charset_spec = std::str::from_utf8(&bytes[2..charset_end]).ok()?;
        // an optional RFC 2231 language tag follows '*'
        let charset_name = charset_spec.split('*').next().unwrap_or(charset_spec);
        if charset_name.is_empty() {
            return None;
        }

        let encoding_char = *bytes.get(charset_end + 1)?;
        if bytes.get(charset_end + 2) != Some(&b'?') {
            return None;
        }
        let payload_start = charset_end + 3;
        let payload_length = bytes[payload_start..]
            .windows(2)
            .position(|pair| pair == b"?=")?;
        let payload = &bytes[payload_start..payload_start + payload_length];
        let consumed = start + payload_start + payload_length + 2;

        let decoded = match encoding_char {
            b'Q' | b'q' => quoted_printable::try_decode_q(payload),
            b'B' | b'b' => base64_codec::try_decode(payload),
            _ => return None,
        };

        let charset = Charset::new(charset_name);
        let word = match decoded {
            Some(raw) if charset.is_recognized() => Word::new(charset, raw),
            _ => Word::new(Charset::unknown_8bit(), payload.to_vec()),
        };
        Some((word, consumed))
    }

    /// Generate this word, encoding when forced or required, splitting
    /// long content into adjacent encoded words.
    pub(crate) fn generate_word(
        &self,
        writer: &mut FoldingWriter<'_>,
        force_encoding: bool,
    ) -> MailForgeResult<()> {
        if !force_encoding && !self.needs_encoding() {
            writer.write_atom(&self.buffer)?;
            return Ok(());
        }

        let use_q = {
            let safe = self
                .buffer
                .iter()
                .filter(|&&b| is_q_safe(b) || b == b' ')
                .count();
            safe * 4 >= self.buffer.len() * 3
        };

        let chunks = self.split_chunks(use_q);
        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 {
                writer.write_raw(b" ")?;
            }
            let payload = if use_q {
                q_encode(chunk)
            } else {
                STANDARD.encode(chunk)
            };
            let encoded = format!(
                "=?{}?{}?{}?=",
                self.charset.name(),
                if use_q { 'Q' } else { 'B' },
                payload
            );
            writer.write_atom(encoded.as_bytes())?;
        }
        Ok(())
    }

    /// Split the buffer so every encoded word stays at or under 75
    /// characters. UTF-8 content splits on code-point boundaries,
    /// single-byte charsets on byte boundaries.
    fn split_chunks(&self, use_q: bool) -> Vec<Vec<u8>> {
        let overhead = self.charset.name().len() + 7;
        let payload_budget = MAX_ENCODED_WORD_LENGTH.saturating_sub(overhead).max(4);
        let utf8 = self.charset == Charset::utf_8();

        let mut chunks = Vec::new();
        let mut current = Vec::new();
        let mut current_cost = 0usize;

        let mut index = 0;
        while index < self.buffer.len() {
            let unit_length = if utf8 {
                utf8_sequence_length(self.buffer[index]).min(self.buffer.len() - index)
            } else {
                1
            };
            let unit = &self.buffer[index..index + unit_length];
            let cost = if use_q {
                unit.iter()
                    .map(|&b| if is_q_safe(b) || b == b' ' { 1 } else { 3 })
                    .sum()
            } else {
                // base64 grows in 4-char groups per 3 input bytes
                unit_length * 4 / 3 + 4
            };

            let fits = if use_q {
                current_cost + cost <= payload_budget
            } else {
                (current.len() + unit_length).div_ceil(3) * 4 <= payload_budget
            };
            if !fits && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_cost = 0;
            }
            current.extend_from_slice(unit);
            current_cost += cost;
            index += unit_length;
        }
        if !current.is_empty() || chunks.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

fn utf8_sequence_length(first_byte: u8) -> usize {
    match first_byte {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

/// Characters that survive "Q" encoding unchanged (RFC 2047 §4.2).
fn is_q_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'!' | b'*' | b'+' | b'-' | b'/')
}

fn q_encode(data: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(data.len());
    for &byte in data {
        if byte == b' ' {
            out.push('_');
        } else if is_q_safe(byte) {
            out.push(byte as char);
        } else {
            out.push('=');
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 15) as usize] as char);
        }
    }
    out
}

impl Component for Word {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        if let Some((word, consumed)) = Word::parse_encoded_word(buffer, start, end) {
            self.buffer = word.buffer;
            self.charset = word.charset;
            self.bounds = ParsedBounds {
                start,
                end: consumed,
            };
            return Ok(consumed);
        }
        self.buffer = buffer[start..end].to_vec();
        self.charset = ctx.default_charset.clone();
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
        self.generate_word(&mut writer, false)?;
        Ok(writer.column())
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::mime::generate_to_string;

    #[test]
    fn ascii_word_stays_plain() {
        let word = Word::ascii("Hello");
        assert!(!word.needs_encoding());
        assert_eq!(generate_to_string(&word).unwrap(), "Hello");
    }

    #[test]
    fn latin1_word_q_encodes() {
        let word = Word::new(Charset::iso_8859_1(), b"Hello \xe9".to_vec());
        assert!(word.needs_encoding());
        assert_eq!(
            generate_to_string(&word).unwrap(),
            "=?iso-8859-1?Q?Hello_=E9?="
        );
    }

    #[test]
    fn mostly_binary_word_b_encodes() {
        let word = Word::new(Charset::utf_8(), "日本語テキスト".as_bytes().to_vec());
        let generated = generate_to_string(&word).unwrap();
        assert!(generated.starts_with("=?utf-8?B?"), "{}", generated);
    }

    #[test]
    fn decode_q_encoded_word() {
        let source = b"=?iso-8859-1?Q?Hello_=E9?=";
        let (word, consumed) = Word::parse_encoded_word(source, 0, source.len()).unwrap();
        assert_eq!(consumed, source.len());
        assert_eq!(word.charset(), &Charset::iso_8859_1());
        assert_eq!(word.buffer(), b"Hello \xe9");
    }

    #[test]
    fn decode_b_encoded_word() {
        let source = b"=?utf-8?B?Y2Fmw6k=?=";
        let (word, _) = Word::parse_encoded_word(source, 0, source.len()).unwrap();
        assert_eq!(word.buffer(), "café".as_bytes());
    }

    #[test]
    fn unknown_charset_falls_back_to_raw() {
        let source = b"=?x-fancy-charset?Q?data?=";
        let (word, _) = Word::parse_encoded_word(source, 0, source.len()).unwrap();
        assert_eq!(word.charset(), &Charset::unknown_8bit());
        assert_eq!(word.buffer(), b"data");
    }

    #[test]
    fn invalid_payload_falls_back_to_raw() {
        let source = b"=?utf-8?B?###?=";
        let (word, _) = Word::parse_encoded_word(source, 0, source.len()).unwrap();
        assert_eq!(word.charset(), &Charset::unknown_8bit());
        assert_eq!(word.buffer(), b"###");
    }

    #[test]
    fn language_tag_is_ignored() {
        let source = b"=?utf-8*en?Q?cat?=";
        let (word, _) = Word::parse_encoded_word(source, 0, source.len()).unwrap();
        assert_eq!(word.charset(), &Charset::utf_8());
        assert_eq!(word.buffer(), b"cat");
    }

    #[test]
    fn long_words_split_under_limit() {
        let word = Word::utf8(&"é".repeat(100));
        let generated = generate_to_string(&word).unwrap();
        for atom in generated.split_whitespace() {
            assert!(atom.len() <= MAX_ENCODED_WORD_LENGTH, "{}", atom);
            assert!(atom.starts_with("=?utf-8?"));
            assert!(atom.ends_with("?="));
        }
        assert!(generated.split_whitespace().count() > 1);
    }
}
