// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::charset::Charset;
use crate::modules::encoding::Encoding;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::field::{FieldValue, HeaderField};
use crate::modules::mime::mediatype::MediaType;
use crate::modules::mime::registry::fields;
use crate::modules::mime::{
    Component, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;
use crate::raise_error;

/// An ordered header block. Duplicate field names are permitted;
/// lookups return the first match.
#[derive(Clone, Debug, Default)]
pub struct Header {
    fields: Vec<HeaderField>,
    bounds: ParsedBounds,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn append(&mut self, field: HeaderField) {
        self.fields.push(field);
    }

    /// First field with the given name.
    pub fn field(&self, name: &str) -> Option<&HeaderField> {
        self.fields.iter().find(|field| field.is_named(name))
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut HeaderField> {
        self.fields.iter_mut().find(|field| field.is_named(name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// All fields with the given name, in order.
    pub fn fields_named(&self, name: &str) -> Vec<&HeaderField> {
        self.fields
            .iter()
            .filter(|field| field.is_named(name))
            .collect()
    }

    /// First field with the given name, or an error carrying the name.
    pub fn expect_field(&self, name: &str) -> MailForgeResult<&HeaderField> {
        self.field(name).ok_or_else(|| {
            raise_error!(
                format!("header has no '{}' field", name),
                ErrorCode::NoSuchField
            )
        })
    }

    /// Get-or-create a field, returning it for mutation.
    pub fn field_or_create(&mut self, name: &str, value: FieldValue) -> &mut HeaderField {
        if let Some(position) = self.fields.iter().position(|field| field.is_named(name)) {
            return &mut self.fields[position];
        }
        self.fields.push(HeaderField::with_value(name, value));
        self.fields.last_mut().expect("just pushed")
    }

    /// Replace (or create) the value of the first field with this name.
    pub fn set_field_value(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|field| field.is_named(name)) {
            Some(field) => field.set_value(value),
            None => self.fields.push(HeaderField::with_value(name, value)),
        }
    }

    /// Remove the first field with this name; true when one existed.
    pub fn remove_field(&mut self, name: &str) -> bool {
        match self.fields.iter().position(|field| field.is_named(name)) {
            Some(position) => {
                self.fields.remove(position);
                true
            }
            None => false,
        }
    }

    /// Remove every field with this name.
    pub fn remove_all_fields(&mut self, name: &str) {
        self.fields.retain(|field| !field.is_named(name));
    }

    pub fn remove_at(&mut self, index: usize) -> Option<HeaderField> {
        if index < self.fields.len() {
            Some(self.fields.remove(index))
        } else {
            None
        }
    }

    // Typed convenience accessors used throughout the body engine.

    /// The `Content-Type` media type, `text/plain` when absent.
    pub fn content_type(&self) -> MediaType {
        self.field(fields::CONTENT_TYPE)
            .and_then(|field| field.value().ok())
            .and_then(|value| value.as_media_type().ok().cloned())
            .unwrap_or_default()
    }

    /// The declared transfer encoding, `7bit` when absent.
    pub fn content_transfer_encoding(&self) -> Encoding {
        self.field(fields::CONTENT_TRANSFER_ENCODING)
            .and_then(|field| field.value().ok())
            .and_then(|value| value.as_encoding().ok().cloned())
            .unwrap_or_default()
    }

    /// The `charset` parameter of Content-Type, us-ascii when absent.
    pub fn content_charset(&self) -> Charset {
        self.field(fields::CONTENT_TYPE)
            .and_then(|field| field.charset_parameter().ok().flatten())
            .unwrap_or_default()
    }
}

impl Component for Header {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        self.fields.clear();
        let mut position = start;

        while position < end {
            // blank line terminates the header block
            if buffer[position] == b'\n' {
                position += 1;
                break;
            }
            if buffer[position] == b'\r' && buffer.get(position + 1) == Some(&b'\n') {
                position += 2;
                break;
            }

            // logical line: physical line plus folded continuations
            let line_start = position;
            let mut line_end = position;
            loop {
                while line_end < end && buffer[line_end] != b'\n' {
                    line_end += 1;
                }
                if line_end < end {
                    line_end += 1;
                }
                if line_end < end && matches!(buffer[line_end], b' ' | b'\t') {
                    continue;
                }
                break;
            }
            position = line_end;

            // strip the trailing line break from the logical line
            let mut content_end = line_end;
            if content_end > line_start && buffer[content_end - 1] == b'\n' {
                content_end -= 1;
            }
            if content_end > line_start && buffer[content_end - 1] == b'\r' {
                content_end -= 1;
            }

            let line = &buffer[line_start..content_end];
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                if ctx.strict {
                    return Err(raise_error!(
                        format!(
                            "malformed header line: '{}'",
                            String::from_utf8_lossy(line)
                        ),
                        ErrorCode::ParseError
                    ));
                }
                continue;
            };

            let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
            if name.is_empty() {
                continue;
            }
            let mut body_start = colon + 1;
            if line.get(body_start) == Some(&b' ') {
                body_start += 1;
            }

            let mut field = HeaderField::create(&name, &line[body_start..], ctx);
            field.parse(
                ctx,
                buffer,
                line_start + body_start,
                line_start + line.len(),
            )?;
            self.fields.push(field);
        }

        self.bounds = ParsedBounds {
            start,
            end: position,
        };
        Ok(position)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        _cur_col: usize,
    ) -> MailForgeResult<usize> {
        for field in &self.fields {
            field.generate(ctx, out, 0)?;
            out.write(b"\r\n")?;
        }
        Ok(0)
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[u8]) -> Header {
        let mut header = Header::new();
        header
            .parse(&ParsingContext::default(), raw, 0, raw.len())
            .unwrap();
        header
    }

    #[test]
    fn parses_fields_until_blank_line() {
        let raw = b"Subject: Hi\r\nTo: a@b.org\r\n\r\nbody";
        let mut header = Header::new();
        let consumed = header
            .parse(&ParsingContext::default(), raw, 0, raw.len())
            .unwrap();
        assert_eq!(header.field_count(), 2);
        assert_eq!(&raw[consumed..], b"body");
    }

    #[test]
    fn folded_field_spans_lines() {
        let header = parse(b"Subject: part one\r\n part two\r\n\r\n");
        let value = header.field("Subject").unwrap().value().unwrap();
        assert_eq!(
            value.as_text().unwrap().to_utf8_lossy(),
            "part one part two"
        );
    }

    #[test]
    fn duplicate_fields_keep_order_and_first_wins() {
        let header = parse(b"Received: from a\r\nReceived: from b\r\n\r\n");
        assert_eq!(header.fields_named("Received").len(), 2);
        let first = header.field("Received").unwrap().value().unwrap();
        assert_eq!(first.as_received().unwrap().from(), "a");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let header = parse(b"SUBJECT: x\r\n\r\n");
        assert!(header.has_field("subject"));
    }

    #[test]
    fn malformed_line_is_skipped_in_tolerant_mode() {
        let header = parse(b"garbage line\r\nSubject: ok\r\n\r\n");
        assert_eq!(header.field_count(), 1);
    }

    #[test]
    fn malformed_line_fails_in_strict_mode() {
        let ctx = ParsingContext {
            strict: true,
            ..Default::default()
        };
        let mut header = Header::new();
        assert!(header
            .parse(&ctx, b"garbage line\r\n\r\n", 0, 16)
            .is_err());
    }

    #[test]
    fn generation_round_trips() {
        let raw = b"Subject: Hello\r\nTo: a@b.org\r\n";
        let header = parse(raw);
        let mut out = crate::modules::stream::VecOutputStream::new();
        header
            .generate(&GenerationContext::default(), &mut out, 0)
            .unwrap();
        assert_eq!(out.as_bytes(), raw);
    }

    #[test]
    fn content_accessors_fall_back_to_defaults() {
        let header = parse(b"Subject: x\r\n\r\n");
        assert_eq!(header.content_type(), MediaType::text_plain());
        assert_eq!(header.content_transfer_encoding(), Encoding::seven_bit());
        assert_eq!(header.content_charset(), Charset::us_ascii());
    }
}
