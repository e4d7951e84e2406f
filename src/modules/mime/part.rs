// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::body::Body;
use crate::modules::mime::header::Header;
use crate::modules::mime::registry::fields;
use crate::modules::mime::{Component, GenerationContext, ParsedBounds, ParsingContext};
use crate::modules::stream::{OutputStream, VecOutputStream};
use std::sync::Arc;

/// A header plus a body. The part tree is an owned tree: a body owns
/// its child parts, and ancestry is carried on the call stack during
/// traversal rather than through back-pointers.
#[derive(Clone, Debug, Default)]
pub struct BodyPart {
    header: Header,
    body: Body,
    bounds: ParsedBounds,
}

/// A root body part used as a complete RFC 5322 message.
pub type Message = BodyPart;

impl BodyPart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header_and_body(header: Header, body: Body) -> Self {
        Self {
            header,
            body,
            bounds: ParsedBounds::default(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Parse a complete message from owned bytes.
    pub fn parse_message(ctx: &ParsingContext, data: Vec<u8>) -> MailForgeResult<Self> {
        let shared = Arc::new(data);
        let mut part = Self::new();
        let length = shared.len();
        part.parse_region(ctx, &shared, 0, length)?;
        Ok(part)
    }

    /// Generate the complete wire form.
    pub fn to_bytes(&self, ctx: &GenerationContext) -> MailForgeResult<Vec<u8>> {
        let mut out = VecOutputStream::new();
        self.generate(ctx, &mut out, 0)?;
        Ok(out.into_bytes())
    }

    pub(crate) fn parse_region(
        &mut self,
        ctx: &ParsingContext,
        buffer: &Arc<Vec<u8>>,
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let body_start = self.header.parse(ctx, buffer, start, end)?;
        self.body
            .parse_region(ctx, buffer, body_start, end, &self.header)?;
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    /// Build a leaf part: Content-Type (with optional charset
    /// parameter), Content-Transfer-Encoding, and contents.
    pub fn build(
        media_type: crate::modules::mime::mediatype::MediaType,
        charset: Option<&crate::modules::charset::Charset>,
        encoding: crate::modules::encoding::Encoding,
        contents: std::sync::Arc<dyn crate::modules::content::ContentHandler>,
    ) -> Self {
        use crate::modules::mime::field::{FieldValue, HeaderField};
        use crate::modules::mime::word::Word;

        let mut part = BodyPart::new();
        let mut content_type_field = HeaderField::with_value(
            fields::CONTENT_TYPE,
            FieldValue::MediaType(media_type.clone()),
        );
        if let Some(charset) = charset {
            let _ = content_type_field.set_parameter("charset", Word::ascii(charset.name()));
        }
        part.header_mut().append(content_type_field);
        part.header_mut().set_field_value(
            fields::CONTENT_TRANSFER_ENCODING,
            FieldValue::Encoding(encoding.clone()),
        );
        part.body_mut().set_contents(contents);
        part.body_mut().set_content_type(media_type);
        if let Some(charset) = charset {
            part.body_mut().set_charset(charset.clone());
        }
        part.body_mut().set_encoding(encoding);
        part
    }

    /// Walk this part and its descendants depth-first, calling
    /// `visit(part, is_root)` on each.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a BodyPart, bool)) {
        fn inner<'a>(
            part: &'a BodyPart,
            is_root: bool,
            visit: &mut dyn FnMut(&'a BodyPart, bool),
        ) {
            visit(part, is_root);
            for child in part.body().parts() {
                inner(child, false, visit);
            }
        }
        inner(self, true, visit);
    }
}

impl Component for BodyPart {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let shared = Arc::new(buffer[start..end].to_vec());
        let length = shared.len();
        self.parse_region(ctx, &shared, 0, length)?;
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        _cur_col: usize,
    ) -> MailForgeResult<usize> {
        self.header.generate(ctx, out, 0)?;
        out.write(b"\r\n")?;
        let boundary = self
            .header
            .field(fields::CONTENT_TYPE)
            .and_then(|field| field.boundary().ok().flatten());
        self.body
            .generate_with_boundary(ctx, out, boundary.as_deref())?;
        Ok(0)
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::content::extract_to_vec;

    fn parse(raw: &[u8]) -> Message {
        Message::parse_message(&ParsingContext::default(), raw.to_vec()).unwrap()
    }

    #[test]
    fn simple_message_splits_header_and_content() {
        let message = parse(b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\nhello body");
        assert_eq!(message.body().part_count(), 0);
        assert_eq!(
            extract_to_vec(message.body().contents().as_ref()).unwrap(),
            b"hello body"
        );
    }

    #[test]
    fn empty_body_parses_to_empty_content() {
        let message = parse(b"Subject: Hi\r\n\r\n");
        assert_eq!(message.body().part_count(), 0);
        assert!(message.body().contents().is_empty());
    }

    #[test]
    fn multipart_boundary_recovery_scenario() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nPreamble\r\n--foo\r\nX: 1\r\n\r\nA\r\n--foo--\r\n";
        let message = parse(raw);
        assert_eq!(message.body().prolog(), "Preamble");
        assert_eq!(message.body().epilog(), "");
        assert_eq!(message.body().part_count(), 1);

        let child = message.body().part_at(0).unwrap();
        assert!(child.header().has_field("X"));
        assert_eq!(
            extract_to_vec(child.body().contents().as_ref()).unwrap(),
            b"A"
        );

        // regenerate and re-parse: same structure
        let bytes = message.to_bytes(&GenerationContext::default()).unwrap();
        let reparsed = parse(&bytes);
        assert_eq!(reparsed.body().prolog(), "Preamble");
        assert_eq!(reparsed.body().part_count(), 1);
        assert_eq!(
            extract_to_vec(reparsed.body().part_at(0).unwrap().body().contents().as_ref())
                .unwrap(),
            b"A"
        );
    }

    #[test]
    fn declared_boundary_parameter_wins() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\r\n\r\n--outer\r\n\r\nfirst\r\n--outer\r\n\r\nsecond\r\n--outer--\r\n";
        let message = parse(raw);
        assert_eq!(message.body().part_count(), 2);
        assert_eq!(
            extract_to_vec(message.body().part_at(1).unwrap().body().contents().as_ref())
                .unwrap(),
            b"second"
        );
    }

    #[test]
    fn nested_multipart_parses_recursively() {
        let raw = b"Content-Type: multipart/mixed; boundary=out\r\n\r\n--out\r\nContent-Type: multipart/alternative; boundary=in\r\n\r\n--in\r\nContent-Type: text/plain\r\n\r\nplain\r\n--in\r\nContent-Type: text/html\r\n\r\n<p>html</p>\r\n--in--\r\n\r\n--out--\r\n";
        let message = parse(raw);
        assert_eq!(message.body().part_count(), 1);
        let nested = message.body().part_at(0).unwrap();
        assert_eq!(nested.body().part_count(), 2);
        assert_eq!(
            extract_to_vec(nested.body().part_at(1).unwrap().body().contents().as_ref())
                .unwrap(),
            b"<p>html</p>"
        );
    }

    #[test]
    fn multipart_without_discoverable_boundary_recovers_single_part() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nno boundaries here at all";
        let message = parse(raw);
        assert_eq!(message.body().part_count(), 0);
        assert_eq!(
            extract_to_vec(message.body().contents().as_ref()).unwrap(),
            b"no boundaries here at all"
        );
    }

    #[test]
    fn missing_final_boundary_recovers_trailing_part() {
        let raw = b"Content-Type: multipart/mixed; boundary=bb\r\n\r\n--bb\r\n\r\nfirst\r\n--bb\r\n\r\ntrailing without end";
        let message = parse(raw);
        assert_eq!(message.body().part_count(), 2);
        assert_eq!(
            extract_to_vec(message.body().part_at(1).unwrap().body().contents().as_ref())
                .unwrap(),
            b"trailing without end"
        );
    }

    #[test]
    fn transport_padding_between_dashes_and_boundary_is_tolerated() {
        let raw = b"Content-Type: multipart/mixed; boundary=foo\r\n\r\nPre\r\n-- \tfoo\r\n\r\nbody\r\n--foo--\r\n";
        let message = parse(raw);
        assert_eq!(message.body().prolog(), "Pre");
        assert_eq!(message.body().part_count(), 1);
        assert_eq!(
            extract_to_vec(message.body().part_at(0).unwrap().body().contents().as_ref())
                .unwrap(),
            b"body"
        );
    }

    #[test]
    fn whitespace_between_line_break_and_dashes_is_not_a_delimiter() {
        // "\n   --foo" is not a boundary line; the padding belongs
        // between the dashes and the boundary text
        let raw = b"Content-Type: multipart/mixed; boundary=foo\r\n\r\n   --foo\r\nnot a part\r\n--foo\r\n\r\nreal\r\n--foo--\r\n";
        let message = parse(raw);
        assert_eq!(message.body().prolog(), "   --foo\r\nnot a part");
        assert_eq!(message.body().part_count(), 1);
        assert_eq!(
            extract_to_vec(message.body().part_at(0).unwrap().body().contents().as_ref())
                .unwrap(),
            b"real"
        );
    }

    #[test]
    fn empty_part_between_boundaries_is_kept() {
        let raw = b"Content-Type: multipart/mixed; boundary=bb\r\n\r\n--bb\r\n--bb\r\n\r\nsecond\r\n--bb--\r\n";
        let message = parse(raw);
        assert_eq!(message.body().part_count(), 2);
        assert!(message.body().part_at(0).unwrap().body().contents().is_empty());
    }

    #[test]
    fn generated_multipart_counts_boundaries() {
        let raw = b"Content-Type: multipart/mixed; boundary=bb\r\n\r\n--bb\r\n\r\none\r\n--bb\r\n\r\ntwo\r\n--bb--\r\n";
        let message = parse(raw);
        let bytes = message.to_bytes(&GenerationContext::default()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert_eq!(text.matches("--bb").count(), 3); // partCount + 1
        assert_eq!(text.matches("--bb--").count(), 1);
    }

    #[test]
    fn prolog_and_epilog_round_trip() {
        let raw = b"Content-Type: multipart/mixed; boundary=bb\r\n\r\npre\r\n--bb\r\n\r\nbody\r\n--bb--\r\npost";
        let message = parse(raw);
        assert_eq!(message.body().prolog(), "pre");
        assert_eq!(message.body().epilog(), "post");
        let bytes = message.to_bytes(&GenerationContext::default()).unwrap();
        let reparsed = parse(&bytes);
        assert_eq!(reparsed.body().prolog(), "pre");
        assert_eq!(reparsed.body().epilog(), "post");
    }
}
