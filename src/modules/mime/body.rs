// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Body parsing and generation, including the multipart state machine:
//! boundary discovery and recovery, prolog/epilog capture and nested
//! part parsing.

use crate::modules::charset::Charset;
use crate::modules::content::{ContentHandler, EmptyContentHandler, StringContentHandler};
use crate::modules::encoding::Encoding;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::header::Header;
use crate::modules::mime::mediatype::MediaType;
use crate::modules::mime::part::BodyPart;
use crate::modules::mime::{Component, GenerationContext, ParsedBounds, ParsingContext};
use crate::modules::stream::OutputStream;
use std::sync::Arc;

/// Longest boundary accepted during discovery (RFC 2046 §5.1.1).
const MAX_BOUNDARY_LENGTH: usize = 70;

fn is_boundary_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?'
                | b' '
        )
}

/// A body: either content behind a handler, or an ordered list of child
/// parts with prolog/epilog text. `part_count() == 0` selects content.
#[derive(Clone)]
pub struct Body {
    content: Arc<dyn ContentHandler>,
    parts: Vec<BodyPart>,
    prolog: String,
    epilog: String,
    boundary: Option<String>,
    content_type: MediaType,
    encoding: Encoding,
    charset: Charset,
    bounds: ParsedBounds,
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body")
            .field("content_type", &self.content_type)
            .field("encoding", &self.encoding)
            .field("parts", &self.parts.len())
            .field("length", &self.content.length())
            .finish()
    }
}

impl Default for Body {
    fn default() -> Self {
        Self {
            content: Arc::new(EmptyContentHandler),
            parts: Vec::new(),
            prolog: String::new(),
            epilog: String::new(),
            boundary: None,
            content_type: MediaType::text_plain(),
            encoding: Encoding::seven_bit(),
            charset: Charset::us_ascii(),
            bounds: ParsedBounds::default(),
        }
    }
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &Arc<dyn ContentHandler> {
        &self.content
    }

    pub fn set_contents(&mut self, handler: Arc<dyn ContentHandler>) {
        self.content = handler;
        self.parts.clear();
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn parts(&self) -> &[BodyPart] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut Vec<BodyPart> {
        &mut self.parts
    }

    pub fn part_at(&self, index: usize) -> Option<&BodyPart> {
        self.parts.get(index)
    }

    /// Append a child part. Importing a part this way detaches it from
    /// wherever it lived before; the body owns its parts.
    pub fn append_part(&mut self, part: BodyPart) {
        self.parts.push(part);
    }

    pub fn remove_all_parts(&mut self) -> Vec<BodyPart> {
        std::mem::take(&mut self.parts)
    }

    pub fn prolog(&self) -> &str {
        &self.prolog
    }

    pub fn epilog(&self) -> &str {
        &self.epilog
    }

    pub fn set_prolog(&mut self, prolog: &str) {
        self.prolog = prolog.to_string();
    }

    pub fn set_epilog(&mut self, epilog: &str) {
        self.epilog = epilog.to_string();
    }

    /// The boundary discovered at parse time or set for generation.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub fn set_boundary(&mut self, boundary: &str) {
        self.boundary = Some(boundary.to_string());
    }

    /// Content type inherited from the owning part's header.
    pub fn content_type(&self) -> &MediaType {
        &self.content_type
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    pub fn set_content_type(&mut self, content_type: MediaType) {
        self.content_type = content_type;
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    /// Parse this body from `buffer[start..end]`, guided by the owning
    /// part's header.
    pub(crate) fn parse_region(
        &mut self,
        ctx: &ParsingContext,
        buffer: &Arc<Vec<u8>>,
        start: usize,
        end: usize,
        header: &Header,
    ) -> MailForgeResult<usize> {
        self.content_type = header.content_type();
        self.encoding = header.content_transfer_encoding();
        self.charset = header.content_charset();
        self.parts.clear();
        self.prolog.clear();
        self.epilog.clear();
        self.boundary = None;
        self.bounds = ParsedBounds { start, end };

        if self.content_type.is_multipart() {
            let declared = header
                .field(crate::modules::mime::registry::fields::CONTENT_TYPE)
                .and_then(|field| field.boundary().ok().flatten());
            let boundary = match declared {
                Some(boundary) if !boundary.is_empty() => Some(boundary),
                _ => discover_boundary(&buffer[start..end]),
            };

            if let Some(boundary) = boundary {
                self.boundary = Some(boundary.clone());
                self.parse_multipart(ctx, buffer, start, end, boundary.as_bytes())?;
                return Ok(end);
            }
            // multipart without a usable boundary: single-part recovery
        }

        self.content = Arc::new(StringContentHandler::region(
            buffer.clone(),
            start,
            end - start,
            self.encoding.clone(),
        ));
        Ok(end)
    }

    fn parse_multipart(
        &mut self,
        ctx: &ParsingContext,
        buffer: &Arc<Vec<u8>>,
        start: usize,
        end: usize,
        boundary: &[u8],
    ) -> MailForgeResult<usize> {
        let data = &buffer[..end];
        let mut delimiters: Vec<(usize, usize, bool)> = Vec::new(); // (delimiter_start, content_start_after, last?)
        let mut search_from = start;

        while let Some((delimiter_start, text_end)) =
            find_next_boundary(data, search_from, boundary)
        {
            let mut after = text_end;
            let is_last = data.get(after..after + 2) == Some(b"--");
            if is_last {
                after += 2;
            }
            // whitespace at the end of a boundary line was added by a
            // gateway and must be dropped (RFC 2046 §5.1.1)
            while matches!(data.get(after), Some(b' ') | Some(b'\t')) {
                after += 1;
            }
            if data.get(after) == Some(&b'\r') && data.get(after + 1) == Some(&b'\n') {
                after += 2;
            } else if data.get(after) == Some(&b'\n') {
                after += 1;
            }

            delimiters.push((delimiter_start, after, is_last));
            search_from = after;
            if is_last {
                break;
            }
        }

        if delimiters.is_empty() {
            // no delimiter found at all: tolerant single-part recovery
            self.content = Arc::new(StringContentHandler::region(
                buffer.clone(),
                start,
                end - start,
                self.encoding.clone(),
            ));
            self.boundary = None;
            return Ok(end);
        }

        // the first delimiter may reach back before the body (its line
        // break is the header separator); there is no prolog then
        let first_delimiter = delimiters[0].0;
        self.prolog = if first_delimiter > start {
            String::from_utf8_lossy(&data[start..first_delimiter]).into_owned()
        } else {
            String::new()
        };

        for window in delimiters.windows(2) {
            let (_, content_start, _) = window[0];
            let (next_delimiter_start, _, _) = window[1];
            // end before start happens on empty parts (directly
            // successive boundaries without even a line break)
            let (part_start, part_end) = if next_delimiter_start < content_start {
                (next_delimiter_start, content_start)
            } else {
                (content_start, next_delimiter_start)
            };
            let mut part = BodyPart::new();
            part.parse_region(ctx, buffer, part_start, part_end)?;
            self.parts.push(part);
        }

        let (_, last_content_start, terminated) = *delimiters.last().expect("non-empty");
        if terminated {
            self.epilog = String::from_utf8_lossy(&data[last_content_start..end]).into_owned();
        } else {
            // missing terminating boundary: the remainder is one more
            // recovered child part
            let mut part = BodyPart::new();
            part.parse_region(ctx, buffer, last_content_start, end)?;
            self.parts.push(part);
        }

        self.content = Arc::new(EmptyContentHandler);
        Ok(end)
    }

    /// Generate this body. `boundary_override` is the boundary declared
    /// on the owning header, when present.
    pub(crate) fn generate_with_boundary(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        boundary_override: Option<&str>,
    ) -> MailForgeResult<()> {
        if self.parts.is_empty() {
            self.content
                .generate(out, &self.encoding, ctx.max_line_length.max(1))?;
            return Ok(());
        }

        let generated;
        let boundary = match boundary_override.or(self.boundary.as_deref()) {
            Some(boundary) => boundary,
            None => {
                generated = crate::modules::utils::random_boundary();
                generated.as_str()
            }
        };

        let prolog = if self.prolog.is_empty() {
            ctx.prolog_text.as_str()
        } else {
            self.prolog.as_str()
        };
        let epilog = if self.epilog.is_empty() {
            ctx.epilog_text.as_str()
        } else {
            self.epilog.as_str()
        };

        if !prolog.is_empty() {
            out.write(prolog.as_bytes())?;
        }
        out.write(b"\r\n--")?;
        out.write(boundary.as_bytes())?;

        for part in &self.parts {
            out.write(b"\r\n")?;
            part.generate(ctx, out, 0)?;
            out.write(b"\r\n--")?;
            out.write(boundary.as_bytes())?;
        }

        out.write(b"--\r\n")?;
        if !epilog.is_empty() {
            out.write(epilog.as_bytes())?;
        }
        Ok(())
    }
}

/// Plain byte search at or after `from`.
fn find_bytes(data: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || from >= data.len() {
        return None;
    }
    data[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

/// Locate the next boundary delimiter at or after `from`: find the bare
/// boundary text, skip SPACE/TAB transport padding between the dashes
/// and the text, then require the `[CR]LF--` prefix and a CR, LF or
/// dash after the text. The preceding line break may sit before the
/// body range (the header separator serves for a boundary on the very
/// first line). Returns the delimiter line start (including its
/// `[CR]LF`) and the position one past the boundary text.
fn find_next_boundary(data: &[u8], from: usize, boundary: &[u8]) -> Option<(usize, usize)> {
    let mut search_from = from;
    loop {
        let position = find_bytes(data, search_from, boundary)?;
        search_from = position + 1;
        if position == 0 {
            continue;
        }

        // transport padding between "--" and the boundary text
        let mut advance = 0;
        while position - advance > 0 && matches!(data[position - advance - 1], b' ' | b'\t') {
            advance += 1;
        }
        if position - advance < 3
            || &data[position - advance - 3..position - advance] != b"\n--"
        {
            continue;
        }

        // the boundary must be followed by a line break or a dash
        let text_end = position + boundary.len();
        if !matches!(data.get(text_end), Some(b'\r') | Some(b'\n') | Some(b'-')) {
            continue;
        }

        let mut delimiter_start = position - advance - 3;
        if delimiter_start >= 1 && data[delimiter_start - 1] == b'\r' {
            delimiter_start -= 1;
        }
        return Some((delimiter_start, text_end));
    }
}

/// Scan a body for `[LF]--` followed by 1–70 boundary characters
/// terminated by CR, LF or a hyphen pair, trimming trailing whitespace.
/// Used when a multipart header carries no `boundary` parameter.
fn discover_boundary(data: &[u8]) -> Option<String> {
    let mut position = 0;
    while position < data.len() {
        let at_line_start = position == 0 || data[position - 1] == b'\n';
        if at_line_start && data.get(position..position + 2) == Some(b"--") {
            let mut candidate_start = position + 2;
            // transport padding between the dashes and the boundary text
            while matches!(data.get(candidate_start), Some(b' ') | Some(b'\t')) {
                candidate_start += 1;
            }
            let mut candidate_end = candidate_start;
            while candidate_end < data.len()
                && candidate_end - candidate_start <= MAX_BOUNDARY_LENGTH
                && is_boundary_char(data[candidate_end])
            {
                candidate_end += 1;
            }
            let terminated = matches!(
                data.get(candidate_end),
                None | Some(b'\r') | Some(b'\n') | Some(b'-')
            );
            if terminated {
                let mut trimmed_end = candidate_end;
                while trimmed_end > candidate_start
                    && data[trimmed_end - 1].is_ascii_whitespace()
                {
                    trimmed_end -= 1;
                }
                let length = trimmed_end - candidate_start;
                if (1..=MAX_BOUNDARY_LENGTH).contains(&length) {
                    return Some(
                        String::from_utf8_lossy(&data[candidate_start..trimmed_end]).into_owned(),
                    );
                }
            }
        }
        position += 1;
    }
    None
}

impl Component for Body {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let shared = Arc::new(buffer[start..end].to_vec());
        let header = Header::new();
        let length = shared.len();
        self.parse_region(ctx, &shared, 0, length, &header)?;
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        _cur_col: usize,
    ) -> MailForgeResult<usize> {
        self.generate_with_boundary(ctx, out, None)?;
        Ok(0)
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_discovery_finds_first_candidate() {
        let data = b"Preamble\r\n--frontier\r\ncontent\r\n--frontier--\r\n";
        assert_eq!(discover_boundary(data).as_deref(), Some("frontier"));
    }

    #[test]
    fn boundary_discovery_rejects_overlong_candidates() {
        let mut data = b"--".to_vec();
        data.extend(vec![b'a'; 80]);
        data.extend_from_slice(b"\r\n");
        assert_eq!(discover_boundary(&data), None);
    }

    #[test]
    fn boundary_discovery_trims_trailing_whitespace() {
        let data = b"\r\n--edge  \r\n";
        assert_eq!(discover_boundary(data).as_deref(), Some("edge"));
    }
}
