// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The component model: every parseable/generatable email object
//! (words, fields, headers, bodies, parts, addresses, dates) shares one
//! parse/generate contract over byte ranges.

use crate::modules::charset::Charset;
use crate::modules::error::MailForgeResult;
use crate::modules::stream::OutputStream;

pub mod address;
pub mod body;
pub mod datetime;
pub mod field;
pub mod header;
pub mod importance;
pub mod mediatype;
pub mod messageid;
pub mod parameter;
pub mod part;
pub mod path;
pub mod received;
pub mod registry;
pub mod text;
pub mod word;

pub mod disposition;

/// Soft line-length limit for generated headers (RFC 5322 §2.1.1).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 78;

/// Hard ceiling a generated line may never cross when folding is
/// possible (RFC 5322 §2.1.1).
pub const MAX_LINE_LENGTH_CEILING: usize = 998;

/// Knobs that flow through the parse recursion.
#[derive(Clone, Debug)]
pub struct ParsingContext {
    /// Charset assumed for raw (non encoded-word) bytes.
    pub default_charset: Charset,
    /// When true, structural errors surface instead of being recovered.
    pub strict: bool,
}

impl Default for ParsingContext {
    fn default() -> Self {
        Self {
            default_charset: Charset::us_ascii(),
            strict: false,
        }
    }
}

/// Knobs that flow through the generate recursion.
#[derive(Clone, Debug)]
pub struct GenerationContext {
    pub max_line_length: usize,
    /// Default prolog emitted before the first boundary of a multipart
    /// body that has none of its own.
    pub prolog_text: String,
    /// Default epilog emitted after the final boundary.
    pub epilog_text: String,
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            prolog_text: String::new(),
            epilog_text: String::new(),
        }
    }
}

impl GenerationContext {
    /// The effective wrap column, clamped to the RFC 5322 ceiling.
    pub fn wrap_column(&self) -> usize {
        self.max_line_length.clamp(1, MAX_LINE_LENGTH_CEILING)
    }
}

/// Byte range `[start, end)` a component was parsed from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ParsedBounds {
    pub start: usize,
    pub end: usize,
}

/// The uniform parse/generate contract shared by every email object.
///
/// `parse` consumes `buffer[start..end]` and returns the position one
/// past the last consumed byte. `generate` emits the wire form starting
/// at column `cur_col` and returns the column after the last emitted
/// byte. Parse followed by generate round-trips byte-identically, up to
/// folding whitespace.
pub trait Component {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize>;

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize>;

    fn parsed_bounds(&self) -> ParsedBounds;
}

/// Render a component to a string with default generation settings.
/// Handy for tests and header previews.
pub fn generate_to_string(component: &dyn Component) -> MailForgeResult<String> {
    let mut out = crate::modules::stream::VecOutputStream::new();
    component.generate(&GenerationContext::default(), &mut out, 0)?;
    Ok(String::from_utf8_lossy(out.as_bytes()).into_owned())
}

/// Collapse folded line breaks: every `CRLF WSP+` (or bare `LF WSP+`)
/// run becomes a single space.
pub fn unfold(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut index = 0;
    while index < data.len() {
        let byte = data[index];
        let lf_at = if byte == b'\r' && data.get(index + 1) == Some(&b'\n') {
            Some(index + 1)
        } else if byte == b'\n' {
            Some(index)
        } else {
            None
        };
        match lf_at {
            Some(lf) if matches!(data.get(lf + 1), Some(b' ') | Some(b'\t')) => {
                out.push(b' ');
                index = lf + 1;
                while matches!(data.get(index), Some(b' ') | Some(b'\t')) {
                    index += 1;
                }
            }
            _ => {
                out.push(byte);
                index += 1;
            }
        }
    }
    out
}

/// Trim ASCII whitespace from both ends of a byte range, returning the
/// trimmed `(start, end)`.
pub(crate) fn trim_range(buffer: &[u8], mut start: usize, mut end: usize) -> (usize, usize) {
    while start < end && buffer[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && buffer[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    (start, end)
}

/// Line-folding writer: tracks the output column and inserts
/// `CRLF + SP` before an atom that would cross the wrap column. Atoms
/// are never split; an unbreakable atom longer than the line simply
/// overflows and the column keeps counting.
pub struct FoldingWriter<'a> {
    out: &'a mut dyn OutputStream,
    column: usize,
    wrap_column: usize,
}

impl<'a> FoldingWriter<'a> {
    pub fn new(out: &'a mut dyn OutputStream, column: usize, wrap_column: usize) -> Self {
        Self {
            out,
            column,
            wrap_column,
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Emit an unbreakable atom, folding first when it would cross the
    /// wrap column and folding is still useful. An atom carrying its
    /// own leading whitespace provides the continuation whitespace.
    pub fn write_atom(&mut self, atom: &[u8]) -> MailForgeResult<()> {
        if self.column > 1 && self.column + atom.len() > self.wrap_column {
            if matches!(atom.first(), Some(b' ') | Some(b'\t')) {
                self.out.write(b"\r\n")?;
                self.column = 0;
            } else {
                self.out.write(b"\r\n ")?;
                self.column = 1;
            }
        }
        self.write_raw(atom)
    }

    /// Emit bytes verbatim, tracking the column across embedded line
    /// breaks.
    pub fn write_raw(&mut self, data: &[u8]) -> MailForgeResult<()> {
        self.out.write(data)?;
        match data.iter().rposition(|&b| b == b'\n') {
            Some(position) => self.column = data.len() - position - 1,
            None => self.column += data.len(),
        }
        Ok(())
    }
}
