// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Parameters of parameterized header fields, including RFC 2231
//! continuations and extended (charset-tagged, percent-encoded) values.

use crate::modules::charset::Charset;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::word::Word;
use crate::modules::mime::{FoldingWriter, ParsingContext};

/// One `name=value` parameter. The value is a charset-tagged word so
/// non-ASCII filenames survive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    name: String,
    value: Word,
}

impl Parameter {
    pub fn new(name: &str, value: Word) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            value,
        }
    }

    pub fn ascii(name: &str, value: &str) -> Self {
        Self::new(name, Word::ascii(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Word {
        &self.value
    }

    pub fn value_utf8(&self) -> String {
        String::from_utf8_lossy(&self.value.converted_buffer(&Charset::utf_8())).into_owned()
    }

    pub fn set_value(&mut self, value: Word) {
        self.value = value;
    }
}

/// Split a raw field body on top-level semicolons, honouring quoted
/// strings.
fn split_segments(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);
    segments
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        trimmed.to_string()
    }
}

struct Piece {
    index: usize,
    extended: bool,
    raw: String,
}

/// Parse a parameterized field body into its main value and ordered
/// parameter list. RFC 2231 `name*0*`/`name*1*` continuations reassemble
/// in index order; the extended form's leading `charset'lang'` tags the
/// resulting word.
pub fn parse_field_body(ctx: &ParsingContext, raw: &str) -> (String, Vec<Parameter>) {
    let mut segments = split_segments(raw).into_iter();
    let main = segments.next().unwrap_or_default().trim().to_string();

    // name -> pieces, preserving first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut pieces: std::collections::HashMap<String, Vec<Piece>> =
        std::collections::HashMap::new();

    for segment in segments {
        let Some((name_part, value_part)) = segment.split_once('=') else {
            continue;
        };
        let mut name = name_part.trim().to_ascii_lowercase();
        let mut extended = false;
        if let Some(stripped) = name.strip_suffix('*') {
            extended = true;
            name = stripped.to_string();
        }
        let mut index = 0usize;
        if let Some((base, digits)) = name.rsplit_once('*') {
            if let Ok(parsed) = digits.parse() {
                index = parsed;
                name = base.to_string();
            }
        }
        if !pieces.contains_key(&name) {
            order.push(name.clone());
        }
        pieces.entry(name).or_default().push(Piece {
            index,
            extended,
            raw: value_part.trim().to_string(),
        });
    }

    let mut parameters = Vec::new();
    for name in order {
        let mut parts = pieces.remove(&name).unwrap_or_default();
        parts.sort_by_key(|piece| piece.index);

        let mut charset = ctx.default_charset.clone();
        let mut bytes: Vec<u8> = Vec::new();
        for (position, piece) in parts.iter().enumerate() {
            if piece.extended {
                let mut raw = piece.raw.as_str();
                if position == 0 {
                    // charset'language'value
                    let mut sections = raw.splitn(3, '\'');
                    if let (Some(cs), Some(_lang), Some(rest)) =
                        (sections.next(), sections.next(), sections.next())
                    {
                        if !cs.is_empty() {
                            charset = Charset::new(cs);
                        }
                        raw = rest;
                    }
                }
                bytes.extend_from_slice(&urlencoding::decode_binary(raw.as_bytes()));
            } else {
                let unquoted = unquote(&piece.raw);
                // encoded words occasionally appear inside quoted values
                let text =
                    crate::modules::mime::text::Text::parse_multiple(ctx, unquoted.as_bytes());
                if text.words().len() == 1 && !text.words()[0].charset().eq(&ctx.default_charset) {
                    charset = text.words()[0].charset().clone();
                    bytes.extend_from_slice(text.words()[0].buffer());
                } else {
                    bytes.extend_from_slice(unquoted.as_bytes());
                }
            }
        }
        parameters.push(Parameter::new(&name, Word::new(charset, bytes)));
    }

    (main, parameters)
}

fn needs_quoting(value: &[u8]) -> bool {
    value.is_empty()
        || value.iter().any(|&b| {
            matches!(
                b,
                b' ' | b'\t' | b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\'
                    | b'"' | b'/' | b'[' | b']' | b'?' | b'='
            )
        })
}

/// Append `; name=value` pairs, using the RFC 2231 extended form for
/// values that do not fit in plain ASCII.
pub fn generate_parameters(
    parameters: &[Parameter],
    writer: &mut FoldingWriter<'_>,
) -> MailForgeResult<()> {
    for parameter in parameters {
        writer.write_raw(b";")?;
        let value = parameter.value();
        let rendered = if value.needs_encoding() {
            format!(
                " {}*={}''{}",
                parameter.name(),
                value.charset().name(),
                urlencoding::encode_binary(value.buffer())
            )
        } else {
            let buffer = value.buffer();
            if needs_quoting(buffer) {
                format!(
                    " {}=\"{}\"",
                    parameter.name(),
                    String::from_utf8_lossy(buffer)
                        .replace('\\', "\\\\")
                        .replace('"', "\\\"")
                )
            } else {
                format!(" {}={}", parameter.name(), String::from_utf8_lossy(buffer))
            }
        };
        writer.write_atom(rendered.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> (String, Vec<Parameter>) {
        parse_field_body(&ParsingContext::default(), raw)
    }

    #[test]
    fn simple_parameters_parse_in_order() {
        let (main, params) = parse("multipart/mixed; boundary=abc; charset=utf-8");
        assert_eq!(main, "multipart/mixed");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name(), "boundary");
        assert_eq!(params[0].value_utf8(), "abc");
        assert_eq!(params[1].name(), "charset");
    }

    #[test]
    fn quoted_values_unquote() {
        let (_, params) = parse("application/pdf; name=\"year report.pdf\"");
        assert_eq!(params[0].value_utf8(), "year report.pdf");
    }

    #[test]
    fn rfc2231_continuations_reassemble() {
        let (_, params) = parse(
            "application/octet-stream; name*0=\"long \"; name*1=\"file name.bin\"",
        );
        assert_eq!(params[0].name(), "name");
        assert_eq!(params[0].value_utf8(), "long file name.bin");
    }

    #[test]
    fn rfc2231_extended_value_decodes_charset() {
        let (_, params) = parse("attachment; filename*=utf-8''caf%C3%A9.txt");
        assert_eq!(params[0].name(), "filename");
        assert_eq!(params[0].value().charset(), &Charset::utf_8());
        assert_eq!(params[0].value_utf8(), "café.txt");
    }

    #[test]
    fn extended_continuations_combine() {
        let (_, params) = parse(
            "attachment; filename*0*=utf-8''caf%C3%A9; filename*1*=%20menu.txt",
        );
        assert_eq!(params[0].value_utf8(), "café menu.txt");
    }

    #[test]
    fn generation_quotes_when_needed() {
        let mut sink = crate::modules::stream::VecOutputStream::new();
        let mut writer = FoldingWriter::new(&mut sink, 0, 78);
        let parameters = vec![
            Parameter::ascii("boundary", "simple"),
            Parameter::ascii("name", "two words.txt"),
        ];
        generate_parameters(&parameters, &mut writer).unwrap();
        assert_eq!(
            String::from_utf8(sink.into_bytes()).unwrap(),
            "; boundary=simple; name=\"two words.txt\""
        );
    }

    #[test]
    fn generation_uses_rfc2231_for_non_ascii() {
        let mut sink = crate::modules::stream::VecOutputStream::new();
        let mut writer = FoldingWriter::new(&mut sink, 0, 200);
        let parameters = vec![Parameter::new(
            "filename",
            Word::utf8("café.txt"),
        )];
        generate_parameters(&parameters, &mut writer).unwrap();
        let rendered = String::from_utf8(sink.into_bytes()).unwrap();
        assert_eq!(rendered, "; filename*=utf-8''caf%C3%A9.txt");
    }
}
