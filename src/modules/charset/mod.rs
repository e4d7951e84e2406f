// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::encoding::Encoding;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::stream::{read_to_end, InputStream, OutputStream};
use crate::raise_error;
use serde::{Deserialize, Serialize};

pub mod idna;

/// Sentinel charset assigned to payloads that could not be decoded
/// (unknown charset name or invalid encoded-word payload).
pub const UNKNOWN_8BIT: &str = "unknown-8bit";

/// Pseudo-charset selecting the Punycode converter.
pub const IDNA: &str = "idna";

/// A character-set identity. Names compare case-insensitively and
/// through a small alias table, so `latin1 == ISO-8859-1`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct Charset {
    name: String,
}

fn resolve_alias(name: &str) -> &str {
    match name {
        "latin1" | "latin-1" | "l1" | "cp819" => "iso-8859-1",
        "ascii" | "ansi_x3.4-1968" | "us" => "us-ascii",
        "utf8" => "utf-8",
        "utf16" => "utf-16",
        other => other,
    }
}

impl Charset {
    pub fn new(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase();
        Self {
            name: resolve_alias(&normalized).to_string(),
        }
    }

    pub fn us_ascii() -> Self {
        Self::new("us-ascii")
    }

    pub fn utf_8() -> Self {
        Self::new("utf-8")
    }

    pub fn iso_8859_1() -> Self {
        Self::new("iso-8859-1")
    }

    pub fn unknown_8bit() -> Self {
        Self::new(UNKNOWN_8BIT)
    }

    pub fn idna() -> Self {
        Self::new(IDNA)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> Option<&'static encoding_rs::Encoding> {
        encoding_rs::Encoding::for_label(self.name.as_bytes())
    }

    /// Whether a converter backend exists for this charset. The
    /// `unknown-8bit` sentinel is never recognized; its bytes pass
    /// through conversions unchanged.
    pub fn is_recognized(&self) -> bool {
        self.backend().is_some()
    }

    /// Whether bytes 0x00–0x7F mean the same thing in this charset as in
    /// US-ASCII. Charsets that fail this (UTF-16, UTF-32, EBCDIC
    /// variants) force base64 transfer encoding.
    pub fn is_ascii_compatible(&self) -> bool {
        match self.backend() {
            Some(encoding) => encoding.is_ascii_compatible(),
            None => !self.name.starts_with("utf-16") && !self.name.starts_with("utf-32"),
        }
    }

    /// The transfer encoding recommended for text in this charset.
    pub fn recommended_encoding(&self) -> Encoding {
        if self.is_ascii_compatible() {
            Encoding::quoted_printable()
        } else {
            Encoding::base64()
        }
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::us_ascii()
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Charset {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Clone, Debug)]
pub struct CharsetConverterOptions {
    /// Substituted for byte sequences that are invalid in the source
    /// charset or unmappable in the destination.
    pub invalid_replacement: String,
}

impl Default for CharsetConverterOptions {
    fn default() -> Self {
        Self {
            invalid_replacement: "?".to_string(),
        }
    }
}

enum ConverterKind {
    Identity,
    ToIdna,
    FromIdna,
    Table {
        source: &'static encoding_rs::Encoding,
        dest: &'static encoding_rs::Encoding,
    },
}

/// Converts bytes between two charsets through a neutral Unicode stage.
pub struct CharsetConverter {
    kind: ConverterKind,
    options: CharsetConverterOptions,
}

impl CharsetConverter {
    pub fn new(
        source: &Charset,
        dest: &Charset,
        options: CharsetConverterOptions,
    ) -> MailForgeResult<Self> {
        let kind = if source == dest {
            ConverterKind::Identity
        } else if dest.name() == IDNA {
            ConverterKind::ToIdna
        } else if source.name() == IDNA {
            ConverterKind::FromIdna
        } else {
            let source_backend = source.backend().ok_or_else(|| {
                raise_error!(
                    format!("no converter available for charset '{}'", source),
                    ErrorCode::NoFactoryAvailable
                )
            })?;
            let dest_backend = dest.backend().ok_or_else(|| {
                raise_error!(
                    format!("no converter available for charset '{}'", dest),
                    ErrorCode::NoFactoryAvailable
                )
            })?;
            ConverterKind::Table {
                source: source_backend,
                dest: dest_backend,
            }
        };
        Ok(Self { kind, options })
    }

    /// String-form conversion.
    pub fn convert_bytes(&self, input: &[u8]) -> MailForgeResult<Vec<u8>> {
        match &self.kind {
            ConverterKind::Identity => Ok(input.to_vec()),
            ConverterKind::ToIdna => {
                let label = String::from_utf8_lossy(input);
                let encoded = idna::to_idna(&label).ok_or_else(|| {
                    raise_error!(
                        format!("punycode encoding failed for '{}'", label),
                        ErrorCode::InternalError
                    )
                })?;
                Ok(encoded.into_bytes())
            }
            ConverterKind::FromIdna => {
                let label = String::from_utf8_lossy(input);
                let decoded = idna::from_idna(&label).ok_or_else(|| {
                    raise_error!(
                        format!("punycode decoding failed for '{}'", label),
                        ErrorCode::InternalError
                    )
                })?;
                Ok(decoded.into_bytes())
            }
            ConverterKind::Table { source, dest } => {
                let (unicode, _, had_errors) = source.decode(input);
                let unicode = if had_errors {
                    unicode.replace('\u{FFFD}', &self.options.invalid_replacement)
                } else {
                    unicode.into_owned()
                };
                let mut encoder = dest.new_encoder();
                Ok(encode_streaming(
                    &mut encoder,
                    &unicode,
                    &self.options.invalid_replacement,
                    true,
                ))
            }
        }
    }

    /// Stream-form conversion, reading `input` until EOF.
    pub fn convert_stream(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> MailForgeResult<usize> {
        let data = read_to_end(input)?;
        let converted = self.convert_bytes(&data)?;
        output.write(&converted)?;
        Ok(converted.len())
    }
}

/// Output stream filter that converts between charsets as bytes flow
/// through, holding back incomplete multi-byte sequences until the next
/// write or the final flush.
pub struct CharsetFilteredOutputStream<'a> {
    decoder: encoding_rs::Decoder,
    encoder: encoding_rs::Encoder,
    replacement: String,
    inner: &'a mut dyn OutputStream,
}

impl<'a> CharsetFilteredOutputStream<'a> {
    pub fn new(
        source: &Charset,
        dest: &Charset,
        options: CharsetConverterOptions,
        inner: &'a mut dyn OutputStream,
    ) -> MailForgeResult<Self> {
        let source_backend = source.backend().ok_or_else(|| {
            raise_error!(
                format!("no converter available for charset '{}'", source),
                ErrorCode::NoFactoryAvailable
            )
        })?;
        let dest_backend = dest.backend().ok_or_else(|| {
            raise_error!(
                format!("no converter available for charset '{}'", dest),
                ErrorCode::NoFactoryAvailable
            )
        })?;
        Ok(Self {
            decoder: source_backend.new_decoder(),
            encoder: dest_backend.new_encoder(),
            replacement: options.invalid_replacement,
            inner,
        })
    }

    fn pump(&mut self, data: &[u8], last: bool) -> MailForgeResult<()> {
        let mut unicode_buffer = String::with_capacity(4096);
        let mut remaining = data;
        loop {
            let (result, read, had_errors) =
                self.decoder
                    .decode_to_string(remaining, &mut unicode_buffer, last);
            remaining = &remaining[read..];
            let unicode = if had_errors && self.replacement != "\u{FFFD}" {
                unicode_buffer.replace('\u{FFFD}', &self.replacement)
            } else {
                std::mem::take(&mut unicode_buffer)
            };
            let encoded = encode_streaming(
                &mut self.encoder,
                &unicode,
                &self.replacement,
                last && remaining.is_empty(),
            );
            self.inner.write(&encoded)?;
            unicode_buffer.clear();
            match result {
                encoding_rs::CoderResult::InputEmpty => break,
                encoding_rs::CoderResult::OutputFull => continue,
            }
        }
        Ok(())
    }
}

fn encode_streaming(
    encoder: &mut encoding_rs::Encoder,
    input: &str,
    replacement: &str,
    last: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + 16);
    let mut buffer = [0u8; 1024];
    let mut remaining = input;
    loop {
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(remaining, &mut buffer, last);
        out.extend_from_slice(&buffer[..written]);
        remaining = &remaining[read..];
        match result {
            encoding_rs::EncoderResult::InputEmpty => break,
            encoding_rs::EncoderResult::OutputFull => {}
            encoding_rs::EncoderResult::Unmappable(_) => {
                out.extend_from_slice(replacement.as_bytes());
            }
        }
    }
    out
}

impl OutputStream for CharsetFilteredOutputStream<'_> {
    fn write(&mut self, data: &[u8]) -> MailForgeResult<()> {
        self.pump(data, false)
    }

    fn flush(&mut self) -> MailForgeResult<()> {
        self.pump(&[], true)?;
        self.inner.flush()
    }
}

/// One-call conversion between two charsets.
pub fn convert(input: &[u8], source: &Charset, dest: &Charset) -> MailForgeResult<Vec<u8>> {
    CharsetConverter::new(source, dest, CharsetConverterOptions::default())?.convert_bytes(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_normalise_through_aliases() {
        assert_eq!(Charset::new("Latin1"), Charset::iso_8859_1());
        assert_eq!(Charset::new("ASCII"), Charset::us_ascii());
        assert_eq!(Charset::new("UTF8"), Charset::utf_8());
    }

    #[test]
    fn latin1_to_utf8_conversion() {
        let converted = convert(b"caf\xe9", &Charset::iso_8859_1(), &Charset::utf_8()).unwrap();
        assert_eq!(converted, "café".as_bytes());
    }

    #[test]
    fn utf8_to_latin1_conversion() {
        let converted = convert("café".as_bytes(), &Charset::utf_8(), &Charset::iso_8859_1()).unwrap();
        assert_eq!(converted, b"caf\xe9");
    }

    #[test]
    fn unmappable_characters_use_replacement() {
        let converted = convert("日本".as_bytes(), &Charset::utf_8(), &Charset::iso_8859_1()).unwrap();
        assert_eq!(converted, b"??");
    }

    #[test]
    fn idna_pseudo_charset_routes_to_punycode() {
        let encoded = convert("bücher".as_bytes(), &Charset::utf_8(), &Charset::idna()).unwrap();
        assert!(encoded.starts_with(b"xn--"));
        let decoded = convert(&encoded, &Charset::idna(), &Charset::utf_8()).unwrap();
        assert_eq!(decoded, "bücher".as_bytes());
    }

    #[test]
    fn ascii_hostname_idna_round_trip() {
        let encoded = convert(b"example", &Charset::utf_8(), &Charset::idna()).unwrap();
        assert_eq!(encoded, b"example");
        let decoded = convert(&encoded, &Charset::idna(), &Charset::utf_8()).unwrap();
        assert_eq!(decoded, b"example");
    }

    #[test]
    fn recommended_encoding_tracks_ascii_compatibility() {
        assert_eq!(
            Charset::utf_8().recommended_encoding(),
            Encoding::quoted_printable()
        );
        assert_eq!(
            Charset::new("utf-16be").recommended_encoding(),
            Encoding::base64()
        );
    }
}
