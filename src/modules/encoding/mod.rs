// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::charset::Charset;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::stream::{InputStream, OutputStream};
use crate::raise_error;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

pub mod base64;
pub mod identity;
pub mod quoted_printable;
pub mod uuencode;

/// A transfer-encoding name. Stored lower-cased so equality and registry
/// lookups are case-insensitive.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct Encoding {
    name: String,
}

pub const SEVEN_BIT: &str = "7bit";
pub const EIGHT_BIT: &str = "8bit";
pub const BINARY: &str = "binary";
pub const QUOTED_PRINTABLE: &str = "quoted-printable";
pub const BASE64: &str = "base64";
pub const UUENCODE: &str = "uuencode";

impl Encoding {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_ascii_lowercase(),
        }
    }

    pub fn seven_bit() -> Self {
        Self::new(SEVEN_BIT)
    }

    pub fn eight_bit() -> Self {
        Self::new(EIGHT_BIT)
    }

    pub fn binary() -> Self {
        Self::new(BINARY)
    }

    pub fn quoted_printable() -> Self {
        Self::new(QUOTED_PRINTABLE)
    }

    pub fn base64() -> Self {
        Self::new(BASE64)
    }

    pub fn uuencode() -> Self {
        Self::new(UUENCODE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether content in this encoding is already in its raw form.
    pub fn is_identity(&self) -> bool {
        matches!(self.name.as_str(), SEVEN_BIT | EIGHT_BIT | BINARY)
    }

    /// Instantiate the codec for this encoding from the process-wide
    /// registry.
    pub fn to_encoder(&self) -> MailForgeResult<Box<dyn Encoder>> {
        let constructor = ENCODER_REGISTRY.get(self.name.as_str()).ok_or_else(|| {
            raise_error!(
                format!("no codec registered for encoding '{}'", self.name),
                ErrorCode::NoFactoryAvailable
            )
        })?;
        Ok(constructor())
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Self::seven_bit()
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Mutable property bag read by codecs during encode. Recognised keys:
/// `maxlinelength` (quoted-printable, base64, uuencode), `text`
/// (quoted-printable), `filename` and `mode` (uuencode).
#[derive(Clone, Debug, Default)]
pub struct EncoderProperties {
    values: HashMap<String, String>,
}

impl EncoderProperties {
    pub fn set(&mut self, name: &str, value: impl ToString) {
        self.values
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn get_usize(&self, name: &str, default: usize) -> usize {
        self.get(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get(name)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }
}

/// A reversible byte-to-byte transform. `encode` and `decode` return the
/// number of bytes written to `output`.
pub trait Encoder: Send {
    fn name(&self) -> &'static str;

    fn properties(&self) -> &EncoderProperties;
    fn properties_mut(&mut self) -> &mut EncoderProperties;

    fn encode(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> MailForgeResult<usize>;

    fn decode(
        &self,
        input: &mut dyn InputStream,
        output: &mut dyn OutputStream,
    ) -> MailForgeResult<usize>;

    /// Upper-bound estimate of the encoded size of `decoded_length` bytes.
    fn encoded_size(&self, decoded_length: usize) -> usize {
        decoded_length
    }

    /// Upper-bound estimate of the decoded size of `encoded_length` bytes.
    fn decoded_size(&self, encoded_length: usize) -> usize {
        encoded_length
    }
}

type EncoderConstructor = fn() -> Box<dyn Encoder>;

static ENCODER_REGISTRY: LazyLock<DashMap<&'static str, EncoderConstructor>> =
    LazyLock::new(|| {
        let registry: DashMap<&'static str, EncoderConstructor> = DashMap::new();
        registry.insert(SEVEN_BIT, identity::SevenBitEncoder::construct as _);
        registry.insert(EIGHT_BIT, identity::EightBitEncoder::construct as _);
        registry.insert(BINARY, identity::BinaryEncoder::construct as _);
        registry.insert(
            QUOTED_PRINTABLE,
            quoted_printable::QuotedPrintableEncoder::construct as _,
        );
        registry.insert(BASE64, base64::Base64Encoder::construct as _);
        registry.insert(UUENCODE, uuencode::UuencodeEncoder::construct as _);
        registry
    });

/// Names of all registered encodings.
pub fn registered_encodings() -> Vec<String> {
    ENCODER_REGISTRY.iter().map(|e| e.key().to_string()).collect()
}

/// Intended use of a body when deciding its transfer encoding.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EncodingUsage {
    Text,
    Binary,
}

/// Pick a transfer encoding for raw content: base64 for binary content or
/// charsets that are not ASCII-compatible, quoted-printable for text with
/// more than 20% non-ASCII bytes, 7bit otherwise.
pub fn decide(data: &[u8], charset: &Charset, usage: EncodingUsage) -> Encoding {
    if usage == EncodingUsage::Binary || !charset.is_ascii_compatible() {
        return Encoding::base64();
    }

    let non_ascii = data.iter().filter(|&&b| b >= 0x80).count();
    if non_ascii * 5 > data.len() {
        Encoding::quoted_printable()
    } else {
        Encoding::seven_bit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::stream::{read_to_end, MemoryInputStream, VecOutputStream};

    fn roundtrip(encoding: &Encoding, data: &[u8]) -> Vec<u8> {
        let encoder = encoding.to_encoder().unwrap();
        let mut encoded = VecOutputStream::new();
        encoder
            .encode(&mut MemoryInputStream::new(data.to_vec()), &mut encoded)
            .unwrap();
        let mut decoded = VecOutputStream::new();
        encoder
            .decode(
                &mut MemoryInputStream::new(encoded.into_bytes()),
                &mut decoded,
            )
            .unwrap();
        decoded.into_bytes()
    }

    #[test]
    fn registry_resolves_all_names() {
        for name in [
            SEVEN_BIT,
            EIGHT_BIT,
            BINARY,
            QUOTED_PRINTABLE,
            BASE64,
            UUENCODE,
        ] {
            assert!(Encoding::new(name).to_encoder().is_ok(), "{}", name);
        }
        assert!(Encoding::new("rot13").to_encoder().is_err());
    }

    #[test]
    fn name_comparison_is_case_insensitive() {
        assert_eq!(Encoding::new("Base64"), Encoding::base64());
        assert_eq!(Encoding::new(" QUOTED-PRINTABLE "), Encoding::quoted_printable());
    }

    #[test]
    fn decode_inverts_encode() {
        let sample = b"Binary \x00\xff\xfe data with text and \r\nlines".to_vec();
        for encoding in [Encoding::base64(), Encoding::binary(), Encoding::eight_bit()] {
            assert_eq!(roundtrip(&encoding, &sample), sample, "{}", encoding);
        }
    }

    #[test]
    fn decide_picks_expected_encodings() {
        let ascii = Charset::us_ascii();
        assert_eq!(
            decide(b"plain text", &ascii, EncodingUsage::Text),
            Encoding::seven_bit()
        );
        // a sprinkle of non-ASCII (at most 20%) passes through as-is
        assert_eq!(
            decide(b"caf\xe9 au lait du matin", &ascii, EncodingUsage::Text),
            Encoding::seven_bit()
        );
        // mostly non-ASCII text stays readable as quoted-printable
        assert_eq!(
            decide(b"\xe9\xe8\xea a \xf4\xf6", &ascii, EncodingUsage::Text),
            Encoding::quoted_printable()
        );
        assert_eq!(
            decide(b"\xff\xfe\xfd\xfc\xfb", &ascii, EncodingUsage::Text),
            Encoding::quoted_printable()
        );
        assert_eq!(
            decide(b"anything", &ascii, EncodingUsage::Binary),
            Encoding::base64()
        );
        assert_eq!(
            decide(b"text", &Charset::new("utf-16"), EncodingUsage::Text),
            Encoding::base64()
        );
    }
}
