// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use rand::{rng, Rng};

#[macro_export]
macro_rules! mailforge_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::MailForgeError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! base64_encode {
    ($bytes:expr) => {{
        use base64::{engine::general_purpose::STANDARD, *};
        STANDARD.encode($bytes)
    }};
}

#[macro_export]
macro_rules! base64_decode {
    ($key:expr) => {{
        use base64::{engine::general_purpose::STANDARD, *};
        STANDARD.decode($key)
    }};
}

#[macro_export]
macro_rules! generate_token {
    ($length:expr) => {{
        $crate::modules::utils::random_string($length)
    }};
}

/// Characters allowed in a multipart boundary, from the RFC 2046 `bchars`
/// set minus space and characters that are fragile in practice.
pub(crate) const BOUNDARY_CHARS: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ+_.";

/// Random string over `[a-zA-Z0-9]`, used for tokens, boundaries and
/// maildir unique names.
pub fn random_string(length: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut generator = rng();
    (0..length)
        .map(|_| ALPHABET[generator.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Random multipart boundary: `=_` prefix plus 48 characters from the
/// RFC 2046 safe set. The prefix can never appear in quoted-printable or
/// base64 encoded part content.
pub fn random_boundary() -> String {
    let mut generator = rng();
    let mut boundary = String::with_capacity(50);
    boundary.push_str("=_");
    for _ in 0..48 {
        boundary.push(BOUNDARY_CHARS[generator.random_range(0..BOUNDARY_CHARS.len())] as char);
    }
    boundary
}

/// Case-insensitive ASCII comparison without allocating.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_string_has_requested_length() {
        assert_eq!(random_string(6).len(), 6);
        assert_eq!(random_string(0).len(), 0);
    }

    #[test]
    fn random_boundary_shape() {
        let boundary = random_boundary();
        assert!(boundary.starts_with("=_"));
        assert_eq!(boundary.len(), 50);
        assert!(boundary
            .as_bytes()
            .iter()
            .skip(2)
            .all(|b| BOUNDARY_CHARS.contains(b)));
    }
}
