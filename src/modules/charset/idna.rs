// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Punycode (RFC 3492) for the `idna` pseudo-charset. Works on one host
//! name label at a time: ASCII labels pass through unchanged in both
//! directions.

const BASE: u32 = 36;
const TMIN: u32 = 1;
const TMAX: u32 = 26;
const SKEW: u32 = 38;
const DAMP: u32 = 700;
const INITIAL_BIAS: u32 = 72;
const INITIAL_N: u32 = 128;

pub const ACE_PREFIX: &str = "xn--";

fn adapt(mut delta: u32, num_points: u32, first_time: bool) -> u32 {
    delta /= if first_time { DAMP } else { 2 };
    delta += delta / num_points;
    let mut k = 0;
    while delta > ((BASE - TMIN) * TMAX) / 2 {
        delta /= BASE - TMIN;
        k += BASE;
    }
    k + (((BASE - TMIN + 1) * delta) / (delta + SKEW))
}

fn encode_digit(digit: u32) -> char {
    match digit {
        0..=25 => (b'a' + digit as u8) as char,
        26..=35 => (b'0' + (digit - 26) as u8) as char,
        _ => unreachable!("punycode digit out of range"),
    }
}

fn decode_digit(ch: char) -> Option<u32> {
    match ch {
        'a'..='z' => Some(ch as u32 - 'a' as u32),
        'A'..='Z' => Some(ch as u32 - 'A' as u32),
        '0'..='9' => Some(ch as u32 - '0' as u32 + 26),
        _ => None,
    }
}

/// Raw punycode encoding of a sequence of code points.
pub fn punycode_encode(input: &str) -> Option<String> {
    let code_points: Vec<u32> = input.chars().map(|c| c as u32).collect();
    let mut output = String::new();

    let basic: Vec<u32> = code_points.iter().copied().filter(|&c| c < 0x80).collect();
    for &c in &basic {
        output.push(char::from_u32(c)?);
    }
    let basic_count = basic.len() as u32;
    if basic_count > 0 {
        output.push('-');
    }

    let mut n = INITIAL_N;
    let mut delta = 0u32;
    let mut bias = INITIAL_BIAS;
    let mut handled = basic_count;

    while (handled as usize) < code_points.len() {
        let m = code_points.iter().copied().filter(|&c| c >= n).min()?;
        delta = delta.checked_add((m - n).checked_mul(handled + 1)?)?;
        n = m;

        for &c in &code_points {
            if c < n {
                delta = delta.checked_add(1)?;
            } else if c == n {
                let mut q = delta;
                let mut k = BASE;
                loop {
                    let t = if k <= bias {
                        TMIN
                    } else if k >= bias + TMAX {
                        TMAX
                    } else {
                        k - bias
                    };
                    if q < t {
                        break;
                    }
                    output.push(encode_digit(t + (q - t) % (BASE - t)));
                    q = (q - t) / (BASE - t);
                    k += BASE;
                }
                output.push(encode_digit(q));
                bias = adapt(delta, handled + 1, handled == basic_count);
                delta = 0;
                handled += 1;
            }
        }
        delta += 1;
        n += 1;
    }

    Some(output)
}

/// Raw punycode decoding back to a string.
pub fn punycode_decode(input: &str) -> Option<String> {
    let mut output: Vec<char> = Vec::new();
    let delimiter = input.rfind('-');

    let mut extended = input;
    if let Some(pos) = delimiter {
        if !input[..pos].is_ascii() {
            return None;
        }
        output.extend(input[..pos].chars());
        extended = &input[pos + 1..];
    }

    let mut n = INITIAL_N;
    let mut i = 0u32;
    let mut bias = INITIAL_BIAS;
    let mut chars = extended.chars();

    while chars.as_str().len() > 0 {
        let old_i = i;
        let mut weight = 1u32;
        let mut k = BASE;
        loop {
            let digit = decode_digit(chars.next()?)?;
            i = i.checked_add(digit.checked_mul(weight)?)?;
            let t = if k <= bias {
                TMIN
            } else if k >= bias + TMAX {
                TMAX
            } else {
                k - bias
            };
            if digit < t {
                break;
            }
            weight = weight.checked_mul(BASE - t)?;
            k += BASE;
        }

        let length = output.len() as u32 + 1;
        bias = adapt(i - old_i, length, old_i == 0);
        n = n.checked_add(i / length)?;
        i %= length;
        output.insert(i as usize, char::from_u32(n)?);
        i += 1;
    }

    Some(output.into_iter().collect())
}

/// Convert one host name label to its IDNA form: ASCII labels pass
/// through, anything else becomes `xn--` + punycode.
pub fn to_idna(label: &str) -> Option<String> {
    if label.is_ascii() {
        return Some(label.to_string());
    }
    punycode_encode(label).map(|encoded| format!("{}{}", ACE_PREFIX, encoded))
}

/// Convert one host name label from its IDNA form. Labels without the
/// `xn--` prefix pass through.
pub fn from_idna(label: &str) -> Option<String> {
    match label.strip_prefix(ACE_PREFIX) {
        Some(encoded) if !encoded.is_empty() => punycode_decode(encoded),
        _ => Some(label.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_labels_pass_through_both_ways() {
        assert_eq!(to_idna("example").unwrap(), "example");
        assert_eq!(from_idna("example").unwrap(), "example");
    }

    #[test]
    fn non_ascii_labels_gain_ace_prefix() {
        let encoded = to_idna("bücher").unwrap();
        assert!(encoded.starts_with("xn--"));
        assert_eq!(from_idna(&encoded).unwrap(), "bücher");
    }

    #[test]
    fn rfc3492_sample_round_trips() {
        // RFC 3492 §7.1 (L) Japanese sample: 3B-ww4c5e180e575a65lsy2b
        assert_eq!(to_idna("münchen").unwrap(), "xn--mnchen-3ya");
        assert_eq!(from_idna("xn--mnchen-3ya").unwrap(), "münchen");
    }

    #[test]
    fn idna_round_trip_is_identity() {
        for label in ["héllo", "日本語", "π", "mixed-ascii-ö"] {
            let encoded = to_idna(label).unwrap();
            assert_eq!(from_idna(&encoded).unwrap(), label);
        }
    }
}
