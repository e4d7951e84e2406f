// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Message importance, read from `Importance:` with `X-Priority:` as a
//! fallback, and written to both so either style of client agrees.

use crate::modules::mime::field::FieldValue;
use crate::modules::mime::part::Message;
use crate::modules::mime::registry::fields;
use crate::modules::mime::text::Text;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum Importance {
    Highest,
    High,
    #[default]
    Normal,
    Low,
    Lowest,
}

impl Importance {
    fn from_importance_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "highest" => Some(Importance::Highest),
            "high" => Some(Importance::High),
            "normal" => Some(Importance::Normal),
            "low" => Some(Importance::Low),
            "lowest" => Some(Importance::Lowest),
            _ => None,
        }
    }

    fn from_x_priority(value: &str) -> Option<Self> {
        // "2 (High)" style values carry the digit first
        let digit = value.trim().chars().next()?.to_digit(10)?;
        Some(match digit {
            1 => Importance::Highest,
            2 => Importance::High,
            3 => Importance::Normal,
            4 => Importance::Low,
            _ => Importance::Lowest,
        })
    }

    fn importance_header(&self) -> &'static str {
        match self {
            Importance::Highest => "highest",
            Importance::High => "high",
            Importance::Normal => "normal",
            Importance::Low => "low",
            Importance::Lowest => "lowest",
        }
    }

    fn x_priority_header(&self) -> &'static str {
        match self {
            Importance::Highest => "1 (Highest)",
            Importance::High => "2 (High)",
            Importance::Normal => "3 (Normal)",
            Importance::Low => "4 (Low)",
            Importance::Lowest => "5 (Lowest)",
        }
    }
}

/// The importance of a message, `Normal` when neither header is
/// present or parseable.
pub fn get_importance(message: &Message) -> Importance {
    let header = message.header();

    if let Some(field) = header.field(fields::IMPORTANCE) {
        if let Ok(value) = field.value() {
            if let Ok(text) = value.as_text() {
                if let Some(importance) =
                    Importance::from_importance_header(&text.to_utf8_lossy())
                {
                    return importance;
                }
            }
        }
    }

    if let Some(field) = header.field(fields::X_PRIORITY) {
        if let Ok(value) = field.value() {
            if let Ok(text) = value.as_text() {
                if let Some(importance) = Importance::from_x_priority(&text.to_utf8_lossy()) {
                    return importance;
                }
            }
        }
    }

    Importance::Normal
}

/// Set both importance headers coherently.
pub fn set_importance(message: &mut Message, importance: Importance) {
    let header = message.header_mut();
    header.set_field_value(
        fields::IMPORTANCE,
        FieldValue::Text(Text::ascii(importance.importance_header())),
    );
    header.set_field_value(
        fields::X_PRIORITY,
        FieldValue::Text(Text::ascii(importance.x_priority_header())),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::mime::ParsingContext;

    #[test]
    fn importance_header_wins() {
        let message = Message::parse_message(
            &ParsingContext::default(),
            b"Importance: high\r\nX-Priority: 5 (Lowest)\r\n\r\n".to_vec(),
        )
        .unwrap();
        assert_eq!(get_importance(&message), Importance::High);
    }

    #[test]
    fn x_priority_fallback() {
        let message = Message::parse_message(
            &ParsingContext::default(),
            b"X-Priority: 1\r\n\r\n".to_vec(),
        )
        .unwrap();
        assert_eq!(get_importance(&message), Importance::Highest);
    }

    #[test]
    fn absent_headers_mean_normal() {
        let message =
            Message::parse_message(&ParsingContext::default(), b"Subject: x\r\n\r\n".to_vec())
                .unwrap();
        assert_eq!(get_importance(&message), Importance::Normal);
    }

    #[test]
    fn set_importance_round_trips() {
        let mut message =
            Message::parse_message(&ParsingContext::default(), b"Subject: x\r\n\r\n".to_vec())
                .unwrap();
        set_importance(&mut message, Importance::Low);
        assert_eq!(get_importance(&message), Importance::Low);
        assert!(message.header().has_field(fields::X_PRIORITY));
    }
}
