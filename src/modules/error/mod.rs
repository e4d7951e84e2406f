// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use code::ErrorCode;
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MailForgeError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

pub type MailForgeResult<T, E = MailForgeError> = std::result::Result<T, E>;

impl MailForgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MailForgeError::Generic { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MailForgeError::Generic { message, .. } => message,
        }
    }

    /// Chain a causing error into a new one, keeping the original text
    /// visible to the caller.
    pub fn with_cause<E: std::fmt::Display>(message: &str, cause: E, code: ErrorCode) -> Self {
        MailForgeError::Generic {
            message: format!("{}: {}", message, cause),
            location: Location::default(),
            code,
        }
    }
}
