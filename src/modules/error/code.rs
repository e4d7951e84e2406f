// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side and configuration errors (10000–10999)
    InvalidParameter = 10000,
    MalformedUrl = 10010,
    NoSuchProperty = 10020,
    InvalidPropertyType = 10030,
    NoFactoryAvailable = 10040,
    NoPlatformHandler = 10050,
    NoExpeditor = 10060,
    NoRecipient = 10070,
    UnsupportedOption = 10080,

    // Authentication errors (20000–20999)
    AuthenticationFailed = 20000,
    NoAuthInformation = 20010,
    SaslFailure = 20020,
    NoSuchMechanism = 20030,

    // Resource and filesystem errors (30000–30999)
    FolderNotFound = 30000,
    FolderAlreadyOpen = 30010,
    MessageNotFound = 30020,
    InvalidFolderName = 30030,
    FileNotFound = 30040,
    NotADirectory = 30050,
    FilesystemError = 30060,
    OpenFileError = 30070,

    // Network connection errors (40000–40999)
    ConnectionError = 40000,
    ConnectionGreetingError = 40010,
    SocketError = 40020,
    SocketNotConnected = 40030,
    OperationTimedOut = 40040,
    OperationCancelled = 40050,
    NotConnected = 40060,
    AlreadyConnected = 40070,
    TlsError = 40080,
    CertificateError = 40090,
    CertificateVerificationError = 40100,
    UnsupportedCertificateType = 40110,

    // Mail service errors (50000–50999)
    CommandFailed = 50000,
    InvalidResponse = 50010,
    OperationNotSupported = 50020,
    PartialFetchNotSupported = 50030,
    IllegalState = 50040,
    IllegalOperation = 50050,
    UnfetchedObject = 50060,

    // Parsing errors (60000–60999)
    ParseError = 60000,
    BadFieldValueType = 60010,
    NoSuchField = 60020,
    NoSuchPart = 60030,
    NoSuchParameter = 60040,
    NoSuchMessageId = 60050,
    NoSuchAddress = 60060,
    NoSuchMailbox = 60070,

    // Internal system errors (70000–70999)
    InternalError = 70000,
    SystemError = 70010,
}

impl ErrorCode {
    /// Whether an error with this code leaves the connection unusable.
    /// Services transition to `Disconnected` before surfacing such errors.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConnectionError
                | ErrorCode::ConnectionGreetingError
                | ErrorCode::SocketError
                | ErrorCode::SocketNotConnected
                | ErrorCode::OperationTimedOut
                | ErrorCode::OperationCancelled
                | ErrorCode::TlsError
                | ErrorCode::CertificateError
                | ErrorCode::CertificateVerificationError
        )
    }
}
