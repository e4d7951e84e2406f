use super::*;
use crate::modules::error::code::ErrorCode;
use crate::modules::mime::part::Message;
use crate::modules::mime::ParsingContext;
use crate::modules::net::text_protocol::testing::ScriptedSocket;
use crate::modules::store::ServiceState;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::{Arc, Mutex};

type SentHandle = Arc<Mutex<Vec<u8>>>;

fn transport(session: Session) -> SmtpTransport {
    SmtpTransport::new(session).unwrap()
}

fn scripted(server_lines: &[&str]) -> (ScriptedSocket, SentHandle) {
    let socket = ScriptedSocket::new(server_lines);
    let handle = socket.sent_handle();
    (socket, handle)
}

fn text_of(sent: &SentHandle) -> String {
    String::from_utf8_lossy(&sent.lock().unwrap()).into_owned()
}

#[test]
fn establish_reads_greeting_and_extensions() {
    let (socket, sent) = scripted(&[
        "220 mx.example.org ESMTP",
        "250-mx.example.org greets you",
        "250-SIZE 10240000",
        "250-AUTH PLAIN LOGIN",
        "250 8BITMIME",
    ]);
    let mut smtp = transport(Session::new());
    smtp.establish(Box::new(socket)).unwrap();
    assert_eq!(smtp.state(), ServiceState::Connected);
    assert!(smtp.extensions.contains("SIZE"));
    assert!(smtp.extensions.contains("8BITMIME"));
    assert_eq!(smtp.auth_mechanisms, ["PLAIN", "LOGIN"]);
    assert!(text_of(&sent).starts_with("EHLO "));
}

#[test]
fn bad_greeting_disconnects() {
    let (socket, _sent) = scripted(&["554 go away"]);
    let mut smtp = transport(Session::new());
    let error = smtp.establish(Box::new(socket)).unwrap_err();
    assert_eq!(error.code(), ErrorCode::ConnectionGreetingError);
    assert_eq!(smtp.state(), ServiceState::Disconnected);
    assert!(error.message().contains("554"));
}

#[test]
fn plain_authentication_runs_when_credentials_present() {
    let mut session = Session::new();
    session.set_property("smtp.auth.username", "jane");
    session.set_property("smtp.auth.password", "secret");

    let (socket, sent) = scripted(&[
        "220 mx ESMTP",
        "250-mx",
        "250 AUTH PLAIN",
        "235 2.7.0 accepted",
    ]);
    let mut smtp = transport(session);
    smtp.establish(Box::new(socket)).unwrap();

    let expected = STANDARD.encode(b"\0jane\0secret");
    let sent = text_of(&sent);
    assert!(sent.contains(&format!("AUTH PLAIN {}", expected)), "{}", sent);
}

#[test]
fn xoauth2_is_preferred_when_offered() {
    let mut session = Session::new();
    session.set_property("smtp.auth.username", "u@example.com");
    session.set_property("smtp.auth.accesstoken", "TOK");

    let (socket, sent) = scripted(&[
        "220 mx ESMTP",
        "250-mx",
        "250 AUTH PLAIN XOAUTH2",
        "235 2.7.0 accepted",
    ]);
    let mut smtp = transport(session);
    smtp.establish(Box::new(socket)).unwrap();

    let expected = STANDARD.encode(b"user=u@example.com\x01auth=Bearer TOK\x01\x01");
    let sent = text_of(&sent);
    assert!(sent.contains(&format!("AUTH XOAUTH2 {}", expected)), "{}", sent);
}

#[test]
fn failed_authentication_surfaces_response() {
    let mut session = Session::new();
    session.set_property("smtp.auth.username", "jane");
    session.set_property("smtp.auth.password", "wrong");

    let (socket, _sent) = scripted(&[
        "220 mx ESMTP",
        "250-mx",
        "250 AUTH PLAIN",
        "535 5.7.8 bad credentials",
    ]);
    let mut smtp = transport(session);
    let error = smtp.establish(Box::new(socket)).unwrap_err();
    assert_eq!(error.code(), ErrorCode::AuthenticationFailed);
    assert!(error.message().contains("535"));
}

#[test]
fn send_runs_the_submission_dialogue() {
    let (socket, sent) = scripted(&[
        "220 mx ESMTP",
        "250 mx",
        "250 sender ok",
        "250 recipient ok",
        "354 end with <CRLF>.<CRLF>",
        "250 queued as 123",
    ]);
    let mut smtp = transport(Session::new());
    smtp.establish(Box::new(socket)).unwrap();

    let message = b"Subject: hi\r\n\r\nline one\r\n.starts with dot\r\n";
    smtp.send(
        &Mailbox::from_email("a@x.org"),
        &[Mailbox::from_email("b@y.org")],
        &mut MemoryInputStream::new(message.to_vec()),
        message.len() as u64,
        None,
    )
    .unwrap();

    let sent = text_of(&sent);
    assert!(sent.contains("MAIL FROM:<a@x.org>"));
    assert!(sent.contains("RCPT TO:<b@y.org>"));
    assert!(sent.contains("DATA"));
    // dot-stuffing applied
    assert!(sent.contains("\r\n..starts with dot\r\n"), "{}", sent);
    assert!(sent.ends_with(".\r\n"));
}

#[test]
fn rejected_recipient_carries_server_line() {
    let (socket, _sent) = scripted(&[
        "220 mx ESMTP",
        "250 mx",
        "250 sender ok",
        "550 5.1.1 no such user",
    ]);
    let mut smtp = transport(Session::new());
    smtp.establish(Box::new(socket)).unwrap();

    let error = smtp
        .send(
            &Mailbox::from_email("a@x.org"),
            &[Mailbox::from_email("nobody@y.org")],
            &mut MemoryInputStream::new(b"Subject: x\r\n\r\n".to_vec()),
            0,
            None,
        )
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::CommandFailed);
    assert!(error.message().contains("550 5.1.1 no such user"));
}

#[test]
fn send_without_recipients_is_rejected_locally() {
    let (socket, _sent) = scripted(&["220 mx ESMTP", "250 mx"]);
    let mut smtp = transport(Session::new());
    smtp.establish(Box::new(socket)).unwrap();
    let error = smtp
        .send(
            &Mailbox::from_email("a@x.org"),
            &[],
            &mut MemoryInputStream::new(Vec::new()),
            0,
            None,
        )
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::NoRecipient);
}

#[test]
fn send_message_collects_envelope_and_strips_bcc() {
    let (socket, sent) = scripted(&[
        "220 mx ESMTP",
        "250 mx",
        "250 ok",
        "250 ok",
        "250 ok",
        "354 go",
        "250 queued",
    ]);
    let mut smtp = transport(Session::new());
    smtp.establish(Box::new(socket)).unwrap();

    let message = Message::parse_message(
        &ParsingContext::default(),
        b"From: a@x.org\r\nTo: b@y.org\r\nBcc: hidden@z.org\r\nSubject: hi\r\n\r\nbody\r\n"
            .to_vec(),
    )
    .unwrap();
    smtp.send_message(&message, None).unwrap();

    let sent = text_of(&sent);
    assert!(sent.contains("RCPT TO:<b@y.org>"));
    assert!(sent.contains("RCPT TO:<hidden@z.org>"));
    // the Bcc header never reaches the wire
    assert!(!sent.contains("Bcc: hidden@z.org"));
}

#[test]
fn starttls_required_but_missing_fails() {
    let mut session = Session::new();
    session.set_property("smtp.connection.tls", "true");
    session.set_property("smtp.connection.tls.required", "true");

    let (socket, _sent) = scripted(&["220 mx ESMTP", "250 mx"]);
    let mut smtp = transport(session);
    let error = smtp.establish(Box::new(socket)).unwrap_err();
    assert_eq!(error.code(), ErrorCode::UnsupportedOption);
}
