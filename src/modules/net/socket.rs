// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::net::{Socket, SocketStatus, TimeoutHandler, Tracer};
use crate::raise_error;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How long a single blocking read/write slice lasts before the
/// timeout handler is consulted.
const POLL_SLICE: Duration = Duration::from_millis(250);

/// Timeout for the TCP connect itself.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Plain TCP socket over the host network stack.
pub struct TcpSocket {
    stream: Option<TcpStream>,
    peer_name: String,
    peer_address: String,
    status: SocketStatus,
    timeout_handler: Option<Box<dyn TimeoutHandler>>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl TcpSocket {
    pub fn new() -> Self {
        Self {
            stream: None,
            peer_name: String::new(),
            peer_address: String::new(),
            status: SocketStatus::default(),
            timeout_handler: None,
            tracer: None,
        }
    }

    fn stream(&mut self) -> MailForgeResult<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            raise_error!("socket is not connected".into(), ErrorCode::SocketNotConnected)
        })
    }

    /// Decide whether to keep waiting after a no-progress slice.
    fn consult_timeout(&mut self) -> MailForgeResult<()> {
        let Some(handler) = self.timeout_handler.as_mut() else {
            return Ok(());
        };
        if !handler.is_time_out() {
            return Ok(());
        }
        if handler.handle_time_out() {
            handler.reset_time_out();
            return Ok(());
        }
        let elapsed = handler.elapsed_ms();
        Err(raise_error!(
            format!("operation timed out after {} ms", elapsed),
            ErrorCode::OperationTimedOut
        ))
    }

    fn reset_timeout(&mut self) {
        if let Some(handler) = self.timeout_handler.as_mut() {
            handler.reset_time_out();
        }
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

fn is_no_progress(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

impl Socket for TcpSocket {
    fn connect(&mut self, address: &str, port: u16) -> MailForgeResult<()> {
        if self.stream.is_some() {
            return Err(raise_error!(
                "socket is already connected".into(),
                ErrorCode::AlreadyConnected
            ));
        }

        let mut addresses = (address, port).to_socket_addrs().map_err(|e| {
            raise_error!(
                format!("DNS resolution failed for '{}': {}", address, e),
                ErrorCode::ConnectionError
            )
        })?;
        let target = addresses.next().ok_or_else(|| {
            raise_error!(
                format!("no address found for '{}'", address),
                ErrorCode::ConnectionError
            )
        })?;

        debug!("connecting to {} ({}:{})", target, address, port);
        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT).map_err(|e| {
            raise_error!(
                format!("connection to {}:{} failed: {}", address, port, e),
                ErrorCode::ConnectionError
            )
        })?;
        stream
            .set_nodelay(true)
            .map_err(|e| raise_error!(e.to_string(), ErrorCode::SocketError))?;
        stream
            .set_read_timeout(Some(POLL_SLICE))
            .map_err(|e| raise_error!(e.to_string(), ErrorCode::SocketError))?;
        stream
            .set_write_timeout(Some(POLL_SLICE))
            .map_err(|e| raise_error!(e.to_string(), ErrorCode::SocketError))?;

        self.peer_name = address.to_string();
        self.peer_address = target.to_string();
        self.stream = Some(stream);
        self.reset_timeout();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn receive_raw(&mut self, buffer: &mut [u8]) -> MailForgeResult<usize> {
        loop {
            let result = self.stream()?.read(buffer);
            match result {
                Ok(count) => {
                    self.status.would_block = false;
                    self.reset_timeout();
                    return Ok(count);
                }
                Err(error) if is_no_progress(&error) => {
                    self.status.would_block = true;
                    self.consult_timeout().map_err(|timeout| {
                        self.disconnect();
                        timeout
                    })?;
                }
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(error) => {
                    self.disconnect();
                    return Err(raise_error!(
                        format!("socket read failed: {}", error),
                        ErrorCode::SocketError
                    ));
                }
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> MailForgeResult<()> {
        let mut written = 0usize;
        while written < data.len() {
            written += self.send_raw_non_blocking(&data[written..]).map_err(|e| {
                self.disconnect();
                e
            })?;
        }
        Ok(())
    }

    fn send_raw_non_blocking(&mut self, data: &[u8]) -> MailForgeResult<usize> {
        loop {
            let result = self.stream()?.write(data);
            match result {
                Ok(count) => {
                    self.status.would_block = false;
                    self.reset_timeout();
                    return Ok(count);
                }
                Err(error) if is_no_progress(&error) => {
                    self.status.would_block = true;
                    self.consult_timeout()?;
                }
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(error) => {
                    return Err(raise_error!(
                        format!("socket write failed: {}", error),
                        ErrorCode::SocketError
                    ));
                }
            }
        }
    }

    fn wait_for_read(&mut self, timeout: Duration) -> MailForgeResult<bool> {
        let stream = self.stream()?;
        stream
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
            .map_err(|e| raise_error!(e.to_string(), ErrorCode::SocketError))?;
        let mut probe = [0u8; 1];
        let readable = match stream.peek(&mut probe) {
            Ok(_) => true,
            Err(error) if is_no_progress(&error) => false,
            Err(error) => {
                return Err(raise_error!(
                    format!("socket poll failed: {}", error),
                    ErrorCode::SocketError
                ))
            }
        };
        self.stream()?
            .set_read_timeout(Some(POLL_SLICE))
            .map_err(|e| raise_error!(e.to_string(), ErrorCode::SocketError))?;
        Ok(readable)
    }

    fn wait_for_write(&mut self, _timeout: Duration) -> MailForgeResult<bool> {
        // a connected TCP stream with empty kernel buffers is writable
        Ok(self.is_connected())
    }

    fn status(&self) -> SocketStatus {
        self.status
    }

    fn peer_name(&self) -> String {
        self.peer_name.clone()
    }

    fn peer_address(&self) -> String {
        self.peer_address.clone()
    }

    fn set_timeout_handler(&mut self, handler: Option<Box<dyn TimeoutHandler>>) {
        self.timeout_handler = handler;
    }

    fn set_tracer(&mut self, tracer: Option<Arc<dyn Tracer>>) {
        self.tracer = tracer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::net::DefaultTimeoutHandler;
    use std::net::TcpListener;

    #[test]
    fn connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buffer = [0u8; 4];
            stream.read_exact(&mut buffer).unwrap();
            stream.write_all(b"pong").unwrap();
        });

        let mut socket = TcpSocket::new();
        socket.connect("127.0.0.1", port).unwrap();
        assert!(socket.is_connected());
        socket.send(b"ping").unwrap();

        let mut buffer = [0u8; 4];
        let mut got = 0;
        while got < 4 {
            got += socket.receive_raw(&mut buffer[got..]).unwrap();
        }
        assert_eq!(&buffer, b"pong");

        socket.disconnect();
        assert!(!socket.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn silent_peer_times_out_with_elapsed_in_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        // keep the listener alive but never write
        let mut socket = TcpSocket::new();
        socket.set_timeout_handler(Some(Box::new(DefaultTimeoutHandler::new(
            Duration::from_millis(400),
        ))));
        socket.connect("127.0.0.1", port).unwrap();

        let started = std::time::Instant::now();
        let mut buffer = [0u8; 16];
        let error = socket.receive_raw(&mut buffer).unwrap_err();
        assert_eq!(error.code(), ErrorCode::OperationTimedOut);
        assert!(error.message().contains("ms"));
        assert!(started.elapsed() >= Duration::from_millis(350));
        assert!(!socket.is_connected());
        drop(listener);
    }

    #[test]
    fn receive_before_connect_fails() {
        let mut socket = TcpSocket::new();
        let mut buffer = [0u8; 1];
        assert_eq!(
            socket.receive_raw(&mut buffer).unwrap_err().code(),
            ErrorCode::SocketNotConnected
        );
    }

    #[test]
    fn dns_failure_is_a_connection_error() {
        let mut socket = TcpSocket::new();
        let error = socket
            .connect("definitely-not-a-real-host.invalid", 25)
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::ConnectionError);
    }
}
