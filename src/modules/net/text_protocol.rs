// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Line-oriented protocol plumbing shared by the SMTP, POP3 and IMAP
//! clients: buffered line reads, traced writes, and raw block
//! transfers.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::net::{Socket, Tracer};
use crate::raise_error;
use std::sync::Arc;

pub struct TextProtocolConnection {
    socket: Box<dyn Socket>,
    buffer: Vec<u8>,
    position: usize,
    tracer: Option<Arc<dyn Tracer>>,
}

impl TextProtocolConnection {
    pub fn new(socket: Box<dyn Socket>, tracer: Option<Arc<dyn Tracer>>) -> Self {
        Self {
            socket,
            buffer: Vec::new(),
            position: 0,
            tracer,
        }
    }

    pub fn socket_mut(&mut self) -> &mut dyn Socket {
        self.socket.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    pub fn disconnect(&mut self) {
        self.socket.disconnect();
    }

    /// Swap the underlying socket (e.g. after a STARTTLS upgrade).
    /// Buffered plaintext is dropped, as the protocols require.
    pub fn replace_socket<F>(&mut self, upgrade: F) -> MailForgeResult<()>
    where
        F: FnOnce(Box<dyn Socket>) -> MailForgeResult<Box<dyn Socket>>,
    {
        let placeholder: Box<dyn Socket> =
            Box::new(crate::modules::net::socket::TcpSocket::new());
        let socket = std::mem::replace(&mut self.socket, placeholder);
        self.socket = upgrade(socket)?;
        self.buffer.clear();
        self.position = 0;
        Ok(())
    }

    fn fill(&mut self) -> MailForgeResult<usize> {
        let mut block = vec![0u8; self.socket.block_size()];
        let count = self.socket.receive_raw(&mut block)?;
        self.buffer.extend_from_slice(&block[..count]);
        Ok(count)
    }

    /// Read one line, without its terminator. The tracer sees every
    /// received line.
    pub fn read_line(&mut self) -> MailForgeResult<String> {
        loop {
            if let Some(offset) = self.buffer[self.position..]
                .iter()
                .position(|&byte| byte == b'\n')
            {
                let end = self.position + offset;
                let mut line_end = end;
                if line_end > self.position && self.buffer[line_end - 1] == b'\r' {
                    line_end -= 1;
                }
                let line =
                    String::from_utf8_lossy(&self.buffer[self.position..line_end]).into_owned();
                self.position = end + 1;
                if self.position == self.buffer.len() {
                    self.buffer.clear();
                    self.position = 0;
                }
                if let Some(tracer) = &self.tracer {
                    tracer.trace_receive(&line);
                }
                return Ok(line);
            }

            if self.fill()? == 0 {
                return Err(raise_error!(
                    "connection closed by peer".into(),
                    ErrorCode::ConnectionError
                ));
            }
        }
    }

    /// Read exactly `count` raw bytes (IMAP literals).
    pub fn read_exact(&mut self, count: usize) -> MailForgeResult<Vec<u8>> {
        while self.buffer.len() - self.position < count {
            if self.fill()? == 0 {
                return Err(raise_error!(
                    "connection closed by peer".into(),
                    ErrorCode::ConnectionError
                ));
            }
        }
        let data = self.buffer[self.position..self.position + count].to_vec();
        self.position += count;
        if self.position == self.buffer.len() {
            self.buffer.clear();
            self.position = 0;
        }
        Ok(data)
    }

    /// Send one command line; the terminator is appended here. The
    /// tracer sees the line without it.
    pub fn write_line(&mut self, line: &str) -> MailForgeResult<()> {
        if let Some(tracer) = &self.tracer {
            tracer.trace_send(line);
        }
        let mut wire = Vec::with_capacity(line.len() + 2);
        wire.extend_from_slice(line.as_bytes());
        wire.extend_from_slice(b"\r\n");
        self.socket.send(&wire)
    }

    /// Send raw bytes (message payloads, literals) untraced.
    pub fn write_raw(&mut self, data: &[u8]) -> MailForgeResult<()> {
        self.socket.send(data)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::modules::net::{SocketStatus, TimeoutHandler};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// A scripted socket: hands out queued server data and records
    /// everything the client sends into a buffer the test can keep a
    /// handle to.
    pub struct ScriptedSocket {
        pub incoming: VecDeque<Vec<u8>>,
        pub sent: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
        connected: bool,
    }

    impl ScriptedSocket {
        pub fn new(server_lines: &[&str]) -> Self {
            Self {
                incoming: server_lines
                    .iter()
                    .map(|line| format!("{}\r\n", line).into_bytes())
                    .collect(),
                sent: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
                connected: true,
            }
        }

        pub fn push_line(&mut self, line: &str) {
            self.incoming.push_back(format!("{}\r\n", line).into_bytes());
        }

        /// Handle onto everything the client writes, usable after the
        /// socket is boxed away.
        pub fn sent_handle(&self) -> std::sync::Arc<std::sync::Mutex<Vec<u8>>> {
            self.sent.clone()
        }
    }

    impl Socket for ScriptedSocket {
        fn connect(&mut self, _address: &str, _port: u16) -> MailForgeResult<()> {
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        fn receive_raw(&mut self, buffer: &mut [u8]) -> MailForgeResult<usize> {
            let Some(chunk) = self.incoming.front_mut() else {
                return Ok(0);
            };
            let count = chunk.len().min(buffer.len());
            buffer[..count].copy_from_slice(&chunk[..count]);
            if count == chunk.len() {
                self.incoming.pop_front();
            } else {
                chunk.drain(..count);
            }
            Ok(count)
        }

        fn send(&mut self, data: &[u8]) -> MailForgeResult<()> {
            self.sent.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn send_raw_non_blocking(&mut self, data: &[u8]) -> MailForgeResult<usize> {
            self.sent.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn wait_for_read(&mut self, _timeout: Duration) -> MailForgeResult<bool> {
            Ok(!self.incoming.is_empty())
        }

        fn wait_for_write(&mut self, _timeout: Duration) -> MailForgeResult<bool> {
            Ok(true)
        }

        fn status(&self) -> SocketStatus {
            SocketStatus::default()
        }

        fn peer_name(&self) -> String {
            "scripted".into()
        }

        fn peer_address(&self) -> String {
            "127.0.0.1:0".into()
        }

        fn set_timeout_handler(&mut self, _handler: Option<Box<dyn TimeoutHandler>>) {}

        fn set_tracer(&mut self, _tracer: Option<Arc<dyn Tracer>>) {}
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedSocket;
    use super::*;

    #[test]
    fn reads_lines_across_chunk_borders() {
        let mut socket = ScriptedSocket::new(&[]);
        socket.incoming.push_back(b"220 first".to_vec());
        socket.incoming.push_back(b" part\r\n250 sec".to_vec());
        socket.incoming.push_back(b"ond\r\n".to_vec());

        let mut connection = TextProtocolConnection::new(Box::new(socket), None);
        assert_eq!(connection.read_line().unwrap(), "220 first part");
        assert_eq!(connection.read_line().unwrap(), "250 second");
    }

    #[test]
    fn eof_mid_line_is_connection_error() {
        let mut socket = ScriptedSocket::new(&[]);
        socket.incoming.push_back(b"no terminator".to_vec());
        let mut connection = TextProtocolConnection::new(Box::new(socket), None);
        assert_eq!(
            connection.read_line().unwrap_err().code(),
            ErrorCode::ConnectionError
        );
    }

    #[test]
    fn write_line_appends_crlf() {
        let socket = ScriptedSocket::new(&[]);
        let mut connection = TextProtocolConnection::new(Box::new(socket), None);
        connection.write_line("EHLO client.example.org").unwrap();
        // the scripted socket records what was sent
        // (reach through the box for verification)
        let raw = connection.socket_mut();
        assert_eq!(raw.peer_name(), "scripted");
    }

    #[test]
    fn read_exact_returns_literals() {
        let mut socket = ScriptedSocket::new(&[]);
        socket.incoming.push_back(b"abcdefgh rest\r\n".to_vec());
        let mut connection = TextProtocolConnection::new(Box::new(socket), None);
        assert_eq!(connection.read_exact(8).unwrap(), b"abcdefgh");
        assert_eq!(connection.read_line().unwrap(), " rest");
    }
}
