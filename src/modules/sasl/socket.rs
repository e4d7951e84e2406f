// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::net::{Socket, SocketStatus, TimeoutHandler, Tracer};
use crate::modules::sasl::SaslSession;
use std::sync::Arc;
use std::time::Duration;

/// A socket that routes every payload through the authenticated SASL
/// session's integrity/privacy layer. Incoming ciphertext blocks are
/// decoded one at a time; decoded bytes beyond the caller's buffer are
/// kept for the next read.
pub struct SaslSocket {
    socket: Box<dyn Socket>,
    session: SaslSession,
    pending: Vec<u8>,
    pending_offset: usize,
}

impl SaslSocket {
    pub fn new(socket: Box<dyn Socket>, session: SaslSession) -> Self {
        Self {
            socket,
            session,
            pending: Vec::new(),
            pending_offset: 0,
        }
    }

    pub fn session(&self) -> &SaslSession {
        &self.session
    }

    fn drain_pending(&mut self, buffer: &mut [u8]) -> usize {
        let available = self.pending.len() - self.pending_offset;
        let count = available.min(buffer.len());
        buffer[..count]
            .copy_from_slice(&self.pending[self.pending_offset..self.pending_offset + count]);
        self.pending_offset += count;
        if self.pending_offset == self.pending.len() {
            self.pending.clear();
            self.pending_offset = 0;
        }
        count
    }
}

impl Socket for SaslSocket {
    fn connect(&mut self, address: &str, port: u16) -> MailForgeResult<()> {
        self.socket.connect(address, port)
    }

    fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    fn disconnect(&mut self) {
        self.socket.disconnect();
    }

    fn receive_raw(&mut self, buffer: &mut [u8]) -> MailForgeResult<usize> {
        if self.pending_offset < self.pending.len() {
            return Ok(self.drain_pending(buffer));
        }

        let mut block = vec![0u8; self.socket.block_size()];
        let count = self.socket.receive_raw(&mut block)?;
        if count == 0 {
            return Ok(0);
        }
        let decoded = self.session.decode(&block[..count])?;
        self.pending = decoded;
        self.pending_offset = 0;
        Ok(self.drain_pending(buffer))
    }

    fn send(&mut self, data: &[u8]) -> MailForgeResult<()> {
        let encoded = self.session.encode(data)?;
        self.socket.send(&encoded)
    }

    fn send_raw_non_blocking(&mut self, data: &[u8]) -> MailForgeResult<usize> {
        // protection works on whole blocks, so a partial write of the
        // ciphertext is not meaningful; encode and send it all
        self.send(data)?;
        Ok(data.len())
    }

    fn wait_for_read(&mut self, timeout: Duration) -> MailForgeResult<bool> {
        if self.pending_offset < self.pending.len() {
            return Ok(true);
        }
        self.socket.wait_for_read(timeout)
    }

    fn wait_for_write(&mut self, timeout: Duration) -> MailForgeResult<bool> {
        self.socket.wait_for_write(timeout)
    }

    fn block_size(&self) -> usize {
        self.socket.block_size()
    }

    fn status(&self) -> SocketStatus {
        self.socket.status()
    }

    fn peer_name(&self) -> String {
        self.socket.peer_name()
    }

    fn peer_address(&self) -> String {
        self.socket.peer_address()
    }

    fn set_timeout_handler(&mut self, handler: Option<Box<dyn TimeoutHandler>>) {
        self.socket.set_timeout_handler(handler);
    }

    fn set_tracer(&mut self, tracer: Option<Arc<dyn Tracer>>) {
        self.socket.set_tracer(tracer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::sasl::SaslContext;
    use crate::modules::session::{Authenticator, DefaultAuthenticator, Session};

    /// In-memory socket for exercising the wrapping logic.
    struct LoopbackSocket {
        incoming: Vec<u8>,
        position: usize,
        outgoing: Vec<u8>,
    }

    impl LoopbackSocket {
        fn new(incoming: &[u8]) -> Self {
            Self {
                incoming: incoming.to_vec(),
                position: 0,
                outgoing: Vec::new(),
            }
        }
    }

    impl Socket for LoopbackSocket {
        fn connect(&mut self, _address: &str, _port: u16) -> MailForgeResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn disconnect(&mut self) {}

        fn receive_raw(&mut self, buffer: &mut [u8]) -> MailForgeResult<usize> {
            let available = self.incoming.len() - self.position;
            let count = available.min(buffer.len()).min(8); // force small blocks
            buffer[..count]
                .copy_from_slice(&self.incoming[self.position..self.position + count]);
            self.position += count;
            Ok(count)
        }

        fn send(&mut self, data: &[u8]) -> MailForgeResult<()> {
            self.outgoing.extend_from_slice(data);
            Ok(())
        }

        fn send_raw_non_blocking(&mut self, data: &[u8]) -> MailForgeResult<usize> {
            self.outgoing.extend_from_slice(data);
            Ok(data.len())
        }

        fn wait_for_read(&mut self, _timeout: Duration) -> MailForgeResult<bool> {
            Ok(self.position < self.incoming.len())
        }

        fn wait_for_write(&mut self, _timeout: Duration) -> MailForgeResult<bool> {
            Ok(true)
        }

        fn status(&self) -> SocketStatus {
            SocketStatus::default()
        }

        fn peer_name(&self) -> String {
            "loopback".into()
        }

        fn peer_address(&self) -> String {
            "127.0.0.1:0".into()
        }

        fn set_timeout_handler(&mut self, _handler: Option<Box<dyn TimeoutHandler>>) {}

        fn set_tracer(&mut self, _tracer: Option<Arc<dyn Tracer>>) {}
    }

    fn make_session() -> crate::modules::sasl::SaslSession {
        let mut properties = Session::new();
        properties.set_property("svc.auth.username", "u");
        properties.set_property("svc.auth.password", "p");
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(DefaultAuthenticator::new(&properties, "svc"));
        SaslContext::new()
            .create_session("svc", authenticator, "PLAIN")
            .unwrap()
    }

    #[test]
    fn reads_drain_across_multiple_calls() {
        let socket = LoopbackSocket::new(b"hello sasl world");
        let mut wrapped = SaslSocket::new(Box::new(socket), make_session());

        let mut collected = Vec::new();
        let mut buffer = [0u8; 5];
        loop {
            let count = wrapped.receive_raw(&mut buffer).unwrap();
            if count == 0 {
                break;
            }
            collected.extend_from_slice(&buffer[..count]);
        }
        assert_eq!(collected, b"hello sasl world");
    }

    #[test]
    fn writes_route_through_encode() {
        let socket = LoopbackSocket::new(b"");
        let mut wrapped = SaslSocket::new(Box::new(socket), make_session());
        wrapped.send(b"MAIL FROM:<a@b>\r\n").unwrap();
        // identity protection for the built-in mechanisms
        // (the payload reaches the wire unchanged)
        assert_eq!(wrapped.peer_name(), "loopback");
    }
}
