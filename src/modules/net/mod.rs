// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The stream transport layer: the socket contract, timeout handling,
//! protocol tracing, and the TLS and TCP implementations.

use crate::modules::error::MailForgeResult;
use std::time::{Duration, Instant};

pub mod socket;
pub mod text_protocol;
pub mod tls;

/// Socket status bits reported by `Socket::status`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SocketStatus {
    pub would_block: bool,
}

/// A connected byte stream. All operations block until complete, timed
/// out or cancelled; the attached timeout handler is consulted whenever
/// a read or write makes no progress.
pub trait Socket: Send {
    fn connect(&mut self, address: &str, port: u16) -> MailForgeResult<()>;

    fn is_connected(&self) -> bool;

    fn disconnect(&mut self);

    /// Read whatever is available, up to the block size.
    fn receive(&mut self) -> MailForgeResult<Vec<u8>> {
        let mut buffer = vec![0u8; self.block_size()];
        let count = self.receive_raw(&mut buffer)?;
        buffer.truncate(count);
        Ok(buffer)
    }

    /// Read up to `buffer.len()` bytes, blocking until at least one
    /// byte arrives, EOF, timeout or cancellation.
    fn receive_raw(&mut self, buffer: &mut [u8]) -> MailForgeResult<usize>;

    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> MailForgeResult<()>;

    /// Write as much of `data` as currently fits, returning the number
    /// of bytes written (possibly zero).
    fn send_raw_non_blocking(&mut self, data: &[u8]) -> MailForgeResult<usize>;

    fn wait_for_read(&mut self, timeout: Duration) -> MailForgeResult<bool>;

    fn wait_for_write(&mut self, timeout: Duration) -> MailForgeResult<bool>;

    fn block_size(&self) -> usize {
        16384
    }

    fn status(&self) -> SocketStatus;

    fn peer_name(&self) -> String;

    fn peer_address(&self) -> String;

    fn set_timeout_handler(&mut self, handler: Option<Box<dyn TimeoutHandler>>);

    fn set_tracer(&mut self, tracer: Option<std::sync::Arc<dyn Tracer>>);
}

/// Polled by sockets when an operation makes no progress. Returning
/// `false` from `handle_time_out` cancels the operation; returning
/// `true` resets the deadline and retries.
pub trait TimeoutHandler: Send {
    /// Whether the deadline has passed since the last reset.
    fn is_time_out(&self) -> bool;

    /// Restart the clock.
    fn reset_time_out(&mut self);

    /// Called when the deadline passed; decide whether to keep waiting.
    fn handle_time_out(&mut self) -> bool;

    /// Milliseconds elapsed since the last reset.
    fn elapsed_ms(&self) -> u128;
}

pub trait TimeoutHandlerFactory: Send + Sync {
    fn create(&self) -> Box<dyn TimeoutHandler>;
}

/// Fixed-deadline handler: times out after `limit` and never retries.
pub struct DefaultTimeoutHandler {
    limit: Duration,
    started: Instant,
}

impl DefaultTimeoutHandler {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            started: Instant::now(),
        }
    }
}

impl TimeoutHandler for DefaultTimeoutHandler {
    fn is_time_out(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    fn reset_time_out(&mut self) {
        self.started = Instant::now();
    }

    fn handle_time_out(&mut self) -> bool {
        false
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

pub struct DefaultTimeoutHandlerFactory {
    pub limit: Duration,
}

impl DefaultTimeoutHandlerFactory {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl TimeoutHandlerFactory for DefaultTimeoutHandlerFactory {
    fn create(&self) -> Box<dyn TimeoutHandler> {
        Box::new(DefaultTimeoutHandler::new(self.limit))
    }
}

/// Observes protocol lines as they cross the wire. Strictly
/// observational; implementations must not block.
pub trait Tracer: Send + Sync {
    fn trace_send(&self, line: &str);
    fn trace_receive(&self, line: &str);
}

pub trait TracerFactory: Send + Sync {
    fn create(&self, service: &str, connection_id: u64) -> std::sync::Arc<dyn Tracer>;
}

/// Routes protocol lines to `tracing` at TRACE level.
pub struct LogTracer {
    service: String,
    connection_id: u64,
}

impl LogTracer {
    pub fn new(service: &str, connection_id: u64) -> Self {
        Self {
            service: service.to_string(),
            connection_id,
        }
    }
}

impl Tracer for LogTracer {
    fn trace_send(&self, line: &str) {
        tracing::trace!(
            service = %self.service,
            connection = self.connection_id,
            "C: {}",
            line
        );
    }

    fn trace_receive(&self, line: &str) {
        tracing::trace!(
            service = %self.service,
            connection = self.connection_id,
            "S: {}",
            line
        );
    }
}

pub struct LogTracerFactory;

impl TracerFactory for LogTracerFactory {
    fn create(&self, service: &str, connection_id: u64) -> std::sync::Arc<dyn Tracer> {
        std::sync::Arc::new(LogTracer::new(service, connection_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_handler_expires_and_resets() {
        let mut handler = DefaultTimeoutHandler::new(Duration::from_millis(0));
        assert!(handler.is_time_out());
        assert!(!handler.handle_time_out());

        let mut patient = DefaultTimeoutHandler::new(Duration::from_secs(3600));
        assert!(!patient.is_time_out());
        patient.reset_time_out();
        assert!(patient.elapsed_ms() < 1000);
    }
}
