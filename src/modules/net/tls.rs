// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! TLS session wrapping over any `Socket`, with a pluggable certificate
//! verifier. The default path chains to the webpki roots; embedders can
//! pin explicitly-trusted certificates or supply their own verifier.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::{MailForgeError, MailForgeResult};
use crate::modules::net::{Socket, SocketStatus, TimeoutHandler, Tracer};
use crate::raise_error;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Verifies a peer certificate chain (DER encoded, leaf first) against
/// a host name. Returning an error aborts the handshake.
pub trait CertificateVerifier: Send + Sync {
    fn verify(&self, chain: &[Vec<u8>], hostname: &str) -> MailForgeResult<()>;
}

/// Creates TLS-wrapped sockets from plain ones.
pub struct TlsSession {
    config: Arc<ClientConfig>,
}

/// Builder-style configuration for a `TlsSession`.
#[derive(Default)]
pub struct TlsSessionBuilder {
    custom_verifier: Option<Arc<dyn CertificateVerifier>>,
    trusted_certificates: Vec<Vec<u8>>,
}

impl TlsSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom verifier instead of the webpki chain validation.
    pub fn with_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.custom_verifier = Some(verifier);
        self
    }

    /// Accept this exact certificate (DER) regardless of its chain.
    pub fn trust_certificate(mut self, der: Vec<u8>) -> Self {
        self.trusted_certificates.push(der);
        self
    }

    pub fn build(self) -> MailForgeResult<TlsSession> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.into(),
        };
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| {
                raise_error!(
                    format!("failed to build certificate verifier: {}", e),
                    ErrorCode::TlsError
                )
            })?;

        let verifier = Arc::new(PluggableVerifier {
            webpki,
            custom: self.custom_verifier,
            trusted: self
                .trusted_certificates
                .into_iter()
                .map(CertificateDer::from)
                .collect(),
            algorithms: provider.signature_verification_algorithms,
        });

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| {
                raise_error!(
                    format!("unsupported TLS protocol versions: {}", e),
                    ErrorCode::TlsError
                )
            })?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        Ok(TlsSession {
            config: Arc::new(config),
        })
    }
}

impl TlsSession {
    pub fn new() -> MailForgeResult<Self> {
        TlsSessionBuilder::new().build()
    }

    pub fn builder() -> TlsSessionBuilder {
        TlsSessionBuilder::new()
    }

    /// Run the client-initiated handshake over `socket` and return the
    /// wrapped stream. The peer chain is verified during the handshake.
    pub fn wrap(&self, socket: Box<dyn Socket>, hostname: &str) -> MailForgeResult<TlsSocket> {
        let server_name = ServerName::try_from(hostname.to_string()).map_err(|_| {
            raise_error!(
                format!("invalid TLS server name: '{}'", hostname),
                ErrorCode::TlsError
            )
        })?;
        let mut connection =
            ClientConnection::new(self.config.clone(), server_name).map_err(|e| {
                raise_error!(
                    format!("TLS client setup failed: {}", e),
                    ErrorCode::TlsError
                )
            })?;

        let mut transport = SocketTransport {
            socket,
            last_error: None,
        };

        debug!("starting TLS handshake with {}", hostname);
        while connection.is_handshaking() {
            if let Err(error) = connection.complete_io(&mut transport) {
                let cause = transport
                    .last_error
                    .take()
                    .map(|e| e.message().to_string())
                    .unwrap_or_else(|| error.to_string());
                let certificate_failure = error
                    .get_ref()
                    .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                    .map(|e| matches!(e, rustls::Error::InvalidCertificate(_)))
                    .unwrap_or(false)
                    || cause.contains("InvalidCertificate")
                    || cause.contains("invalid peer certificate");
                let code = if certificate_failure {
                    ErrorCode::CertificateVerificationError
                } else {
                    ErrorCode::TlsError
                };
                return Err(raise_error!(
                    format!("TLS handshake with '{}' failed: {}", hostname, cause),
                    code
                ));
            }
        }
        debug!("TLS handshake with {} complete", hostname);

        Ok(TlsSocket {
            stream: rustls::StreamOwned::new(connection, transport),
        })
    }
}

/// Bridges the `Socket` trait into `std::io` for rustls.
struct SocketTransport {
    socket: Box<dyn Socket>,
    last_error: Option<MailForgeError>,
}

impl Read for SocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.socket.receive_raw(buf).map_err(|error| {
            let io = std::io::Error::other(error.message().to_string());
            self.last_error = Some(error);
            io
        })
    }
}

impl Write for SocketTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.socket.send(buf) {
            Ok(()) => Ok(buf.len()),
            Err(error) => {
                let io = std::io::Error::other(error.message().to_string());
                self.last_error = Some(error);
                Err(io)
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A TLS-wrapped socket.
pub struct TlsSocket {
    stream: rustls::StreamOwned<ClientConnection, SocketTransport>,
}

impl TlsSocket {
    /// The peer's certificate chain (DER, leaf first).
    pub fn peer_certificates(&self) -> Vec<Vec<u8>> {
        self.stream
            .conn
            .peer_certificates()
            .map(|certs| certs.iter().map(|cert| cert.as_ref().to_vec()).collect())
            .unwrap_or_default()
    }

    fn map_io_error(&mut self, error: std::io::Error) -> MailForgeError {
        self.stream
            .sock
            .last_error
            .take()
            .unwrap_or_else(|| raise_error!(format!("TLS I/O failed: {}", error), ErrorCode::TlsError))
    }
}

impl Socket for TlsSocket {
    fn connect(&mut self, _address: &str, _port: u16) -> MailForgeResult<()> {
        Err(raise_error!(
            "TLS sockets wrap an already-connected socket".into(),
            ErrorCode::IllegalOperation
        ))
    }

    fn is_connected(&self) -> bool {
        self.stream.sock.socket.is_connected()
    }

    fn disconnect(&mut self) {
        self.stream.conn.send_close_notify();
        let _ = self.stream.flush();
        self.stream.sock.socket.disconnect();
    }

    fn receive_raw(&mut self, buffer: &mut [u8]) -> MailForgeResult<usize> {
        match self.stream.read(buffer) {
            Ok(count) => Ok(count),
            Err(error) => Err(self.map_io_error(error)),
        }
    }

    fn send(&mut self, data: &[u8]) -> MailForgeResult<()> {
        match self.stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(error) => Err(self.map_io_error(error)),
        }
    }

    fn send_raw_non_blocking(&mut self, data: &[u8]) -> MailForgeResult<usize> {
        match self.stream.write(data) {
            Ok(count) => Ok(count),
            Err(error) => Err(self.map_io_error(error)),
        }
    }

    fn wait_for_read(&mut self, timeout: Duration) -> MailForgeResult<bool> {
        self.stream.sock.socket.wait_for_read(timeout)
    }

    fn wait_for_write(&mut self, timeout: Duration) -> MailForgeResult<bool> {
        self.stream.sock.socket.wait_for_write(timeout)
    }

    fn status(&self) -> SocketStatus {
        self.stream.sock.socket.status()
    }

    fn peer_name(&self) -> String {
        self.stream.sock.socket.peer_name()
    }

    fn peer_address(&self) -> String {
        self.stream.sock.socket.peer_address()
    }

    fn set_timeout_handler(&mut self, handler: Option<Box<dyn TimeoutHandler>>) {
        self.stream.sock.socket.set_timeout_handler(handler);
    }

    fn set_tracer(&mut self, tracer: Option<Arc<dyn Tracer>>) {
        self.stream.sock.socket.set_tracer(tracer);
    }
}

/// The rustls-facing verifier: exact-match pins first, then the custom
/// verifier when present, then webpki chain validation.
struct PluggableVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    custom: Option<Arc<dyn CertificateVerifier>>,
    trusted: Vec<CertificateDer<'static>>,
    algorithms: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl std::fmt::Debug for PluggableVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluggableVerifier")
            .field("custom", &self.custom.is_some())
            .field("trusted", &self.trusted.len())
            .finish()
    }
}

impl ServerCertVerifier for PluggableVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self
            .trusted
            .iter()
            .any(|pinned| pinned.as_ref() == end_entity.as_ref())
        {
            return Ok(ServerCertVerified::assertion());
        }

        if let Some(custom) = &self.custom {
            let mut chain = Vec::with_capacity(intermediates.len() + 1);
            chain.push(end_entity.as_ref().to_vec());
            chain.extend(intermediates.iter().map(|cert| cert.as_ref().to_vec()));
            let hostname = match server_name {
                ServerName::DnsName(dns) => dns.as_ref().to_string(),
                other => format!("{:?}", other),
            };
            return custom
                .verify(&chain, &hostname)
                .map(|_| ServerCertVerified::assertion())
                .map_err(|error| {
                    rustls::Error::General(format!("InvalidCertificate: {}", error.message()))
                });
        }

        self.webpki
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_builds_with_default_roots() {
        assert!(TlsSession::new().is_ok());
    }

    #[test]
    fn session_builds_with_custom_verifier() {
        struct AcceptAll;
        impl CertificateVerifier for AcceptAll {
            fn verify(&self, _chain: &[Vec<u8>], _hostname: &str) -> MailForgeResult<()> {
                Ok(())
            }
        }
        let session = TlsSession::builder()
            .with_verifier(Arc::new(AcceptAll))
            .trust_certificate(vec![0x30, 0x82])
            .build();
        assert!(session.is_ok());
    }
}
