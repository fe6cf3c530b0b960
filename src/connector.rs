//! Connection establishment: server rotation, source binding, TLS.
//!
//! The connector round-robins the configured server list. A failed attempt
//! advances to the next candidate after a fixed back-off; a successful
//! connection keeps the index so the next reconnect tries the same server
//! first.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::rustls::{self, pki_types::ServerName, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{BotError, Result};
use crate::transport::{split_tcp, split_tls, TransportReader, TransportWriter};

/// Fixed wait between connection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Round-robin server connector.
pub struct Connector {
    servers: Vec<ServerConfig>,
    bindhost: Option<String>,
    index: usize,
}

impl Connector {
    pub fn new(servers: Vec<ServerConfig>, bindhost: Option<String>) -> Self {
        Connector {
            servers,
            bindhost,
            index: 0,
        }
    }

    /// Swap in a new server list (config reload).
    pub fn update(&mut self, servers: Vec<ServerConfig>, bindhost: Option<String>) {
        self.servers = servers;
        self.bindhost = bindhost;
        self.index = 0;
    }

    /// Advance to the next server; called after a steady-state disconnect.
    pub fn rotate(&mut self) {
        if !self.servers.is_empty() {
            self.index = (self.index + 1) % self.servers.len();
        }
    }

    /// Connect to the next willing server, backing off 5 s between
    /// attempts. Runs until a connection is established; the caller
    /// cancels by dropping the future.
    pub async fn connect(&mut self) -> (ServerConfig, TransportReader, TransportWriter) {
        loop {
            let server = self.servers[self.index % self.servers.len()].clone();
            info!(
                host = %server.host,
                port = server.port,
                tls = server.tls,
                "connecting"
            );
            match self.try_connect(&server).await {
                Ok((reader, writer)) => {
                    info!(host = %server.host, "connected");
                    return (server, reader, writer);
                }
                Err(e) => {
                    error!(host = %server.host, port = server.port, "connect failed: {}", e);
                    self.index = (self.index + 1) % self.servers.len();
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn try_connect(
        &self,
        server: &ServerConfig,
    ) -> Result<(TransportReader, TransportWriter)> {
        let addr = lookup_host((server.host.as_str(), server.port))
            .await?
            .next()
            .ok_or_else(|| {
                BotError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {}", server.host),
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        if let Some(bindhost) = &self.bindhost {
            let ip: std::net::IpAddr = bindhost
                .parse()
                .map_err(|_| BotError::Config(format!("invalid bindhost: {}", bindhost)))?;
            info!(bindhost = %ip, "binding local source address");
            socket.bind(std::net::SocketAddr::new(ip, 0))?;
        }

        let stream = socket.connect(addr).await?;

        if server.tls {
            let stream = self.wrap_tls(server, stream).await?;
            Ok(split_tls(stream))
        } else {
            Ok(split_tcp(stream))
        }
    }

    async fn wrap_tls(
        &self,
        server: &ServerConfig,
        stream: TcpStream,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        let config = if server.verify_cert {
            let mut roots = RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                warn!("native root certificate error: {}", err);
            }
            roots.add_parsable_certificates(native.certs);
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            warn!(host = %server.host, "certificate verification disabled");
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(danger::NoVerification::new()))
                .with_no_client_auth()
        };

        let connector = TlsConnector::from(Arc::new(config));
        let name = ServerName::try_from(server.host.clone())
            .map_err(|_| BotError::Config(format!("invalid server name: {}", server.host)))?;
        Ok(connector.connect(name, stream).await?)
    }
}

mod danger {
    //! Certificate verifier for `verify_cert: false`. Accepts any chain
    //! while still checking handshake signatures.

    use tokio_rustls::rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use tokio_rustls::rustls::crypto::{self, CryptoProvider};
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use tokio_rustls::rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerification {
        provider: CryptoProvider,
    }

    impl NoVerification {
        pub fn new() -> Self {
            NoVerification {
                provider: crypto::aws_lc_rs::default_provider(),
            }
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
