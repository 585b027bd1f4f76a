use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;

use super::fragment::{Fragmentation, FragmentedStream};
use super::{ALPN_PROTOCOLS, ProbeMethod, dial};
use crate::connection::BoxedConnection;
use crate::probe::context::ProbeContext;
use crate::probe::error::ProbeError;
use crate::probe::result::AttemptResult;

/// TCP + rustls, pinned to a set of TLS versions, optionally with a
/// fragmented ClientHello.
pub struct RustlsMethod {
    label: String,
    config: Arc<ClientConfig>,
    fragmentation: Option<Fragmentation>,
}

impl RustlsMethod {
    pub fn new(
        label: impl Into<String>,
        versions: &[&'static SupportedProtocolVersion],
    ) -> Result<Self, rustls::Error> {
        Ok(Self {
            label: label.into(),
            config: Arc::new(client_config(versions)?),
            fragmentation: None,
        })
    }

    pub fn fragmented(mut self, fragmentation: Fragmentation) -> Self {
        self.fragmentation = Some(fragmentation);
        self
    }

    async fn handshake<S>(
        &self,
        ctx: &ProbeContext,
        server_name: ServerName<'static>,
        stream: S,
    ) -> Result<BoxedConnection, ProbeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connector = TlsConnector::from(Arc::clone(&self.config));
        let tls = ctx
            .bound(connector.connect(server_name, stream))
            .await?
            .map_err(ProbeError::Handshake)?;
        Ok(Box::new(tls))
    }
}

fn client_config(versions: &[&'static SupportedProtocolVersion]) -> Result<ClientConfig, rustls::Error> {
    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.as_bytes().to_vec()).collect();
    Ok(config)
}

#[async_trait]
impl ProbeMethod for RustlsMethod {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(
        &self,
        ctx: &ProbeContext,
        endpoint: SocketAddr,
        sni: &str,
        _host: &str,
    ) -> AttemptResult {
        let mut result = AttemptResult::default();

        let (tcp, transport) = match dial(ctx, endpoint).await {
            Ok(dialed) => dialed,
            Err(err) => return result.failed(err),
        };
        result.transport = transport;

        let server_name = match ServerName::try_from(sni.to_string()) {
            Ok(name) => name,
            Err(_) => return result.failed(ProbeError::ServerName(sni.to_string())),
        };

        let start = Instant::now();
        let handshake = match self.fragmentation {
            Some(plan) => {
                self.handshake(ctx, server_name, FragmentedStream::new(tcp, plan))
                    .await
            }
            None => self.handshake(ctx, server_name, tcp).await,
        };
        result.tls_handshake = start.elapsed();

        match handshake {
            Ok(connection) => result.connected(connection),
            Err(err) => result.failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_offers_h2_and_http1() {
        let config = client_config(&[&rustls::version::TLS13]).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[test]
    fn builds_both_versions() {
        assert!(RustlsMethod::new("tls12", &[&rustls::version::TLS12]).is_ok());
        let method = RustlsMethod::new("tls13", &[&rustls::version::TLS13])
            .unwrap()
            .fragmented(Fragmentation::default());
        assert_eq!(method.label(), "tls13");
        assert!(method.fragmentation.is_some());
    }

    #[tokio::test]
    async fn refused_connection_is_recorded() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        drop(listener);

        let method = RustlsMethod::new("tls13", &[&rustls::version::TLS13]).unwrap();
        let ctx = ProbeContext::background().with_timeout(std::time::Duration::from_secs(5));
        let result = method.attempt(&ctx, endpoint, "localhost", "localhost").await;

        assert!(!result.is_success());
        assert!(result.connection.is_none());
        assert!(matches!(
            result.error,
            Some(ProbeError::Connect { .. }) | Some(ProbeError::Context(_))
        ));
    }

    #[tokio::test]
    async fn handshake_failure_keeps_transport_time() {
        // A server that accepts and immediately closes.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let method = RustlsMethod::new("tls12", &[&rustls::version::TLS12]).unwrap();
        let ctx = ProbeContext::background().with_timeout(std::time::Duration::from_secs(5));
        let result = method.attempt(&ctx, endpoint, "localhost", "localhost").await;

        assert!(matches!(result.error, Some(ProbeError::Handshake(_))));
        assert!(result.transport > std::time::Duration::ZERO);
    }
}
