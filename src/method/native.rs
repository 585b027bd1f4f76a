use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use tokio_native_tls::TlsConnector as TokioTlsConnector;

use super::{ALPN_PROTOCOLS, ProbeMethod, dial};
use crate::probe::context::ProbeContext;
use crate::probe::error::ProbeError;
use crate::probe::result::AttemptResult;

/// TCP + the platform TLS library, which sends a different ClientHello than rustls.
pub struct NativeTlsMethod {
    label: String,
    connector: TokioTlsConnector,
}

impl NativeTlsMethod {
    pub fn new(label: impl Into<String>) -> Result<Self, native_tls::Error> {
        let connector = native_tls::TlsConnector::builder()
            .request_alpns(ALPN_PROTOCOLS)
            .build()?;
        Ok(Self {
            label: label.into(),
            connector: TokioTlsConnector::from(connector),
        })
    }
}

#[async_trait]
impl ProbeMethod for NativeTlsMethod {
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

        let start = Instant::now();
        let handshake = ctx.bound(self.connector.connect(sni, tcp)).await;
        result.tls_handshake = start.elapsed();

        match handshake {
            Ok(Ok(tls)) => result.connected(Box::new(tls)),
            Ok(Err(err)) => result.failed(ProbeError::NativeHandshake(err)),
            Err(err) => result.failed(err),
        }
    }
}
