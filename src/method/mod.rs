//! Connection-establishment methods under test.
//!
//! Every method dials the endpoint itself and hands back the timings of the
//! transport and TLS phases plus the live connection. The runner never looks
//! at which technique a method uses.

mod fragment;
mod native;
mod tls;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::probe::context::ProbeContext;
use crate::probe::error::ProbeError;
use crate::probe::result::AttemptResult;

pub use fragment::{Fragmentation, FragmentedStream};
pub use native::NativeTlsMethod;
pub use tls::RustlsMethod;

/// Protocols offered through ALPN, most preferred first.
pub const ALPN_PROTOCOLS: &[&str] = &["h2", "http/1.1"];

#[async_trait]
pub trait ProbeMethod: Send + Sync {
    /// Display label, unique within a suite.
    fn label(&self) -> &str;

    /// Establishes one connection to `endpoint` presenting `sni`.
    ///
    /// Failures are reported on the returned attempt, together with whatever
    /// phase durations were measured before the failure.
    async fn attempt(
        &self,
        ctx: &ProbeContext,
        endpoint: SocketAddr,
        sni: &str,
        host: &str,
    ) -> AttemptResult;
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to build rustls configuration")]
    Rustls(#[from] rustls::Error),
    #[error("failed to build native tls connector")]
    NativeTls(#[from] native_tls::Error),
}

/// Ordered, immutable list of methods; the order is the execution and display order.
pub struct MethodSuite {
    methods: Vec<Box<dyn ProbeMethod>>,
}

impl MethodSuite {
    pub fn new(methods: Vec<Box<dyn ProbeMethod>>) -> Self {
        Self { methods }
    }

    /// The methods shipped with the probe.
    pub fn standard() -> Result<Self, SetupError> {
        Ok(Self::new(vec![
            Box::new(RustlsMethod::new(
                "Default - TCP - TLS 1.2",
                &[&rustls::version::TLS12],
            )?),
            Box::new(RustlsMethod::new(
                "Default - TCP - TLS 1.3",
                &[&rustls::version::TLS13],
            )?),
            Box::new(NativeTlsMethod::new("Native - TCP - TLS")?),
            Box::new(
                RustlsMethod::new("Fragment - TCP - TLS 1.3", &[&rustls::version::TLS13])?
                    .fragmented(Fragmentation::default()),
            ),
        ]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ProbeMethod> + '_ {
        self.methods.iter().map(|method| method.as_ref())
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Opens the TCP connection every method starts from and times it.
pub(crate) async fn dial(
    ctx: &ProbeContext,
    endpoint: SocketAddr,
) -> Result<(TcpStream, Duration), ProbeError> {
    let start = Instant::now();
    let stream = ctx
        .bound(TcpStream::connect(endpoint))
        .await?
        .map_err(|source| ProbeError::Connect { endpoint, source })?;
    let elapsed = start.elapsed();

    stream
        .set_nodelay(true)
        .map_err(|source| ProbeError::Connect { endpoint, source })?;
    Ok((stream, elapsed))
}
