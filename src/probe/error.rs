use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::probe::context::ContextError;
use crate::resolve::ResolveError;
use crate::ttfb::TtfbError;

/// Failure of a single attempt. Recorded on the attempt, never propagated.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("tcp connect to {endpoint} failed")]
    Connect {
        endpoint: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("invalid server name {0:?}")]
    ServerName(String),
    #[error("tls handshake failed")]
    Handshake(#[source] io::Error),
    #[error("native tls handshake failed")]
    NativeHandshake(#[source] native_tls::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("time to first byte measurement failed")]
    Ttfb(#[from] TtfbError),
}

/// Failure that aborts the whole run before any probing starts.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to resolve {host}")]
    Resolve {
        host: String,
        #[source]
        source: ResolveError,
    },
}
