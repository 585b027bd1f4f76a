//! Time-to-first-byte measurement on an already negotiated TLS connection.
//!
//! HTTP/1.1 is a plain byte stream, so the first response byte marks the
//! boundary. HTTP/2 multiplexes framed streams and the first byte on the wire
//! may belong to a control frame, so the round trip of our own request is
//! used instead.

mod deadline;
mod http1;
mod http2;

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::connection::TlsConnection;
use crate::probe::context::ProbeContext;

pub use deadline::DeadlineStream;

pub const USER_AGENT: &str = concat!("sniprobe/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum TtfbError {
    #[error("passed a non-TLS connection")]
    NotTls,
    #[error("unsupported ALPN protocol: {0:?}")]
    UnsupportedAlpn(String),
    #[error("invalid host {0:?}")]
    InvalidHost(String),
    #[error("failed to write request")]
    Write(#[source] io::Error),
    #[error("failed to read response")]
    Read(#[source] io::Error),
    #[error("connection closed before the response arrived")]
    ConnectionClosed,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("response head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("http/2 exchange failed")]
    Http2(#[from] h2::Error),
}

/// HTTP version spoken on a connection, as picked through ALPN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpProtocol {
    Http1,
    Http2,
}

impl HttpProtocol {
    /// A missing or empty ALPN value means the server did not negotiate and speaks HTTP/1.1.
    pub fn from_alpn(alpn: Option<&[u8]>) -> Result<Self, TtfbError> {
        match alpn {
            None | Some(b"") | Some(b"http/1.1") => Ok(Self::Http1),
            Some(b"h2") => Ok(Self::Http2),
            Some(other) => Err(TtfbError::UnsupportedAlpn(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

/// Sends `GET /` with the given host and measures the time to the first byte
/// of the response.
///
/// The duration and the error are independent: a response that fails to
/// parse after its first byte arrived still reports the measured TTFB. Once
/// the timer started, failures report the time elapsed up to the failure.
/// The context's deadline only applies while this call runs.
pub async fn measure_ttfb<C>(
    ctx: &ProbeContext,
    conn: &mut C,
    host: &str,
) -> (Duration, Result<u16, TtfbError>)
where
    C: TlsConnection + ?Sized,
{
    let mut stream = DeadlineStream::new(conn, ctx);

    let Some(session) = stream.get_ref().tls_session() else {
        return (Duration::ZERO, Err(TtfbError::NotTls));
    };
    let protocol = match HttpProtocol::from_alpn(session.alpn.as_deref()) {
        Ok(protocol) => protocol,
        Err(err) => return (Duration::ZERO, Err(err)),
    };

    tracing::trace!(?protocol, host, "measuring time to first byte");
    match protocol {
        HttpProtocol::Http1 => http1::measure(&mut stream, host).await,
        HttpProtocol::Http2 => http2::measure(&mut stream, host).await,
    }
}
