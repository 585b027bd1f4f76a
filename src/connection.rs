use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Facts a connection learned during its TLS handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSession {
    /// Protocol agreed through ALPN, if the server picked one.
    pub alpn: Option<Vec<u8>>,
    pub version: Option<String>,
}

impl TlsSession {
    pub fn alpn_label(&self) -> Option<String> {
        self.alpn
            .as_deref()
            .map(|alpn| String::from_utf8_lossy(alpn).into_owned())
    }
}

/// A byte stream that can report the TLS session negotiated on it.
///
/// Measurements only depend on this capability, never on the concrete
/// TLS library behind a connection.
pub trait TlsConnection: AsyncRead + AsyncWrite + Unpin + Send {
    /// `None` when the stream never performed a TLS handshake.
    fn tls_session(&self) -> Option<TlsSession>;
}

pub type BoxedConnection = Box<dyn TlsConnection>;

impl TlsConnection for TcpStream {
    fn tls_session(&self) -> Option<TlsSession> {
        None
    }
}

impl<S> TlsConnection for tokio_rustls::client::TlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn tls_session(&self) -> Option<TlsSession> {
        let (_, conn) = self.get_ref();
        let version = conn.protocol_version().map(|version| match version {
            rustls::ProtocolVersion::TLSv1_2 => "TLS1.2".to_string(),
            rustls::ProtocolVersion::TLSv1_3 => "TLS1.3".to_string(),
            other => format!("{other:?}"),
        });
        Some(TlsSession {
            alpn: conn.alpn_protocol().map(<[u8]>::to_vec),
            version,
        })
    }
}

impl<S> TlsConnection for tokio_native_tls::TlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn tls_session(&self) -> Option<TlsSession> {
        // native-tls does not expose the protocol version.
        Some(TlsSession {
            alpn: self.get_ref().negotiated_alpn().ok().flatten(),
            version: None,
        })
    }
}
