use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::connection::{BoxedConnection, TlsSession};
use crate::probe::error::ProbeError;

/// One execution of one method against one endpoint.
#[derive(Default)]
pub struct AttemptResult {
    pub transport: Duration,
    pub tls_handshake: Duration,
    pub ttfb: Duration,
    /// Live connection, owned by the attempt until it is closed.
    pub connection: Option<BoxedConnection>,
    pub session: Option<TlsSession>,
    pub http_status: Option<u16>,
    pub error: Option<ProbeError>,
}

impl AttemptResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed(mut self, error: impl Into<ProbeError>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn connected(mut self, connection: BoxedConnection) -> Self {
        self.session = connection.tls_session();
        self.connection = Some(connection);
        self
    }
}

impl fmt::Debug for AttemptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptResult")
            .field("transport", &self.transport)
            .field("tls_handshake", &self.tls_handshake)
            .field("ttfb", &self.ttfb)
            .field("connection", &self.connection.as_ref().map(|_| "open"))
            .field("session", &self.session)
            .field("http_status", &self.http_status)
            .field("error", &self.error)
            .finish()
    }
}

/// All attempts of one method against one endpoint, in chronological order.
#[derive(Debug)]
pub struct MethodEndpointResult {
    pub sni: String,
    pub endpoint: SocketAddr,
    pub attempts: Vec<AttemptResult>,
}

impl MethodEndpointResult {
    pub fn new(sni: &str, endpoint: SocketAddr, capacity: usize) -> Self {
        Self {
            sni: sni.to_string(),
            endpoint,
            attempts: Vec::with_capacity(capacity),
        }
    }
}

/// Results of a run, keyed by method label.
///
/// The map alone has no order; iteration goes through the label list, which
/// holds the order the methods ran in.
#[derive(Debug, Default)]
pub struct RunResults {
    order: Vec<String>,
    by_method: HashMap<String, Vec<MethodEndpointResult>>,
}

impl RunResults {
    /// Stores the results of a method; its label joins the display order the first time only.
    pub fn record(&mut self, label: &str, results: Vec<MethodEndpointResult>) {
        match self.by_method.get_mut(label) {
            Some(existing) => existing.extend(results),
            None => {
                self.order.push(label.to_string());
                self.by_method.insert(label.to_string(), results);
            }
        }
    }

    pub fn methods(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, label: &str) -> Option<&[MethodEndpointResult]> {
        self.by_method.get(label).map(Vec::as_slice)
    }

    /// Method results in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MethodEndpointResult])> + '_ {
        self.order.iter().filter_map(|label| {
            self.by_method
                .get(label)
                .map(|results| (label.as_str(), results.as_slice()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
