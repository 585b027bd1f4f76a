//! Connectivity-quality probe.
//!
//! Connects to a TLS endpoint with a fixed sequence of connection methods and
//! measures, per attempt, how long the transport, the TLS handshake and the
//! first byte of an HTTP response took.

pub mod config;
pub mod connection;
pub mod method;
pub mod mimir;
pub mod probe;
pub mod report;
pub mod resolve;
pub mod ttfb;
