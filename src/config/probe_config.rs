use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use super::ConfigError;

/// The probe section of the YAML configuration file.
/// Every field has a default so an empty file (or no file) is valid; only the
/// SNI has to come from somewhere, either here or from the command line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeFile {
    /// The server name sent in the TLS ClientHello.
    #[serde(default)]
    pub sni: Option<String>,

    /// The HTTP `Host` header. Defaults to the SNI.
    #[serde(default)]
    pub host: Option<String>,

    /// Defaults to 443.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Probe this address instead of resolving the SNI.
    /// `0.0.0.0` and `::` count as not set.
    #[serde(default)]
    pub ip: Option<IpAddr>,

    /// Defaults to true.
    #[serde(default = "default_true")]
    pub ipv4: bool,

    /// Defaults to false.
    #[serde(default)]
    pub ipv6: bool,

    /// Attempts per method and endpoint. Defaults to 3.
    #[serde(default = "default_repeat")]
    pub repeat: u32,

    #[serde(default)]
    pub pacing: Pacing,
}

impl Default for ProbeFile {
    fn default() -> Self {
        Self {
            sni: None,
            host: None,
            port: default_port(),
            ip: None,
            ipv4: default_true(),
            ipv6: false,
            repeat: default_repeat(),
            pacing: Pacing::default(),
        }
    }
}

fn default_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

fn default_repeat() -> u32 {
    3
}

/// Timing of a run, given in milliseconds in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pacing {
    /// Deadline of a single attempt, TTFB included. Defaults to 10 seconds.
    #[serde(
        rename = "attempt_timeout_ms",
        default = "default_attempt_timeout",
        deserialize_with = "from_millis"
    )]
    pub attempt_timeout: Duration,

    /// Pause after each attempt. Defaults to 2 seconds.
    #[serde(
        rename = "attempt_interval_ms",
        default = "default_interval",
        deserialize_with = "from_millis"
    )]
    pub attempt_interval: Duration,

    /// Pause between two methods. Defaults to 2 seconds.
    #[serde(
        rename = "method_interval_ms",
        default = "default_interval",
        deserialize_with = "from_millis"
    )]
    pub method_interval: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            attempt_timeout: default_attempt_timeout(),
            attempt_interval: default_interval(),
            method_interval: default_interval(),
        }
    }
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

fn from_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Validated probe settings, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub sni: String,
    pub host: String,
    pub port: u16,
    pub manual_ip: Option<IpAddr>,
    pub resolve_ipv4: bool,
    pub resolve_ipv6: bool,
    pub repeat: u32,
}

/// Command line override of the file settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: Option<u16>,
}

impl ProbeFile {
    pub fn into_probe_config(self, target: Option<&Target>) -> Result<ProbeConfig, ConfigError> {
        let sni = target
            .map(|target| target.host.clone())
            .or(self.sni)
            .filter(|sni| !sni.trim().is_empty())
            .ok_or(ConfigError::MissingSni)?;
        let port = target.and_then(|target| target.port).unwrap_or(self.port);

        if self.repeat == 0 {
            return Err(ConfigError::InvalidRepeat);
        }

        let manual_ip = self.ip.filter(|ip| !ip.is_unspecified());
        if manual_ip.is_none() && !self.ipv4 && !self.ipv6 {
            return Err(ConfigError::NoAddressFamily);
        }

        let host = self
            .host
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| sni.clone());

        Ok(ProbeConfig {
            sni,
            host,
            port,
            manual_ip,
            resolve_ipv4: self.ipv4,
            resolve_ipv6: self.ipv6,
            repeat: self.repeat,
        })
    }
}
