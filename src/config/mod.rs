pub mod app_config;
pub mod probe_config;

use std::io;
use std::net::AddrParseError;

use thiserror::Error;

pub use app_config::{AppConfig, MimirTarget, load_config, setup_resolver};
pub use probe_config::{Pacing, ProbeConfig, ProbeFile, Target};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid YAML in {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid target {target:?}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },
    #[error("target {0:?} has no host")]
    TargetWithoutHost(String),
    #[error("invalid DNS host {host:?}")]
    InvalidDnsHost {
        host: String,
        #[source]
        source: AddrParseError,
    },
    #[error("DNS_HOSTS lists no resolver")]
    NoDnsHost,
    #[error("no SNI configured: pass a target or set `sni` in the config file")]
    MissingSni,
    #[error("repeat must be at least 1")]
    InvalidRepeat,
    #[error("nothing to probe: enable ipv4 or ipv6, or set an ip")]
    NoAddressFamily,
}
