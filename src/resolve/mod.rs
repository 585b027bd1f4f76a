use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;

use crate::config::probe_config::ProbeConfig;
use crate::probe::context::{ContextError, ProbeContext};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dns lookup for {host} failed")]
    Lookup {
        host: String,
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Hostname lookup returning every address of every family.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

#[async_trait]
impl HostResolver for TokioAsyncResolver {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let lookup = self
            .lookup_ip(host)
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;
        Ok(lookup.iter().collect())
    }
}

/// First address of each requested family; `None` when not requested or not found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolved {
    pub v4: Option<Ipv4Addr>,
    pub v6: Option<Ipv6Addr>,
}

pub async fn resolve(
    ctx: &ProbeContext,
    resolver: &dyn HostResolver,
    hostname: &str,
    want_v4: bool,
    want_v6: bool,
) -> Result<Resolved, ResolveError> {
    let addrs = ctx.bound(resolver.lookup_host(hostname)).await??;
    debug!(hostname, ?addrs, "resolved");
    Ok(select_families(&addrs, want_v4, want_v6))
}

/// IPv4-mapped IPv6 addresses count as IPv4.
pub fn select_families(addrs: &[IpAddr], want_v4: bool, want_v6: bool) -> Resolved {
    let mut resolved = Resolved::default();
    for addr in addrs.iter().map(IpAddr::to_canonical) {
        match addr {
            IpAddr::V4(v4) if want_v4 && resolved.v4.is_none() => resolved.v4 = Some(v4),
            IpAddr::V6(v6) if want_v6 && resolved.v6.is_none() => resolved.v6 = Some(v6),
            _ => {}
        }
    }
    resolved
}

/// Endpoints to probe: the manual address alone, or the IPv4 then IPv6 result of a lookup.
pub async fn resolve_endpoints(
    ctx: &ProbeContext,
    resolver: &dyn HostResolver,
    config: &ProbeConfig,
) -> Result<Vec<SocketAddr>, ResolveError> {
    if let Some(ip) = config.manual_ip {
        debug!(%ip, "manual IP specified, skipping DNS resolution");
        return Ok(vec![SocketAddr::new(ip, config.port)]);
    }

    debug!("manual IP not specified, attempting DNS resolution");
    let resolved = resolve(
        ctx,
        resolver,
        &config.sni,
        config.resolve_ipv4,
        config.resolve_ipv6,
    )
    .await?;

    let mut endpoints = Vec::with_capacity(2);
    if let Some(v4) = resolved.v4.filter(|_| config.resolve_ipv4) {
        endpoints.push(SocketAddr::new(IpAddr::V4(v4), config.port));
    }
    if let Some(v6) = resolved.v6.filter(|_| config.resolve_ipv6) {
        endpoints.push(SocketAddr::new(IpAddr::V6(v6), config.port));
    }
    Ok(endpoints)
}
