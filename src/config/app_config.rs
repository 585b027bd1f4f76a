use std::env;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, info};
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{
        LookupIpStrategy, NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig,
        ResolverOpts,
    },
};
use url::{Host, Url};

use super::ConfigError;
use super::probe_config::{Pacing, ProbeConfig, ProbeFile, Target};

const DEFAULT_CONFIG_FILE: &str = "probe.yml";
const DEFAULT_DNS_HOSTS: &str = "1.1.1.1,8.8.8.8";

/// Where run metrics are pushed, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimirTarget {
    pub endpoint: String,
    pub tenant: Option<String>,
}

pub struct AppConfig {
    pub probe: ProbeConfig,
    pub pacing: Pacing,
    pub dns_hosts: Vec<IpAddr>,
    pub mimir: Option<MimirTarget>,
}

/// Load the application configuration from a YAML file, the environment and the command line.
///
/// Reads `.env` if present, then the file named by `CONFIG_FILE` (default
/// `probe.yml`, which may be absent), `DNS_HOSTS`, `MIMIR_ENDPOINT` and
/// `MIMIR_TENANT`. A `target_arg` (hostname, `host:port` or URL) replaces the
/// SNI and, when it carries one, the port of the file.
pub fn load_config(target_arg: Option<&str>) -> Result<AppConfig, ConfigError> {
    if dotenvy::dotenv().is_ok() {
        debug!("loaded environment from .env");
    }

    let explicit_file = env::var("CONFIG_FILE").ok();
    let path = explicit_file
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let file = read_probe_file(&path, explicit_file.is_some())?;
    let pacing = file.pacing;

    let target = target_arg.map(parse_target).transpose()?;
    let probe = file.into_probe_config(target.as_ref())?;

    let dns_hosts = parse_dns_hosts(
        &env::var("DNS_HOSTS").unwrap_or_else(|_| DEFAULT_DNS_HOSTS.to_string()),
    )?;
    info!("Using DNS hosts: {:?}", dns_hosts);

    let mimir = env::var("MIMIR_ENDPOINT")
        .ok()
        .map(|endpoint| endpoint.trim().trim_end_matches('/').to_string())
        .filter(|endpoint| !endpoint.is_empty())
        .map(|endpoint| MimirTarget {
            endpoint,
            tenant: env::var("MIMIR_TENANT").ok().filter(|t| !t.is_empty()),
        });

    Ok(AppConfig {
        probe,
        pacing,
        dns_hosts,
        mimir,
    })
}

/// A missing file is only an error when it was asked for explicitly.
pub fn read_probe_file(path: &str, required: bool) -> Result<ProbeFile, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
            debug!(path, "no config file, using defaults");
            return Ok(ProbeFile::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_string(),
                source,
            });
        }
    };

    if contents.trim().is_empty() {
        return Ok(ProbeFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Accepts `example.com`, `example.com:8443`, `[2001:db8::1]:443` or a full URL.
///
/// A URL always yields a port (its scheme's default when none is written); a
/// bare host only yields the port written after it.
pub fn parse_target(input: &str) -> Result<Target, ConfigError> {
    let input = input.trim();
    let has_scheme = input.contains("://");
    // A non-special scheme keeps an explicit `:443`, which `https` would drop as its default.
    let candidate = if has_scheme {
        input.to_string()
    } else {
        format!("target://{input}")
    };

    let url = Url::parse(&candidate).map_err(|source| ConfigError::InvalidTarget {
        target: input.to_string(),
        source,
    })?;
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(ConfigError::TargetWithoutHost(input.to_string())),
    };

    let port = if has_scheme {
        url.port_or_known_default()
    } else {
        url.port()
    };
    Ok(Target { host, port })
}

/// Comma separated resolver addresses.
pub fn parse_dns_hosts(value: &str) -> Result<Vec<IpAddr>, ConfigError> {
    let hosts = value
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(|host| {
            host.parse().map_err(|source| ConfigError::InvalidDnsHost {
                host: host.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<IpAddr>, _>>()?;

    if hosts.is_empty() {
        return Err(ConfigError::NoDnsHost);
    }
    Ok(hosts)
}

/// Setup a DNS resolver using the provided DNS hosts
/// This function creates a `TokioAsyncResolver` configured with the specified DNS hosts.
/// It sets the resolver options to have 2 attempts, a timeout of 100 milliseconds, and a cache size of 1024 for quick DNS lookups.
/// Lookups ask for both address families; callers pick the ones they want.
pub fn setup_resolver(dns_hosts: &[IpAddr]) -> TokioAsyncResolver {
    let mut opts = ResolverOpts::default();
    opts.attempts = 2;
    opts.timeout = Duration::from_millis(100);
    opts.cache_size = 1024;
    opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

    let mut name_servers = NameServerConfigGroup::new();

    for ip in dns_hosts {
        name_servers.push(NameServerConfig {
            socket_addr: (*ip, 53).into(),
            protocol: Protocol::Tcp,
            tls_dns_name: None,
            trust_negative_responses: false,
            bind_addr: None,
        });
    }

    let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
    TokioAsyncResolver::tokio(resolver_config, opts)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_target_forms() {
        let plain = parse_target("example.com").unwrap();
        assert_eq!(plain.host, "example.com");
        assert_eq!(plain.port, None);

        let default_port = parse_target("example.com:443").unwrap();
        assert_eq!(default_port.port, Some(443));

        let v4 = parse_target("192.0.2.7:8443").unwrap();
        assert_eq!(v4.host, "192.0.2.7");
        assert_eq!(v4.port, Some(8443));

        let with_port = parse_target("example.com:8443").unwrap();
        assert_eq!(with_port.port, Some(8443));

        let url = parse_target("https://cdn.example.com/some/path?q=1").unwrap();
        assert_eq!(url.host, "cdn.example.com");
        assert_eq!(url.port, Some(443));

        let v6 = parse_target("[2001:db8::1]:9443").unwrap();
        assert_eq!(v6.host, "2001:db8::1");
        assert_eq!(v6.port, Some(9443));
    }

    #[test]
    fn test_bare_host_keeps_file_port() {
        let file = ProbeFile {
            sni: Some("file.example.com".to_string()),
            port: 8443,
            ..Default::default()
        };

        let target = parse_target("example.com").unwrap();
        let config = file.clone().into_probe_config(Some(&target)).unwrap();
        assert_eq!(config.sni, "example.com");
        assert_eq!(config.port, 8443);

        let target = parse_target("example.com:9443").unwrap();
        assert_eq!(file.clone().into_probe_config(Some(&target)).unwrap().port, 9443);

        let target = parse_target("https://example.com/").unwrap();
        assert_eq!(file.into_probe_config(Some(&target)).unwrap().port, 443);
    }

    #[test]
    fn test_parse_target_rejects_garbage() {
        assert!(matches!(
            parse_target("exa mple.com"),
            Err(ConfigError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_parse_dns_hosts() {
        let hosts = parse_dns_hosts("1.1.1.1, 8.8.8.8,,2606:4700:4700::1111").unwrap();
        assert_eq!(hosts.len(), 3);
        assert!(hosts[2].is_ipv6());

        assert!(matches!(
            parse_dns_hosts("1.1.1.1,dns.google"),
            Err(ConfigError::InvalidDnsHost { ref host, .. }) if host == "dns.google"
        ));
        assert!(matches!(parse_dns_hosts(" , "), Err(ConfigError::NoDnsHost)));
    }

    #[test]
    fn test_missing_default_file_is_fine() {
        let file = read_probe_file("definitely/not/here.yml", false).unwrap();
        assert_eq!(file, ProbeFile::default());

        assert!(matches!(
            read_probe_file("definitely/not/here.yml", true),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_read_probe_file() {
        let path = env::temp_dir().join(format!("sniprobe-config-{}.yml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "sni: example.org\nrepeat: 1").unwrap();

        let parsed = read_probe_file(path.to_str().unwrap(), true).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(parsed.sni.as_deref(), Some("example.org"));
        assert_eq!(parsed.repeat, 1);
    }

    #[tokio::test]
    async fn test_setup_resolver() {
        let _resolver = setup_resolver(&["1.1.1.1".parse().unwrap()]);
    }
}
