use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sniprobe::config::{AppConfig, MimirTarget, load_config, setup_resolver};
use sniprobe::method::MethodSuite;
use sniprobe::mimir::{client::send_to_mimir, create_run_metrics};
use sniprobe::probe::{ProbeContext, RunResults, run};
use sniprobe::report::{print_table, report};

const USAGE: &str = "\
Usage: sniprobe [TARGET]

Probes TARGET (hostname, host:port or URL) with every connection method and
prints transport, TLS handshake and time-to-first-byte latencies.

Environment:
  CONFIG_FILE     YAML probe settings (default: probe.yml)
  DNS_HOSTS       comma separated resolver IPs (default: 1.1.1.1,8.8.8.8)
  MIMIR_ENDPOINT  push run metrics to this Mimir instance
  MIMIR_TENANT    tenant sent as X-Scope-OrgID
  RUST_LOG        log filter (default: info)";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let target_arg = std::env::args().nth(1);
    if matches!(target_arg.as_deref(), Some("-h" | "--help")) {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    let config = match load_config(target_arg.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", report(&e));
            return ExitCode::from(2);
        }
    };

    let suite = match MethodSuite::standard() {
        Ok(suite) => suite,
        Err(e) => {
            error!("Failed to set up connection methods: {}", report(&e));
            return ExitCode::FAILURE;
        }
    };

    let (ctx, cancel) = ProbeContext::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing with the results collected so far");
            cancel.cancel();
        }
    });

    let AppConfig {
        probe,
        pacing,
        dns_hosts,
        mimir,
    } = config;
    let resolver = setup_resolver(&dns_hosts);

    info!(
        sni = %probe.sni,
        host = %probe.host,
        port = probe.port,
        repeat = probe.repeat,
        methods = suite.len(),
        "starting probe"
    );
    let results = match run(&ctx, &probe, &resolver, &suite, &pacing).await {
        Ok(results) => results,
        Err(e) => {
            error!("Probe failed: {}", report(&e));
            return ExitCode::FAILURE;
        }
    };

    print_table(&results);

    if let Some(target) = mimir {
        push_metrics(&target, &results).await;
    }
    ExitCode::SUCCESS
}

async fn push_metrics(target: &MimirTarget, results: &RunResults) {
    let client = match Client::builder()
        .timeout(Duration::from_secs(5))
        .user_agent(sniprobe::ttfb::USER_AGENT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Mimir client: {}", report(&e));
            return;
        }
    };

    info!("Using Mimir endpoint: {}", target.endpoint);
    let metrics = create_run_metrics(results, Utc::now().timestamp_millis());
    if let Err(e) = send_to_mimir(&client, &target.endpoint, target.tenant.as_deref(), metrics).await {
        error!("Failed to send metrics: {}", report(&e));
    }
}
