use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::probe_config::{Pacing, ProbeConfig};
use crate::connection::TlsSession;
use crate::method::{MethodSuite, ProbeMethod};
use crate::probe::context::ProbeContext;
use crate::probe::error::RunError;
use crate::probe::result::{AttemptResult, MethodEndpointResult, RunResults};
use crate::report::report;
use crate::resolve::{HostResolver, resolve_endpoints};
use crate::ttfb::measure_ttfb;

/// Runs every method of `suite` against every resolved endpoint, `config.repeat` times each.
///
/// Attempts run one after another, each under its own `pacing.attempt_timeout`.
/// Only a failed resolution aborts the run; attempt failures are recorded on
/// the attempt. When `ctx` is cancelled the run stops between attempts and
/// returns what it collected so far.
#[tracing::instrument(skip_all, fields(sni = %config.sni, port = config.port))]
pub async fn run(
    ctx: &ProbeContext,
    config: &ProbeConfig,
    resolver: &dyn HostResolver,
    suite: &MethodSuite,
    pacing: &Pacing,
) -> Result<RunResults, RunError> {
    let endpoints = resolve_endpoints(ctx, resolver, config)
        .await
        .map_err(|source| RunError::Resolve {
            host: config.sni.clone(),
            source,
        })?;
    let mut results = RunResults::default();
    if endpoints.is_empty() {
        warn!("no endpoint resolved for the requested address families");
        return Ok(results);
    }

    let repeat = config.repeat as usize;
    let total = suite.len() * endpoints.len() * repeat;
    let mut completed = 0usize;

    for (index, method) in suite.iter().enumerate() {
        if index > 0 && ctx.sleep(pacing.method_interval).await.is_err() {
            break;
        }
        if ctx.is_cancelled() {
            break;
        }

        let mut cancelled = false;
        let mut per_endpoint = Vec::with_capacity(endpoints.len());
        for &endpoint in &endpoints {
            let mut record = MethodEndpointResult::new(&config.sni, endpoint, repeat);
            for number in 1..=repeat {
                if ctx.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let span = info_span!("attempt", method = method.label(), %endpoint, number);
                let attempt = run_attempt(ctx, method, endpoint, config, pacing.attempt_timeout)
                    .instrument(span)
                    .await;
                record.attempts.push(attempt);
                completed += 1;

                if completed < total && ctx.sleep(pacing.attempt_interval).await.is_err() {
                    cancelled = true;
                    break;
                }
            }
            per_endpoint.push(record);
            if cancelled {
                break;
            }
        }

        results.record(method.label(), per_endpoint);
        if cancelled {
            info!(completed, total, "run cancelled");
            break;
        }
    }

    Ok(results)
}

/// One attempt under its own deadline: establish, measure TTFB, close.
async fn run_attempt(
    ctx: &ProbeContext,
    method: &dyn ProbeMethod,
    endpoint: SocketAddr,
    config: &ProbeConfig,
    timeout: Duration,
) -> AttemptResult {
    let attempt_ctx = ctx.with_timeout(timeout);
    let mut result = method
        .attempt(&attempt_ctx, endpoint, &config.sni, &config.host)
        .await;

    if let Some(mut connection) = result.connection.take() {
        if result.error.is_none() {
            let (ttfb, outcome) =
                measure_ttfb(&attempt_ctx, connection.as_mut(), &config.host).await;
            result.ttfb = ttfb;
            match outcome {
                Ok(status) => result.http_status = Some(status),
                Err(err) => result.error = Some(err.into()),
            }
        }

        match attempt_ctx.bound(connection.shutdown()).await {
            Ok(Err(err)) => debug!(error = %err, "connection shutdown failed"),
            Err(err) => debug!(error = %err, "connection shutdown interrupted"),
            Ok(Ok(())) => {}
        }
    }

    match &result.error {
        None => info!(
            transport = ?result.transport,
            tls = ?result.tls_handshake,
            ttfb = ?result.ttfb,
            status = ?result.http_status,
            alpn = ?result.session.as_ref().and_then(TlsSession::alpn_label),
            "attempt succeeded"
        ),
        Some(err) => warn!(error = %report(err), "attempt failed"),
    }
    result
}
