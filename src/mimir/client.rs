use chrono::Utc;
use reqwest::{
    Client,
    header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue},
};
use snap::raw::Encoder;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::prompb::{Label, Sample, TimeSeries, WriteRequest};

#[derive(Debug, Error)]
pub enum MimirError {
    #[error("failed to compress write request")]
    Compress(#[from] snap::Error),
    #[error("invalid tenant id")]
    Tenant(#[from] InvalidHeaderValue),
    #[error("request to mimir failed")]
    Request(#[from] reqwest::Error),
    #[error("mimir rejected the push: {status} - {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Sends Prometheus metrics to a Mimir remote write endpoint.
///
/// # Arguments
///
/// * `client` - The HTTP client used for the push.
/// * `mimir_endpoint` - The base URL of your Mimir instance (e.g., "http://localhost:9009").
/// * `tenant_id` - An optional tenant ID string for multi-tenant Mimir setups.
/// * `metrics` - A vector of `TimeSeries` to send.
pub async fn send_to_mimir(
    client: &Client,
    mimir_endpoint: &str,
    tenant_id: Option<&str>,
    metrics: Vec<TimeSeries>,
) -> Result<(), MimirError> {
    if metrics.is_empty() {
        warn!("No metrics to send.");
        return Ok(());
    }

    let series = metrics.len();
    let compressed_data = encode_write_request(metrics)?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("snappy"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-protobuf"),
    );
    headers.insert(
        "X-Prometheus-Remote-Write-Version",
        HeaderValue::from_static("0.1.0"),
    );
    if let Some(id) = tenant_id {
        headers.insert("X-Scope-OrgID", HeaderValue::from_str(id)?);
    }

    let response = client
        .post(format!("{mimir_endpoint}/api/v1/push")) // Mimir's remote write endpoint
        .headers(headers)
        .body(compressed_data)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("Failed to push to Mimir: {} - {}", status, body);
        return Err(MimirError::Rejected { status, body });
    }
    debug!(series, "pushed metrics to Mimir");
    Ok(())
}

/// Protobuf encoding followed by raw (block) snappy compression, as remote write expects.
pub fn encode_write_request(metrics: Vec<TimeSeries>) -> Result<Vec<u8>, MimirError> {
    let write_request = WriteRequest {
        timeseries: metrics,
    };
    let buf = prost::Message::encode_to_vec(&write_request);

    let mut encoder = Encoder::new();
    Ok(encoder.compress_vec(&buf)?)
}

/// Creates a `TimeSeries` metric with the given metric name, labels, value, and optional timestamp.
/// # Arguments
/// * `metric_name` - The name of the metric (e.g., "probe_success").
/// * `labels` - A slice of tuples representing labels for the metric (e.g., &[("method", "Native - TCP - TLS")]).
/// * `value` - The value of the metric.
/// * `timestamp_ms` - An optional timestamp in milliseconds. If not provided, the current time will be used.
pub fn create_time_series(
    metric_name: &str,
    labels: &[(&str, &str)],
    value: f64,
    timestamp_ms: Option<i64>,
) -> TimeSeries {
    let mut all_labels = Vec::with_capacity(labels.len() + 1);
    all_labels.push(Label {
        name: "__name__".to_string(),
        value: metric_name.to_string(),
    });

    for (name, val) in labels {
        all_labels.push(Label {
            name: name.to_string(),
            value: val.to_string(),
        });
    }

    let sample = Sample {
        value,
        timestamp: timestamp_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
    };

    TimeSeries {
        labels: all_labels,
        samples: vec![sample],
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_create_time_series() {
        let series = create_time_series("probe_success", &[("method", "GET")], 1.0, Some(42));
        assert_eq!(series.labels[0].name, "__name__");
        assert_eq!(series.labels[0].value, "probe_success");
        assert_eq!(series.labels[1].name, "method");
        assert_eq!(series.samples, vec![Sample { value: 1.0, timestamp: 42 }]);
    }

    #[test]
    fn test_default_timestamp_is_now() {
        let before = Utc::now().timestamp_millis();
        let series = create_time_series("probe_success", &[], 0.0, None);
        assert!(series.samples[0].timestamp >= before);
    }

    #[test]
    fn test_encoded_request_decompresses() {
        let series = vec![create_time_series("probe_success", &[("job", "sniprobe")], 1.0, Some(1))];
        let compressed = encode_write_request(series.clone()).unwrap();

        let raw = snap::raw::Decoder::new().decompress_vec(&compressed).unwrap();
        let decoded = WriteRequest::decode(raw.as_slice()).unwrap();
        assert_eq!(decoded.timeseries, series);
    }

    #[tokio::test]
    async fn test_empty_metrics_are_not_sent() {
        // Nothing listens here; an attempted push would fail.
        let result = send_to_mimir(&Client::new(), "http://127.0.0.1:9", None, Vec::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_tenant() {
        let series = vec![create_time_series("probe_success", &[], 1.0, None)];
        let result = send_to_mimir(&Client::new(), "http://127.0.0.1:9", Some("bad\ntenant"), series).await;
        assert!(matches!(result, Err(MimirError::Tenant(_))));
    }
}
