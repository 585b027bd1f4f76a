//! Terminal rendering of a run.

use std::fmt::Write;
use std::time::Duration;

use unicode_truncate::UnicodeTruncateStr;

use crate::probe::result::RunResults;
use crate::probe::summary::aggregate;

const HEADERS: [&str; 7] = [
    "Method",
    "SNI",
    "IP:Port",
    "Handshake",
    "Transport",
    "TLS Handshake",
    "TTFB",
];
const MAX_COLUMN_WIDTH: usize = 48;
const COLUMN_GAP: &str = "  ";

/// Renders an error followed by its chain of sources.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, "\n\nCaused by: {}", src);
        err = src;
    }
    s
}

pub fn to_fixed_width(input: &str, width: usize) -> String {
    let (truncated, _) = input.unicode_truncate(width);
    format!("{:<width$}", truncated, width = width)
}

/// `0 ms` for a zero duration, otherwise milliseconds with one decimal.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0 ms".to_string();
    }
    format!("{:.1} ms", duration.as_secs_f64() * 1000.0)
}

/// One row per method and endpoint, in run order.
pub fn table_rows(results: &RunResults) -> Vec<[String; 7]> {
    let mut rows = Vec::new();
    for (label, per_endpoint) in results.iter() {
        for result in per_endpoint {
            let summary = aggregate(result);
            rows.push([
                label.to_string(),
                result.sni.clone(),
                result.endpoint.to_string(),
                summary.status_label(),
                format_duration(summary.avg_transport),
                format_duration(summary.avg_tls),
                format_duration(summary.avg_ttfb),
            ]);
        }
    }
    rows
}

pub fn render_table(results: &RunResults) -> String {
    let rows = table_rows(results);

    let mut widths = HEADERS.map(|header| header.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count()).min(MAX_COLUMN_WIDTH);
        }
    }

    let mut out = String::new();
    push_line(&mut out, HEADERS.iter().copied(), &widths);
    for row in &rows {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize; 7]) {
    let line = cells
        .zip(widths)
        .map(|(cell, width)| to_fixed_width(cell, *width))
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    out.push_str(line.trim_end());
    out.push('\n');
}

pub fn print_table(results: &RunResults) {
    print!("{}", render_table(results));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::context::ContextError;
    use crate::probe::result::{AttemptResult, MethodEndpointResult};

    fn attempt(ms: u64) -> AttemptResult {
        AttemptResult {
            transport: Duration::from_millis(ms),
            tls_handshake: Duration::from_millis(ms * 2),
            ttfb: Duration::from_millis(ms * 3),
            ..Default::default()
        }
    }

    fn results() -> RunResults {
        let mut results = RunResults::default();
        let mut ok = MethodEndpointResult::new("example.com", "192.0.2.1:443".parse().unwrap(), 2);
        ok.attempts.push(attempt(10));
        ok.attempts.push(attempt(20));
        results.record("Default - TCP - TLS 1.3", vec![ok]);

        let mut bad = MethodEndpointResult::new("example.com", "[2001:db8::1]:443".parse().unwrap(), 1);
        bad.attempts.push(attempt(10).failed(ContextError::DeadlineExceeded));
        results.record("Native - TCP - TLS", vec![bad]);
        results
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0 ms");
        assert_eq!(format_duration(Duration::from_micros(12_340)), "12.3 ms");
        assert_eq!(format_duration(Duration::from_secs(1)), "1000.0 ms");
    }

    #[test]
    fn test_to_fixed_width() {
        assert_eq!(to_fixed_width("abc", 5), "abc  ");
        assert_eq!(to_fixed_width("abcdef", 3), "abc");
    }

    #[test]
    fn test_rows_follow_run_order() {
        let rows = table_rows(&results());
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            [
                "Default - TCP - TLS 1.3",
                "example.com",
                "192.0.2.1:443",
                "Success (2/2)",
                "15.0 ms",
                "30.0 ms",
                "45.0 ms",
            ]
            .map(String::from)
        );
        assert_eq!(rows[1][2], "[2001:db8::1]:443");
        assert_eq!(rows[1][3], "Failed (0/1)");
        assert_eq!(rows[1][6], "0 ms");
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let table = render_table(&results());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Method"));
        let sni_column = lines[0].find("SNI").unwrap();
        assert_eq!(lines[1].find("example.com"), Some(sni_column));
        assert_eq!(lines[2].find("example.com"), Some(sni_column));
    }

    #[test]
    fn test_report_includes_sources() {
        let err = crate::probe::error::ProbeError::Ttfb(crate::ttfb::TtfbError::Read(
            std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline exceeded"),
        ));
        let rendered = report(&err);
        assert!(rendered.starts_with("time to first byte measurement failed"));
        assert!(rendered.contains("Caused by: deadline exceeded"));
    }
}
