use std::fmt;
use std::time::Duration;

use crate::probe::result::MethodEndpointResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Failed,
    Partial,
    Success,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Failed => "Failed",
            Status::Partial => "Partial",
            Status::Success => "Success",
        })
    }
}

/// Success counts and per-phase averages of one method against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub success_count: usize,
    pub total_attempts: usize,
    pub avg_transport: Duration,
    pub avg_tls: Duration,
    pub avg_ttfb: Duration,
}

impl Summary {
    pub fn status(&self) -> Status {
        if self.success_count == 0 {
            Status::Failed
        } else if self.success_count == self.total_attempts {
            Status::Success
        } else {
            Status::Partial
        }
    }

    /// e.g. `Partial (2/3)`.
    pub fn status_label(&self) -> String {
        format!(
            "{} ({}/{})",
            self.status(),
            self.success_count,
            self.total_attempts
        )
    }
}

/// Averages only cover successful attempts; with no success every average is zero.
pub fn aggregate(result: &MethodEndpointResult) -> Summary {
    let mut success_count = 0usize;
    let (mut transport, mut tls, mut ttfb) = (Duration::ZERO, Duration::ZERO, Duration::ZERO);

    for attempt in result.attempts.iter().filter(|attempt| attempt.is_success()) {
        success_count += 1;
        transport += attempt.transport;
        tls += attempt.tls_handshake;
        ttfb += attempt.ttfb;
    }

    let average = |total: Duration| match u32::try_from(success_count) {
        Ok(0) => Duration::ZERO,
        Ok(count) => total / count,
        Err(_) => Duration::ZERO,
    };

    Summary {
        success_count,
        total_attempts: result.attempts.len(),
        avg_transport: average(transport),
        avg_tls: average(tls),
        avg_ttfb: average(ttfb),
    }
}
