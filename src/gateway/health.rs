use serde::Serialize;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Reachable but slower than the degraded threshold.
    Degraded,
    Unhealthy,
}

/// Result of the latest health probe. Only the last one is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub last_check: SystemTime,
    pub response_time: Option<Duration>,
    pub error_message: Option<String>,
}

impl ProviderHealth {
    pub fn from_probe(elapsed: Duration, degraded_after: Duration) -> Self {
        Self {
            status: if elapsed > degraded_after {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            last_check: SystemTime::now(),
            response_time: Some(elapsed),
            error_message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>, elapsed: Option<Duration>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            last_check: SystemTime::now(),
            response_time: elapsed,
            error_message: Some(message.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
