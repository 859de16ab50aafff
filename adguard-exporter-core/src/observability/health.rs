//! Health check endpoints.
//!
//! Liveness is a lightweight reachability check per configured appliance: a
//! status fetch bounded by a timeout. A failing appliance degrades the report
//! but never makes the exporter itself unhealthy.

use crate::client::ApplianceClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timeout of a single appliance check.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall system health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub version: &'static str,
    pub subsystems: Vec<SubsystemHealth>,
}

/// Subsystem health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

/// Health checker that probes every appliance.
#[derive(Clone)]
pub struct HealthChecker {
    clients: Arc<Vec<Arc<dyn ApplianceClient>>>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(clients: Vec<Arc<dyn ApplianceClient>>) -> Self {
        Self { clients: Arc::new(clients), timeout: CHECK_TIMEOUT }
    }

    /// Override the per-appliance check timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn check_one(&self, client: &Arc<dyn ApplianceClient>) -> SubsystemHealth {
        let name = client.url().to_string();
        match tokio::time::timeout(self.timeout, client.get_status()).await {
            Ok(Ok(_)) => SubsystemHealth { name, status: HealthStatus::Healthy, message: None },
            Ok(Err(e)) => {
                debug!(server = %name, error = %e, "Health check failed");
                SubsystemHealth { name, status: HealthStatus::Unhealthy, message: Some(e.to_string()) }
            }
            Err(_) => SubsystemHealth {
                name,
                status: HealthStatus::Unhealthy,
                message: Some(format!("timed out after {:?}", self.timeout)),
            },
        }
    }

    /// Probe all appliances concurrently.
    ///
    /// Returns:
    /// - Healthy: every appliance answered
    /// - Degraded: at least one appliance failed (failures are non-fatal)
    pub async fn get_health(&self) -> HealthCheck {
        let handles: Vec<_> = self
            .clients
            .iter()
            .map(|client| {
                let checker = self.clone();
                let client = client.clone();
                tokio::spawn(async move { checker.check_one(&client).await })
            })
            .collect();

        let mut subsystems = Vec::with_capacity(handles.len());
        for (handle, client) in handles.into_iter().zip(self.clients.iter()) {
            match handle.await {
                Ok(subsystem) => subsystems.push(subsystem),
                Err(e) => subsystems.push(SubsystemHealth {
                    name: client.url().to_string(),
                    status: HealthStatus::Unhealthy,
                    message: Some(format!("check aborted: {}", e)),
                }),
            }
        }

        let status = if subsystems.iter().any(|s| s.status != HealthStatus::Healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthCheck { status, version: env!("CARGO_PKG_VERSION"), subsystems }
    }
}
