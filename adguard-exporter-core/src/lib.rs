//! AdGuard Exporter Core Library
//!
//! Polls AdGuard Home instances and republishes their figures as Prometheus
//! metrics: the appliance client, metric registry, collection engine and the
//! observability plumbing shared with the daemon.

pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod observability;
pub mod registry;

// Re-export commonly used items
pub use client::{AdguardClient, ApplianceClient, Resource};
pub use collector::{collect, CollectorContext, CollectorState, CycleHandle, Scheduler};
pub use config::Config;
pub use error::{ExporterError, Result};
pub use observability::{
    health::HealthChecker, init as init_observability, shutdown as shutdown_observability,
};
pub use registry::ExporterMetrics;
