//! Remote appliance client abstraction.
//!
//! The collector talks to AdGuard Home instances via the `ApplianceClient` trait:
//! - `AdguardClient`: HTTP client for the AdGuard Home control API
//! - test doubles in `tests/` implement the same trait without a network
//!
//! Every fetch is independently failable. Transport failures and non-2xx
//! responses are reported the same way.

use crate::error::Result;
use async_trait::async_trait;

mod adguard;
pub mod types;

pub use adguard::AdguardClient;
pub use types::{
    AutoClient, Clients, DhcpLease, DhcpStatus, PersistentClient, QueryLogEntry, QueryLogPage,
    QueryLogSummary, QueryTime, Stats, Status,
};

/// Sub-resources fetched from an appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Stats,
    Clients,
    Status,
    Dhcp,
    QueryLog,
}

impl Resource {
    /// Convert to string representation (used as a log field and metric label).
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Stats => "stats",
            Resource::Clients => "clients",
            Resource::Status => "status",
            Resource::Dhcp => "dhcp",
            Resource::QueryLog => "querylog",
        }
    }

    /// Control API path of this resource, relative to the appliance base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Stats => "/control/stats",
            Resource::Clients => "/control/clients",
            Resource::Status => "/control/status",
            Resource::Dhcp => "/control/dhcp/status",
            Resource::QueryLog => "/control/querylog",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client for one monitored appliance.
#[async_trait]
pub trait ApplianceClient: Send + Sync {
    /// Stable identity of the appliance (its base URL).
    fn url(&self) -> &str;

    /// Aggregate counters and top-N breakdowns.
    async fn get_stats(&self) -> Result<Stats>;

    /// Client directory used to resolve IPs to display names.
    async fn get_clients(&self) -> Result<Clients>;

    /// Running state, version and protection flag.
    async fn get_status(&self) -> Result<Status>;

    /// DHCP server state and leases.
    async fn get_dhcp(&self) -> Result<DhcpStatus>;

    /// Recent query log, condensed into type counts and timing entries.
    async fn get_query_log(&self) -> Result<QueryLogSummary>;
}
