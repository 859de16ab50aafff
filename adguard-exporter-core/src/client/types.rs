//! Payload types of the AdGuard Home control API.
//!
//! Fields are modelled as AdGuard sends them; the exporter publishes a subset
//! and unknown fields are ignored. AdGuard returns `null` instead of `[]` for several
//! empty lists, so those fields decode through `null_as_default`.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::time::Duration;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A top-N breakdown: a list of single-entry `{key: value}` objects.
pub type Breakdown = Vec<HashMap<String, f64>>;

/// `GET /control/stats`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub num_dns_queries: u64,
    pub num_blocked_filtering: u64,
    pub num_replaced_safebrowsing: u64,
    pub num_replaced_safesearch: u64,
    pub num_replaced_parental: u64,
    /// Seconds.
    pub avg_processing_time: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub top_queried_domains: Breakdown,
    #[serde(deserialize_with = "null_as_default")]
    pub top_blocked_domains: Breakdown,
    #[serde(deserialize_with = "null_as_default")]
    pub top_clients: Breakdown,
    #[serde(deserialize_with = "null_as_default")]
    pub top_upstreams_responses: Breakdown,
    /// Seconds.
    #[serde(deserialize_with = "null_as_default")]
    pub top_upstreams_avg_time: Breakdown,
}

/// `GET /control/clients`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Clients {
    #[serde(default, deserialize_with = "null_as_default")]
    pub clients: Vec<PersistentClient>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_clients: Vec<AutoClient>,
}

/// A client configured by the user, identified by one or more IDs (IP, CIDR, MAC, ClientID).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistentClient {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ids: Vec<String>,
}

/// A client discovered at runtime (rDNS, ARP, DHCP, hosts file).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoClient {
    pub ip: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source: String,
}

impl Clients {
    /// Build the IP -> display name table.
    ///
    /// Runtime clients are added first. User-configured client names then
    /// replace them, so an IP listed under a persistent client is labelled with
    /// the configured name even when discovery found another one. Entries with
    /// an empty name are skipped.
    pub fn name_lookup(&self) -> HashMap<String, String> {
        let mut lookup = HashMap::with_capacity(self.auto_clients.len() + self.clients.len());
        for auto in &self.auto_clients {
            if !auto.name.is_empty() {
                lookup.insert(auto.ip.clone(), auto.name.clone());
            }
        }
        for client in &self.clients {
            if client.name.is_empty() {
                continue;
            }
            for id in &client.ids {
                lookup.insert(id.clone(), client.name.clone());
            }
        }
        lookup
    }
}

/// `GET /control/status`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub protection_enabled: bool,
}

/// `GET /control/dhcp/status`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DhcpStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub leases: Vec<DhcpLease>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub static_leases: Vec<DhcpLease>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DhcpLease {
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
    /// Absent for static leases.
    #[serde(default)]
    pub expires: Option<String>,
}

/// `GET /control/querylog`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryLogPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<QueryLogEntry>,
    #[serde(default)]
    pub oldest: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryLogEntry {
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub client_info: Option<QueryClientInfo>,
    /// Milliseconds, sent as a decimal string.
    #[serde(rename = "elapsedMs", default)]
    pub elapsed_ms: serde_json::Value,
    #[serde(default)]
    pub question: QueryQuestion,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answer: Vec<QueryAnswer>,
    #[serde(default)]
    pub upstream: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryClientInfo {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryQuestion {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub qtype: String,
    #[serde(default)]
    pub class: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryAnswer {
    #[serde(rename = "type", default)]
    pub rtype: String,
    #[serde(default)]
    pub value: String,
}

impl QueryLogEntry {
    /// Time spent resolving the query.
    pub fn elapsed(&self) -> Option<Duration> {
        let ms = match &self.elapsed_ms {
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
            serde_json::Value::Number(n) => n.as_f64()?,
            _ => return None,
        };
        if ms < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(ms / 1000.0).ok()
    }

    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.time).ok()
    }

    pub fn client_name(&self) -> &str {
        self.client_info.as_ref().map(|info| info.name.as_str()).unwrap_or("")
    }
}

/// Category label for question types in `QueryLogSummary::types`.
pub const CATEGORY_QUERY: &str = "query";

/// Category label for answer record types in `QueryLogSummary::types`.
pub const CATEGORY_ANSWER: &str = "answer";

/// One resolved query's timing.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTime {
    pub client: String,
    /// May be empty; consumers fall back to `client`.
    pub client_name: String,
    pub upstream: String,
    pub elapsed: Duration,
}

/// Condensed view of a query log page.
#[derive(Debug, Clone, Default)]
pub struct QueryLogSummary {
    /// category -> record type -> count.
    pub types: HashMap<String, HashMap<String, u64>>,
    pub times: Vec<QueryTime>,
}

impl QueryLogSummary {
    /// Condense log entries.
    ///
    /// Type counts cover every entry. Timing entries are only produced for
    /// entries strictly newer than `after`. Entries without a parseable
    /// timestamp are always considered new.
    ///
    /// Returns the summary and the newest timestamp seen.
    pub fn from_entries(
        entries: &[QueryLogEntry],
        after: Option<DateTime<FixedOffset>>,
    ) -> (Self, Option<DateTime<FixedOffset>>) {
        let mut summary = Self::default();
        let mut newest = after;

        for entry in entries {
            if !entry.question.qtype.is_empty() {
                *summary
                    .types
                    .entry(CATEGORY_QUERY.to_string())
                    .or_default()
                    .entry(entry.question.qtype.clone())
                    .or_default() += 1;
            }
            for answer in entry.answer.iter().filter(|a| !a.rtype.is_empty()) {
                *summary
                    .types
                    .entry(CATEGORY_ANSWER.to_string())
                    .or_default()
                    .entry(answer.rtype.clone())
                    .or_default() += 1;
            }

            let ts = entry.timestamp();
            let is_new = match (after, ts) {
                (Some(cursor), Some(ts)) => ts > cursor,
                _ => true,
            };
            if let Some(ts) = ts {
                if newest.map_or(true, |n| ts > n) {
                    newest = Some(ts);
                }
            }
            if !is_new {
                continue;
            }
            if let Some(elapsed) = entry.elapsed() {
                summary.times.push(QueryTime {
                    client: entry.client.clone(),
                    client_name: entry.client_name().to_string(),
                    upstream: entry.upstream.clone(),
                    elapsed,
                });
            }
        }

        (summary, newest)
    }
}
