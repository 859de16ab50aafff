//! Metric registry for the figures collected from appliances.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for durations
//!
//! Every series carries the appliance identity as its `server` label. A label
//! combination, once written, persists until its whole family is reset; reset
//! is the only way series are ever removed.

use crate::client::DhcpStatus;
use crate::error::Result;
use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Buckets for per-query processing time, in seconds.
pub const PROCESSING_TIME_BUCKETS: &[f64] =
    &[0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Lease type label for dynamic DHCP leases.
pub const LEASE_DYNAMIC: &str = "dynamic";

/// Lease type label for static DHCP leases.
pub const LEASE_STATIC: &str = "static";

/// Named, labeled series published for the scraper.
pub struct ExporterMetrics {
    registry: Registry,

    pub scrape_errors: CounterVec,

    // Aggregate stats
    pub total_queries: GaugeVec,
    pub blocked_filtered: GaugeVec,
    pub replaced_safesearch: GaugeVec,
    pub replaced_safebrowsing: GaugeVec,
    pub replaced_parental: GaugeVec,
    pub avg_processing_time: GaugeVec,

    // Top-N breakdowns
    pub top_clients: GaugeVec,           // labels: server, client, client_name
    pub top_upstreams: GaugeVec,         // labels: server, upstream
    pub top_queried_domains: GaugeVec,   // labels: server, domain
    pub top_blocked_domains: GaugeVec,   // labels: server, domain
    pub top_upstreams_avg_times: GaugeVec, // labels: server, upstream

    // Status
    pub running: GaugeVec, // labels: server, version
    pub protection_enabled: GaugeVec,

    // DHCP
    pub dhcp_enabled: GaugeVec,
    pub dhcp_leases: GaugeVec,       // labels: server, type, ip, mac, hostname
    pub dhcp_leases_count: GaugeVec, // labels: server, type

    // Query log
    pub query_types: GaugeVec,              // labels: server, type, category
    pub processing_time_bucket: HistogramVec, // labels: server, client, client_name, upstream
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let vec = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

impl ExporterMetrics {
    /// Create all families and register them in a fresh registry.
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create all families and register them in `registry`.
    ///
    /// Fails if any family name is already registered there.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let scrape_errors = CounterVec::new(
            Opts::new("adguard_scrape_errors_total", "Number of errors scraping the AdGuard API"),
            &["server"],
        )?;
        registry.register(Box::new(scrape_errors.clone()))?;

        let r = &registry;
        let server = &["server"];
        let total_queries = gauge_vec(r, "adguard_queries", "Total DNS queries processed", server)?;
        let blocked_filtered =
            gauge_vec(r, "adguard_blocked_filtered", "Queries blocked by filters", server)?;
        let replaced_safesearch = gauge_vec(
            r,
            "adguard_replaced_safesearch",
            "Queries rewritten by safe search",
            server,
        )?;
        let replaced_safebrowsing = gauge_vec(
            r,
            "adguard_replaced_safebrowsing",
            "Queries blocked by safe browsing",
            server,
        )?;
        let replaced_parental =
            gauge_vec(r, "adguard_replaced_parental", "Queries blocked by parental control", server)?;
        let avg_processing_time = gauge_vec(
            r,
            "adguard_avg_processing_time_seconds",
            "Average query processing time",
            server,
        )?;

        let top_clients = gauge_vec(
            r,
            "adguard_top_clients",
            "Queries per top client",
            &["server", "client", "client_name"],
        )?;
        let top_upstreams = gauge_vec(
            r,
            "adguard_top_upstreams",
            "Responses per top upstream",
            &["server", "upstream"],
        )?;
        let top_queried_domains = gauge_vec(
            r,
            "adguard_top_queried_domains",
            "Queries per top queried domain",
            &["server", "domain"],
        )?;
        let top_blocked_domains = gauge_vec(
            r,
            "adguard_top_blocked_domains",
            "Queries per top blocked domain",
            &["server", "domain"],
        )?;
        let top_upstreams_avg_times = gauge_vec(
            r,
            "adguard_top_upstreams_avg_response_time_seconds",
            "Average response time per top upstream",
            &["server", "upstream"],
        )?;

        let running = gauge_vec(
            r,
            "adguard_running",
            "Whether the AdGuard DNS server is running",
            &["server", "version"],
        )?;
        let protection_enabled =
            gauge_vec(r, "adguard_protection_enabled", "Whether protection is enabled", server)?;

        let dhcp_enabled =
            gauge_vec(r, "adguard_dhcp_enabled", "Whether the DHCP server is enabled", server)?;
        let dhcp_leases = gauge_vec(
            r,
            "adguard_dhcp_leases",
            "DHCP leases (1 = present)",
            &["server", "type", "ip", "mac", "hostname"],
        )?;
        let dhcp_leases_count = gauge_vec(
            r,
            "adguard_dhcp_leases_count",
            "Number of DHCP leases by type",
            &["server", "type"],
        )?;

        let query_types = gauge_vec(
            r,
            "adguard_query_types",
            "Record types in the recent query log",
            &["server", "type", "category"],
        )?;
        let processing_time_bucket = HistogramVec::new(
            HistogramOpts::new(
                "adguard_processing_time_seconds",
                "Processing time of individual queries from the query log",
            )
            .buckets(PROCESSING_TIME_BUCKETS.to_vec()),
            &["server", "client", "client_name", "upstream"],
        )?;
        registry.register(Box::new(processing_time_bucket.clone()))?;

        Ok(Self {
            registry,
            scrape_errors,
            total_queries,
            blocked_filtered,
            replaced_safesearch,
            replaced_safebrowsing,
            replaced_parental,
            avg_processing_time,
            top_clients,
            top_upstreams,
            top_queried_domains,
            top_blocked_domains,
            top_upstreams_avg_times,
            running,
            protection_enabled,
            dhcp_enabled,
            dhcp_leases,
            dhcp_leases_count,
            query_types,
            processing_time_bucket,
        })
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Make sure the error counter exists for `server`, at 0 if it is new.
    pub fn touch_scrape_errors(&self, server: &str) {
        self.scrape_errors.with_label_values(&[server]);
    }

    pub fn inc_scrape_errors(&self, server: &str) {
        self.scrape_errors.with_label_values(&[server]).inc();
    }

    /// Record the lease list of one appliance.
    ///
    /// Every lease is published as a presence series; lease counts are
    /// published per type. Leases that disappear are not removed.
    pub fn record_dhcp_leases(&self, server: &str, dhcp: &DhcpStatus) {
        for (kind, leases) in [(LEASE_DYNAMIC, &dhcp.leases), (LEASE_STATIC, &dhcp.static_leases)] {
            for lease in leases {
                self.dhcp_leases
                    .with_label_values(&[server, kind, &lease.ip, &lease.mac, &lease.hostname])
                    .set(1.0);
            }
            self.dhcp_leases_count.with_label_values(&[server, kind]).set(leases.len() as f64);
        }
    }

    /// Render every family in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| crate::error::ExporterError::Other(e.into()))
    }
}

/// Content type of `ExporterMetrics::render` output.
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}
