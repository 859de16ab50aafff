//! Integration tests for the collection engine.
//!
//! These tests drive full collection cycles and the scheduler against an
//! in-memory appliance, and read results back from a private registry.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test collection_cycle
//! ```

use adguard_exporter_core::client::types::{
    AutoClient, DhcpLease, QueryLogSummary, QueryTime, Stats, Status,
};
use adguard_exporter_core::client::{Clients, DhcpStatus};
use adguard_exporter_core::{
    collect, ApplianceClient, CollectorContext, CollectorState, ExporterError, ExporterMetrics,
    Resource, Result, Scheduler,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Mock appliance (no network).
struct MockAppliance {
    url: String,
    version: Mutex<String>,
    failing: Mutex<HashSet<Resource>>,
    stats: Stats,
    clients: Clients,
    dhcp: DhcpStatus,
    query_log: QueryLogSummary,
    status_delay: Duration,
    status_calls: AtomicUsize,
    status_done: AtomicUsize,
}

impl MockAppliance {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            version: Mutex::new("v0.107.0".to_string()),
            failing: Mutex::new(HashSet::new()),
            stats: Stats::default(),
            clients: Clients::default(),
            dhcp: DhcpStatus::default(),
            query_log: QueryLogSummary::default(),
            status_delay: Duration::ZERO,
            status_calls: AtomicUsize::new(0),
            status_done: AtomicUsize::new(0),
        }
    }

    fn failing(self, resources: &[Resource]) -> Self {
        self.failing.lock().unwrap().extend(resources.iter().copied());
        self
    }

    fn with_version(self, version: &str) -> Self {
        self.set_version(version);
        self
    }

    fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    fn check(&self, resource: Resource) -> Result<()> {
        if self.failing.lock().unwrap().contains(&resource) {
            return Err(ExporterError::FetchFailed {
                server: self.url.clone(),
                resource,
                reason: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ApplianceClient for MockAppliance {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_stats(&self) -> Result<Stats> {
        self.check(Resource::Stats)?;
        Ok(self.stats.clone())
    }

    async fn get_clients(&self) -> Result<Clients> {
        self.check(Resource::Clients)?;
        Ok(self.clients.clone())
    }

    async fn get_status(&self) -> Result<Status> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        self.status_done.fetch_add(1, Ordering::SeqCst);
        self.check(Resource::Status)?;
        Ok(Status {
            version: self.version.lock().unwrap().clone(),
            running: true,
            protection_enabled: true,
        })
    }

    async fn get_dhcp(&self) -> Result<DhcpStatus> {
        self.check(Resource::Dhcp)?;
        Ok(self.dhcp.clone())
    }

    async fn get_query_log(&self) -> Result<QueryLogSummary> {
        self.check(Resource::QueryLog)?;
        Ok(self.query_log.clone())
    }
}

fn context() -> CollectorContext {
    CollectorContext {
        metrics: Arc::new(ExporterMetrics::new().expect("registry should build")),
        state: Arc::new(CollectorState::default()),
    }
}

/// Value of the series `name{labels}` as currently exposed, if it exists.
fn series(metrics: &ExporterMetrics, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let families = metrics.registry().gather();
    let family = families.iter().find(|f| f.get_name() == name)?;
    family
        .get_metric()
        .iter()
        .find(|m| {
            let pairs = m.get_label();
            labels.iter().all(|(k, v)| pairs.iter().any(|p| p.get_name() == *k && p.get_value() == *v))
        })
        .map(|m| {
            if m.has_counter() {
                m.get_counter().get_value()
            } else {
                m.get_gauge().get_value()
            }
        })
}

/// Number of series of `name` carrying `server`.
fn series_count(metrics: &ExporterMetrics, name: &str, server: &str) -> usize {
    metrics
        .registry()
        .gather()
        .iter()
        .filter(|f| f.get_name() == name)
        .flat_map(|f| f.get_metric().iter())
        .filter(|m| m.get_label().iter().any(|p| p.get_name() == "server" && p.get_value() == server))
        .count()
}

async fn run_cycle(client: &Arc<MockAppliance>, ctx: &CollectorContext) {
    let client: Arc<dyn ApplianceClient> = client.clone();
    collect(client, ctx.clone()).await.join().await;
}

const A: &str = "http://10.0.0.1";
const B: &str = "http://10.0.0.2";

#[tokio::test]
async fn test_error_counter_exists_from_first_cycle() {
    let ctx = context();
    let client: Arc<dyn ApplianceClient> = Arc::new(MockAppliance::new(A).failing(&[
        Resource::Stats,
        Resource::Status,
        Resource::Dhcp,
        Resource::QueryLog,
    ]));

    let handle = collect(client, ctx.clone()).await;
    // Sub-collections have not run yet on the current-thread runtime.
    assert_eq!(series(&ctx.metrics, "adguard_scrape_errors_total", &[("server", A)]), Some(0.0));
    assert!(ctx.state.is_initialised(A).await);

    handle.join().await;
    assert_eq!(series(&ctx.metrics, "adguard_scrape_errors_total", &[("server", A)]), Some(4.0));
}

#[tokio::test]
async fn test_healthy_cycle_has_zero_errors() {
    let ctx = context();
    let client = Arc::new(MockAppliance::new(A));
    run_cycle(&client, &ctx).await;
    run_cycle(&client, &ctx).await;
    assert_eq!(series(&ctx.metrics, "adguard_scrape_errors_total", &[("server", A)]), Some(0.0));
}

#[tokio::test]
async fn test_failed_stats_publishes_nothing() {
    let ctx = context();
    let mut mock = MockAppliance::new(A).failing(&[Resource::Stats]);
    mock.stats.num_dns_queries = 10;
    mock.stats.top_queried_domains = vec![HashMap::from([("example.com".to_string(), 3.0)])];
    run_cycle(&Arc::new(mock), &ctx).await;

    for name in [
        "adguard_queries",
        "adguard_blocked_filtered",
        "adguard_replaced_safesearch",
        "adguard_replaced_safebrowsing",
        "adguard_replaced_parental",
        "adguard_avg_processing_time_seconds",
        "adguard_top_clients",
        "adguard_top_upstreams",
        "adguard_top_queried_domains",
        "adguard_top_blocked_domains",
        "adguard_top_upstreams_avg_response_time_seconds",
    ] {
        assert_eq!(series_count(&ctx.metrics, name, A), 0, "{} should not be published", name);
    }
    assert_eq!(series(&ctx.metrics, "adguard_scrape_errors_total", &[("server", A)]), Some(1.0));
    // The other sub-collections were unaffected.
    assert_eq!(series(&ctx.metrics, "adguard_protection_enabled", &[("server", A)]), Some(1.0));
}

#[tokio::test]
async fn test_failed_client_directory_aborts_stats() {
    let ctx = context();
    let mut mock = MockAppliance::new(A).failing(&[Resource::Clients]);
    mock.stats.num_dns_queries = 10;
    run_cycle(&Arc::new(mock), &ctx).await;

    assert_eq!(series_count(&ctx.metrics, "adguard_queries", A), 0);
    assert_eq!(series(&ctx.metrics, "adguard_scrape_errors_total", &[("server", A)]), Some(1.0));
}

#[tokio::test]
async fn test_top_clients_resolve_display_names() {
    let ctx = context();
    let mut mock = MockAppliance::new(A);
    mock.stats.top_clients = vec![
        HashMap::from([("10.0.0.5".to_string(), 42.0)]),
        HashMap::from([("10.0.0.9".to_string(), 7.0)]),
    ];
    mock.clients.auto_clients = vec![AutoClient {
        ip: "10.0.0.5".to_string(),
        name: "laptop".to_string(),
        source: "rDNS".to_string(),
    }];
    run_cycle(&Arc::new(mock), &ctx).await;

    assert_eq!(
        series(
            &ctx.metrics,
            "adguard_top_clients",
            &[("server", A), ("client", "10.0.0.5"), ("client_name", "laptop")]
        ),
        Some(42.0)
    );
    assert_eq!(
        series(
            &ctx.metrics,
            "adguard_top_clients",
            &[("server", A), ("client", "10.0.0.9"), ("client_name", "10.0.0.9")]
        ),
        Some(7.0)
    );
}

#[tokio::test]
async fn test_version_change_resets_running_series() {
    let ctx = context();
    let a = Arc::new(MockAppliance::new(A).with_version("v1"));
    let b = Arc::new(MockAppliance::new(B).with_version("v9"));

    run_cycle(&a, &ctx).await;
    run_cycle(&b, &ctx).await;
    assert_eq!(ctx.state.baseline_version(A).await.as_deref(), Some("v1"));
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", A), ("version", "v1")]), Some(1.0));
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", B), ("version", "v9")]), Some(1.0));

    a.set_version("v2");
    run_cycle(&a, &ctx).await;

    // Global reset: stale and unrelated series are gone, the new one is present.
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", A), ("version", "v1")]), None);
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", B), ("version", "v9")]), None);
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", A), ("version", "v2")]), Some(1.0));
    // Unaffected families keep their values.
    assert_eq!(series(&ctx.metrics, "adguard_protection_enabled", &[("server", B)]), Some(1.0));
}

#[tokio::test]
async fn test_baseline_is_never_updated_after_drift() {
    let ctx = context();
    let a = Arc::new(MockAppliance::new(A).with_version("v1"));
    let b = Arc::new(MockAppliance::new(B).with_version("v9"));
    run_cycle(&a, &ctx).await;

    a.set_version("v2");
    run_cycle(&a, &ctx).await;
    run_cycle(&b, &ctx).await;
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", B), ("version", "v9")]), Some(1.0));

    // Still v2 against a v1 baseline: the reset fires again.
    run_cycle(&a, &ctx).await;
    assert_eq!(ctx.state.baseline_version(A).await.as_deref(), Some("v1"));
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", B), ("version", "v9")]), None);
    assert_eq!(series(&ctx.metrics, "adguard_running", &[("server", A), ("version", "v2")]), Some(1.0));
}

#[tokio::test]
async fn test_dhcp_and_query_log_publish() {
    let ctx = context();
    let mut mock = MockAppliance::new(A);
    mock.dhcp = DhcpStatus {
        enabled: true,
        leases: vec![DhcpLease {
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            ip: "10.0.0.20".to_string(),
            hostname: "phone".to_string(),
            expires: Some("2024-05-01T10:00:00Z".to_string()),
        }],
        static_leases: Vec::new(),
    };
    mock.query_log = QueryLogSummary {
        types: HashMap::from([
            ("query".to_string(), HashMap::from([("A".to_string(), 9u64)])),
            ("answer".to_string(), HashMap::from([("CNAME".to_string(), 4u64)])),
        ]),
        times: vec![QueryTime {
            client: "192.168.1.2".to_string(),
            client_name: String::new(),
            upstream: "1.1.1.1:53".to_string(),
            elapsed: Duration::from_millis(30),
        }],
    };
    run_cycle(&Arc::new(mock), &ctx).await;

    assert_eq!(series(&ctx.metrics, "adguard_dhcp_enabled", &[("server", A)]), Some(1.0));
    assert_eq!(
        series(&ctx.metrics, "adguard_dhcp_leases", &[("server", A), ("hostname", "phone")]),
        Some(1.0)
    );
    assert_eq!(
        series(&ctx.metrics, "adguard_query_types", &[("server", A), ("type", "CNAME"), ("category", "answer")]),
        Some(4.0)
    );

    let histogram = ctx.metrics.processing_time_bucket.with_label_values(&[
        A,
        "192.168.1.2",
        "192.168.1.2",
        "1.1.1.1:53",
    ]);
    assert_eq!(histogram.get_sample_count(), 1);
    let rendered = ctx.metrics.render().unwrap();
    assert!(!rendered.contains(r#"client_name="""#), "empty display name must fall back");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cycles_do_not_lose_updates() {
    let ctx = context();
    let mock = Arc::new(MockAppliance::new(A).with_version("v1").failing(&[Resource::Dhcp]));

    let cycles: Vec<_> = (0..16)
        .map(|_| {
            let client: Arc<dyn ApplianceClient> = mock.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { collect(client, ctx).await.join().await })
        })
        .collect();
    for cycle in cycles {
        cycle.await.expect("cycle should complete");
    }

    assert_eq!(ctx.state.baseline_version(A).await.as_deref(), Some("v1"));
    assert_eq!(series(&ctx.metrics, "adguard_scrape_errors_total", &[("server", A)]), Some(16.0));
    assert_eq!(series_count(&ctx.metrics, "adguard_running", A), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_ticks_until_shutdown() {
    let a = Arc::new(MockAppliance::new(A));
    let b = Arc::new(MockAppliance::new(B));
    let metrics = Arc::new(ExporterMetrics::new().unwrap());
    let scheduler = Scheduler::new(
        vec![a.clone() as Arc<dyn ApplianceClient>, b.clone() as Arc<dyn ApplianceClient>],
        metrics.clone(),
    );
    let state = scheduler.context().state.clone();

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler.run(Duration::from_secs(10), rx));

    // No tick before the first full interval.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(a.status_calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(a.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(b.status_calls.load(Ordering::SeqCst), 3);
    assert!(state.is_initialised(A).await);
    assert_eq!(series(&metrics, "adguard_scrape_errors_total", &[("server", B)]), Some(0.0));

    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(a.status_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycles_overlap_and_outlive_shutdown() {
    let a = Arc::new(MockAppliance::new(A).with_version("v1").with_status_delay(Duration::from_secs(25)));
    let metrics = Arc::new(ExporterMetrics::new().unwrap());
    let scheduler = Scheduler::new(vec![a.clone() as Arc<dyn ApplianceClient>], metrics.clone());

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler.run(Duration::from_secs(10), rx));

    // Ticks at 10s, 20s and 30s each started a cycle although none finished.
    tokio::time::sleep(Duration::from_secs(32)).await;
    assert_eq!(a.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(a.status_done.load(Ordering::SeqCst), 0);
    assert_eq!(series(&metrics, "adguard_running", &[("server", A), ("version", "v1")]), None);

    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // Pending status fetches still complete and publish after the scheduler stopped.
    tokio::time::sleep(Duration::from_secs(28)).await;
    assert_eq!(a.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(a.status_done.load(Ordering::SeqCst), 3);
    assert_eq!(series(&metrics, "adguard_running", &[("server", A), ("version", "v1")]), Some(1.0));
    assert_eq!(series(&metrics, "adguard_scrape_errors_total", &[("server", A)]), Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn test_empty_scheduler_waits_for_shutdown() {
    let scheduler = Scheduler::new(Vec::new(), Arc::new(ExporterMetrics::new().unwrap()));
    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(scheduler.run(Duration::from_secs(1), rx));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!handle.is_finished());

    drop(tx);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let scheduler = Scheduler::new(Vec::new(), Arc::new(ExporterMetrics::new().unwrap()));
    let (_tx, rx) = broadcast::channel(1);
    let err = scheduler.run(Duration::ZERO, rx).await.unwrap_err();
    assert!(matches!(err, ExporterError::InvalidConfig { .. }));
}
