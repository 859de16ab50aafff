//! Sub-collections: one fetch-and-publish routine per appliance resource.
//!
//! Each routine either publishes everything it fetched or nothing at all. A
//! failure is logged, counted once on the appliance's error counter, and the
//! previously published values stay in place until the next tick.

use super::state::VersionCheck;
use super::CollectorContext;
use crate::client::types::Breakdown;
use crate::client::{ApplianceClient, Clients, QueryLogSummary, Resource, Stats};
use crate::error::Result;
use crate::observability::metrics as self_metrics;
use crate::registry::ExporterMetrics;
use prometheus::GaugeVec;
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Run one sub-collection, turning its error into a counted, logged failure.
async fn guarded<F>(resource: Resource, server: &str, metrics: &ExporterMetrics, work: F)
where
    F: Future<Output = Result<()>>,
{
    let start = Instant::now();
    let result = work.await;
    self_metrics::record_fetch(resource, start.elapsed().as_secs_f64());

    match result {
        Ok(()) => debug!(server = %server, resource = %resource, "Updated metrics"),
        Err(e) => {
            warn!(server = %server, resource = %resource, error = %e, "Could not collect {}", resource);
            metrics.inc_scrape_errors(server);
            self_metrics::record_fetch_failure(e.resource().unwrap_or(resource));
        }
    }
}

/// Aggregate statistics and top-N breakdowns.
pub async fn collect_stats(client: &dyn ApplianceClient, ctx: &CollectorContext) {
    let server = client.url();
    guarded(Resource::Stats, server, &ctx.metrics, async {
        let stats = client.get_stats().await?;
        let clients = client.get_clients().await?;
        publish_stats(&ctx.metrics, server, &stats, &clients);
        Ok(())
    })
    .await
}

/// Running state and protection flag, with version-change reconciliation.
pub async fn collect_status(client: &dyn ApplianceClient, ctx: &CollectorContext) {
    let server = client.url();
    guarded(Resource::Status, server, &ctx.metrics, async {
        let status = client.get_status().await?;

        let check = ctx
            .state
            .reconcile_version(server, &status.version, || ctx.metrics.running.reset())
            .await;
        if check == VersionCheck::Changed {
            info!(server = %server, version = %status.version, "Version changed, reset running series");
        }

        ctx.metrics.running.with_label_values(&[server, &status.version]).set(flag(status.running));
        ctx.metrics.protection_enabled.with_label_values(&[server]).set(flag(status.protection_enabled));
        Ok(())
    })
    .await
}

/// DHCP server state and leases.
pub async fn collect_dhcp(client: &dyn ApplianceClient, ctx: &CollectorContext) {
    let server = client.url();
    guarded(Resource::Dhcp, server, &ctx.metrics, async {
        let dhcp = client.get_dhcp().await?;
        ctx.metrics.dhcp_enabled.with_label_values(&[server]).set(flag(dhcp.enabled));
        ctx.metrics.record_dhcp_leases(server, &dhcp);
        Ok(())
    })
    .await
}

/// Query type counts and per-query processing times.
pub async fn collect_query_log(client: &dyn ApplianceClient, ctx: &CollectorContext) {
    let server = client.url();
    guarded(Resource::QueryLog, server, &ctx.metrics, async {
        let summary = client.get_query_log().await?;
        publish_query_log(&ctx.metrics, server, &summary);
        Ok(())
    })
    .await
}

fn set_breakdown(vec: &GaugeVec, server: &str, breakdown: &Breakdown) {
    for entry in breakdown {
        for (key, value) in entry {
            vec.with_label_values(&[server, key]).set(*value);
        }
    }
}

/// Write a successful stats fetch into the registry.
pub fn publish_stats(metrics: &ExporterMetrics, server: &str, stats: &Stats, clients: &Clients) {
    let names: HashMap<String, String> = clients.name_lookup();

    metrics.total_queries.with_label_values(&[server]).set(stats.num_dns_queries as f64);
    metrics.blocked_filtered.with_label_values(&[server]).set(stats.num_blocked_filtering as f64);
    metrics.replaced_safesearch.with_label_values(&[server]).set(stats.num_replaced_safesearch as f64);
    metrics
        .replaced_safebrowsing
        .with_label_values(&[server])
        .set(stats.num_replaced_safebrowsing as f64);
    metrics.replaced_parental.with_label_values(&[server]).set(stats.num_replaced_parental as f64);
    metrics.avg_processing_time.with_label_values(&[server]).set(stats.avg_processing_time);

    for entry in &stats.top_clients {
        for (ip, count) in entry {
            let name = names.get(ip).map(String::as_str).filter(|n| !n.is_empty()).unwrap_or(ip.as_str());
            metrics.top_clients.with_label_values(&[server, ip, name]).set(*count);
        }
    }
    set_breakdown(&metrics.top_upstreams, server, &stats.top_upstreams_responses);
    set_breakdown(&metrics.top_queried_domains, server, &stats.top_queried_domains);
    set_breakdown(&metrics.top_blocked_domains, server, &stats.top_blocked_domains);
    set_breakdown(&metrics.top_upstreams_avg_times, server, &stats.top_upstreams_avg_time);
}

/// Write a successful query log fetch into the registry.
pub fn publish_query_log(metrics: &ExporterMetrics, server: &str, summary: &QueryLogSummary) {
    for (category, types) in &summary.types {
        for (qtype, count) in types {
            metrics.query_types.with_label_values(&[server, qtype, category]).set(*count as f64);
        }
    }

    for time in &summary.times {
        let client_name = if time.client_name.is_empty() { &time.client } else { &time.client_name };
        metrics
            .processing_time_bucket
            .with_label_values(&[server, &time.client, client_name, &time.upstream])
            .observe(time.elapsed.as_secs_f64());
    }
}
