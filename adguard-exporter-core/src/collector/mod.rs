//! Polling and collection engine.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ── tick ──┬──► collect(appliance 1) ──┬──► stats     ──► ExporterMetrics
//!  (interval)         │                           ├──► status    ──► (+ version reconcile)
//!                     │                           ├──► dhcp
//!                     │                           └──► query log
//!                     └──► collect(appliance N) ...
//! ```
//!
//! Every arrow is a detached task: the scheduler does not wait for cycles and
//! a cycle does not wait for its sub-collections. Ticks may therefore overlap,
//! including several cycles for the same appliance.

use crate::client::ApplianceClient;
use crate::error::{ExporterError, Result};
use crate::observability::metrics as self_metrics;
use crate::registry::ExporterMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub mod resources;
mod state;

pub use state::{CollectorState, VersionCheck};

/// Everything a collection cycle writes to.
#[derive(Clone)]
pub struct CollectorContext {
    pub metrics: Arc<ExporterMetrics>,
    pub state: Arc<CollectorState>,
}

/// Join handles of one cycle's sub-collections.
///
/// Dropping the handle detaches the tasks; they keep running.
pub struct CycleHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl CycleHandle {
    /// Wait for every sub-collection of the cycle to finish.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Sub-collection task did not complete");
            }
        }
    }
}

fn spawn_sub<F, Fut>(client: &Arc<dyn ApplianceClient>, ctx: &CollectorContext, f: F) -> JoinHandle<()>
where
    F: FnOnce(Arc<dyn ApplianceClient>, CollectorContext) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(f(client.clone(), ctx.clone()))
}

/// Run one collection cycle for `client`.
///
/// Makes sure the appliance's error counter exists, then starts the four
/// sub-collections concurrently and returns without waiting for them.
pub async fn collect(client: Arc<dyn ApplianceClient>, ctx: CollectorContext) -> CycleHandle {
    let server = client.url();
    if ctx.state.initialise(server, || ctx.metrics.touch_scrape_errors(server)).await {
        debug!(server = %server, "Initialised appliance");
    }

    let tasks = vec![
        spawn_sub(&client, &ctx, |c, x| async move { resources::collect_stats(c.as_ref(), &x).await }),
        spawn_sub(&client, &ctx, |c, x| async move { resources::collect_status(c.as_ref(), &x).await }),
        spawn_sub(&client, &ctx, |c, x| async move { resources::collect_dhcp(c.as_ref(), &x).await }),
        spawn_sub(&client, &ctx, |c, x| async move {
            resources::collect_query_log(c.as_ref(), &x).await
        }),
    ];

    CycleHandle { tasks }
}

/// Drives collection cycles for a fixed set of appliances on a fixed interval.
pub struct Scheduler {
    clients: Vec<Arc<dyn ApplianceClient>>,
    ctx: CollectorContext,
}

impl Scheduler {
    /// Create a scheduler; per-appliance state is sized to the client list.
    pub fn new(clients: Vec<Arc<dyn ApplianceClient>>, metrics: Arc<ExporterMetrics>) -> Self {
        let state = Arc::new(CollectorState::with_capacity(clients.len()));
        Self { clients, ctx: CollectorContext { metrics, state } }
    }

    pub fn context(&self) -> &CollectorContext {
        &self.ctx
    }

    /// Start one detached collection cycle per appliance.
    pub fn tick(&self) {
        self_metrics::record_tick();
        for client in &self.clients {
            let client = client.clone();
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                // Detach: the cycle's sub-collections outlive this task.
                drop(collect(client, ctx).await);
            });
        }
    }

    /// Tick every `interval` until `shutdown` fires or closes.
    ///
    /// The first tick happens one interval after start. Returns as soon as
    /// shutdown is observed; in-flight cycles are not awaited.
    pub async fn run(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        if interval.is_zero() {
            return Err(ExporterError::invalid_config("collection interval must be positive"));
        }

        info!(appliances = self.clients.len(), "Collecting metrics every {:?}", interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Scheduler stopped");
                    return Ok(());
                }
                _ = ticker.tick() => self.tick(),
            }
        }
    }
}
