use adguard_exporter_core::{
    init_observability, shutdown_observability, AdguardClient, ApplianceClient, Config,
    ExporterMetrics, HealthChecker, Scheduler,
};
use std::sync::Arc;
use tracing::{error, info};

mod api;
mod shutdown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("adguard-exporter: {}", e);
            std::process::exit(1);
        }
    };

    let self_metrics = init_observability(config.server.debug)?;
    info!(version = env!("CARGO_PKG_VERSION"), "AdGuard exporter starting");
    info!(
        appliances = config.appliances.len(),
        interval = ?config.server.interval,
        port = config.server.port,
        "Loaded configuration"
    );

    let metrics = Arc::new(ExporterMetrics::new()?);

    let mut clients: Vec<Arc<dyn ApplianceClient>> = Vec::with_capacity(config.appliances.len());
    for appliance in &config.appliances {
        clients.push(Arc::new(AdguardClient::new(appliance)?));
    }

    let shutdown = shutdown::shutdown_signal();

    let state = api::AppState {
        metrics: metrics.clone(),
        self_metrics,
        health: HealthChecker::new(clients.clone()),
    };
    let mut server = tokio::spawn(api::serve(state, config.server.port, shutdown.subscribe()));

    let scheduler = Scheduler::new(clients, metrics);
    let collector = tokio::spawn(scheduler.run(config.server.interval, shutdown.subscribe()));

    let mut signal = shutdown.subscribe();
    tokio::select! {
        _ = signal.recv() => {
            info!("Received shutdown signal");
        }
        result = &mut server => {
            // The server only returns early on a bind or accept failure.
            let _ = shutdown.send(());
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
            collector.abort();
            shutdown_observability();
            return Err("HTTP server exited unexpectedly".into());
        }
    }

    match server.await {
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    match collector.await {
        Ok(Err(e)) => error!(error = %e, "Scheduler failed"),
        Err(e) => error!(error = %e, "Scheduler task panicked"),
        Ok(Ok(())) => {}
    }

    info!("AdGuard exporter shutting down");
    shutdown_observability();
    Ok(())
}
