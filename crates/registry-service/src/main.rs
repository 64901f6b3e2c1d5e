mod backend;
mod config;
mod dialect;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use registry_core::{
    Forwarder, Identity, IdAllocator, LogBackedStore, MasterElector, MasterObserver,
    NoopApplyListener, Registry,
};

use backend::{StandaloneCoordinator, StandaloneLog};
use config::Config;
use dialect::JsonSchemaDialect;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::install();

    let config = Config::parse();
    tracing::info!(
        host = %config.host_name,
        port = config.port,
        cluster = %config.cluster_name,
        "starting registry-service"
    );

    if config.kafkastore_connection_url.is_some() {
        tracing::warn!(
            "kafkastore.connection.url is set but this build uses the bundled in-process \
             standalone backend; the connection URL is ignored. See backend.rs."
        );
    }

    let log = StandaloneLog::new();
    let coordinator = StandaloneCoordinator::new();

    let store = Arc::new(
        LogBackedStore::init(
            log,
            Arc::new(NoopApplyListener),
            config.bootstrap_timeout(),
            config.write_timeout(),
        )
        .await
        .context("failed to bootstrap the log-backed store")?,
    );

    let id_allocator = Arc::new(IdAllocator::new(coordinator.clone(), config.counter_path()));
    let identity = Identity::new(config.host_name.clone(), config.port, config.master_eligibility);

    let registry = Registry::new(
        store,
        id_allocator,
        Arc::new(JsonSchemaDialect),
        Forwarder::new(),
        identity.clone(),
        config.avro_compatibility_level.0,
    );

    let elector = MasterElector::new(coordinator, config.election_path(), identity);
    let election_observer = registry.clone() as Arc<dyn MasterObserver>;
    tokio::spawn(async move {
        if let Err(err) = elector.run(election_observer).await {
            tracing::error!(%err, "master election watch exited");
        }
    });

    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.metrics_port))
        .await
        .context("failed to bind metrics port")?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, metrics::build_router()).await {
            tracing::error!(%err, "metrics server exited");
        }
    });

    tracing::info!(port = config.metrics_port, "serving prometheus metrics");

    // This process's only externally-driven surface is the metrics exporter; the registry's own
    // REST API is out of scope here, so there is nothing further to drive beyond keeping the
    // tailer and election tasks alive.
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("received ctrl-c, shutting down");

    Ok(())
}
