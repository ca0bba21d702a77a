//! reparrayd - replicated indexed array daemon
//!
//! Hosts named indexed arrays as the authority and keeps in-process replicas
//! converged by forwarding delta batches over bounded channels.

mod config;
mod error;
mod http;
mod metrics;
mod state;
mod sync;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use reparray_core::names::load_table;
use reparray_core::{JsonPayloads, PayloadDecoder, TypeTag};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, NamesConfig};
use crate::state::{ArrayRegistry, HostSettings, LoggingObserver, NameTables};
use crate::sync::{ReplicaMirror, ReplicationLink, spawn_replica};

/// Broadcast depth for each replica's local event stream.
const REPLICA_EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        server = %config.server.name,
        arrays = config.arrays.len(),
        replicas = config.replication.replicas,
        "Starting reparrayd"
    );

    let started_at = Utc::now();
    let decoder: Arc<dyn PayloadDecoder> = Arc::new(JsonPayloads);
    let registry = Arc::new(
        ArrayRegistry::new(load_name_tables(&config.names)?, Arc::clone(&decoder))
            .with_array_observer(Arc::new(LoggingObserver))
            .with_registry_observer(Arc::new(LoggingObserver)),
    );

    // Convention: metrics_port = 0 disables the HTTP endpoint.
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");
        let state = http::HttpState {
            server_name: config.server.name.clone(),
            started_at,
            registry: Arc::clone(&registry),
        };
        tokio::spawn(async move {
            http::run_http_server(metrics_port, state).await;
        });
    }

    // Arrays, preloads and replication links
    let flush_interval = Duration::from_millis(config.replication.flush_interval_ms);
    let mut mirrors = Vec::new();
    for array in &config.arrays {
        let host = registry.add_array(&array.name, HostSettings::from(array))?;

        if let Some(ref path) = array.preload_file {
            let text = std::fs::read_to_string(path)?;
            host.preload_lines(&text, &TypeTag::new(array.type_tag.as_str()))?;
        }

        if config.replication.replicas == 0 {
            continue;
        }
        let mut link = ReplicationLink::new(Arc::clone(&host), flush_interval);
        for index in 0..config.replication.replicas {
            let mirror = Arc::new(RwLock::new(ReplicaMirror::new(
                array.name.as_str(),
                Arc::clone(&decoder),
                REPLICA_EVENT_CAPACITY,
            )));
            spawn_replica(
                Arc::clone(&mirror),
                link.attach(config.replication.channel_capacity),
                index,
            );
            mirrors.push(mirror);
        }
        link.spawn();
        info!(array = %array.name, replicas = config.replication.replicas, "Replication link started");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    for host in registry.arrays() {
        info!(array = %host.name(), entries = host.len(), "Final statistics:\n{}", host.dump_statistics());
    }
    for mirror in &mirrors {
        let mirror = mirror.read();
        if !mirror.is_consistent() {
            warn!(array = %mirror.array_name(), "Replica indices inconsistent at shutdown");
        }
    }
    Ok(())
}

/// Initialize tracing. `REPARRAYD_LOG_JSON` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("REPARRAYD_LOG_JSON").is_some() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn load_name_tables(config: &NamesConfig) -> anyhow::Result<NameTables> {
    let mut tables = NameTables {
        seed: config.seed,
        ..NameTables::default()
    };
    if let (Some(adjectives), Some(names)) = (&config.adjectives_file, &config.names_file) {
        tables.adjectives = load_table(adjectives)?;
        tables.names = load_table(names)?;
        info!(
            adjectives = tables.adjectives.len(),
            names = tables.names.len(),
            "Loaded name tables"
        );
    }
    Ok(tables)
}
