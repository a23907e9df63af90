//! Memory control plane demo.
//!
//! Runs rate-limit and client caches against an in-memory store while a
//! writer task keeps adding and deleting rows, and logs what the caches see.
//!
//! Run with:
//! ```bash
//! cargo run -p memory-control-plane -- --services 5 --duration-secs 30
//! ```

mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use meshsync::prelude::*;
use meshsync::resources::{ClientRow, Location, RateLimitRow};
use rand::Rng;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::store::MemoryStore;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Locked,
    CopyOnWrite,
}

impl From<Mode> for IndexMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Locked => IndexMode::Locked,
            Mode::CopyOnWrite => IndexMode::CopyOnWrite,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "memory-control-plane", version, about)]
struct Args {
    /// Number of services owning rate-limit rules.
    #[arg(long, default_value_t = 5)]
    services: usize,

    /// Rules seeded per service.
    #[arg(long, default_value_t = 3)]
    rules_per_service: usize,

    /// Clients registered at startup.
    #[arg(long, default_value_t = 20)]
    clients: usize,

    /// Refresh interval in milliseconds.
    #[arg(long, default_value_t = 1000)]
    refresh_ms: u64,

    /// Interval between simulated operator writes in milliseconds.
    #[arg(long, default_value_t = 400)]
    mutate_ms: u64,

    /// Store rollback window in seconds.
    #[arg(long, default_value_t = 1)]
    rollback_secs: u64,

    /// Stop after this many seconds; 0 runs until interrupted.
    #[arg(long, default_value_t = 0)]
    duration_secs: u64,

    /// Runtime configuration file. Overrides the interval flags.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Index concurrency mode.
    #[arg(long, value_enum, default_value_t = Mode::Locked)]
    index_mode: Mode,
}

impl Args {
    fn runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let config = match &self.config {
            Some(path) => RuntimeConfig::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RuntimeConfig::new().with_defaults(
                CacheConfig::new()
                    .with_refresh_interval(Duration::from_millis(self.refresh_ms))
                    .with_store_rollback(Duration::from_secs(self.rollback_secs))
                    .with_index_mode(self.index_mode.into()),
            ),
        };
        config.validate()?;
        Ok(config)
    }
}

fn rule_row(service: usize, n: usize) -> RateLimitRow {
    let body = json!({
        "priority": n,
        "labels": { "env": { "type": "EXACT", "value": "prod" } },
        "amounts": [{ "maxAmount": 100 * (n + 1), "validDurationSecs": 1 }],
    });
    RateLimitRow::new(format!("svc-{service}-limit-{n}"), "", body.to_string())
}

fn client_row(n: usize) -> ClientRow {
    ClientRow {
        host: format!("10.0.0.{}", n % 8),
        client_type: if n % 2 == 0 { "SDK" } else { "AGENT" }.to_string(),
        version: "1.0.0".to_string(),
        location: Location {
            region: "region-a".to_string(),
            zone: format!("zone-{}", n % 3),
            campus: String::new(),
        },
        ..ClientRow::default()
    }
}

fn seed(store: &MemoryStore, args: &Args) {
    for service in 0..args.services {
        for n in 0..args.rules_per_service {
            store.add_rule(&format!("svc-{service}"), rule_row(service, n));
        }
    }
    for n in 0..args.clients {
        store.register_client(&format!("client-{n}"), client_row(n));
    }
    info!(
        rules = args.services * args.rules_per_service,
        clients = args.clients,
        "seeded store"
    );
}

/// One simulated operator write.
fn mutate(store: &MemoryStore, args: &Args, round: usize) {
    let mut rng = rand::rng();
    let service = rng.random_range(0..args.services.max(1));
    let name = format!("svc-{service}");
    match rng.random_range(0..4) {
        0 => {
            let id = store.add_rule(&name, rule_row(service, round));
            info!(%id, service = %name, "rule added");
        }
        1 => {
            if let Some(id) = store.delete_some_rule(&name, rng.random_range(0..usize::MAX)) {
                info!(%id, service = %name, "rule deleted");
            }
        }
        2 => {
            let n = rng.random_range(0..args.clients.max(1) * 2);
            store.register_client(&format!("client-{n}"), client_row(n));
        }
        _ => {
            let n = rng.random_range(0..args.clients.max(1) * 2);
            store.deregister_client(&format!("client-{n}"));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meshsync_cache=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();
    info!("Starting memory control plane");
    info!("{}", meshsync::version::version_string());

    let config = args.runtime_config()?;
    let store = Arc::new(MemoryStore::new());
    seed(&store, &args);

    let rules = RateLimitCache::initialize(
        config.cache_config(&ResourceType::new(ResourceType::RATE_LIMIT)),
        store.clone(),
    )?;
    let clients = ClientCache::initialize(
        config.cache_config(&ResourceType::new(ResourceType::CLIENT)),
        store.clone(),
    )?;

    let manager = CacheManager::new();
    manager.register(rules.cache().clone())?;
    manager.register(clients.cache().clone())?;

    let shutdown = ShutdownController::new();
    let loops = manager.spawn_all(&shutdown);
    info!(caches = loops.len(), "refresh loops started");

    let writer = {
        let store = Arc::clone(&store);
        let mut signal = shutdown.subscribe();
        let period = Duration::from_millis(args.mutate_ms.max(1));
        let args = args.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut round = args.rules_per_service;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        mutate(&store, &args, round);
                        round += 1;
                    }
                    _ = signal.changed() => break,
                }
            }
        })
    };

    let reporter = {
        let rules = rules.clone();
        let clients = clients.clone();
        let metrics = manager.metrics().clone();
        let mut signal = shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let stats = rules.cache().stats();
                        info!(
                            "Rules: {} across {} services (svc-0: {} at {:?}), clients: {}, hit_rate={:.2}%, ready caches: {}",
                            rules.rule_count(),
                            rules.revision_count(),
                            rules.rules_for_service("svc-0").len(),
                            rules.last_revision("svc-0").as_str(),
                            clients.client_count(),
                            stats.hit_rate() * 100.0,
                            metrics.ready_caches()
                        );
                    }
                    _ = signal.changed() => break,
                }
            }
        })
    };

    info!("Press Ctrl+C to shutdown");
    if args.duration_secs == 0 {
        meshsync::runtime::wait_for_signal().await?;
    } else {
        tokio::select! {
            result = meshsync::runtime::wait_for_signal() => result?,
            _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {}
        }
    }

    info!("Shutting down...");
    if !shutdown.shutdown(config.shutdown.grace_period).await {
        warn!("refresh cycles still running after the grace period");
    }
    for handle in loops {
        let summary = handle.await?;
        info!(cycles = summary.cycles, failures = summary.failures, "refresh loop stopped");
    }
    writer.await?;
    reporter.await?;
    info!(
        rules = rules.rule_count(),
        clients = clients.client_count(),
        ready = manager.is_ready(),
        "final state"
    );
    Ok(())
}
