//! # Route Indexer
//!
//! Builds the routing graph from the configured chains and keeps it live.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin route_indexer -- run
//! cargo run --bin route_indexer -- route --from USDC_AVAX --to USDC_COQ --amount 1000000
//! cargo run --bin route_indexer -- backup
//! ```
//!
//! Press Ctrl+C to stop `run` gracefully.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::prelude::{Address, Http, Provider, U256};
use log::{info, warn};
use tokio::sync::watch;
use tokio::time::Duration;

use mig_routing_sdk::{
    adapters::{UniswapV2Adapter, UniswapV3Adapter},
    backup::GraphBackup,
    database::{self, PgStore},
    dex_adapter::DexAdapter,
    discovery::{bootstrap_bridges, discover_pools},
    graph::{GraphState, RoutingGraph},
    ingestion::ChainListener,
    persistence::{MemoryStore, PriceTickSink, SnapshotStore},
    postgres_async_writer::PriceTickWriter,
    router::RouteResponse,
    settings::Settings,
    token_registry::TokenRegistry,
    types::{ChainId, TokenId},
};

#[derive(Parser)]
#[command(name = "route_indexer")]
#[command(about = "Cross-chain DEX routing graph indexer", long_about = None)]
struct Cli {
    /// Configuration file, without or with the .toml extension
    #[arg(long, default_value = "Config")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover pools, then follow every chain until Ctrl+C
    Run,

    /// Print the best route between two tokens as JSON
    Route {
        /// Source token address or label
        #[arg(long)]
        from: String,

        /// Destination token address or label
        #[arg(long)]
        to: String,

        /// Input amount in raw units; the configured reference amount when omitted
        #[arg(long)]
        amount: Option<String>,

        /// Load the graph from the backup file instead of the chains
        #[arg(long, default_value = "false")]
        from_backup: bool,
    },

    /// Discover pools and write the graph backup
    Backup,
}

type HttpProvider = Arc<Provider<Http>>;

struct Storage {
    snapshots: Arc<dyn SnapshotStore>,
    sink: Arc<dyn PriceTickSink>,
    writer: Option<Arc<PriceTickWriter>>,
}

fn init_logging(settings: &Settings) -> Result<()> {
    #[cfg(feature = "observability")]
    {
        tracing_subscriber::fmt().with_target(false).init();
        if let Some(addr) = &settings.router.metrics_addr {
            let addr: std::net::SocketAddr = addr.parse().context("invalid metrics_addr")?;
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("Failed to install Prometheus exporter")?;
            info!("Prometheus exporter listening on {}", addr);
        }
        mig_routing_sdk::metrics::describe_metrics();
    }
    #[cfg(not(feature = "observability"))]
    {
        let _ = settings;
        env_logger::init();
    }
    Ok(())
}

async fn open_storage(settings: &Settings) -> Result<Storage> {
    match &settings.database.url {
        Some(url) => {
            let pool = database::connect(url).await?;
            let writer = Arc::new(PriceTickWriter::new(
                pool.clone(),
                settings.database.batch_size,
                Duration::from_millis(settings.database.flush_interval_ms),
            ));
            Ok(Storage {
                snapshots: Arc::new(PgStore::new(pool)),
                sink: writer.clone(),
                writer: Some(writer),
            })
        }
        None => {
            warn!("No database configured; snapshots and price ticks stay in memory");
            let store = Arc::new(MemoryStore::new());
            Ok(Storage {
                snapshots: store.clone(),
                sink: store,
                writer: None,
            })
        }
    }
}

fn parse_factories(raw: &[String]) -> Result<Vec<Address>> {
    raw.iter()
        .map(|f| Address::from_str(f).with_context(|| format!("invalid factory address {}", f)))
        .collect()
}

fn connect_providers(settings: &Settings) -> Result<HashMap<String, HttpProvider>> {
    let mut providers = HashMap::new();
    for (name, chain) in &settings.chains {
        let Some(url) = &chain.rpc_url else {
            warn!("Chain {} has no rpc_url, skipping", name);
            continue;
        };
        let provider = Provider::<Http>::try_from(url.as_str())
            .with_context(|| format!("invalid rpc_url for {}", name))?;
        providers.insert(name.clone(), Arc::new(provider));
    }
    Ok(providers)
}

async fn build_graph(
    settings: &Settings,
    registry: &TokenRegistry,
    providers: &HashMap<String, HttpProvider>,
    storage: &Storage,
) -> Result<GraphState> {
    let mut state = GraphState::new(settings.router.default_builder_fee);

    for (name, provider) in providers {
        let Some(chain) = settings.chain(name) else {
            continue;
        };
        let chain_id = ChainId::normalized(name);
        let mut adapters: Vec<Arc<dyn DexAdapter>> = Vec::new();
        adapters.push(Arc::new(UniswapV2Adapter::new(
            chain_id.clone(),
            parse_factories(&chain.uniswap_v2.factories)?,
            provider.clone(),
        )));
        adapters.push(Arc::new(UniswapV3Adapter::new(
            chain_id,
            parse_factories(&chain.uniswap_v3.factories)?,
            provider.clone(),
            storage.snapshots.clone(),
            &settings.discovery,
        )));

        let tokens = registry.tokens(name);
        let outcome = discover_pools(&adapters, &tokens, &settings.router.fee_tiers).await;
        match outcome.persist(storage.snapshots.as_ref()).await {
            Ok(new_pools) => info!(
                "✅ {}: {} pools discovered ({} new)",
                name,
                outcome.pool_count(),
                new_pools
            ),
            Err(e) => warn!("Failed to persist discovery of {}: {:#}", name, e),
        }
        outcome.install(&mut state);
    }

    bootstrap_bridges(&mut state, &settings.bridge_links());
    info!(
        "✅ Graph built: {} pools, {} edges",
        state.pool_count(),
        state.edge_count()
    );
    Ok(state)
}

fn shared_graph(settings: &Settings, registry: TokenRegistry, state: GraphState) -> RoutingGraph {
    RoutingGraph::from_state(state)
        .with_mappings(Arc::new(registry))
        .with_origin_chain(settings.origin_chain())
}

async fn run(settings: Settings) -> Result<()> {
    let registry = TokenRegistry::from_settings(&settings);
    let providers = connect_providers(&settings)?;
    let storage = open_storage(&settings).await?;

    let state = build_graph(&settings, &registry, &providers, &storage).await?;
    let graph = Arc::new(shared_graph(&settings, registry, state));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();
    for (name, provider) in &providers {
        let listener = ChainListener::new(
            provider.clone(),
            graph.clone(),
            settings.update_context(name)?,
            storage.snapshots.clone(),
            storage.sink.clone(),
            settings.ingestion.clone(),
        );
        handles.push(tokio::spawn(listener.run(shutdown_rx.clone())));
    }
    info!("✅ {} chain listeners running. Press Ctrl+C to stop.", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping listeners...");
    shutdown_tx.send(true).ok();

    for result in futures::future::join_all(handles).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Listener stopped with error: {:#}", e),
            Err(e) => warn!("Listener task panicked: {}", e),
        }
    }

    if let Some(writer) = storage.writer {
        drop(storage.sink);
        match Arc::try_unwrap(writer) {
            Ok(writer) => writer.shutdown().await?,
            Err(_) => warn!("Price tick writer still shared, pending ticks may be lost"),
        }
    }
    Ok(())
}

async fn route(
    settings: Settings,
    from: String,
    to: String,
    amount: Option<String>,
    from_backup: bool,
) -> Result<()> {
    let registry = TokenRegistry::from_settings(&settings);
    let graph = if from_backup {
        let graph = shared_graph(
            &settings,
            registry,
            GraphState::new(settings.router.default_builder_fee),
        );
        graph.restore(GraphBackup::read_from(&settings.backup.path)?)?;
        graph
    } else {
        let providers = connect_providers(&settings)?;
        let storage = open_storage(&settings).await?;
        let state = build_graph(&settings, &registry, &providers, &storage).await?;
        shared_graph(&settings, registry, state)
    };

    let amount_in = match amount {
        Some(raw) => U256::from_dec_str(raw.trim()).with_context(|| format!("invalid amount {}", raw))?,
        None => settings.router.amount_in,
    };
    let hops = graph.best_paths(
        &TokenId::from_config(&from),
        &TokenId::from_config(&to),
        amount_in,
        0.0,
    );
    let response = RouteResponse::from_hops(amount_in, hops);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn backup(settings: Settings) -> Result<()> {
    let registry = TokenRegistry::from_settings(&settings);
    let providers = connect_providers(&settings)?;
    let storage = open_storage(&settings).await?;
    let state = build_graph(&settings, &registry, &providers, &storage).await?;
    let graph = shared_graph(&settings, registry, state);

    let snapshot = graph.backup()?;
    snapshot.write_to(&settings.backup.path)?;
    info!(
        "✅ Backup with {} pools and {} edges written to {}",
        snapshot.pools.len(),
        snapshot.edges.len(),
        settings.backup.path.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_file(&cli.config)?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Run => run(settings).await,
        Commands::Route {
            from,
            to,
            amount,
            from_backup,
        } => route(settings, from, to, amount, from_backup).await,
        Commands::Backup => backup(settings).await,
    }
}
