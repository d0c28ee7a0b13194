//! budgetsync CLI - inspect measure sources and rehearse exports
//!
//! Usage:
//!   budgetsync ranges [--network <network>]
//!   budgetsync cache stats
//!   budgetsync cache clear [--store <name>]
//!   budgetsync simulate <plan.json>
//!
//! Examples:
//!   budgetsync ranges --network dfp
//!   budgetsync cache clear --store appnexus:static
//!   budgetsync simulate plans/spring.json

use budgetsync::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore, SystemClock};
use budgetsync::config::Settings;
use budgetsync::export::simulate::{simulate, SimulationPlan};
use budgetsync::logging;
use budgetsync::measure::id::verify_disjoint;
use budgetsync::measure::{
    CampaignContext, Company, DeliveryNetwork, MeasureSourceProvider, Owner, SourceContext,
    SourceEnv, StandardSourceProvider,
};
use budgetsync::remote::InMemoryCampaignClient;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "budgetsync")]
#[command(about = "budgetsync - Project budget allocations onto delivery network campaigns")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to BUDGETSYNC_CONFIG or the usual locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List measure sources with their id ranges
    Ranges {
        /// Delivery network to list (all networks if not specified)
        #[arg(short, long)]
        network: Option<NetworkArg>,
    },

    /// Inspect or clear the measure cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Reconcile a plan against an in-memory delivery network
    Simulate {
        /// Path to the plan (JSON)
        plan: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and size
    Stats,
    /// Remove cached snapshots
    Clear {
        /// Only clear this store, e.g. `appnexus:static`
        #[arg(short, long)]
        store: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum NetworkArg {
    Appnexus,
    Dfp,
}

impl From<NetworkArg> for DeliveryNetwork {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Appnexus => DeliveryNetwork::AppNexus,
            NetworkArg::Dfp => DeliveryNetwork::GoogleDfp,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Ranges { network } => cmd_ranges(&settings, network),
        Commands::Cache { action } => cmd_cache(&settings, action),
        Commands::Simulate { plan } => cmd_simulate(&settings, plan).await,
    }
}

fn open_cache(settings: &Settings) -> Result<Arc<dyn CacheStore>, String> {
    if settings.cache.in_memory {
        return Ok(Arc::new(MemoryCacheStore::new()));
    }
    let path = settings.cache.resolved_path().map_err(|e| e.to_string())?;
    let store = match path {
        Some(path) => SqliteCacheStore::open_at(path),
        None => SqliteCacheStore::open(),
    };
    store
        .map(|s| Arc::new(s) as Arc<dyn CacheStore>)
        .map_err(|e| e.to_string())
}

fn cmd_ranges(settings: &Settings, network: Option<NetworkArg>) -> ExitCode {
    let networks = match network {
        Some(n) => vec![n.into()],
        None => vec![DeliveryNetwork::AppNexus, DeliveryNetwork::GoogleDfp],
    };

    // Descriptors only; nothing is fetched, so an empty cache and client do
    let ctx = SourceContext {
        company: Some(Company {
            id: 0,
            name: "ranges".to_string(),
            advertiser_id: Some(0),
        }),
        campaign: Some(CampaignContext::default()),
        owner: Some(Owner {
            id: 0,
            name: "ranges".to_string(),
        }),
    };

    let mut all = Vec::new();
    for network in networks {
        let env = SourceEnv::new(Arc::new(MemoryCacheStore::new()), Arc::new(SystemClock))
            .with_remote(Arc::new(InMemoryCampaignClient::new(network)));
        let provider = StandardSourceProvider::from_settings(network, env, &settings.sources)
            .with_online_sources(settings.sources.default_ttl());
        match provider.measure_sources(&ctx) {
            Ok(sources) => all.extend(sources),
            Err(e) => {
                eprintln!("Error building {} sources: {}", network, e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!(
        "{:<10} {:<28} {:>6} {:>20} {:>20}  {}",
        "NETWORK", "SOURCE", "PREFIX", "MIN", "MAX", "REFRESH"
    );
    for source in &all {
        let desc = source.descriptor();
        let range = desc.id_range();
        println!(
            "{:<10} {:<28} {:>6} {:>20} {:>20}  {}",
            desc.network,
            desc.source_id,
            desc.source_prefix,
            range.min,
            range.max,
            if source.is_async_refresh() { "background" } else { "sync" }
        );
    }

    let ranges = all
        .iter()
        .map(|s| (s.source_id(), s.descriptor().id_range()));
    match verify_disjoint(ranges) {
        Ok(()) => {
            println!();
            println!("{} sources, id ranges disjoint", all.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_cache(settings: &Settings, action: CacheAction) -> ExitCode {
    let cache = match open_cache(settings) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error opening cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match action {
        CacheAction::Stats => match cache.stats() {
            Ok(stats) => {
                println!("Entries: {}", stats.entry_count);
                println!("Size:    {} bytes", stats.total_size_bytes);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error reading cache stats: {}", e);
                ExitCode::FAILURE
            }
        },
        CacheAction::Clear { store } => {
            let result = match &store {
                Some(name) => cache.clear_store(name),
                None => cache.clear_all(),
            };
            match result {
                Ok(removed) => {
                    println!("Removed {} entries", removed);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error clearing cache: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn cmd_simulate(settings: &Settings, plan: PathBuf) -> ExitCode {
    let source = match fs::read_to_string(&plan) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", plan.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let parsed: SimulationPlan = match serde_json::from_str(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error parsing plan '{}': {}", plan.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let cache = match open_cache(settings) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error opening cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match simulate(parsed, settings, cache).await {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(json) => {
                println!("{}", json);
                eprintln!("{}", outcome.report.metrics.summary());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error encoding outcome: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
