use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gossip_membership::cluster::LiveCluster;
use gossip_membership::config::{FailureMode, LiveConfig, SimulationConfig};
use gossip_membership::simulation::Simulation;
use gossip_membership::status;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gossip-membership", version, about = "Gossip group membership and failure detection")]
struct Cli {
    /// Log per-message traffic
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a deterministic round-based simulation
    Simulate(SimulateArgs),
    /// Run an in-process cluster on real timers with a status API
    Live(LiveArgs),
}

#[derive(Args)]
struct SimulateArgs {
    /// JSON simulation config; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    nodes: Option<usize>,

    #[arg(long)]
    rounds: Option<u64>,

    #[arg(long, value_enum)]
    failure: Option<FailureMode>,

    #[arg(long)]
    drop_prob: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write the full JSON report here
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct LiveArgs {
    #[arg(long, default_value_t = 5)]
    nodes: usize,

    #[arg(long, default_value_t = 200)]
    tick_ms: u64,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    run_secs: Option<u64>,

    #[arg(long, default_value = "127.0.0.1:8080")]
    http: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Command::Simulate(args) => simulate(args),
        Command::Live(args) => live(args).await,
    }
}

fn simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };

    if let Some(nodes) = args.nodes {
        config.nodes = nodes;
    }
    if let Some(rounds) = args.rounds {
        config.total_rounds = rounds;
    }
    if let Some(failure) = args.failure {
        config.failure = failure;
    }
    if let Some(p) = args.drop_prob {
        config.drop_probability = p;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let mut simulation = Simulation::new(config)?;
    let report = simulation.run()?;

    println!("{}", report);

    if let Some(path) = args.report {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
        tracing::info!("Report written to {}", path.display());
    }

    Ok(())
}

async fn live(args: LiveArgs) -> anyhow::Result<()> {
    let config = LiveConfig {
        nodes: args.nodes,
        tick_interval_ms: args.tick_ms,
        run_for_secs: args.run_secs,
        http_addr: args.http,
        ..LiveConfig::default()
    };

    // 1. Membership services:
    let cluster = LiveCluster::launch(config.clone()).await?;

    // 2. Stats reporter:
    let reporter = cluster.spawn_stats_reporter(Duration::from_secs(5));

    // 3. HTTP server:
    let app = status::router(cluster.clone());
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;

    tracing::info!("HTTP server listening on {}", config.http_addr);
    match config.run_for_secs {
        Some(secs) => tracing::info!("Stopping after {} seconds", secs),
        None => tracing::info!("Press Ctrl+C to shutdown"),
    }

    let run_for = config.run_for_secs;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match run_for {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    }
                }
            }
        })
        .await?;

    // 4. Shutdown:
    reporter.abort();
    cluster.shutdown();

    for snapshot in cluster.snapshots().await {
        let ids: Vec<u32> = snapshot.members.iter().map(|r| r.id).collect();
        println!(
            "{} in_group={} crashed={} hb={} members={:?}",
            snapshot.address, snapshot.in_group, snapshot.crashed, snapshot.heartbeat, ids
        );
    }

    Ok(())
}
