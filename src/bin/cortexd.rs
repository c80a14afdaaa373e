use std::sync::Arc;
use cortex_plan::engine::{MemStore, Persistence};
use cortex_plan::server::Router;
use cortex_plan::server::router::DEFAULT_MAX_IN_FLIGHT;
use cortex_plan::{KVReader, Planner};
use clap::Parser;
use std::env;
use tokio::net::TcpListener;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cortex Plan HTTP daemon", long_about = None)]
struct Args {
    #[arg(short, long)]
    data_dir: Option<String>,

    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    bind: Option<String>,

    /// Requests served concurrently before new ones get a 503.
    #[arg(long)]
    max_in_flight: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data_dir = args.data_dir
        .or_else(|| env::var("CORTEX_DATA_DIR").ok())
        .unwrap_or_else(|| "data".to_string());

    let port = args.port
        .or_else(|| env::var("CORTEX_PORT").ok())
        .unwrap_or_else(|| "8787".to_string());

    let bind = args.bind
        .or_else(|| env::var("CORTEX_BIND").ok())
        .unwrap_or_else(|| "0.0.0.0".to_string());

    let store = Arc::new(MemStore::open(Persistence::new(&data_dir)?)?);
    let partitions = store.partitions().await?;
    let planner = Arc::new(Planner::new(store));

    let router = Router::new(planner)
        .with_max_in_flight(args.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT));

    println!("Starting Cortex Plan daemon...");
    println!("Loaded {} partitions from {}: {:?}", partitions.len(), data_dir, partitions);

    let listener = TcpListener::bind(format!("{}:{}", bind, port)).await?;
    println!("Cortex Plan listening on {}:{} (HTTP)", bind, port);

    let shutdown = async {
        if signal::ctrl_c().await.is_ok() {
            println!("\nShutdown signal received. Draining in-flight requests...");
        }
    };

    router.listen_until(listener, shutdown).await?;
    println!("Shutdown complete.");

    Ok(())
}
