//! BlinkDB server binary.

use blinkdb_cache::BlinkDb;
use blinkdb_server::{Config, Reactor, logging, signal};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "blinkdb-server")]
#[command(about = "Tiered in-memory key-value store speaking RESP-2", version)]
struct Args {
    /// Path to configuration file
    config: Option<PathBuf>,

    /// Listen port (overrides the configuration file; default 9001)
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for the disk tier (overrides the configuration file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return;
    }

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.listener.address.set_port(port);
    }
    if let Some(dir) = &args.data_dir {
        config.cache.data_dir = dir.clone();
    }

    logging::init(&config.logging);

    if let Err(e) = run(config) {
        eprintln!("server error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.listener.address,
        hot_capacity = config.cache.hot_capacity,
        warm_capacity = config.cache.warm_capacity,
        data_dir = %config.cache.data_dir.display(),
        "starting blinkdb-server"
    );

    let shutdown = signal::install_signal_handler();

    let db = BlinkDb::builder()
        .hot_capacity(config.cache.hot_capacity)
        .warm_capacity(config.cache.warm_capacity)
        .data_dir(&config.cache.data_dir)
        .build()?;

    let mut reactor = Reactor::bind(&config, db, shutdown)?;
    reactor.run()?;
    Ok(())
}

fn print_default_config() {
    let config = r#"# BlinkDB Server Configuration

[listener]
# Address to listen on
address = "0.0.0.0:9001"

[cache]
# Hot (L1) level capacity in entries
hot_capacity = 10000

# Warm (L2) level capacity in entries; warm evictees spill to disk
warm_capacity = 50000

# Directory for spilled values and the index file
data_dir = "./blinkdb_data"

# Maximum value size (e.g., "16MB"); larger bulk strings are rejected
max_value_size = "16MB"

[server]
# Maximum concurrent client connections
max_connections = 10000

[logging]
# Level filter (RUST_LOG takes precedence when set)
level = "info"

# Output format: "pretty", "json", or "compact"
format = "pretty"

# Include timestamps in log lines
timestamps = true
"#;
    print!("{}", config);
}
