//! etcd-bridge CLI
//!
//! Command-line interface for both API generations.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use etcd_bridge::{v2, v3, Result};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

/// etcd-bridge CLI
#[derive(Parser, Debug)]
#[command(name = "etcd-bridge-cli")]
#[command(about = "Key and directory operations against an etcd-compatible store")]
#[command(version)]
struct Args {
    /// API generation to use
    #[arg(long, value_enum, default_value = "v2")]
    api: Api,

    /// Comma-separated endpoint list
    #[arg(
        short,
        long,
        env = "ETCD_BRIDGE_ENDPOINTS",
        value_delimiter = ',',
        default_value = "http://127.0.0.1:2379"
    )]
    endpoints: Vec<String>,

    /// Username for authentication
    #[arg(short, long, env = "ETCD_BRIDGE_USERNAME")]
    username: Option<String>,

    /// Password for authentication
    #[arg(short, long, env = "ETCD_BRIDGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request timeout in milliseconds (0 = none)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Api {
    V2,
    V3,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a key that must not exist yet
    Mk { key: String, value: String },

    /// Create an ordered child of a directory
    Mkinorder {
        dir: String,
        value: String,

        /// Time to live in seconds
        #[arg(long, default_value = "0")]
        ttl: u64,
    },

    /// Set a key, creating it if absent
    Set {
        key: String,
        value: String,

        /// Time to live in seconds
        #[arg(long, default_value = "0")]
        ttl: u64,
    },

    /// Set a directory, creating it if absent (v2 only)
    Setdir {
        key: String,

        /// Time to live in seconds
        #[arg(long, default_value = "0")]
        ttl: u64,
    },

    /// Print a key as JSON
    Get { key: String },

    /// Overwrite a key that must exist
    Update { key: String, value: String },

    /// Delete a key
    Rm { key: String },

    /// Delete a directory
    Rmdir {
        key: String,

        /// Also delete everything inside
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,etcd_bridge=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("etcd-bridge CLI v{}", etcd_bridge::VERSION);

    let outcome = match args.api {
        Api::V2 => run_v2(&args),
        Api::V3 => run_v3(&args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_v2(args: &Args) -> Result<()> {
    let mut builder = v2::Config::builder()
        .endpoints(args.endpoints.iter().cloned())
        .header_timeout_per_request(Duration::from_millis(args.timeout_ms));
    if let Some(user) = &args.username {
        builder = builder.credentials(user.clone(), args.password.clone().unwrap_or_default());
    }
    let client = v2::Client::new(builder.build())?;

    match &args.command {
        Commands::Mk { key, value } => client.create(key, value),
        Commands::Mkinorder { dir, value, ttl } => client.create_in_order(dir, value, Duration::from_secs(*ttl)),
        Commands::Set { key, value, ttl } => client.set(key, value, Duration::from_secs(*ttl)),
        Commands::Setdir { key, ttl } => client.set_dir(key, Duration::from_secs(*ttl)),
        Commands::Get { key } => print_json(&client.get(key)?),
        Commands::Update { key, value } => client.update(key, value),
        Commands::Rm { key } => client.delete(key),
        Commands::Rmdir { key, force } => client.delete_dir(key, *force),
    }
}

fn run_v3(args: &Args) -> Result<()> {
    let mut builder = v3::Config::builder()
        .endpoints(args.endpoints.iter().cloned())
        .header_timeout_per_request(Duration::from_millis(args.timeout_ms));
    if let Some(user) = &args.username {
        builder = builder.credentials(user.clone(), args.password.clone().unwrap_or_default());
    }
    let config = builder.build();

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    runtime.block_on(run_v3_command(config, &args.command))
}

async fn run_v3_command(config: v3::Config, command: &Commands) -> Result<()> {
    let client = v3::Client::new(config).await?;

    match command {
        Commands::Mk { key, value } => client.create(key, value).await,
        Commands::Mkinorder { dir, value, ttl } => client.create_in_order(dir, value, Duration::from_secs(*ttl)).await,
        Commands::Set { key, value, ttl } => client.set(key, value, Duration::from_secs(*ttl)).await,
        Commands::Setdir { key, ttl } => client.set_dir(key, Duration::from_secs(*ttl)).await,
        Commands::Get { key } => print_json(&client.get(key).await?),
        Commands::Update { key, value } => client.update(key, value).await,
        Commands::Rm { key } => client.delete(key).await,
        Commands::Rmdir { key, force } => client.delete_dir(key, *force).await,
    }
}
