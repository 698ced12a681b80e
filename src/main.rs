use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use logical_cluster::control_plane::ControlPlane;
use logical_cluster::{
    Config, KubeControlPlane, MembershipManager, MemoryControlPlane, ScaleDirection,
};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/lcluster.toml";

/// Partition a node pool into logical clusters via node labels
#[derive(Parser)]
#[command(name = "lcctl", version, about)]
struct Cli {
    /// Path to configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against an in-memory control plane instead of the API server
    #[arg(long)]
    in_memory: bool,

    /// Node to register in the in-memory control plane (repeatable)
    #[arg(long = "seed-node", requires = "in_memory")]
    seed_nodes: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all nodes and their tags
    Nodes,
    /// Create a logical cluster from the given nodes
    Create {
        name: String,
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Show one logical cluster
    Get { name: String },
    /// List all logical clusters
    List,
    /// Remove the membership tag from every member of a cluster
    Delete { name: String },
    /// Re-tag the given nodes with a new cluster name
    Rename {
        new_name: String,
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Add nodes to, or remove nodes from, a cluster
    #[command(group(ArgGroup::new("direction").required(true).args(["expand", "shrink"])))]
    Scale {
        name: String,
        #[arg(long)]
        expand: bool,
        #[arg(long)]
        shrink: bool,
        #[arg(required = true)]
        nodes: Vec<String>,
    },
}

/// Load the configuration file, falling back to the default location and
/// then to built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(Config::load(DEFAULT_CONFIG_PATH)?)
        }
        None => Ok(Config::default()),
    }
}

fn init_logging(level: &str) {
    let level_filter = level.to_lowercase().parse::<LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Warning: Invalid log level '{}', using 'info'", level);
        LevelFilter::INFO
    });
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn execute<C: ControlPlane>(
    manager: &MembershipManager<C>,
    command: Commands,
) -> Result<Value> {
    let output = match command {
        Commands::Nodes => serde_json::to_value(manager.control_plane().list_all().await?)?,
        Commands::Create { name, nodes } => {
            manager.create_cluster(&name, nodes.as_slice()).await?;
            serde_json::to_value(manager.get_cluster(&name).await?)?
        }
        Commands::Get { name } => serde_json::to_value(manager.get_cluster(&name).await?)?,
        Commands::List => serde_json::to_value(manager.list_clusters().await?)?,
        Commands::Delete { name } => {
            manager.delete_cluster(&name).await?;
            serde_json::json!({ "deleted": name })
        }
        Commands::Rename { new_name, nodes } => {
            let cluster = manager.rename_cluster(&new_name, nodes.as_slice()).await?;
            serde_json::to_value(cluster)?
        }
        Commands::Scale {
            name,
            expand,
            nodes,
            ..
        } => {
            let direction = if expand {
                ScaleDirection::Expand
            } else {
                ScaleDirection::Shrink
            };
            let cluster = manager
                .scale_cluster(&name, nodes.as_slice(), direction)
                .await?;
            serde_json::to_value(cluster)?
        }
    };
    Ok(output)
}

async fn run(cli: Cli) -> Result<Value> {
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging.level);

    if cli.in_memory {
        debug!(nodes = cli.seed_nodes.len(), "using in-memory control plane");
        let manager = MembershipManager::new(MemoryControlPlane::with_nodes(cli.seed_nodes));
        return execute(&manager, cli.command).await;
    }

    let control_plane = KubeControlPlane::new(&config.control_plane)
        .context("failed to build control plane client")?;
    info!(api_server = %control_plane.base_url(), "using control plane");
    execute(&MembershipManager::new(control_plane), cli.command).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
