//! Ballot Node Binary

use anyhow::Context;
use ballot_core::{Address, NodeConfig, StorageBackend};
use ballot_crypto::keys::KeyPair;
use ballot_election::ElectionGenesis;
use ballot_node::NodeBuilder;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ballot-node")]
#[command(about = "Ballot Node - single-election voting ledger")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Storage {
    Memory,
    Sled,
}

impl From<Storage> for StorageBackend {
    fn from(storage: Storage) -> Self {
        match storage {
            Storage::Memory => StorageBackend::Memory,
            Storage::Sled => StorageBackend::Sled,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Genesis file path
        #[arg(short, long)]
        genesis: Option<PathBuf>,

        /// API listen address
        #[arg(long)]
        api_addr: Option<String>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Storage backend
        #[arg(long, value_enum)]
        storage: Option<Storage>,
    },

    /// Generate a new keypair
    Keygen {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate genesis configuration
    Genesis {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Election title
        #[arg(long, default_value = "Ballot Devnet")]
        title: String,

        /// Owner address (hex). Left empty, the node key becomes the owner.
        #[arg(long)]
        owner: Option<String>,

        /// Candidate name, repeatable
        #[arg(long = "candidate")]
        candidates: Vec<String>,

        /// Voter registration as VOTER_ID=ADDRESS, repeatable
        #[arg(long = "voter")]
        voters: Vec<String>,
    },
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            genesis,
            api_addr,
            data_dir,
            storage,
        } => {
            let mut config = match config {
                Some(path) => NodeConfig::load(&path)?,
                None => NodeConfig::default(),
            };
            if let Some(addr) = api_addr {
                config.api.listen_addr = addr;
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(storage) = storage {
                config.storage.backend = storage.into();
            }

            init_logging(&config.log_level);
            info!("Starting Ballot Node...");

            let keypair = load_or_create_keypair(&config.data_dir)?;

            let genesis = match genesis {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading genesis {}", path.display()))?;
                    let genesis = ElectionGenesis::from_json(&content)?;
                    if genesis.owner.is_empty() {
                        genesis.with_owner(keypair.address())
                    } else {
                        genesis
                    }
                }
                None => ElectionGenesis::devnet(keypair.address()),
            };

            let node = NodeBuilder::new()
                .config(config)
                .keypair(keypair)
                .genesis(genesis)
                .build()
                .await?;

            node.start().await?;
        }

        Commands::Keygen { output } => {
            let keypair = KeyPair::generate();
            let json = serde_json::to_string_pretty(&key_json(&keypair))?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &json)?;
                    println!("Keypair saved to: {}", path.display());
                }
                None => {
                    println!("{}", json);
                }
            }
        }

        Commands::Genesis {
            output,
            title,
            owner,
            candidates,
            voters,
        } => {
            let mut genesis = ElectionGenesis {
                title,
                owner: owner.unwrap_or_default(),
                ..Default::default()
            };

            for name in &candidates {
                genesis = genesis.add_candidate(name, "");
            }

            for entry in &voters {
                let (voter_id, address) = entry
                    .rsplit_once('=')
                    .with_context(|| format!("voter must be VOTER_ID=ADDRESS, got {}", entry))?;
                let address = Address::from_hex(address)
                    .with_context(|| format!("invalid address for voter {}", voter_id))?;
                genesis = genesis.add_voter(voter_id, address);
            }

            if !genesis.owner.is_empty() {
                genesis.owner_address()?;
            }

            std::fs::write(&output, genesis.to_json()?)?;

            println!("Genesis configuration saved to: {}", output.display());
        }
    }

    Ok(())
}

fn key_json(keypair: &KeyPair) -> serde_json::Value {
    serde_json::json!({
        "public_key": keypair.public_key().to_hex(),
        "address": keypair.address().to_hex(),
        "secret_key": hex::encode(keypair.secret_bytes().as_slice()),
    })
}

fn load_or_create_keypair(data_dir: &Path) -> anyhow::Result<KeyPair> {
    let key_path = data_dir.join("node_key.json");

    if key_path.exists() {
        let content = std::fs::read_to_string(&key_path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;

        if let Some(secret_hex) = value.get("secret_key").and_then(|v| v.as_str()) {
            let keypair = KeyPair::from_secret_hex(secret_hex)?;
            info!("Loaded keypair from {}", key_path.display());
            return Ok(keypair);
        }
    }

    std::fs::create_dir_all(data_dir)?;

    let keypair = KeyPair::generate();
    std::fs::write(&key_path, serde_json::to_string_pretty(&key_json(&keypair))?)?;
    info!("Generated new keypair, saved to {}", key_path.display());

    Ok(keypair)
}
