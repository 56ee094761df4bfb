//! Full node implementation

use crate::api::start_api_server;
use crate::runtime::NodeRuntime;
use ballot_core::{NodeConfig, StorageBackend};
use ballot_crypto::keys::KeyPair;
use ballot_election::ElectionGenesis;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Full Ballot node
pub struct BallotNode {
    runtime: Arc<NodeRuntime>,
}

impl BallotNode {
    /// Open storage and initialize the election from genesis
    pub async fn new(
        config: NodeConfig,
        keypair: KeyPair,
        genesis: ElectionGenesis,
    ) -> anyhow::Result<Self> {
        let runtime = Arc::new(NodeRuntime::initialize(config, keypair, genesis).await?);
        Ok(Self { runtime })
    }

    /// Serve the API until ctrl-c
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting Ballot node...");

        let api = &self.runtime.config().api;
        let api_handle = if api.enabled {
            let api_runtime = self.runtime.clone();
            let api_addr = api.listen_addr.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = start_api_server(api_runtime, &api_addr).await {
                    error!("API server error: {}", e);
                }
            }))
        } else {
            info!("HTTP API disabled");
            None
        };

        info!("Node started successfully");
        info!("Node address: {}", self.runtime.node_address().to_hex());
        info!("Election: {} ({})", self.runtime.title(), self.runtime.election_id().to_hex());

        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping node...");
            }
            Err(e) => {
                error!("Error waiting for shutdown signal: {}", e);
            }
        }

        if let Some(handle) = api_handle {
            handle.abort();
        }

        info!("Node stopped");

        Ok(())
    }

    /// Get runtime reference
    pub fn runtime(&self) -> &Arc<NodeRuntime> {
        &self.runtime
    }
}

/// Node builder for easier configuration
pub struct NodeBuilder {
    config: NodeConfig,
    keypair: Option<KeyPair>,
    genesis: Option<ElectionGenesis>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            keypair: None,
            genesis: None,
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn keypair(mut self, keypair: KeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    pub fn genesis(mut self, genesis: ElectionGenesis) -> Self {
        self.genesis = Some(genesis);
        self
    }

    pub fn api_addr(mut self, addr: &str) -> Self {
        self.config.api.listen_addr = addr.to_string();
        self
    }

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.data_dir = dir;
        self
    }

    pub fn storage(mut self, backend: StorageBackend) -> Self {
        self.config.storage.backend = backend;
        self
    }

    /// Build the node. Without a genesis, runs the devnet election owned by
    /// the node key.
    pub async fn build(self) -> anyhow::Result<BallotNode> {
        self.config.validate()?;

        let keypair = self.keypair.unwrap_or_else(KeyPair::generate);
        let genesis = self
            .genesis
            .unwrap_or_else(|| ElectionGenesis::devnet(keypair.address()));

        BallotNode::new(self.config, keypair, genesis).await
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
