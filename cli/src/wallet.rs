//! Wallet management

use ballot_core::{Address, BallotError, BallotResult, ElectionId, Timestamp};
use ballot_crypto::keys::KeyPair;
use ballot_election::{BallotCall, SignedCall};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Wallet file format
#[derive(Serialize, Deserialize)]
pub struct WalletFile {
    pub version: u32,
    pub name: String,
    pub address: String,
    pub public_key: String,
    pub secret_key: String,
    pub created_at: u64,
}

/// Local wallet
pub struct Wallet {
    name: String,
    keypair: KeyPair,
}

impl Wallet {
    /// Create a new wallet
    pub fn new(name: &str) -> Self {
        Self::from_keypair(name, KeyPair::generate())
    }

    /// Create wallet from keypair
    pub fn from_keypair(name: &str, keypair: KeyPair) -> Self {
        Self {
            name: name.to_string(),
            keypair,
        }
    }

    /// Load wallet from file
    pub fn load(path: &Path) -> BallotResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let wallet_file: WalletFile = serde_json::from_str(&content)
            .map_err(|e| BallotError::DeserializationError(e.to_string()))?;

        let keypair = KeyPair::from_secret_hex(&wallet_file.secret_key)?;

        // The stored address is informational; refuse files where it was edited
        if keypair.address().to_hex() != wallet_file.address {
            return Err(BallotError::InvalidAddress(format!(
                "wallet {} does not match its secret key",
                path.display()
            )));
        }

        Ok(Self {
            name: wallet_file.name,
            keypair,
        })
    }

    /// Save wallet to file
    pub fn save(&self, path: &Path) -> BallotResult<()> {
        let wallet_file = WalletFile {
            version: 1,
            name: self.name.clone(),
            address: self.address().to_hex(),
            public_key: self.keypair.public_key().to_hex(),
            secret_key: self.secret_hex(),
            created_at: Timestamp::now().0,
        };

        let content = serde_json::to_string_pretty(&wallet_file)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes().as_slice())
    }

    /// Sign a call for `election_id`
    pub fn sign_call(&self, call: BallotCall, election_id: ElectionId) -> SignedCall {
        SignedCall::new(call, election_id, &self.keypair)
    }
}

/// Wallet manager for multiple wallets
pub struct WalletManager {
    wallets_dir: PathBuf,
}

impl WalletManager {
    pub fn new(wallets_dir: PathBuf) -> Self {
        Self { wallets_dir }
    }

    /// Default location under the user's home directory
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".ballot").join("wallets"))
            .unwrap_or_else(|| PathBuf::from("./wallets"))
    }

    fn wallet_path(&self, name: &str) -> PathBuf {
        self.wallets_dir.join(format!("{}.json", name))
    }

    /// Create wallets directory if it doesn't exist
    pub fn init(&self) -> BallotResult<()> {
        std::fs::create_dir_all(&self.wallets_dir)?;
        Ok(())
    }

    /// List all wallets, sorted by name
    pub fn list(&self) -> BallotResult<Vec<WalletInfo>> {
        self.init()?;

        let mut wallets = Vec::new();

        for entry in std::fs::read_dir(&self.wallets_dir)? {
            let path = entry?.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(wallet) = Wallet::load(&path) {
                    wallets.push(WalletInfo {
                        name: wallet.name().to_string(),
                        address: wallet.address().to_hex(),
                        path,
                    });
                }
            }
        }

        wallets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(wallets)
    }

    /// Create a new wallet
    pub fn create(&self, name: &str) -> BallotResult<Wallet> {
        self.store(Wallet::new(name))
    }

    /// Get wallet by name
    pub fn get(&self, name: &str) -> BallotResult<Wallet> {
        let path = self.wallet_path(name);

        if !path.exists() {
            return Err(BallotError::ConfigError(format!(
                "Wallet '{}' not found",
                name
            )));
        }

        Wallet::load(&path)
    }

    /// Import wallet from secret key
    pub fn import(&self, name: &str, secret_hex: &str) -> BallotResult<Wallet> {
        let keypair = KeyPair::from_secret_hex(secret_hex)?;
        self.store(Wallet::from_keypair(name, keypair))
    }

    fn store(&self, wallet: Wallet) -> BallotResult<Wallet> {
        self.init()?;

        let path = self.wallet_path(wallet.name());
        if path.exists() {
            return Err(BallotError::ConfigError(format!(
                "Wallet '{}' already exists",
                wallet.name()
            )));
        }

        wallet.save(&path)?;
        Ok(wallet)
    }
}

/// Wallet info for listing
#[derive(Debug)]
pub struct WalletInfo {
    pub name: String,
    pub address: String,
    pub path: PathBuf,
}
