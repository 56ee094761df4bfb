//! Ballot CLI - Command Line Interface

use ballot_cli::{share, ApiClient, WalletManager};
use ballot_core::{Address, VoterId};
use ballot_election::BallotCall;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ballot")]
#[command(about = "Ballot - election ledger CLI")]
#[command(version)]
struct Cli {
    /// Node URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    node: String,

    /// Wallets directory (defaults to ~/.ballot/wallets)
    #[arg(short, long)]
    wallets_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Show election parameters
    Election,

    /// Register or rebind a voter (owner only)
    RegisterVoter {
        /// Owner wallet name
        #[arg(short, long)]
        wallet: String,

        /// Voter id, e.g. a student number
        voter_id: String,

        /// Address allowed to vote for this id
        address: String,
    },

    /// Add a candidate (owner only)
    RegisterProposal {
        /// Owner wallet name
        #[arg(short, long)]
        wallet: String,

        /// Candidate name
        name: String,

        /// Image reference
        #[arg(long, default_value = "")]
        image: String,
    },

    /// Cast a vote
    Vote {
        /// Voter wallet name
        #[arg(short, long)]
        wallet: String,

        /// Voter id registered to the wallet's address
        voter_id: String,

        /// Candidate index
        candidate: usize,
    },

    /// Look up a voter record
    Voter {
        voter_id: String,
    },

    /// Show the current tally
    Results,

    /// Show the current leader
    Winner,

    /// Node status
    Status,
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a new wallet
    Create {
        /// Wallet name
        name: String,
    },

    /// List all wallets
    List,

    /// Show wallet info
    Info {
        /// Wallet name
        name: String,
    },

    /// Import wallet from secret key
    Import {
        /// Wallet name
        name: String,

        /// Secret key (hex)
        secret: String,
    },

    /// Export wallet secret key
    Export {
        /// Wallet name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let wallets_dir = cli.wallets_dir.unwrap_or_else(WalletManager::default_dir);
    let wallet_manager = WalletManager::new(wallets_dir);
    let api_client = ApiClient::new(&cli.node)?;

    match cli.command {
        Commands::Wallet { action } => {
            handle_wallet_command(action, &wallet_manager)?;
        }

        Commands::Election => {
            let info = api_client.election().await?;
            println!("{}", info.title.bold());
            println!("Owner:       {}", info.owner);
            println!("Election ID: {}", info.election_id);
            println!("Candidates:  {}", info.candidate_count);
            println!("Voters:      {}", info.voter_count);
            println!("Votes cast:  {}", info.total_votes);
        }

        Commands::RegisterVoter {
            wallet,
            voter_id,
            address,
        } => {
            let wallet = wallet_manager.get(&wallet)?;
            let address = Address::from_hex(&address)
                .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;
            let election_id = api_client.election_id().await?;

            let call = wallet.sign_call(
                BallotCall::RegisterVoter {
                    address,
                    voter_id: VoterId::new(voter_id.clone()),
                },
                election_id,
            );
            let receipt = api_client.submit_call(&call).await?;

            println!("{} Voter {} bound to {}", "✓".green(), voter_id, address.to_hex());
            println!("Call ID: {}", receipt.call_id);
        }

        Commands::RegisterProposal {
            wallet,
            name,
            image,
        } => {
            let wallet = wallet_manager.get(&wallet)?;
            let election_id = api_client.election_id().await?;

            let call = wallet.sign_call(
                BallotCall::RegisterProposal {
                    name: name.clone(),
                    image,
                },
                election_id,
            );
            let receipt = api_client.submit_call(&call).await?;

            let index = receipt
                .transition
                .get("index")
                .and_then(|v| v.as_u64())
                .map(|i| i.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("{} Candidate {} registered as #{}", "✓".green(), name, index);
            println!("Call ID: {}", receipt.call_id);
        }

        Commands::Vote {
            wallet,
            voter_id,
            candidate,
        } => {
            let wallet = wallet_manager.get(&wallet)?;
            let election_id = api_client.election_id().await?;

            let call = wallet.sign_call(
                BallotCall::Vote {
                    voter_id: VoterId::new(voter_id.clone()),
                    candidate_index: candidate,
                },
                election_id,
            );
            let receipt = api_client.submit_call(&call).await?;

            println!("{} Vote recorded for {}", "✓".green(), voter_id);
            println!("Call ID: {}", receipt.call_id);
        }

        Commands::Voter { voter_id } => {
            let voter = api_client.voter(&voter_id).await?;
            println!("Voter:      {}", voter.voter_id);
            if voter.registered {
                println!("Delegate:   {}", voter.delegate);
                println!("Voted:      {}", if voter.voted { "Yes" } else { "No" });
            } else {
                println!("{}", "Not registered".yellow());
            }
        }

        Commands::Results => {
            let results = api_client.results().await?;

            if results.candidates.is_empty() {
                println!("No candidates registered.");
            } else {
                println!("{:<4} {:<24} {:>8} {:>8}", "#", "Candidate", "Votes", "Share");
                println!("{:-<4} {:-<24} {:->8} {:->8}", "", "", "", "");
                for c in &results.candidates {
                    println!(
                        "{:<4} {:<24} {:>8} {:>7.1}%",
                        c.index,
                        truncate(&c.name, 24),
                        c.vote_count,
                        share(c.vote_count, results.total_votes)
                    );
                }
            }
            println!("Total votes: {}", results.total_votes);
        }

        Commands::Winner => {
            let winner = api_client.winner().await?;
            println!(
                "{} #{} {} with {} votes",
                "Leading:".bold(),
                winner.index,
                winner.name.green(),
                winner.vote_count
            );
        }

        Commands::Status => {
            let status = api_client.status().await?;
            println!("{}", "Ballot Node Status".bold());
            println!("==================");
            println!("Node:          {}", status.node_name);
            println!("Node Address:  {}", truncate(&status.node_address, 16));
            println!("Election ID:   {}", truncate(&status.election_id, 16));
            println!("State Version: {}", status.state_version);
            println!("State Root:    {}", truncate(&status.state_root, 16));
        }
    }

    Ok(())
}

fn handle_wallet_command(action: WalletAction, manager: &WalletManager) -> anyhow::Result<()> {
    match action {
        WalletAction::Create { name } => {
            let wallet = manager.create(&name)?;
            println!("{} Wallet '{}' created!", "✓".green(), name);
            println!("Address: {}", wallet.address().to_hex());
        }

        WalletAction::List => {
            let wallets = manager.list()?;

            if wallets.is_empty() {
                println!("No wallets found.");
            } else {
                println!("Wallets:");
                println!("{:<20} Address", "Name");
                println!("{:-<20} {:-<66}", "", "");
                for w in wallets {
                    println!("{:<20} {}", w.name, w.address);
                }
            }
        }

        WalletAction::Info { name } => {
            let wallet = manager.get(&name)?;
            println!("Wallet: {}", wallet.name());
            println!("Address: {}", wallet.address().to_hex());
            println!("Public Key: {}", wallet.keypair().public_key().to_hex());
        }

        WalletAction::Import { name, secret } => {
            let wallet = manager.import(&name, &secret)?;
            println!("{} Wallet '{}' imported!", "✓".green(), name);
            println!("Address: {}", wallet.address().to_hex());
        }

        WalletAction::Export { name, yes } => {
            let wallet = manager.get(&name)?;

            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("Print the secret key of '{}'?", name))
                    .default(false)
                    .interact()?;

            if confirmed {
                println!("{}", "Keep this secret key safe!".yellow());
                println!("Secret Key: {}", wallet.secret_hex());
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len).collect();
        format!("{}...", head)
    }
}
