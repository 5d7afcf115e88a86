//! Agent Wallet CLI
//!
//! Operator front end for delegated-signer wallets: create identities, attach
//! delegation credentials, move tokens and buy products. Results are printed
//! as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use custody_core::config::{Config, RemoteConfig};
use custody_core::types::{OrderRequest, PhysicalAddress, Recipient, TransferRequest, WalletIdentity};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wallet_engine::AgentWallet;

const DEFAULT_LOG_FILTER: &str = "agent_wallet=info,wallet_engine=info,custody_core=info,keystore=info";

#[derive(Parser)]
#[command(name = "agent-wallet")]
#[command(version)]
#[command(about = "Delegated-signer custody wallets for autonomous agents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML/JSON); environment variables are used otherwise
    #[arg(long, global = true, env = "AGENT_WALLET_CONFIG")]
    config: Option<PathBuf>,

    /// Talk to the production custody endpoint instead of the configured one
    #[arg(long, global = true)]
    production: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or show) the agent's signer identity
    Setup { agent: String },

    /// Attach the custody address and API key after delegation
    Configure {
        agent: String,
        custody_address: String,
        api_key: String,
    },

    /// Show token balances of the custody wallet
    Balance {
        agent: String,
        /// Token to report (repeatable); defaults to sol and usdc
        #[arg(long = "token")]
        tokens: Vec<String>,
    },

    /// Transfer tokens out of the custody wallet
    Transfer {
        agent: String,
        to: String,
        /// Token locator, e.g. solana:usdc
        token: String,
        amount: String,
        /// Wait until the transaction is terminal
        #[arg(long)]
        wait: bool,
    },

    /// Buy a product, paying from the custody wallet
    Buy {
        agent: String,
        /// Product locator, e.g. amazon:B0XXXXXXX
        product: String,
        #[command(flatten)]
        recipient: RecipientArgs,
    },

    /// Show a transaction's status
    TxStatus {
        agent: String,
        transaction_id: String,
        /// Poll until terminal instead of reading once
        #[arg(long)]
        wait: bool,
    },

    /// Show an order's status
    OrderStatus { agent: String, order_id: String },

    /// Finish a purchase whose payment approval was already submitted
    Resume {
        agent: String,
        order_id: String,
        transaction_id: String,
    },

    /// Delete the agent's identity from the wallet file
    Remove { agent: String },
}

#[derive(Args)]
struct RecipientArgs {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    line1: Option<String>,
    #[arg(long)]
    line2: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    postal_code: Option<String>,
    #[arg(long)]
    country: Option<String>,
}

impl RecipientArgs {
    /// A physical address is built only when any address field is given;
    /// missing required fields are reported by order validation.
    fn into_recipient(self) -> Recipient {
        let has_address = [
            &self.name,
            &self.line1,
            &self.city,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .any(|field| field.is_some());

        let physical_address = has_address.then(|| PhysicalAddress {
            name: self.name.unwrap_or_default(),
            line1: self.line1.unwrap_or_default(),
            line2: self.line2,
            city: self.city.unwrap_or_default(),
            state: self.state,
            postal_code: self.postal_code.unwrap_or_default(),
            country: self.country.unwrap_or_default(),
        });

        Recipient {
            email: self.email,
            physical_address,
        }
    }
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => subscriber
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Identity view safe to print: never includes the API key.
fn identity_view(identity: &WalletIdentity) -> serde_json::Value {
    json!({
        "agentId": identity.agent_id,
        "address": identity.public_address,
        "custodyAddress": identity.credential.as_ref().map(|c| c.custody_address.as_str()),
        "configured": identity.is_usable(),
        "createdAt": identity.created_at,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::from_env().context("failed to load configuration from environment")?,
    };
    if cli.production {
        config.remote.base_url = RemoteConfig::PRODUCTION_BASE_URL.to_string();
    }
    info!(endpoint = %config.remote.base_url, store = ?config.store, "Agent wallet starting");

    let wallet = AgentWallet::from_config(&config)?;
    run(&wallet, cli.command).await
}

async fn run(wallet: &AgentWallet, command: Commands) -> Result<()> {
    match command {
        Commands::Setup { agent } => {
            let identity = wallet.setup(&agent).await?;
            print_json(&identity_view(&identity))
        }
        Commands::Configure {
            agent,
            custody_address,
            api_key,
        } => {
            let identity = wallet.configure(&agent, &custody_address, &api_key).await?;
            print_json(&identity_view(&identity))
        }
        Commands::Balance { agent, tokens } => print_json(&wallet.balance(&agent, &tokens).await?),
        Commands::Transfer {
            agent,
            to,
            token,
            amount,
            wait,
        } => {
            let request = TransferRequest::new(to, token, amount);
            let submitted = wallet.transfer(&agent, &request).await?;
            if wait && !submitted.status.is_terminal() {
                print_json(&wallet.wait_for_transaction(&agent, &submitted.id).await?)
            } else {
                print_json(&submitted)
            }
        }
        Commands::Buy {
            agent,
            product,
            recipient,
        } => {
            let request = OrderRequest::single(product, recipient.into_recipient());
            print_json(&wallet.purchase(&agent, &request).await?)
        }
        Commands::TxStatus {
            agent,
            transaction_id,
            wait,
        } => {
            let tx = if wait {
                wallet.wait_for_transaction(&agent, &transaction_id).await?
            } else {
                wallet.transaction_status(&agent, &transaction_id).await?
            };
            print_json(&tx)
        }
        Commands::OrderStatus { agent, order_id } => {
            print_json(&wallet.order_status(&agent, &order_id).await?)
        }
        Commands::Resume {
            agent,
            order_id,
            transaction_id,
        } => print_json(
            &wallet
                .resume_purchase(&agent, &order_id, &transaction_id)
                .await?,
        ),
        Commands::Remove { agent } => {
            let removed = wallet.remove(&agent).await?;
            print_json(&json!({ "agentId": agent, "removed": removed }))
        }
    }
}
