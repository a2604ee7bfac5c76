use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::application::{BalanceQuery, Page};
use crate::auth::{AuthGate, NonceStore, RequestSigner};
use crate::config::CashierConfig;
use crate::domain::format_cents;
use crate::http::{self, AppState};
use crate::storage::{database_url, LedgerStore};

/// Cashier - wallet ledger service
#[derive(Parser)]
#[command(name = "cashier")]
#[command(about = "Transactional wallet ledger with signed service-to-service requests")]
#[command(version)]
pub struct Cli {
    /// Config file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file path (overrides the config file)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Run the HTTP service
    Serve {
        /// Address to bind (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show a player's balance (opens the wallet on first touch)
    Balance {
        /// Player ID
        player: String,
    },

    /// List a player's transactions, most recent first
    History {
        /// Player ID
        player: String,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<u32>,

        /// Number of entries to skip
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Verify every balance against the journal
    Check,

    /// Print the signature headers a peer service would send for a body
    Sign {
        /// Registered service ID whose secret signs the request
        #[arg(long)]
        service: String,

        /// Raw request body, exactly as it will be sent
        #[arg(long, default_value = "")]
        body: String,
    },
}

impl Cli {
    /// Resolve the effective configuration: file (or defaults) plus CLI overrides.
    pub fn load_config(&self) -> Result<CashierConfig> {
        let mut config = CashierConfig::load_or_default(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.server.database = database.clone();
        }
        Ok(config)
    }

    pub async fn run(self, config: CashierConfig) -> Result<()> {
        match self.command {
            Commands::Init => {
                let store = init_store(&config).await?;
                store.close().await;
                println!("Database initialized: {}", config.server.database);
            }

            Commands::Serve { bind } => {
                run_serve(&config, bind).await?;
            }

            Commands::Balance { player } => {
                let query = BalanceQuery::new(connect_store(&config).await?);
                let balance = query.get_balance(&player).await?;
                println!(
                    "{}: {}",
                    balance.player_id,
                    format_cents(balance.balance_cents)
                );
            }

            Commands::History {
                player,
                limit,
                offset,
            } => {
                let query = BalanceQuery::new(connect_store(&config).await?);
                run_history_command(&query, &player, Page::new(limit, offset)).await?;
            }

            Commands::Check => {
                let query = BalanceQuery::new(connect_store(&config).await?);
                run_check_command(&query).await?;
            }

            Commands::Sign { service, body } => {
                let secret = config
                    .auth
                    .services
                    .get(&service)
                    .with_context(|| format!("Service '{}' is not registered in the config", service))?;
                let signed = RequestSigner::new(service.as_str(), secret.as_str()).sign(body.as_bytes());
                for (name, value) in signed.header_pairs() {
                    println!("{}: {}", name, value);
                }
            }
        }

        Ok(())
    }
}

async fn init_store(config: &CashierConfig) -> Result<LedgerStore> {
    LedgerStore::init(
        &database_url(&config.server.database, true),
        config.opening_balance()?,
    )
    .await
}

async fn connect_store(config: &CashierConfig) -> Result<LedgerStore> {
    LedgerStore::connect(
        &database_url(&config.server.database, false),
        config.opening_balance()?,
    )
    .await
    .with_context(|| {
        format!(
            "Cannot open {}. Run `cashier init` first",
            config.server.database
        )
    })
}

async fn run_serve(config: &CashierConfig, bind: Option<String>) -> Result<()> {
    if config.auth.services.is_empty() {
        warn!("no peer services configured; every signed route will reject requests");
    }

    let store = init_store(config).await?;

    let nonces = Arc::new(NonceStore::new(config.auth.nonce_retention()));
    let sweeper = nonces.spawn_sweeper(config.auth.sweep_interval());
    let gate = Arc::new(AuthGate::new(
        config.auth.services.clone(),
        config.auth.timestamp_tolerance(),
        nonces,
    ));

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let result = http::serve(listener, AppState::new(store.clone(), gate)).await;

    sweeper.abort();
    store.close().await;
    info!("cashier stopped");
    result
}

async fn run_history_command(query: &BalanceQuery, player: &str, page: Page) -> Result<()> {
    let entries = query.get_transactions(player, page).await?;

    if entries.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<7} {:>12} {:<36} REFERENCE",
        "TIMESTAMP", "DIR", "AMOUNT", "ID"
    );
    println!("{}", "-".repeat(96));

    for entry in entries {
        println!(
            "{:<20} {:<7} {:>12} {:<36} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.direction,
            format_cents(entry.amount_cents),
            entry.id,
            truncate(&entry.reference, 30)
        );
    }
    Ok(())
}

async fn run_check_command(query: &BalanceQuery) -> Result<()> {
    println!("Reconciling balances against the journal...\n");

    let report = query.reconcile().await?;

    println!("Accounts: {}", report.account_count);
    println!("Entries:  {}", report.entry_count);
    println!("Total:    {}", format_cents(report.total_balance));
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger reconciliation failed");
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
