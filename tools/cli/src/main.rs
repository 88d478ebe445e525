//! Lenda CLI - synchronize a lending-marketplace account into a local store
//! and query it offline.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use lenda_client::{ApiClient, Credentials};
use lenda_common::{AppConfig, Error};
use lenda_store::models::{Transaction, Wallet};
use lenda_store::{ensure_version, SchemaRegistry, Store, SCHEMA_VERSION};
use lenda_sync::SyncEngine;

/// Environment variable consulted before prompting for the password.
const PASSWORD_ENV: &str = "LENDA_PASSWORD";

#[derive(Parser)]
#[command(name = "lenda")]
#[command(about = "Lenda - local mirror of a lending-marketplace account")]
#[command(version)]
struct Cli {
    /// Path of the configuration file.
    #[arg(short, long, default_value = "./lenda.toml")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local store and stamp the schema version.
    Init,

    /// Run a full synchronization pass against the remote API.
    Update,

    /// Show the stored wallet snapshot.
    Wallet,

    /// List stored wallet transactions.
    Transactions,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install log subscriber");
    }

    if let Err(err) = run(cli).await {
        error!("{:#}", err);
        let code = err.downcast_ref::<Error>().map(exit_code).unwrap_or(1);
        std::process::exit(code);
    }
}

/// Translate the error taxonomy into process exit codes.
fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Config(_) => 2,
        Error::NotInitialized(_) => 3,
        Error::VersionMismatch { .. } => 4,
        Error::Authentication(_) | Error::Network(_) => 5,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Update => cmd_update(&config).await,
        Commands::Wallet => cmd_wallet(&config),
        Commands::Transactions => cmd_transactions(&config),
    }
}

fn registry(config: &AppConfig) -> anyhow::Result<SchemaRegistry> {
    match &config.schema_file {
        Some(path) => Ok(SchemaRegistry::load(path)?),
        None => Ok(SchemaRegistry::builtin()),
    }
}

/// Open an existing store, pointing the operator at `init` when missing,
/// and check the schema version before anything reads or writes.
fn open_checked(config: &AppConfig) -> anyhow::Result<Store> {
    let store = match Store::open_existing(&config.db_file, registry(config)?) {
        Err(Error::NotInitialized(path)) => {
            warn!("Missing database file '{}', run 'lenda init', please.", path);
            return Err(Error::NotInitialized(path).into());
        }
        other => other?,
    };

    if let Err(err) = ensure_version(&store, SCHEMA_VERSION) {
        if let Error::VersionMismatch { ref path, .. } = err {
            error!(
                "Old version of database schema, remove file '{}' and run 'lenda init', please.",
                path
            );
        }
        return Err(err.into());
    }

    Ok(store)
}

fn cmd_init(config: &AppConfig) -> anyhow::Result<()> {
    let store = Store::open(&config.db_file, registry(config)?)?;
    ensure_version(&store, SCHEMA_VERSION)?;

    println!("Store initialized at {}", store.path());
    Ok(())
}

fn prompt_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password("Enter password: ").context("Failed to read password")
}

async fn cmd_update(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_checked(config)?;

    let credentials = Credentials {
        username: config.username.clone(),
        password: prompt_password()?,
    };

    info!("authenticating against {}", config.host);
    let client = ApiClient::connect(&config.host, &credentials).await?;

    let report = SyncEngine::new(&store, client).run_full_sync().await?;

    println!("Synchronized in {:?}:", report.duration);
    println!("  transactions:     {}", report.transactions);
    println!("  loans backfilled: {}", report.loans_backfilled);
    println!("  loan investments: {}", report.loan_investments);
    println!("  user investments: {}", report.user_investments);
    println!("  notifications:    {} ({} relations resolved)",
        report.notifications, report.relations_resolved);
    Ok(())
}

fn cmd_wallet(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_checked(config)?;

    let wallets = Wallet::list(&store, None)?;
    match wallets.first() {
        Some(wallet) => {
            println!("Wallet:");
            println!("  available: {:>12.2}", wallet.available_balance.unwrap_or(0.0));
            println!("  blocked:   {:>12.2}", wallet.blocked_balance.unwrap_or(0.0));
            println!("  credit:    {:>12.2}", wallet.credit_sum.unwrap_or(0.0));
        }
        None => println!("No wallet stored yet, run 'lenda update'."),
    }

    match store.last_sync_timestamp()? {
        Some(stamp) => println!("Last synchronized: {}", stamp),
        None => println!("Never synchronized."),
    }
    Ok(())
}

fn cmd_transactions(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_checked(config)?;

    let transactions = Transaction::list(&store, None)?;
    if transactions.is_empty() {
        println!("No transactions stored yet, run 'lenda update'.");
        return Ok(());
    }

    for t in &transactions {
        println!(
            "{:>8}  {:<24}  {:>10.2}  {:<16}  {}",
            t.id.unwrap_or_default(),
            t.transaction_date.as_deref().unwrap_or("-"),
            t.amount.unwrap_or(0.0),
            t.category.as_deref().unwrap_or("-"),
            t.loan_name.as_deref().unwrap_or(""),
        );
    }
    println!("{} transactions", transactions.len());
    Ok(())
}
