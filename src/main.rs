//! multichain-tx - connect to the configured EVM chains and query transactions
//!
//! Usage: `multichain-tx [query <chain> <hash> [--wait]]`, where `<chain>` is a
//! configured chain name, a chain kind such as `bsc`, or a numeric type id.

use anyhow::{Context, Result};
use multichain_tx::config::{LoggingConfig, Settings};
use multichain_tx::{ChainKind, EvmClient};
use std::collections::BTreeMap;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

const USAGE: &str = "usage: multichain-tx [query <chain|kind|type-id> <hash> [--wait]]";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logging(&settings.logging);

    info!("Starting multichain-tx v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    let private_key = settings.wallet.private_key();
    if private_key.is_none() {
        info!("No wallet key configured, running read-only");
    }

    // Connect to every enabled chain
    let mut clients = BTreeMap::new();
    for (name, chain) in settings.enabled_chains() {
        let mut client = EvmClient::connect(name, chain, &settings.poller)
            .with_context(|| format!("Failed to set up chain {}", name))?;

        if let Some(key) = &private_key {
            client
                .set_private(key)
                .with_context(|| format!("Invalid wallet key for chain {}", name))?;
        }

        match client.chain_spec().await {
            Ok(spec) => info!("Chain {} ({}) has chain id {}", name, spec.kind, spec.chain_id),
            Err(e) => warn!("Chain {} is unreachable: {}", name, e),
        }

        if let Some(account) = client.account() {
            match client.balance_of(&format!("{:?}", account)).await {
                Ok(balance) => info!("Account {:?} on {} holds {} wei", account, name, balance),
                Err(e) => warn!("Balance check on {} failed: {}", name, e),
            }
        }

        clients.insert(name.clone(), client);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("query") => run_query(&clients, &args[1..]).await,
        Some(other) => anyhow::bail!("Unknown command {}; {}", other, USAGE),
        None => Ok(()),
    }
}

async fn run_query(clients: &BTreeMap<String, EvmClient>, args: &[String]) -> Result<()> {
    let (chain, hash) = match args {
        [chain, hash, ..] => (chain, hash),
        _ => anyhow::bail!(USAGE),
    };
    let wait = args[2..].iter().any(|arg| arg == "--wait");

    let client = match clients.get(chain) {
        Some(client) => client,
        None => {
            // fall back to a chain kind, alias or numeric type id
            let kind: ChainKind = chain
                .parse()
                .with_context(|| format!("Chain {} is not configured or not enabled", chain))?;
            clients
                .values()
                .find(|client| client.kind() == kind)
                .with_context(|| format!("No enabled chain of kind {}", kind))?
        }
    };

    let result = if wait {
        // Ctrl+C abandons the wait; the transaction itself is unaffected
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let signal_handle = tokio::spawn(async move {
            shutdown_signal().await;
            let _ = cancel_tx.send(true);
        });
        let result = client.query_tx_until(hash, cancel_rx).await;
        signal_handle.abort();
        result?
    } else {
        client.query_tx(hash, false).await?
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
