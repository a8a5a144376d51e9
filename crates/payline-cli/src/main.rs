//! Operator CLI for the Payline core: exercises the clearing link, the
//! aggregator, and the session controller from the command line.
//!
//! The signer here is the in-memory dev signer; production deployments talk
//! to the external signer service instead.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use payline_auth::{install_handshake_hook, AuthedClient, SessionAuth, SessionClaims};
use payline_chains::ChainAggregator;
use payline_core::{Asset, Chain, UserId};
use payline_indexer::{IndexerClient, IndexerConfig};
use payline_query::{LedgerTxFilter, QueryService};
use payline_rpc::{RpcConfig, RpcTransport};
use payline_sessions::{AppSessionController, CreateSessionParams, MemorySessionStore};
use payline_signer::testing::{MemorySeedStore, TestSigner};

#[derive(Parser)]
#[command(name = "payline", about = "Payline wallet-backend CLI", version)]
struct Cli {
    /// Clearing node websocket endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:7824/ws")]
    clearing_url: String,

    /// Portfolio indexer base URL.
    #[arg(long, default_value = "https://api.zerion.io")]
    indexer_url: String,

    /// Indexer API key (Basic auth username).
    #[arg(long, default_value = "")]
    indexer_key: String,

    /// On-chain wallet address presented in the session claims.
    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    wallet_address: String,

    /// Local user id for derivation.
    #[arg(long, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Liveness check against the clearing node.
    Ping,
    /// Derive one address per supported chain.
    Addresses,
    /// Stream native balances per chain as they complete.
    Balances,
    /// Recent transactions on one chain.
    History {
        chain: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Send native or token funds.
    Send {
        chain: String,
        recipient: String,
        amount: String,
        #[arg(long)]
        token: Option<String>,
    },
    /// List app sessions from the clearing node.
    Sessions,
    /// Create an app session.
    SessionCreate {
        /// Comma-separated participant addresses.
        participants: String,
        /// Comma-separated weights, same order.
        weights: String,
        quorum: u64,
        asset: String,
        chain: String,
        /// `address=amount` opening allocations, comma-separated.
        #[arg(long, default_value = "")]
        fund: String,
    },
    /// Close an app session.
    SessionClose { id: String },
    /// List payment channels.
    Channels,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let user = UserId::new(&cli.user);

    // Clearing link + session auth.
    let transport = RpcTransport::new(RpcConfig::new(&cli.clearing_url));
    let auth = Arc::new(SessionAuth::new(SessionClaims {
        wallet_address: cli.wallet_address.clone(),
        application: "payline-cli".into(),
        expires_in_secs: 3_600,
    }));
    install_handshake_hook(&transport, Arc::clone(&auth));
    let client = AuthedClient::new(transport.clone(), auth);
    let query = QueryService::new(client.clone());

    // Aggregator over the dev signer and the indexer.
    let indexer = Arc::new(IndexerClient::new(IndexerConfig::new(
        &cli.indexer_url,
        &cli.indexer_key,
    )));
    let aggregator = ChainAggregator::new(
        Arc::new(MemorySeedStore::new()),
        Arc::new(TestSigner::new()),
        indexer,
    );

    match cli.command {
        Command::Ping => {
            transport.connect().await?;
            let pong = query.ping().await?;
            println!("{} @ {}", pong.pong, pong.timestamp);
        }
        Command::Addresses => {
            for entry in aggregator.get_addresses(&user).await? {
                match entry.address {
                    Some(address) => println!("{:<14} {address}", entry.chain.slug()),
                    None => println!("{:<14} (derivation failed)", entry.chain.slug()),
                }
            }
        }
        Command::Balances => {
            let mut stream = aggregator.stream_balances(&user).await?;
            while let Some(balance) = stream.next().await {
                println!(
                    "{:<14} {:>24} {}",
                    balance.chain.slug(),
                    balance.balance,
                    balance.symbol
                );
            }
        }
        Command::History { chain, limit } => {
            let chain = parse_chain(&chain)?;
            for tx in aggregator
                .get_transaction_history(&user, chain, Some(limit))
                .await?
            {
                println!(
                    "{} {} {} -> {} {} ({})",
                    tx.timestamp,
                    tx.status.as_str(),
                    tx.from,
                    tx.to,
                    tx.value,
                    tx.token_symbol.unwrap_or_else(|| "native".into()),
                );
            }
        }
        Command::Send { chain, recipient, amount, token } => {
            let chain = parse_chain(&chain)?;
            let outcome = aggregator
                .send_crypto(&user, chain, &recipient, &amount, token.as_deref())
                .await?;
            println!(
                "submitted {} ({} smallest units @ {} decimals)",
                outcome.tx_hash, outcome.amount_smallest, outcome.decimals
            );
        }
        Command::Sessions => {
            transport.connect().await?;
            for session in query.get_app_sessions(None, None).await? {
                println!(
                    "{} v{} {}",
                    session.app_session_id, session.version, session.status
                );
            }
        }
        Command::SessionCreate { participants, weights, quorum, asset, chain, fund } => {
            transport.connect().await?;
            let controller = AppSessionController::new(
                client.clone(),
                Arc::new(MemorySessionStore::new()),
                Arc::new(transport.clone()),
                Some(Arc::new(query.clone())),
            );
            let participants: Vec<String> =
                participants.split(',').map(str::to_string).collect();
            let weights = weights
                .split(',')
                .map(|w| w.trim().parse::<u64>().context("weight"))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let mut initial_allocations = HashMap::new();
            for pair in fund.split(',').filter(|p| !p.is_empty()) {
                let (address, amount) = pair
                    .split_once('=')
                    .context("fund entries are address=amount")?;
                initial_allocations.insert(address.to_string(), amount.to_string());
            }
            let created = controller
                .create(CreateSessionParams {
                    participants,
                    weights,
                    quorum,
                    asset: Asset::new(&asset),
                    chain: parse_chain(&chain)?,
                    initial_allocations,
                    protocol: None,
                    challenge: None,
                })
                .await?;
            println!("created {} v{}", created.id, created.version);
        }
        Command::SessionClose { id } => {
            transport.connect().await?;
            // No local row for a foreign session id; close straight through
            // the clearing node.
            client
                .call("close_app_session", serde_json::json!({ "app_session_id": id }))
                .await?;
            println!("closed {id}");
        }
        Command::Channels => {
            transport.connect().await?;
            for channel in query.get_channels().await? {
                println!(
                    "{} {} chain={} amount={}",
                    channel.channel_id, channel.status, channel.chain_id, channel.amount
                );
            }
        }
    }

    transport.close().await;
    Ok(())
}

fn parse_chain(slug: &str) -> anyhow::Result<Chain> {
    Chain::from_slug(slug).with_context(|| format!("unknown chain: {slug}"))
}
