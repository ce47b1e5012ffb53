//! Bridge relayer entrypoint.
//!
//! Watches a Cosmos-SDK source chain for signed cross-chain transfer
//! confirmations and submits the corresponding withdrawal on the
//! destination chain (EVM family, Solana, NEAR, or the source chain
//! itself). Delivery is at-least-once on top of a durable queue; the
//! destination contracts are idempotent on the transfer origin.
//!
//! Subcommands:
//! - `run all` – admin API, catch-up scheduler, consumer pool, queue cleaner
//! - `run api` – admin API only
//! - `run relayer` – consumer pool and queue cleaner
//! - `run generate-key` – print a signed admin JWT
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` selects the configuration file
//! - `RUST_LOG` controls log filtering

mod api;
mod bouncer;
mod bridger;
mod config;
mod core;
mod cursor;
mod horizon;
mod proto;
mod queue;
mod relay_task;
mod secrets;
mod services;
mod telemetry;
mod util;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio_util::task::TaskTracker;

use crate::api::ApiState;
use crate::bouncer::Bouncer;
use crate::bridger::{BridgerProvider, BridgerResolver};
use crate::config::Config;
use crate::core::{Core, GrpcSourceChain, SourceChain};
use crate::cursor::{CursorStore, RedisCursor};
use crate::horizon::Horizon;
use crate::queue::{RELAY_QUEUE_NAME, RelayQueue};
use crate::secrets::Secrets;
use crate::services::{QueueCleaner, Relayer, Scheduler};
use crate::telemetry::Telemetry;
use crate::util::shutdown_token;

#[derive(Parser, Debug)]
#[command(name = "relayer-rs")]
#[command(about = "Bridge relayer service")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run service workers
    Run {
        #[command(subcommand)]
        target: RunTarget,
    },
}

#[derive(Subcommand, Debug)]
enum RunTarget {
    /// All workers: API, scheduler, relayer and queue cleaner
    All,
    /// HTTP API only
    Api,
    /// Consumer pool and queue cleaner
    Relayer,
    /// Print a signed admin JWT
    GenerateKey,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load(&cli.config)?;
    let Command::Run { target } = cli.command;

    if let RunTarget::GenerateKey = target {
        let token = bouncer::generate_jwt(&config.bouncer)?;
        println!("{token}");
        return Ok(());
    }

    let secrets = Arc::new(Secrets::load(&config.secrets).await?);
    let config = Arc::new(config);

    let redis_client = redis::Client::open(config.redis.url.value().as_str())?;
    let redis = redis_client.get_connection_manager().await?;

    let client: Arc<dyn SourceChain> =
        Arc::new(GrpcSourceChain::connect_lazy(config.cosmos.grpc.value())?);
    let core = Core::new(client.clone());
    let queue = RelayQueue::new(redis.clone(), RELAY_QUEUE_NAME);
    let cursor: Arc<dyn CursorStore> = Arc::new(RedisCursor::new(redis));
    let horizon = config
        .horizon
        .as_ref()
        .map(|horizon| Arc::new(Horizon::new(horizon.url.value().clone())));
    let bridgers: Arc<dyn BridgerResolver> = Arc::new(BridgerProvider::new(
        config.clone(),
        secrets.clone(),
        client.clone(),
        horizon,
    ));

    let cancellation = shutdown_token()?;
    let tracker = TaskTracker::new();

    if matches!(target, RunTarget::All | RunTarget::Api) {
        let state = Arc::new(ApiState {
            core: core.clone(),
            queue: Arc::new(queue.clone()),
            bouncer: Bouncer::new(&config.bouncer),
        });
        let router = api::routes(state);
        let addr = SocketAddr::new(config.host, config.port);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("starting API at http://{addr}");
        let shutdown = cancellation.clone();
        tracker.spawn(async move {
            let graceful = async move { shutdown.cancelled().await };
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                tracing::error!(%error, "api server failed");
            }
        });
    }

    if matches!(target, RunTarget::All) {
        let scheduler = Scheduler::new(
            core.clone(),
            Arc::new(queue.clone()),
            cursor.clone(),
            config.scheduler.start_block,
        );
        tracker.spawn(scheduler.run(cancellation.clone()));
    }

    if matches!(target, RunTarget::All | RunTarget::Relayer) {
        tracing::info!("starting relayer");
        let relayer = Relayer::new(core.clone(), queue.clone(), bridgers.clone());
        let relayer_cancellation = cancellation.clone();
        tracker.spawn(async move {
            if let Err(error) = relayer.run(relayer_cancellation).await {
                tracing::error!(%error, "failed to start consuming the relay queue");
                std::process::exit(1);
            }
        });

        tracing::info!("starting queue cleaner");
        tracker.spawn(QueueCleaner::new(queue.clone()).run(cancellation.clone()));
    }

    tracker.close();
    tracker.wait().await;
    tracing::warn!("all services stopped");
    Ok(())
}
