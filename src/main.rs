//! Moon extractions service

use std::future::IntoFuture;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use moon_extractions::{
    api::{create_router, AppState},
    config::AppConfig,
    database::Database,
    dispatch::{DispatchStatus, Dispatcher, MemoryRecencyCache, RateLimitedSource},
    errors::MoonExtractionsError,
    host::Unpriced,
    seat::SeatHost,
    store::ExtractionStore,
    sync::{Collaborators, SyncJob},
};

#[derive(Debug, Parser)]
#[command(name = "moon-extractions", about = "Moon extraction timers for SeAT")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the read API
    Serve,
    /// Sync moon extraction data from the game API
    Sync {
        /// Sync a specific corporation
        #[arg(long)]
        corporation_id: Option<i64>,
        /// Sync even if recently synced
        #[arg(long)]
        force: bool,
    },
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), MoonExtractionsError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    config.validate()?;

    let database = Database::connect(&config.database).await?;

    match cli.command {
        Command::Migrate => database.migrate().await,
        Command::Sync {
            corporation_id,
            force,
        } => {
            let dispatcher = build_dispatcher(&config, &database);
            run_sync(&dispatcher, corporation_id, force).await
        }
        Command::Serve => {
            database.migrate().await?;
            let dispatcher = build_dispatcher(&config, &database);
            serve(&config, database, dispatcher).await
        }
    }
}

fn build_dispatcher(config: &AppConfig, database: &Database) -> Dispatcher {
    let host = Arc::new(SeatHost::new(database.pool().clone()));
    let source = Arc::new(RateLimitedSource::new(
        host.clone(),
        config.sync.api_rate_limit,
    ));

    let collaborators = Collaborators {
        corporations: host.clone(),
        source,
        structures: host.clone(),
        universe: host.clone(),
        moons: host.clone(),
        valuation: Arc::new(Unpriced),
    };
    let store: Arc<dyn ExtractionStore> = Arc::new(database.clone());
    let job = SyncJob::new(store, collaborators);

    Dispatcher::new(
        job,
        host,
        Arc::new(MemoryRecencyCache::new()),
        config.sync.clone(),
    )
}

async fn run_sync(
    dispatcher: &Dispatcher,
    corporation_id: Option<i64>,
    force: bool,
) -> Result<(), MoonExtractionsError> {
    info!("Starting moon extractions sync");

    for result in dispatcher.dispatch(corporation_id, force).await? {
        match result.status {
            DispatchStatus::Synced(report) => info!(
                corporation_id = result.corporation_id,
                outcome = ?report.outcome,
                upserted = report.upserted,
                skipped = report.skipped,
                swept = report.swept,
                "Corporation synced"
            ),
            DispatchStatus::RecentlySynced => warn!(
                corporation_id = result.corporation_id,
                "Recently synced, use --force to override"
            ),
            DispatchStatus::NoCredential => warn!(
                corporation_id = result.corporation_id,
                "No valid token found with required scope"
            ),
            DispatchStatus::Failed { attempts, error } => warn!(
                corporation_id = result.corporation_id,
                attempts,
                error = %error,
                "Corporation sync failed"
            ),
        }
    }

    info!("Moon extractions sync completed");
    Ok(())
}

async fn serve(
    config: &AppConfig,
    database: Database,
    dispatcher: Dispatcher,
) -> Result<(), MoonExtractionsError> {
    let state = AppState::new(Arc::new(database), config.api.clone());
    let router = create_router(state);

    let listener = TcpListener::bind(config.api.bind).await?;
    info!(bind = %config.api.bind, "Serving moon extractions API");

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    });

    if config.sync.schedule {
        info!(interval = ?config.sync.interval, "Scheduled sync enabled");
        tokio::select! {
            result = server.into_future() => result?,
            _ = dispatcher.run_periodically() => {}
        }
    } else {
        server.await?;
    }

    Ok(())
}
