use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use muday_core::cli::{self, Cli, Commands, DbCommands, PricingCommands};
use muday_core::{config, create_app, db, services, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Pricing(PricingCommands::Show) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_pricing_show(&pool).await
        }
        Commands::Pricing(PricingCommands::Set {
            rate,
            deposit_percent_fee,
            deposit_flat_fee,
            topup_percent_fee,
            topup_flat_fee,
            topup_min,
            topup_max,
            card_request_fee_etb,
        }) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_pricing_set(
                &pool,
                &rate,
                &deposit_percent_fee,
                &deposit_flat_fee,
                &topup_percent_fee,
                &topup_flat_fee,
                topup_min.as_ref(),
                topup_max.as_ref(),
                card_request_fee_etb.as_ref(),
            )
            .await
        }
        Commands::Verify {
            provider,
            reference,
            amount,
        } => cli::handle_verify(&config, provider, &reference, amount.as_ref()).await,
        Commands::Reconcile { limit } => cli::handle_reconcile(&config, limit).await,
        Commands::Config => cli::handle_config_validate(&config),
    }
}

async fn serve(config: config::Config) -> anyhow::Result<()> {
    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let server_port = config.server_port;
    let reconcile_interval = config.reconcile_interval_secs;
    let reconcile_limit = config.reconcile_limit;

    let state = AppState::build(pool, config);

    if let Some(interval_secs) = reconcile_interval {
        tokio::spawn(services::run_sweeper(
            state.reconciliation.clone(),
            reconcile_limit,
            interval_secs,
        ));
    } else {
        tracing::info!("Reconciliation sweeper disabled");
    }

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
