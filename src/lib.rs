pub mod cards;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod pricing;
pub mod providers;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::cards::StroWalletClient;
use crate::config::Config;
use crate::services::{
    DepositService, LogNotifier, Notifier, ReconciliationService, TopupService,
    VerificationService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub cards: StroWalletClient,
    pub deposits: Arc<DepositService>,
    pub topups: Arc<TopupService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppState {
    /// Wires the service graph from a pool and a loaded config.
    pub fn build(db: sqlx::PgPool, config: Config) -> Self {
        let config = Arc::new(config);
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let cards = StroWalletClient::new(
            config.strowallet.api_url.clone(),
            config.strowallet.public_key.clone(),
        );
        let verification = Arc::new(VerificationService::from_config(&config));

        let deposits = Arc::new(DepositService::new(
            db.clone(),
            verification,
            notifier.clone(),
            config.deposit_policy,
        ));
        let topups = Arc::new(TopupService::new(
            db.clone(),
            cards.clone(),
            notifier.clone(),
            config.simulate_card_funding,
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            db.clone(),
            cards.clone(),
            notifier,
        ));

        AppState {
            db,
            config,
            cards,
            deposits,
            topups,
            reconciliation,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/deposits", post(handlers::deposits::create_deposit))
        .route(
            "/deposits/:id/approve",
            post(handlers::deposits::approve_deposit),
        )
        .route("/cards/:id/topups", post(handlers::topups::create_topup))
        .route(
            "/cards/:id/reconcile",
            post(handlers::cards::reconcile_card),
        )
        .route(
            "/cards/:id/reconciliations",
            get(handlers::cards::list_reconciliations),
        )
        .route("/reconciliation/sweep", post(handlers::cards::run_sweep))
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/users/:id/transactions",
            get(handlers::transactions::list_user_transactions),
        )
        .route("/users/:id/wallet", get(handlers::transactions::get_wallet))
        .with_state(state)
}
