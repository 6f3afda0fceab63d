pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod services;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domain::TransitionPolicy;
use crate::middleware::request_logger::{request_logger_middleware, RequestLogSettings};
use crate::services::{CatalogStore, QrTicketManager, TransactionLedger, WalletAccessor};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub catalog: CatalogStore,
    pub tickets: QrTicketManager,
    pub ledger: TransactionLedger,
    pub wallets: WalletAccessor,
}

impl AppState {
    pub fn new(pool: sqlx::PgPool, config: &Config) -> Self {
        Self {
            catalog: CatalogStore::new(pool.clone()),
            tickets: QrTicketManager::new(pool.clone(), config.ticket_ttl()),
            ledger: TransactionLedger::new(
                pool.clone(),
                TransitionPolicy::new(config.allow_direct_completion),
            ),
            wallets: WalletAccessor::new(pool.clone()),
            db: pool,
        }
    }
}

pub fn create_app(state: AppState, log_settings: RequestLogSettings) -> Router {
    use handlers::{catalog, qr, transactions, wallets};

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/catalog/waste-categories", get(catalog::list_waste_categories))
        .route("/catalog/waste-categories/:id", get(catalog::get_waste_category))
        .route("/qr/generate", post(qr::generate))
        .route("/qr/verify", post(qr::verify))
        .route(
            "/transactions",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route(
            "/transactions/:id",
            get(transactions::get_transaction).patch(transactions::update_transaction),
        )
        .route("/transactions/:id/details", get(transactions::get_transaction_details))
        .route("/transactions/:id/status", patch(transactions::transition_transaction))
        .route("/transactions/:id/confirm", patch(transactions::confirm_transaction))
        .route("/transactions/:id/complete", patch(transactions::complete_transaction))
        .route("/transactions/:id/cancel", patch(transactions::cancel_transaction))
        .route(
            "/transactions/:id/customer-confirm",
            patch(transactions::customer_confirm_transaction),
        )
        .route("/transactions/:id/bind", post(transactions::bind_waste_bank))
        .route(
            "/transactions/:id/items",
            post(transactions::add_line_items).patch(transactions::update_line_items),
        )
        .route("/wallets/:depositor_id", get(wallets::get_wallet))
        .route("/wallets/:depositor_id/entries", get(wallets::list_wallet_entries))
        .layer(axum::middleware::from_fn_with_state(
            log_settings,
            request_logger_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
