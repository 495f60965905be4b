pub mod auth;
pub mod health;
pub mod swaps;
pub mod trades;
pub mod wallets;

use crate::config::Config;
use crate::db::{Pagination, Repository};
use crate::directory::AdvertisementDirectory;
use crate::domain::{Asset, TradeId};
use crate::engine::{RateQuoter, SwapEngine, TradeEngine};
use crate::error::{AppError, ValidationError};
use crate::proof::ProofStore;
use crate::wallet::{UnconfiguredProvisioner, WalletProvisioner, WalletService};
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use auth::AuthenticatedUser;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub wallet: Arc<WalletService>,
    pub trades: Arc<TradeEngine>,
    pub swaps: Arc<SwapEngine>,
    pub quoter: RateQuoter,
    pub directory: Arc<dyn AdvertisementDirectory>,
    pub proofs: Arc<dyn ProofStore>,
    pub provisioner: Arc<dyn WalletProvisioner>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        directory: Arc<dyn AdvertisementDirectory>,
        proofs: Arc<dyn ProofStore>,
    ) -> Result<Self, AppError> {
        let quoter = RateQuoter::new(config.swap_btc_usdt_rate)
            .map_err(|e| AppError::Config(e.to_string()))?;
        let wallet = Arc::new(WalletService::new(repo.clone()));

        Ok(Self {
            trades: Arc::new(TradeEngine::new(wallet.clone(), config.escrow_mode)),
            swaps: Arc::new(SwapEngine::new(wallet.clone())),
            repo,
            config,
            wallet,
            quoter,
            directory,
            proofs,
            provisioner: Arc::new(UnconfiguredProvisioner),
        })
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn WalletProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.config.max_proof_bytes);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/trades", post(trades::open_trade).get(trades::list_trades))
        .route("/v1/trades/:id", get(trades::get_trade))
        .route("/v1/trades/:id/payment-proof", post(trades::submit_payment_proof))
        .route("/v1/trades/:id/release", post(trades::release_trade))
        .route("/v1/trades/:id/dispute", post(trades::dispute_trade))
        .route("/v1/trades/:id/cancel", post(trades::cancel_trade))
        .route("/v1/wallets", get(wallets::list_wallets))
        .route("/v1/wallets/demo-balance", post(wallets::add_demo_balance))
        .route("/v1/wallets/provision", post(wallets::provision_wallets))
        .route("/v1/wallets/:asset", get(wallets::get_wallet))
        .route(
            "/v1/wallets/:asset/transactions",
            get(wallets::list_transactions),
        )
        .route("/v1/swaps", post(swaps::create_swap).get(swaps::list_swaps))
        .route("/v1/swaps/quote", get(swaps::get_quote))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// `?page=&limit=` on history endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn pagination(&self) -> Result<Pagination, AppError> {
        Ok(Pagination::checked(self.page, self.limit)?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

impl PageInfo {
    pub fn new(page: Pagination, total: i64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            pages: page.pages(total),
        }
    }
}

pub(crate) fn parse_asset(s: &str) -> Result<Asset, AppError> {
    s.parse::<Asset>()
        .map_err(|e| ValidationError::UnknownAsset(e.0).into())
}

pub(crate) fn parse_trade_id(s: &str) -> Result<TradeId, AppError> {
    s.parse::<TradeId>()
        .map_err(|_| AppError::BadRequest(format!("invalid trade id: {}", s)))
}
