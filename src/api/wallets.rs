use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

use super::{parse_asset, AppState, AuthenticatedUser, PageInfo, PageQuery};
use crate::domain::{Asset, Decimal, EntryKind, LedgerEntry, UserId};
use crate::error::AppError;

/// Amounts credited by the demo faucet.
const DEMO_CREDITS: [(Asset, &str); 2] = [(Asset::Btc, "0.001"), (Asset::Usdt, "1000")];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDto {
    pub asset: String,
    pub balance: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletsResponse {
    pub user_id: String,
    pub wallets: Vec<WalletDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: i64,
    pub kind: String,
    pub amount: String,
    pub balance_after: String,
    pub reference_id: String,
    pub created_at: i64,
}

impl From<LedgerEntry> for TransactionDto {
    fn from(e: LedgerEntry) -> Self {
        TransactionDto {
            id: e.id,
            kind: e.kind.as_str().to_string(),
            amount: e.delta.to_canonical_string(),
            balance_after: e.resulting_balance.to_canonical_string(),
            reference_id: e.reference_id,
            created_at: e.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub asset: String,
    pub transactions: Vec<TransactionDto>,
    #[serde(flatten)]
    pub page: PageInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressesResponse {
    pub addresses: BTreeMap<String, String>,
}

async fn wallets_of(state: &AppState, user: UserId) -> Result<WalletsResponse, AppError> {
    let wallets = state
        .wallet
        .balances(&user)
        .await?
        .into_iter()
        .map(|(asset, amount)| WalletDto {
            asset: asset.as_str().to_string(),
            balance: amount.to_canonical_string(),
        })
        .collect();

    Ok(WalletsResponse {
        user_id: user.to_string(),
        wallets,
    })
}

pub async fn list_wallets(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<WalletsResponse>, AppError> {
    Ok(Json(wallets_of(&state, user).await?))
}

pub async fn get_wallet(
    Path(asset): Path<String>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<WalletDto>, AppError> {
    let asset = parse_asset(&asset)?;
    let amount = state.wallet.get_balance(&user, asset).await?;

    Ok(Json(WalletDto {
        asset: asset.as_str().to_string(),
        balance: amount.to_canonical_string(),
    }))
}

pub async fn list_transactions(
    Path(asset): Path<String>,
    Query(params): Query<PageQuery>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TransactionsResponse>, AppError> {
    let asset = parse_asset(&asset)?;
    let page = params.pagination()?;
    let (entries, total) = state.wallet.entries(&user, asset, page).await?;

    Ok(Json(TransactionsResponse {
        asset: asset.as_str().to_string(),
        transactions: entries.into_iter().map(TransactionDto::from).collect(),
        page: PageInfo::new(page, total),
    }))
}

pub async fn add_demo_balance(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<WalletsResponse>, AppError> {
    if !state.config.allow_demo_balance {
        return Err(AppError::Forbidden("demo balance is disabled".into()));
    }

    for (asset, amount) in DEMO_CREDITS {
        let amount = Decimal::from_str(amount).map_err(|e| AppError::Internal(e.to_string()))?;
        state
            .wallet
            .adjust_single(&user, asset, amount, EntryKind::Deposit, "demo-balance")
            .await?;
    }
    info!(user = %user, "Demo balance credited");

    Ok(Json(wallets_of(&state, user).await?))
}

pub async fn provision_wallets(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<AddressesResponse>, AppError> {
    let addresses = state
        .wallet
        .ensure_provisioned(&user, state.provisioner.as_ref())
        .await?;

    Ok(Json(AddressesResponse {
        addresses: addresses
            .into_iter()
            .map(|(asset, address)| (asset.as_str().to_string(), address))
            .collect(),
    }))
}
