use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{parse_trade_id, AppState, AuthenticatedUser, PageInfo, PageQuery};
use crate::domain::{Decimal, Trade, TradeAction};
use crate::error::AppError;
use crate::proof::ProofError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTradeRequest {
    pub advertisement_id: String,
    /// Fiat amount.
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDto {
    pub id: String,
    pub advertisement_id: String,
    pub asset: String,
    pub trade_type: String,
    pub rate: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub fiat_amount: String,
    pub asset_amount: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_proof: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_reason: Option<String>,
    pub escrow_held: bool,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl From<Trade> for TradeDto {
    fn from(t: Trade) -> Self {
        TradeDto {
            id: t.id.to_string(),
            advertisement_id: t.advertisement.advertisement_id,
            asset: t.advertisement.asset.as_str().to_string(),
            trade_type: t.advertisement.trade_type.as_str().to_string(),
            rate: t.advertisement.rate.to_canonical_string(),
            buyer_id: t.buyer_id.to_string(),
            seller_id: t.seller_id.to_string(),
            fiat_amount: t.fiat_amount.to_canonical_string(),
            asset_amount: t.asset_amount.to_canonical_string(),
            status: t.status.as_str().to_string(),
            payment_proof: t.payment_proof_ref,
            dispute_reason: t.dispute_reason,
            escrow_held: t.escrow_held,
            created_at: t.created_at.as_ms(),
            updated_at: t.updated_at.as_ms(),
            completed_at: t.completed_at.map(|c| c.as_ms()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesResponse {
    pub trades: Vec<TradeDto>,
    #[serde(flatten)]
    pub page: PageInfo,
}

pub async fn open_trade(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(req): Json<OpenTradeRequest>,
) -> Result<(StatusCode, Json<TradeDto>), AppError> {
    let trade = state
        .trades
        .open_from_directory(
            state.directory.as_ref(),
            &req.advertisement_id,
            &user,
            req.amount,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(trade.into())))
}

pub async fn list_trades(
    Query(params): Query<PageQuery>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TradesResponse>, AppError> {
    let page = params.pagination()?;
    let (trades, total) = state.trades.list_trades(&user, page).await?;

    Ok(Json(TradesResponse {
        trades: trades.into_iter().map(TradeDto::from).collect(),
        page: PageInfo::new(page, total),
    }))
}

pub async fn get_trade(
    Path(id): Path<String>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TradeDto>, AppError> {
    let id = parse_trade_id(&id)?;
    let trade = state.trades.get_trade(id, &user).await?;
    Ok(Json(trade.into()))
}

/// Body is the raw proof file (JPEG, PNG, GIF or PDF).
pub async fn submit_payment_proof(
    Path(id): Path<String>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Bytes,
) -> Result<Json<TradeDto>, AppError> {
    let id = parse_trade_id(&id)?;
    // Only the buyer may store files.
    state
        .trades
        .get_trade(id, &user)
        .await?
        .authorize(&user, TradeAction::SubmitPaymentProof)?;

    let proof_ref = state
        .proofs
        .store_payment_proof(&body)
        .await
        .map_err(|e| match e {
            ProofError::Io(io) => {
                warn!(trade_id = %id, error = %io, "Payment proof storage failed");
                AppError::Unavailable(io.to_string())
            }
            other => AppError::BadRequest(other.to_string()),
        })?;

    let trade = state
        .trades
        .submit_payment_proof(id, &user, proof_ref)
        .await?;
    Ok(Json(trade.into()))
}

pub async fn release_trade(
    Path(id): Path<String>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TradeDto>, AppError> {
    let id = parse_trade_id(&id)?;
    let trade = state.trades.release(id, &user).await?;
    Ok(Json(trade.into()))
}

pub async fn dispute_trade(
    Path(id): Path<String>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(req): Json<DisputeRequest>,
) -> Result<Json<TradeDto>, AppError> {
    let id = parse_trade_id(&id)?;
    let trade = state.trades.dispute(id, &user, &req.reason).await?;
    Ok(Json(trade.into()))
}

pub async fn cancel_trade(
    Path(id): Path<String>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TradeDto>, AppError> {
    let id = parse_trade_id(&id)?;
    let trade = state.trades.cancel(id, &user).await?;
    Ok(Json(trade.into()))
}
