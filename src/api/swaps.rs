use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_asset, AppState, AuthenticatedUser, PageInfo, PageQuery};
use crate::domain::{Decimal, Swap};
use crate::engine::SwapQuote;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub from_asset: String,
    pub to_asset: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapDto {
    pub id: String,
    pub from_asset: String,
    pub to_asset: String,
    pub from_amount: String,
    pub to_amount: String,
    pub rate: String,
    pub status: String,
    pub created_at: i64,
}

impl From<Swap> for SwapDto {
    fn from(s: Swap) -> Self {
        SwapDto {
            id: s.id.to_string(),
            from_asset: s.from_asset.as_str().to_string(),
            to_asset: s.to_asset.as_str().to_string(),
            from_amount: s.from_amount.to_canonical_string(),
            to_amount: s.to_amount.to_canonical_string(),
            rate: s.rate.to_canonical_string(),
            status: s.status.as_str().to_string(),
            created_at: s.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapsResponse {
    pub swaps: Vec<SwapDto>,
    #[serde(flatten)]
    pub page: PageInfo,
}

pub async fn get_quote(
    Query(params): Query<QuoteQuery>,
    State(state): State<AppState>,
) -> Result<Json<SwapQuote>, AppError> {
    let from = parse_asset(&params.from)?;
    let to = parse_asset(&params.to)?;
    if !params.amount.is_positive() {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }
    Ok(Json(state.quoter.quote(from, to, params.amount)?))
}

pub async fn create_swap(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(req): Json<SwapRequest>,
) -> Result<(StatusCode, Json<SwapDto>), AppError> {
    let from = parse_asset(&req.from_asset)?;
    let to = parse_asset(&req.to_asset)?;
    let swap = state
        .swaps
        .swap_at_platform_rate(&state.quoter, &user, from, to, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(swap.into())))
}

pub async fn list_swaps(
    Query(params): Query<PageQuery>,
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SwapsResponse>, AppError> {
    let page = params.pagination()?;
    let (swaps, total) = state.swaps.list_swaps(&user, page).await?;

    Ok(Json(SwapsResponse {
        swaps: swaps.into_iter().map(SwapDto::from).collect(),
        page: PageInfo::new(page, total),
    }))
}
