use crate::domain::{Asset, Decimal, TradeId, TradeStatus, UserId};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Input rejected before anything was touched. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount {amount} outside advertisement limits [{min}, {max}]")]
    InvalidAmountRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },
    #[error("cannot trade against your own advertisement")]
    SelfTradeForbidden,
    #[error("unknown asset symbol: {0}")]
    UnknownAsset(String),
    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
    #[error("cannot swap {0} into itself")]
    SameAsset(Asset),
    #[error("cannot transfer to the same account")]
    SelfTransfer,
    #[error("invalid advertisement terms: {0}")]
    InvalidAdvertisement(String),
    #[error("{asset} amounts carry at most {scale} decimal places")]
    ExcessPrecision { asset: Asset, scale: u32 },
    #[error("amount out of range: {0}")]
    Overflow(&'static str),
    #[error("invalid payment proof: {0}")]
    InvalidProof(String),
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    StateConflict,
    InsufficientBalance,
    NotFound,
    StorageUnavailable,
}

/// Errors surfaced by the wallet service, trade engine and swap engine.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("user {actor} may not {action} trade {trade_id}")]
    Unauthorized {
        actor: UserId,
        action: &'static str,
        trade_id: TradeId,
    },
    #[error("cannot {action} trade in status {from}")]
    InvalidStateTransition {
        from: TradeStatus,
        action: &'static str,
    },
    #[error("{0} was modified concurrently")]
    Conflict(String),
    #[error("insufficient {asset} balance for {user}: available {available}, required {required}")]
    InsufficientBalance {
        user: UserId,
        asset: Asset,
        available: Decimal,
        required: Decimal,
    },
    #[error("seller {seller} has insufficient {asset}: available {available}, required {required}")]
    InsufficientSellerBalance {
        seller: UserId,
        asset: Asset,
        available: Decimal,
        required: Decimal,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Unauthorized { .. } => ErrorKind::Authorization,
            LedgerError::InvalidStateTransition { .. } | LedgerError::Conflict(_) => {
                ErrorKind::StateConflict
            }
            LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientSellerBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::StorageUnavailable(_) | LedgerError::CollaboratorUnavailable(_) => {
                ErrorKind::StorageUnavailable
            }
        }
    }

    /// Only system faults are worth retrying; business rejections need the caller to
    /// change something first.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StorageUnavailable
    }

    /// Re-tag a wallet overdraft as the seller-side failure of a trade.
    pub(crate) fn into_seller_shortfall(self) -> Self {
        match self {
            LedgerError::InsufficientBalance {
                user,
                asset,
                available,
                required,
            } => LedgerError::InsufficientSellerBalance {
                seller: user,
                asset,
                available,
                required,
            },
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::Validation => AppError::BadRequest(msg),
            ErrorKind::Authorization => AppError::Forbidden(msg),
            ErrorKind::StateConflict => AppError::Conflict(msg),
            ErrorKind::InsufficientBalance => AppError::Unprocessable(msg),
            ErrorKind::NotFound => AppError::NotFound(msg),
            ErrorKind::StorageUnavailable => AppError::Unavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
