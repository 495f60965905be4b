//! Caller identity.

use crate::domain::UserId;
use crate::error::AppError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the caller's user id, set by the identity provider in front of us.
pub const USER_HEADER: &str = "x-user-id";

/// The authenticated caller. Requests without an identity are rejected with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::Unauthenticated(format!("missing {} header", USER_HEADER)))?;
        let id = value
            .to_str()
            .map_err(|_| AppError::Unauthenticated(format!("malformed {} header", USER_HEADER)))?
            .trim();
        if id.is_empty() {
            return Err(AppError::Unauthenticated(format!("empty {} header", USER_HEADER)));
        }

        let user = UserId::new(id);
        if user.is_system() {
            return Err(AppError::Forbidden("reserved user id".into()));
        }
        Ok(AuthenticatedUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<AuthenticatedUser, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(USER_HEADER, h);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_user() {
        let AuthenticatedUser(user) = extract(Some(" alice ")).await.unwrap();
        assert_eq!(user, UserId::new("alice"));
    }

    #[tokio::test]
    async fn test_rejections() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthenticated(_))));
        assert!(matches!(extract(Some("  ")).await, Err(AppError::Unauthenticated(_))));
        assert!(matches!(
            extract(Some("system:escrow")).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
