//! Caller identity extraction

use crate::error::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};
use devory_types::UserId;

/// Header carrying the acting user's id.
pub const USER_HEADER: &str = "x-user-id";

/// The user on whose behalf a request is made.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_HEADER} header")))?;
        let user = value
            .to_str()
            .map(str::trim)
            .map_err(|_| ApiError::Unauthenticated(format!("{USER_HEADER} is not valid text")))?;
        if user.is_empty() {
            return Err(ApiError::Unauthenticated(format!("{USER_HEADER} is empty")));
        }
        Ok(Caller(UserId::new(user)))
    }
}
