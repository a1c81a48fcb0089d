//! Join request decision handlers

use crate::api::rest::caller::Caller;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use devory_collab::{Acceptance, AllocationError};
use devory_types::{JoinRequest, RequestId};

/// Get a request; visible to its requester and the post owner
pub async fn get_request(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(request_id): Path<String>,
) -> ApiResult<Json<JoinRequest>> {
    let request = state
        .allocator
        .get_request(&RequestId::new(request_id))
        .await?;
    if request.requester_id != viewer {
        let post = state.allocator.get_post(&request.post_id).await?;
        if post.owner_id != viewer {
            return Err(AllocationError::Unauthorized(format!(
                "user {viewer} cannot view request {}",
                request.id
            ))
            .into());
        }
    }
    Ok(Json(request))
}

/// Accept a pending request on a post the caller owns
pub async fn accept_request(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(request_id): Path<String>,
) -> ApiResult<Json<Acceptance>> {
    let acceptance = state
        .allocator
        .accept_request(&RequestId::new(request_id), &owner)
        .await?;
    Ok(Json(acceptance))
}

/// Reject a pending request on a post the caller owns
pub async fn reject_request(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(request_id): Path<String>,
) -> ApiResult<Json<JoinRequest>> {
    let rejected = state
        .allocator
        .reject_request(&RequestId::new(request_id), &owner)
        .await?;
    Ok(Json(rejected))
}
