//! User profile and notification handlers

use crate::api::rest::caller::Caller;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use devory_collab::AllocationError;
use devory_types::{Notification, ProfileStats, UserId};

/// Public profile stats
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ProfileStats>> {
    let profile = state.allocator.get_profile(&UserId::new(user_id)).await?;
    Ok(Json(profile))
}

/// The caller's own notifications, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Notification>>> {
    let user_id = UserId::new(user_id);
    if user_id != viewer {
        return Err(AllocationError::Unauthorized(format!(
            "user {viewer} cannot read notifications of {user_id}"
        ))
        .into());
    }
    Ok(Json(state.notifications.list_for(&user_id)))
}
