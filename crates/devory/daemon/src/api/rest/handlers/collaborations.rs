//! Collaboration post handlers

use crate::api::rest::caller::Caller;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use devory_storage::QueryWindow;
use devory_types::{CollaborationPost, JoinRequest, NewCollaborationPost, PostId, PostKind};
use serde::Deserialize;

/// Create collaboration post request
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub kind: Option<PostKind>,
    pub title: String,
    #[serde(default)]
    pub required_slots: Option<u32>,
}

/// Join request body
#[derive(Debug, Default, Deserialize)]
pub struct JoinPostRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// Paging parameters for request listings
#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ListRequestsQuery {
    fn window(&self) -> QueryWindow {
        QueryWindow {
            limit: self.limit.unwrap_or(50),
            offset: self.offset.unwrap_or(0),
        }
    }
}

/// Create a post owned by the caller
pub async fn create_post(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<CollaborationPost>)> {
    let new_post = NewCollaborationPost {
        owner_id: owner,
        kind: request.kind.unwrap_or(PostKind::Collaboration),
        title: request.title,
        required_slots: request.required_slots,
    };
    let post = state.allocator.create_post(new_post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// Get a specific post
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<Json<CollaborationPost>> {
    let post = state.allocator.get_post(&PostId::new(post_id)).await?;
    Ok(Json(post))
}

/// Ask to join a post as the caller
pub async fn request_to_join(
    State(state): State<AppState>,
    Caller(requester): Caller,
    Path(post_id): Path<String>,
    Json(body): Json<JoinPostRequest>,
) -> ApiResult<(StatusCode, Json<JoinRequest>)> {
    let request = state
        .allocator
        .request_to_join(&PostId::new(post_id), &requester, body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List requests against a post the caller owns
pub async fn list_requests(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(post_id): Path<String>,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Json<Vec<JoinRequest>>> {
    let requests = state
        .allocator
        .list_requests(&PostId::new(post_id), &viewer, query.window())
        .await?;
    Ok(Json(requests))
}
