use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    forum::{moderation, permissions::can_comment},
    handlers::{community::DeleteParams, current_user},
    models::{
        comment::{CreateCommentRequest, NewComment},
        user::Viewer,
        vote::{VoteRequest, VoteTarget},
    },
    store::DynStore,
    utils::html::sanitize_body,
};

/// Create a new comment or reply.
/// Requires: Login, account not banned, post open and unlocked.
pub async fn create_comment(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = current_user(store.as_ref(), viewer).await?;
    moderation::ensure_active(&user)?;

    // 1. The post must exist, be visible and accept comments
    let post = moderation::visible_post(store.as_ref(), post_id, &user).await?;
    if !can_comment(&post) {
        return Err(AppError::Forbidden(
            "This post is not accepting comments".to_string(),
        ));
    }

    // 2. A reply must point at a comment of the same post; 0 means no parent
    let parent_id = payload.parent_id.filter(|pid| *pid != 0);
    if let Some(pid) = parent_id {
        let parent = store.find_comment(pid).await?;
        if parent.is_none_or(|p| p.post_id != post.id) {
            return Err(AppError::NotFound("Parent comment not found".to_string()));
        }
    }

    // 3. Insert Comment
    let new_id = store
        .create_comment(NewComment {
            post_id: post.id,
            user_id: user.id,
            parent_id,
            content: sanitize_body(&payload.content)?,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": new_id })),
    ))
}

/// Delete a comment and its replies.
/// Requires: Login + (Comment author OR Post author OR Moderator).
pub async fn delete_comment(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(comment_id): Path<i64>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(store.as_ref(), viewer).await?;
    moderation::delete_comment(store.as_ref(), comment_id, &user, params.reason).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Accept a comment as the solution of its post.
/// Requires: Login + Post author.
pub async fn mark_solution(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(store.as_ref(), viewer).await?;
    let comment = moderation::mark_solution(store.as_ref(), comment_id, &user).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "comment_id": comment.id,
        "post_id": comment.post_id,
    })))
}

/// Toggle a like/dislike on a post.
pub async fn vote_post(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(post_id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(store.as_ref(), viewer).await?;
    moderation::ensure_active(&user)?;
    let post = moderation::visible_post(store.as_ref(), post_id, &user).await?;

    cast_vote(&store, VoteTarget::Post, post.id, user.id, payload).await
}

/// Toggle a like/dislike on a comment.
pub async fn vote_comment(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(comment_id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(store.as_ref(), viewer).await?;
    moderation::ensure_active(&user)?;

    let comment = store
        .find_comment(comment_id)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;
    moderation::visible_post(store.as_ref(), comment.post_id, &user).await?;

    cast_vote(&store, VoteTarget::Comment, comment.id, user.id, payload).await
}

async fn cast_vote(
    store: &DynStore,
    target: VoteTarget,
    target_id: i64,
    user_id: i64,
    payload: VoteRequest,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = store
        .toggle_vote(target, target_id, user_id, payload.vote_type)
        .await
        .map_err(|e| {
            tracing::error!("Failed to toggle vote on {:?} {}: {:?}", target, target_id, e);
            e
        })?;

    Ok(Json(serde_json::json!({
        "outcome": outcome,
        "vote": outcome.resulting_vote(payload.vote_type),
    })))
}
