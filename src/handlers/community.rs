use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    forum::{
        moderation,
        permissions::{LifecyclePolicy, can_view},
        thread::{CommentSort, load_thread},
    },
    handlers::{current_user, refresh_viewer},
    models::{
        image::ImageResponse,
        post::{
            ChangeStatusRequest, CreatePostRequest, NewPost, PostDetailParams,
            PostDetailResponse, PostListParams,
        },
        user::Viewer,
    },
    store::{DynStore, PostFilter},
    utils::{html::sanitize_body, jwt::CurrentViewer},
};

/// Optional body for deletions performed by staff.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    pub reason: Option<String>,
}

/// Create a new post.
/// Requires: Login, account not banned.
pub async fn create_post(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Validate payload
    payload.validate()?;

    // 2. Check the author is still allowed to write
    let user = current_user(store.as_ref(), viewer).await?;
    moderation::ensure_active(&user)?;

    // 3. Insert Post
    let post_id = store
        .create_post(NewPost {
            user_id: user.id,
            category_id: payload.category_id,
            title: payload.title.trim().to_string(),
            content: sanitize_body(&payload.content)?,
        })
        .await?;

    tracing::info!("Post {} created by user {}", post_id, user.id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": post_id})),
    ))
}

/// List categories with their post counts.
pub async fn list_categories(
    State(store): State<DynStore>,
) -> Result<impl IntoResponse, AppError> {
    let categories = store.list_categories().await?;
    Ok(Json(categories))
}

/// List posts (pinned first, then recent first).
/// Archived posts only show up for their author and for moderators.
pub async fn list_posts(
    State(store): State<DynStore>,
    Extension(CurrentViewer(viewer)): Extension<CurrentViewer>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100); // Default 20, max 100
    let viewer = refresh_viewer(store.as_ref(), viewer).await?;

    let posts = store
        .list_posts(PostFilter {
            category_id: params.category_id,
            viewer,
            limit,
        })
        .await?;

    Ok(Json(posts))
}

/// Get a single post with its comment thread.
///
/// `?sort=` picks the comment order; unknown values fall back to newest.
pub async fn get_post(
    State(store): State<DynStore>,
    Extension(CurrentViewer(viewer)): Extension<CurrentViewer>,
    Path(id): Path<i64>,
    Query(params): Query<PostDetailParams>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = refresh_viewer(store.as_ref(), viewer).await?;

    let mut post = store
        .find_post(id)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    // Hide the existence of archived posts from everyone else.
    if !can_view(&post, viewer.as_ref()) {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    if let Err(e) = store.increment_post_views(post.id).await {
        tracing::warn!("Failed to count view on post {}: {:?}", post.id, e);
    } else {
        post.views_count += 1;
    }

    let sort = CommentSort::parse(params.sort.as_deref());
    let comments = load_thread(store.as_ref(), post.id, viewer.as_ref(), sort).await?;
    let images = store
        .post_images(post.id)
        .await?
        .into_iter()
        .map(ImageResponse::from)
        .collect();
    let user_vote = match viewer {
        Some(v) => store.viewer_post_vote(post.id, v.id).await?,
        None => None,
    };

    Ok(Json(PostDetailResponse {
        post,
        images,
        user_vote,
        comments,
        current_sort: sort.as_str(),
        available_sorts: CommentSort::options(),
    }))
}

/// Delete a post with its comments.
/// Requires: Login + (Author OR Moderator).
pub async fn delete_post(
    State(store): State<DynStore>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(store.as_ref(), viewer).await?;
    moderation::delete_post(store.as_ref(), id, &user, params.reason).await?;

    tracing::info!("Post {} deleted by user {}", id, user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Change the lifecycle status of a post.
/// Requires: Login + (Author OR Moderator); archive moves may need a moderator.
pub async fn change_post_status(
    State(store): State<DynStore>,
    State(config): State<Config>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<i64>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = current_user(store.as_ref(), viewer).await?;
    let policy = LifecyclePolicy {
        archive_requires_moderator: config.archive_requires_moderator,
    };

    let new_status = moderation::change_status(
        store.as_ref(),
        id,
        &user,
        payload.status,
        payload.reason,
        policy,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "new_status": new_status,
    })))
}
