//! Lifecycle writes: status transitions, solution marking, deletions and
//! account moderation.
//!
//! Each operation loads what it needs from the store, runs the matching
//! predicate from [`permissions`](crate::forum::permissions) and only then
//! writes. Privileged actions append a moderation-log entry afterwards; that
//! append never undoes the action it describes.

use crate::{
    error::AppError,
    forum::permissions::{self, LifecyclePolicy},
    models::{
        comment::Comment,
        moderation::{ModerationAction, NewModerationLog, TargetKind},
        post::{Post, PostStatus},
        user::{Role, User},
    },
    store::ForumStore,
};

/// Refuses writes from banned accounts.
pub fn ensure_active(actor: &User) -> Result<(), AppError> {
    if actor.is_banned {
        return Err(AppError::Forbidden("Your account is banned".to_string()));
    }
    Ok(())
}

/// Loads a post the actor is allowed to see. Hidden posts read as missing.
pub async fn visible_post(
    store: &dyn ForumStore,
    post_id: i64,
    actor: &User,
) -> Result<Post, AppError> {
    let post = store
        .find_post(post_id)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    if !permissions::can_view(&post, Some(&actor.viewer())) {
        return Err(AppError::NotFound("Post not found".to_string()));
    }
    Ok(post)
}

/// Appends a log entry. Failures are reported and swallowed.
pub async fn record(store: &dyn ForumStore, entry: NewModerationLog) {
    let action = entry.action_type;
    let target = entry.target_id;
    if let Err(e) = store.append_moderation_log(entry).await {
        tracing::warn!(
            "Failed to write moderation log ({} on {}): {:?}",
            action.as_str(),
            target,
            e
        );
    }
}

/// Moves a post to `next`. Returns the new status.
pub async fn change_status(
    store: &dyn ForumStore,
    post_id: i64,
    actor: &User,
    next: PostStatus,
    reason: Option<String>,
    policy: LifecyclePolicy,
) -> Result<PostStatus, AppError> {
    ensure_active(actor)?;
    let post = visible_post(store, post_id, actor).await?;

    if !permissions::can_apply_transition(&post, &actor.viewer(), next, policy) {
        return Err(AppError::Forbidden(
            "You are not allowed to change the status of this post".to_string(),
        ));
    }

    if !post.status.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "Cannot move a post from {} to {}",
            post.status, next
        )));
    }

    store.update_post_status(post.id, next).await?;
    tracing::info!(
        "Post {} moved from {} to {} by user {}",
        post.id,
        post.status,
        next,
        actor.id
    );

    record(
        store,
        NewModerationLog {
            moderator_id: actor.id,
            action_type: ModerationAction::for_status(next),
            target_type: TargetKind::Post,
            target_id: post.id,
            reason: reason.unwrap_or_default(),
        },
    )
    .await;

    Ok(next)
}

/// Accepts a comment as the answer to its post.
pub async fn mark_solution(
    store: &dyn ForumStore,
    comment_id: i64,
    actor: &User,
) -> Result<Comment, AppError> {
    ensure_active(actor)?;

    let comment = store
        .find_comment(comment_id)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;
    let post = visible_post(store, comment.post_id, actor).await?;

    if actor.id != post.user_id {
        return Err(AppError::Forbidden(
            "Only the post author can accept a solution".to_string(),
        ));
    }
    if !permissions::can_mark_solution(&comment, actor.id, post.user_id) {
        return Err(AppError::Conflict(
            "This comment is already the solution".to_string(),
        ));
    }
    if post.is_solved {
        return Err(AppError::Conflict(
            "This post already has a solution".to_string(),
        ));
    }

    store.mark_solution(post.id, comment.id).await?;
    tracing::info!("Comment {} accepted as solution of post {}", comment.id, post.id);

    Ok(Comment {
        is_solution: true,
        ..comment
    })
}

/// Deletes a post. Deleting someone else's post is logged.
pub async fn delete_post(
    store: &dyn ForumStore,
    post_id: i64,
    actor: &User,
    reason: Option<String>,
) -> Result<(), AppError> {
    let post = visible_post(store, post_id, actor).await?;

    if !permissions::can_delete_post(&post, actor) {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this post".to_string(),
        ));
    }

    store.delete_post(post.id).await?;

    if actor.id != post.user_id {
        record(
            store,
            NewModerationLog {
                moderator_id: actor.id,
                action_type: ModerationAction::Delete,
                target_type: TargetKind::Post,
                target_id: post.id,
                reason: reason.unwrap_or_default(),
            },
        )
        .await;
    }
    Ok(())
}

/// Deletes a comment and its replies. Deleting someone else's comment is logged.
pub async fn delete_comment(
    store: &dyn ForumStore,
    comment_id: i64,
    actor: &User,
    reason: Option<String>,
) -> Result<(), AppError> {
    let comment = store
        .find_comment(comment_id)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;
    let post = visible_post(store, comment.post_id, actor).await?;

    if !permissions::can_delete_comment(&comment, &post, actor) {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this comment".to_string(),
        ));
    }

    store.delete_comment(comment.id).await?;

    if actor.id != comment.user_id {
        record(
            store,
            NewModerationLog {
                moderator_id: actor.id,
                action_type: ModerationAction::Delete,
                target_type: TargetKind::Comment,
                target_id: comment.id,
                reason: reason.unwrap_or_default(),
            },
        )
        .await;
    }
    Ok(())
}

async fn find_target(store: &dyn ForumStore, user_id: i64) -> Result<User, AppError> {
    store
        .find_user(user_id)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

pub async fn ban_user(
    store: &dyn ForumStore,
    actor: &User,
    target_id: i64,
    reason: &str,
) -> Result<(), AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::BadRequest("A ban reason is required".to_string()));
    }

    let target = find_target(store, target_id).await?;
    if !permissions::can_ban(actor, &target) {
        return Err(AppError::Forbidden(
            "You are not allowed to ban this user".to_string(),
        ));
    }
    if actor.id == target.id {
        return Err(AppError::BadRequest("You cannot ban yourself".to_string()));
    }

    store.set_user_ban(target.id, true, Some(reason)).await?;
    tracing::info!("User {} banned by {}", target.id, actor.id);

    record(
        store,
        NewModerationLog {
            moderator_id: actor.id,
            action_type: ModerationAction::Ban,
            target_type: TargetKind::User,
            target_id: target.id,
            reason: reason.to_string(),
        },
    )
    .await;
    Ok(())
}

pub async fn unban_user(
    store: &dyn ForumStore,
    actor: &User,
    target_id: i64,
) -> Result<(), AppError> {
    let target = find_target(store, target_id).await?;
    if !permissions::can_ban(actor, &target) {
        return Err(AppError::Forbidden(
            "You are not allowed to unban this user".to_string(),
        ));
    }

    store.set_user_ban(target.id, false, None).await?;
    tracing::info!("User {} unbanned by {}", target.id, actor.id);

    record(
        store,
        NewModerationLog {
            moderator_id: actor.id,
            action_type: ModerationAction::Unban,
            target_type: TargetKind::User,
            target_id: target.id,
            reason: String::new(),
        },
    )
    .await;
    Ok(())
}

/// Administrator-only role change.
pub async fn change_role(
    store: &dyn ForumStore,
    actor: &User,
    target_id: i64,
    role: Role,
) -> Result<(), AppError> {
    if !permissions::can_promote(actor) {
        return Err(AppError::Forbidden(
            "Only administrators can change roles".to_string(),
        ));
    }

    let target = find_target(store, target_id).await?;
    store.set_user_role(target.id, role).await?;
    tracing::info!(
        "User {} role changed from {} to {} by {}",
        target.id,
        target.role,
        role,
        actor.id
    );

    record(
        store,
        NewModerationLog {
            moderator_id: actor.id,
            action_type: ModerationAction::Promote,
            target_type: TargetKind::User,
            target_id: target.id,
            reason: format!("{} -> {}", target.role, role),
        },
    )
    .await;
    Ok(())
}
