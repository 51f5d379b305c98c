//! Storage collaborator.
//!
//! Handlers and the forum core only talk to [`ForumStore`]. Production runs
//! on [`postgres::PgStore`]; [`memory::MemoryStore`] backs tests and
//! database-less local runs.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        category::Category,
        comment::{Comment, NewComment},
        image::Image,
        moderation::{ModerationLog, NewModerationLog},
        post::{NewPost, Post, PostStatus},
        user::{Role, User, Viewer},
        vote::{VoteTarget, VoteToggle, VoteType},
    },
};

pub type DynStore = Arc<dyn ForumStore>;

/// Which posts a listing should return.
#[derive(Debug, Clone, Copy)]
pub struct PostFilter {
    pub category_id: Option<i64>,
    /// Archived posts are only listed for their author or a moderator.
    pub viewer: Option<Viewer>,
    pub limit: i64,
}

#[async_trait]
pub trait ForumStore: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;

    /// `banned = false` also clears the stored reason.
    async fn set_user_ban(&self, id: i64, banned: bool, reason: Option<&str>)
    -> Result<(), AppError>;

    async fn set_user_role(&self, id: i64, role: Role) -> Result<(), AppError>;

    /// Ordered by name.
    async fn list_categories(&self) -> Result<Vec<Category>, AppError>;

    async fn find_post(&self, id: i64) -> Result<Option<Post>, AppError>;

    /// Pinned posts first, then newest.
    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<Post>, AppError>;

    /// Fails with `BadRequest` when the category does not exist.
    async fn create_post(&self, post: NewPost) -> Result<i64, AppError>;

    /// Removes the post with its comments, votes and images.
    async fn delete_post(&self, id: i64) -> Result<(), AppError>;

    async fn increment_post_views(&self, id: i64) -> Result<(), AppError>;

    async fn update_post_status(&self, id: i64, status: PostStatus) -> Result<(), AppError>;

    /// Every comment of the post, in no particular order.
    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError>;

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, AppError>;

    async fn create_comment(&self, comment: NewComment) -> Result<i64, AppError>;

    /// Removes the comment and, transitively, its replies.
    async fn delete_comment(&self, id: i64) -> Result<(), AppError>;

    /// Flags the comment as the solution and the post as solved, as one unit.
    ///
    /// Fails with `Conflict` when the post already has a solution. A
    /// half-applied write surfaces as `InconsistentState`.
    async fn mark_solution(&self, post_id: i64, comment_id: i64) -> Result<(), AppError>;

    /// Attachments of the post's comments keyed by comment id, oldest first.
    async fn comment_images(&self, post_id: i64) -> Result<HashMap<i64, Vec<Image>>, AppError>;

    async fn post_images(&self, post_id: i64) -> Result<Vec<Image>, AppError>;

    async fn viewer_comment_votes(
        &self,
        post_id: i64,
        viewer_id: i64,
    ) -> Result<HashMap<i64, VoteType>, AppError>;

    async fn viewer_post_vote(
        &self,
        post_id: i64,
        viewer_id: i64,
    ) -> Result<Option<VoteType>, AppError>;

    /// Applies [`VoteToggle::resolve`] atomically and refreshes the target's counters.
    async fn toggle_vote(
        &self,
        target: VoteTarget,
        target_id: i64,
        user_id: i64,
        vote: VoteType,
    ) -> Result<VoteToggle, AppError>;

    async fn append_moderation_log(&self, entry: NewModerationLog) -> Result<(), AppError>;

    /// Newest first.
    async fn list_moderation_logs(&self, limit: i64) -> Result<Vec<ModerationLog>, AppError>;
}
