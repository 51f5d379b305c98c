use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        image::ImageResponse,
        user::{Role, avatar_url},
        vote::VoteType,
    },
};

/// A comment as retrieved for one post, joined with its author.
///
/// `images` and `user_vote` are left empty by the store and filled in
/// when the thread is built for a specific viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    /// `None` for a root comment.
    pub parent_id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    pub user_role: Role,
    pub user_banned: bool,
    pub user_avatar_url: Option<String>,
    pub content: String,
    pub is_solution: bool,
    pub likes_count: i32,
    pub dislikes_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub images: Vec<ImageResponse>,
    pub user_vote: Option<VoteType>,
}

/// Raw row shape for the comments query.
#[derive(Debug, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    pub user_role: String,
    pub user_banned: bool,
    pub avatar_filename: Option<String>,
    pub content: String,
    pub is_solution: bool,
    pub likes_count: i32,
    pub dislikes_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = AppError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let user_role = row.user_role.parse::<Role>().map_err(|_| {
            AppError::InternalServerError(format!("Bad author role on comment {}", row.id))
        })?;

        Ok(Comment {
            id: row.id,
            post_id: row.post_id,
            // Legacy rows use 0 for "no parent".
            parent_id: row.parent_id.filter(|pid| *pid != 0),
            user_id: row.user_id,
            username: row.username,
            user_role,
            user_banned: row.user_banned,
            user_avatar_url: avatar_url(row.avatar_filename.as_deref()),
            content: row.content,
            is_solution: row.is_solution,
            likes_count: row.likes_count,
            dislikes_count: row.dislikes_count,
            created_at: row.created_at,
            images: Vec::new(),
            user_vote: None,
        })
    }
}

/// A comment with its direct replies, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, itself included.
    pub fn subtree_size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.replies.iter());
        }
        count
    }
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 5,
        max = 10000,
        message = "Comment must be between 5 and 10000 characters"
    ))]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<i64>,
}

/// Comment insert as handed to the store, body already sanitized.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
}
