use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    error::AppError,
    models::{comment::CommentNode, image::ImageResponse, vote::VoteType},
};

/// Lifecycle status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Open,
    Closed,
    Archived,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Open => "open",
            PostStatus::Closed => "closed",
            PostStatus::Archived => "archived",
        }
    }

    /// open <-> closed, open|closed -> archived, archived -> open.
    pub fn can_transition_to(self, next: PostStatus) -> bool {
        matches!(
            (self, next),
            (PostStatus::Open, PostStatus::Closed)
                | (PostStatus::Closed, PostStatus::Open)
                | (PostStatus::Open, PostStatus::Archived)
                | (PostStatus::Closed, PostStatus::Archived)
                | (PostStatus::Archived, PostStatus::Open)
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PostStatus::Open),
            "closed" => Ok(PostStatus::Closed),
            "archived" => Ok(PostStatus::Archived),
            other => Err(AppError::BadRequest(format!("Invalid status '{}'", other))),
        }
    }
}

/// Represents the 'posts' table joined with its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category_id: i64,
    pub user_id: i64,
    pub username: String,
    pub status: PostStatus,
    pub is_solved: bool,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub views_count: i32,
    pub likes_count: i32,
    pub dislikes_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Raw row shape; `status` is stored as text.
#[derive(Debug, FromRow)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category_id: i64,
    pub user_id: i64,
    pub username: String,
    pub status: String,
    pub is_solved: bool,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub views_count: i32,
    pub likes_count: i32,
    pub dislikes_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = AppError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<PostStatus>()
            .map_err(|_| AppError::InternalServerError(format!("Bad status for post {}", row.id)))?;

        Ok(Post {
            id: row.id,
            title: row.title,
            content: row.content,
            category_id: row.category_id,
            user_id: row.user_id,
            username: row.username,
            status,
            is_solved: row.is_solved,
            is_pinned: row.is_pinned,
            is_locked: row.is_locked,
            views_count: row.views_count,
            likes_count: row.likes_count,
            dislikes_count: row.dislikes_count,
            created_at: row.created_at,
        })
    }
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(
        min = 5,
        max = 255,
        message = "Title length must be between 5 and 255 chars"
    ))]
    pub title: String,

    #[validate(length(min = 20, max = 20000, message = "Content must be at least 20 chars"))]
    pub content: String,

    #[validate(range(min = 1, message = "A category is required"))]
    pub category_id: i64,
}

/// Post insert as handed to the store, body already sanitized.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub category_id: i64,
    pub title: String,
    pub content: String,
}

/// Query parameters for listing posts.
#[derive(Debug, Default, Deserialize)]
pub struct PostListParams {
    pub category_id: Option<i64>,

    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}

/// Query parameters for a single post page.
#[derive(Debug, Default, Deserialize)]
pub struct PostDetailParams {
    /// Comment ordering: newest (default), oldest, most_liked, solutions_first.
    pub sort: Option<String>,
}

/// DTO for changing a post's lifecycle status.
#[derive(Debug, Deserialize, Validate)]
pub struct ChangeStatusRequest {
    pub status: PostStatus,

    #[validate(length(max = 500))]
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SortOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Everything the post page renders.
#[derive(Debug, Serialize)]
pub struct PostDetailResponse {
    pub post: Post,
    pub images: Vec<ImageResponse>,
    pub user_vote: Option<VoteType>,
    pub comments: Vec<CommentNode>,
    pub current_sort: &'static str,
    pub available_sorts: Vec<SortOption>,
}

#[cfg(test)]
mod tests {
    use super::PostStatus::*;

    #[test]
    fn only_listed_transitions_are_allowed() {
        assert!(Open.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Open));
        assert!(Open.can_transition_to(Archived));
        assert!(Closed.can_transition_to(Archived));
        assert!(Archived.can_transition_to(Open));

        assert!(!Archived.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Open));
        assert!(!Archived.can_transition_to(Archived));
    }
}
