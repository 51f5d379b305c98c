use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'images' table. An image belongs to either a post or a comment.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub user_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Image {
    pub fn url(&self) -> String {
        format!("/uploads/posts/{}", self.filename)
    }
}

/// Image as handed to clients, with its public URL resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResponse {
    #[serde(flatten)]
    pub image: Image,
    pub url: String,
}

impl From<Image> for ImageResponse {
    fn from(image: Image) -> Self {
        let url = image.url();
        Self { image, url }
    }
}
