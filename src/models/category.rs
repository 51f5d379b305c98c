use serde::Serialize;
use sqlx::FromRow;

/// Categories every fresh database starts with, in id order.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Mathematics", "Algebra, analysis, geometry and statistics"),
    ("Physics", "Mechanics, electromagnetism and thermodynamics"),
    ("Chemistry", "General, organic and physical chemistry"),
    ("Computer Science", "Programming, algorithms and systems"),
    ("General", "Anything that fits nowhere else"),
];

/// Represents the 'categories' table, with the number of listed posts.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Archived posts are not counted.
    pub post_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
