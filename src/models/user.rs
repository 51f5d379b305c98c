// src/models/user.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Forum role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Professor,
    Moderator,
    Administrator,
}

impl Role {
    /// `true` if this role is `min` or anything above it.
    pub fn at_least(self, min: Role) -> bool {
        self >= min
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Professor => "professor",
            Role::Moderator => "moderator",
            Role::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" | "user" => Ok(Role::Student),
            "professor" => Ok(Role::Professor),
            "moderator" => Ok(Role::Moderator),
            "administrator" | "admin" => Ok(Role::Administrator),
            other => Err(AppError::BadRequest(format!("Unknown role '{}'", other))),
        }
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub avatar_filename: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl User {
    pub fn avatar_url(&self) -> Option<String> {
        avatar_url(self.avatar_filename.as_deref())
    }

    pub fn viewer(&self) -> Viewer {
        Viewer {
            id: self.id,
            role: self.role,
        }
    }
}

pub fn avatar_url(filename: Option<&str>) -> Option<String> {
    filename.map(|f| format!("/uploads/avatars/{}", f))
}

/// Raw row shape; `role` is stored as text.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub avatar_filename: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| AppError::InternalServerError(format!("Bad role for user {}", row.id)))?;

        Ok(User {
            id: row.id,
            username: row.username,
            role,
            is_banned: row.is_banned,
            ban_reason: row.ban_reason,
            avatar_filename: row.avatar_filename,
            created_at: row.created_at,
        })
    }
}

/// Identity of whoever is making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub id: i64,
    pub role: Role,
}

impl Viewer {
    pub fn is_moderator(&self) -> bool {
        self.role.at_least(Role::Moderator)
    }
}

/// DTO for banning a user.
#[derive(Debug, Deserialize, Validate)]
pub struct BanUserRequest {
    #[validate(length(min = 1, max = 500, message = "A ban reason is required"))]
    pub reason: String,
}

/// DTO for changing a user's role. Accepts the legacy names too ("user", "admin").
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}
