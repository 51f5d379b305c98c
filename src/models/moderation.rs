use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::AppError,
    models::post::PostStatus,
};

/// Privileged action recorded in the moderation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    ClosePost,
    ReopenPost,
    ArchivePost,
    Delete,
    Ban,
    Unban,
    Promote,
}

impl ModerationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationAction::ClosePost => "close_post",
            ModerationAction::ReopenPost => "reopen_post",
            ModerationAction::ArchivePost => "archive_post",
            ModerationAction::Delete => "delete",
            ModerationAction::Ban => "ban",
            ModerationAction::Unban => "unban",
            ModerationAction::Promote => "promote",
        }
    }

    /// Log action for a status change ending in `status`.
    pub fn for_status(status: PostStatus) -> Self {
        match status {
            PostStatus::Open => ModerationAction::ReopenPost,
            PostStatus::Closed => ModerationAction::ClosePost,
            PostStatus::Archived => ModerationAction::ArchivePost,
        }
    }
}

impl FromStr for ModerationAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "close_post" => Ok(ModerationAction::ClosePost),
            "reopen_post" => Ok(ModerationAction::ReopenPost),
            "archive_post" => Ok(ModerationAction::ArchivePost),
            "delete" => Ok(ModerationAction::Delete),
            "ban" => Ok(ModerationAction::Ban),
            "unban" => Ok(ModerationAction::Unban),
            "promote" => Ok(ModerationAction::Promote),
            other => Err(AppError::InternalServerError(format!(
                "Unknown moderation action '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
    User,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Post => "post",
            TargetKind::Comment => "comment",
            TargetKind::User => "user",
        }
    }
}

impl FromStr for TargetKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(TargetKind::Post),
            "comment" => Ok(TargetKind::Comment),
            "user" => Ok(TargetKind::User),
            other => Err(AppError::InternalServerError(format!(
                "Unknown moderation target '{}'",
                other
            ))),
        }
    }
}

/// Represents the append-only 'moderation_logs' table.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationLog {
    pub id: i64,
    pub moderator_id: i64,
    pub action_type: ModerationAction,
    pub target_type: TargetKind,
    pub target_id: i64,
    pub reason: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, FromRow)]
pub struct ModerationLogRow {
    pub id: i64,
    pub moderator_id: i64,
    pub action_type: String,
    pub target_type: String,
    pub target_id: i64,
    pub reason: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<ModerationLogRow> for ModerationLog {
    type Error = AppError;

    fn try_from(row: ModerationLogRow) -> Result<Self, Self::Error> {
        Ok(ModerationLog {
            id: row.id,
            moderator_id: row.moderator_id,
            action_type: row.action_type.parse()?,
            target_type: row.target_type.parse()?,
            target_id: row.target_id,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

/// A log entry waiting to be appended.
#[derive(Debug, Clone)]
pub struct NewModerationLog {
    pub moderator_id: i64,
    pub action_type: ModerationAction,
    pub target_type: TargetKind,
    pub target_id: i64,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModerationLogParams {
    /// Default 50, max 200.
    pub limit: Option<i64>,
}
