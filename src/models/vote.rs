// src/models/vote.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Like,
    Dislike,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::Like => "like",
            VoteType::Dislike => "dislike",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(VoteType::Like),
            "dislike" => Ok(VoteType::Dislike),
            other => Err(AppError::BadRequest(format!("Invalid vote type '{}'", other))),
        }
    }
}

/// What a vote is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteTarget {
    Post,
    Comment,
}

/// Result of toggling a vote, given the voter's existing vote on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteToggle {
    Added,
    Changed,
    Removed,
}

impl VoteToggle {
    /// Same vote twice removes it; a different vote replaces it.
    pub fn resolve(existing: Option<VoteType>, requested: VoteType) -> Self {
        match existing {
            None => VoteToggle::Added,
            Some(current) if current == requested => VoteToggle::Removed,
            Some(_) => VoteToggle::Changed,
        }
    }

    /// The vote the voter holds once the toggle is applied.
    pub fn resulting_vote(self, requested: VoteType) -> Option<VoteType> {
        match self {
            VoteToggle::Removed => None,
            VoteToggle::Added | VoteToggle::Changed => Some(requested),
        }
    }
}

/// DTO for casting a vote.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    #[serde(rename = "type")]
    pub vote_type: VoteType,
}
