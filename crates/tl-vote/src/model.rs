//! Vote targets, directions, and the server's reply payloads.

use serde::Deserialize;
use std::fmt;

/// Identifier of the post a vote control acts on (`data-post-id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostId(String);

impl PostId {
    /// Returns `None` for blank values.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic action of a vote control (`data-vote-type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDirection {
    Upvote,
    Downvote,
}

impl VoteDirection {
    pub const ALL: [Self; 2] = [Self::Upvote, Self::Downvote];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upvote" => Some(Self::Upvote),
            "downvote" => Some(Self::Downvote),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The voter's state after the server applied the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub enum UserVote {
    Downvoted,
    Neutral,
    Upvoted,
}

impl UserVote {
    /// The direction whose button should render as active, if any.
    pub fn active_direction(self) -> Option<VoteDirection> {
        match self {
            Self::Upvoted => Some(VoteDirection::Upvote),
            Self::Downvoted => Some(VoteDirection::Downvote),
            Self::Neutral => None,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Self::Downvoted => -1,
            Self::Neutral => 0,
            Self::Upvoted => 1,
        }
    }
}

impl TryFrom<i64> for UserVote {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Downvoted),
            0 => Ok(Self::Neutral),
            1 => Ok(Self::Upvoted),
            other => Err(format!("userVote must be -1, 0 or 1, got {other}")),
        }
    }
}

/// Authoritative vote state returned by a successful request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub total_votes: i64,
    pub user_vote: UserVote,
}

/// JSON body of a vote response. Both camelCase and the server's
/// snake_case spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct VotePayload {
    #[serde(default, rename = "totalVotes", alias = "total_votes")]
    pub total_votes: Option<i64>,
    #[serde(default, rename = "userVote", alias = "user_vote")]
    pub user_vote: Option<UserVote>,
    #[serde(default)]
    pub error: Option<String>,
}

/// JSON body of a `401` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct AuthPayload {
    #[serde(default, rename = "loginUrl", alias = "login_url")]
    pub login_url: Option<String>,
}
