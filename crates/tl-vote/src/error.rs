//! Failure taxonomy for a vote submission.

use tl_core::TallyError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    /// The page markup lacks something the controller needs (post id,
    /// direction, form action). Logged only.
    #[error("vote control contract violated: {0}")]
    ClientContract(String),
    /// The request could not complete or its reply could not be understood.
    #[error("vote request failed: {0}")]
    Transport(String),
    /// The server answered with an `error` field.
    #[error("server rejected vote: {0}")]
    Application(String),
    /// The server asked for a login (`401`).
    #[error("authentication required, redirecting to `{login_url}`")]
    AuthRequired { login_url: String },
}

impl VoteError {
    /// Text shown to the user, or `None` for failures that are not surfaced
    /// as a notification.
    pub fn notice_message(&self) -> Option<String> {
        match self {
            Self::ClientContract(_) | Self::AuthRequired { .. } => None,
            Self::Transport(_) => Some("An error occurred while voting. Please try again.".to_owned()),
            Self::Application(message) if message.trim().is_empty() => {
                Some("Your vote could not be recorded.".to_owned())
            }
            Self::Application(message) => Some(message.clone()),
        }
    }
}

impl From<TallyError> for VoteError {
    fn from(error: TallyError) -> Self {
        Self::Transport(error.to_string())
    }
}
