//! Classification of a vote endpoint reply.

use crate::config::VoteConfig;
use crate::error::VoteError;
use crate::model::AuthPayload;
use crate::model::VoteOutcome;
use crate::model::VotePayload;
use tl_net::HttpResponse;
use tl_net::HttpStatusCode;
use url::form_urlencoded;

/// Maps a reply to the vote state it carries, or to the failure it
/// represents. `location` is the page URL, used to build the default login
/// redirect.
pub fn interpret_response(
    response: &HttpResponse,
    location: &str,
    config: &VoteConfig,
) -> Result<VoteOutcome, VoteError> {
    if response.status == HttpStatusCode::UNAUTHORIZED {
        let login_url = serde_json::from_slice::<AuthPayload>(&response.body)
            .ok()
            .and_then(|payload| payload.login_url)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_login_url(location, config));
        return Err(VoteError::AuthRequired { login_url });
    }

    if !response.status.is_success() {
        return Err(VoteError::Transport(format!(
            "HTTP error! status: {}",
            response.status.as_u16()
        )));
    }

    let payload: VotePayload = serde_json::from_slice(&response.body)
        .map_err(|error| VoteError::Transport(format!("malformed vote response: {error}")))?;

    if let Some(message) = payload.error {
        return Err(VoteError::Application(message));
    }

    match (payload.total_votes, payload.user_vote) {
        (Some(total_votes), Some(user_vote)) => Ok(VoteOutcome {
            total_votes,
            user_vote,
        }),
        _ => Err(VoteError::Transport(
            "vote response is missing `totalVotes` or `userVote`".to_owned(),
        )),
    }
}

/// `<login_path>?next=<location>`, with the location form-encoded.
pub fn default_login_url(location: &str, config: &VoteConfig) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair(&config.login_next_param, location)
        .finish();
    format!("{}?{query}", config.login_path)
}
