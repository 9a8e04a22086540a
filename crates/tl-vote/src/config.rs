//! Controller configuration.
//!
//! Every field has a default matching the forum templates, so a config file
//! only needs the keys it overrides:
//!
//! ```toml
//! loading-indicator = "..."
//! notice-ttl-ms = 5000
//!
//! [upvote]
//! active = "btn-primary"
//! inactive = "btn-outline-primary"
//! ```

use crate::model::VoteDirection;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tl_core::TallyError;
use tl_core::TallyResult;
use tl_net::Header;

/// CSS classes toggled on one direction's button.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ButtonClasses {
    pub active: String,
    pub inactive: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct VoteConfig {
    /// Class marking forms the controller intercepts.
    pub form_class: String,
    pub post_id_attribute: String,
    pub vote_type_attribute: String,
    /// Counter element id is this prefix followed by the post id.
    pub counter_id_prefix: String,
    /// Nested element that receives the count when present.
    pub counter_emphasis_tag: String,
    pub loading_indicator: String,
    pub upvote: ButtonClasses,
    pub downvote: ButtonClasses,
    /// Name of the hidden input holding the anti-forgery token.
    pub csrf_field: String,
    pub csrf_header: String,
    pub login_path: String,
    pub login_next_param: String,
    pub notice_ttl_ms: u64,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            form_class: "vote-form".to_owned(),
            post_id_attribute: "data-post-id".to_owned(),
            vote_type_attribute: "data-vote-type".to_owned(),
            counter_id_prefix: "vote-count-".to_owned(),
            counter_emphasis_tag: "strong".to_owned(),
            loading_indicator: "\u{23f3}".to_owned(),
            upvote: ButtonClasses {
                active: "btn-success".to_owned(),
                inactive: "btn-outline-success".to_owned(),
            },
            downvote: ButtonClasses {
                active: "btn-danger".to_owned(),
                inactive: "btn-outline-danger".to_owned(),
            },
            csrf_field: "csrfmiddlewaretoken".to_owned(),
            csrf_header: "X-CSRFToken".to_owned(),
            login_path: "/users/login/".to_owned(),
            login_next_param: "next".to_owned(),
            notice_ttl_ms: 3000,
        }
    }
}

impl VoteConfig {
    pub fn from_toml_str(input: &str) -> TallyResult<Self> {
        let config: Self = toml::from_str(input).map_err(|error| {
            TallyError::new("vote.config_parse_failed", format!("invalid config: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> TallyResult<Self> {
        let contents = fs::read_to_string(path).map_err(|error| {
            TallyError::new(
                "vote.config_read_failed",
                format!("failed to read {}: {error}", path.display()),
            )
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> TallyResult<()> {
        let required = [
            ("form-class", &self.form_class),
            ("post-id-attribute", &self.post_id_attribute),
            ("vote-type-attribute", &self.vote_type_attribute),
            ("counter-id-prefix", &self.counter_id_prefix),
            ("counter-emphasis-tag", &self.counter_emphasis_tag),
            ("upvote.active", &self.upvote.active),
            ("upvote.inactive", &self.upvote.inactive),
            ("downvote.active", &self.downvote.active),
            ("downvote.inactive", &self.downvote.inactive),
            ("csrf-field", &self.csrf_field),
            ("login-path", &self.login_path),
            ("login-next-param", &self.login_next_param),
        ];

        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(TallyError::new(
                "vote.config_invalid",
                format!("`{key}` must not be empty"),
            ));
        }

        for classes in [&self.upvote, &self.downvote] {
            if classes.active.contains(char::is_whitespace)
                || classes.inactive.contains(char::is_whitespace)
            {
                return Err(TallyError::new(
                    "vote.config_invalid",
                    "button classes must be single class names",
                ));
            }
        }

        Header::new(&self.csrf_header, "").map_err(|error| {
            TallyError::new(
                "vote.config_invalid",
                format!("`csrf-header` is not a valid header name: {}", error.message),
            )
        })?;

        if self.notice_ttl_ms == 0 {
            return Err(TallyError::new(
                "vote.config_invalid",
                "`notice-ttl-ms` must be greater than zero",
            ));
        }

        Ok(())
    }

    pub fn button_classes(&self, direction: VoteDirection) -> &ButtonClasses {
        match direction {
            VoteDirection::Upvote => &self.upvote,
            VoteDirection::Downvote => &self.downvote,
        }
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }
}
