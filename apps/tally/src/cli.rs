//! Command-line arguments.

use clap::Parser;
use clap::ValueEnum;
use std::path::PathBuf;
use tl_vote::VoteDirection;

/// Load a forum page, cast one vote through its vote form, and print the
/// reconciled state.
#[derive(Debug, Parser)]
#[command(name = "tally", version)]
pub struct Cli {
    /// Saved HTML of the page holding the vote forms.
    #[arg(long)]
    pub page: PathBuf,

    /// URL the page was served from; form actions resolve against it.
    #[arg(long)]
    pub location: String,

    /// Value of `data-post-id` on the control to activate.
    #[arg(long)]
    pub post: String,

    #[arg(long, value_enum)]
    pub vote: VoteArg,

    /// TOML file overriding controller defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Vertical scroll offset to start from, in CSS pixels.
    #[arg(long, default_value_t = 0.0)]
    pub scroll: f64,

    /// Permit plain HTTP to non-loopback hosts.
    #[arg(long)]
    pub allow_http: bool,

    /// Trust operating-system root certificates in addition to the bundled
    /// WebPKI roots.
    #[arg(long)]
    pub os_roots: bool,

    /// Connect and socket read/write timeout for the vote request.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// How long to wait for the server's reply.
    #[arg(long, default_value_t = 10_000)]
    pub wait_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VoteArg {
    Upvote,
    Downvote,
}

impl From<VoteArg> for VoteDirection {
    fn from(value: VoteArg) -> Self {
        match value {
            VoteArg::Upvote => Self::Upvote,
            VoteArg::Downvote => Self::Downvote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use super::VoteArg;
    use clap::Parser;

    #[test]
    fn parses_required_and_default_flags() {
        let cli = Cli::try_parse_from([
            "tally",
            "--page",
            "feed.html",
            "--location",
            "http://localhost:8000/",
            "--post",
            "1",
            "--vote",
            "downvote",
        ]);
        let cli = match cli {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(cli.vote, VoteArg::Downvote);
        assert_eq!(cli.wait_ms, 10_000);
        assert!(!cli.allow_http);
        assert!(!cli.os_roots);
        assert_eq!(cli.timeout_ms, 10_000);
        assert!(cli.config.is_none());
    }

    #[test]
    fn rejects_unknown_vote_kind() {
        let cli = Cli::try_parse_from([
            "tally", "--page", "p.html", "--location", "http://localhost/", "--post", "1", "--vote",
            "sideways",
        ]);
        assert!(cli.is_err());
    }
}
