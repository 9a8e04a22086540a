//! Asynchronous vote submission for forum pages.
//!
//! A [`VoteController`] intercepts submits on vote forms, sends the vote
//! through a [`VoteTransport`], and rewrites the post's counter and button
//! styling from the server's reply. At most one request per form is in
//! flight; the page never computes vote totals itself.

pub mod config;
pub mod controller;
pub mod error;
pub mod locate;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod response;
pub mod transport;

pub use config::ButtonClasses;
pub use config::VoteConfig;
pub use controller::Resolution;
pub use controller::SubmitDisposition;
pub use controller::VoteController;
pub use error::VoteError;
pub use locate::Locator;
pub use locate::VoteTrigger;
pub use model::PostId;
pub use model::UserVote;
pub use model::VoteDirection;
pub use model::VoteOutcome;
pub use notify::NoticeLevel;
pub use notify::Notifier;
pub use notify::ToastNotifier;
pub use transport::RequestId;
pub use transport::ThreadedTransport;
pub use transport::TransportReply;
pub use transport::VoteTransport;
