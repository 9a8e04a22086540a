//! User-visible notifications.

use std::time::Duration;
use std::time::Instant;
use tl_dom::Document;
use tl_dom::NodeId;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

impl NoticeLevel {
    pub fn alert_class(self) -> &'static str {
        match self {
            Self::Info => "alert-info",
            Self::Success => "alert-success",
            Self::Error => "alert-danger",
        }
    }
}

/// Sink for transient messages. Implementations own the dismissal of what
/// they show; `tick` is called from the event loop with the current time.
pub trait Notifier {
    fn show(&mut self, document: &mut Document, message: &str, level: NoticeLevel);

    fn tick(&mut self, _document: &mut Document, _now: Instant) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Toast {
    node: NodeId,
    level: NoticeLevel,
    message: String,
    expires_at: Instant,
}

/// Renders each notice as a fixed-position alert appended to `<body>` and
/// removes it once its time-to-live has passed.
#[derive(Debug, Clone)]
pub struct ToastNotifier {
    ttl: Duration,
    live: Vec<Toast>,
}

impl ToastNotifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            live: Vec::new(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Messages currently on screen, oldest first.
    pub fn live_messages(&self) -> Vec<(NoticeLevel, &str)> {
        self.live
            .iter()
            .map(|toast| (toast.level, toast.message.as_str()))
            .collect()
    }
}

impl Notifier for ToastNotifier {
    fn show(&mut self, document: &mut Document, message: &str, level: NoticeLevel) {
        let alert = document.create_element("div");
        document.set_attribute(
            alert,
            "class",
            &format!(
                "alert {} alert-dismissible fade show position-fixed",
                level.alert_class()
            ),
        );
        document.set_attribute(alert, "role", "alert");
        let text = document.create_text(message);

        let host = document.body().unwrap_or(document.root());
        let attached = document
            .append_child(alert, text)
            .and_then(|()| document.append_child(host, alert));
        if let Err(error) = attached {
            trace!(%error, "notification could not be attached");
            return;
        }

        self.live.push(Toast {
            node: alert,
            level,
            message: message.to_owned(),
            expires_at: Instant::now() + self.ttl,
        });
    }

    fn tick(&mut self, document: &mut Document, now: Instant) {
        self.live.retain(|toast| {
            if !document.contains(toast.node) {
                return false;
            }
            if now >= toast.expires_at {
                document.detach(toast.node);
                return false;
            }
            true
        });
    }
}
