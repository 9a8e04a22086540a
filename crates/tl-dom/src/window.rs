//! Browsing context state: location and scroll position.

use url::Url;

/// Scroll offset of the viewport in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

impl ScrollPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Window state observed and mutated by page scripts.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    location: String,
    scroll: ScrollPosition,
    last_navigation: Option<String>,
}

impl Window {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_owned(),
            scroll: ScrollPosition::default(),
            last_navigation: None,
        }
    }

    /// Current absolute location (`location.href`).
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn scroll_position(&self) -> ScrollPosition {
        self.scroll
    }

    pub fn scroll_to(&mut self, position: ScrollPosition) {
        self.scroll = ScrollPosition {
            x: position.x.max(0.0),
            y: position.y.max(0.0),
        };
    }

    /// Assigns `location.href`. Relative targets resolve against the current
    /// location; the raw target stays available via `last_navigation`.
    pub fn navigate(&mut self, href: &str) {
        if let Some(resolved) = resolve_location(&self.location, href) {
            self.location = resolved;
        } else {
            self.location = href.to_owned();
        }
        self.last_navigation = Some(href.to_owned());
    }

    pub fn last_navigation(&self) -> Option<&str> {
        self.last_navigation.as_deref()
    }
}

fn resolve_location(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|resolved| resolved.to_string())
}
