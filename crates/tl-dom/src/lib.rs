//! DOM tree data structures and the window that hosts them.

mod document;
mod window;

pub use document::Attribute;
pub use document::Document;
pub use document::NodeData;
pub use document::NodeId;
pub use window::ScrollPosition;
pub use window::Window;

/// A loaded page: its document plus the window state scripts act on.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub document: Document,
    pub window: Window,
}

impl Page {
    pub fn new(document: Document, location: &str) -> Self {
        Self {
            document,
            window: Window::new(location),
        }
    }
}
