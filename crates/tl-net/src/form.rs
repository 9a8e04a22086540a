//! `application/x-www-form-urlencoded` request bodies.

use url::form_urlencoded;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Ordered list of form fields, as collected from a `<form>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    fields: Vec<(String, String)>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.fields.push((name.to_owned(), value.to_owned()));
    }

    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter())
            .finish()
    }
}
