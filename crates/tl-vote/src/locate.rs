//! Lookups from vote identity to page elements. Every lookup yields `None`
//! when the page lacks the node.

use crate::config::VoteConfig;
use crate::error::VoteError;
use crate::model::PostId;
use crate::model::VoteDirection;
use tl_dom::Document;
use tl_dom::NodeId;

/// Identity carried by the control that triggered a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTrigger {
    pub post_id: PostId,
    pub direction: VoteDirection,
}

#[derive(Debug, Clone, Copy)]
pub struct Locator<'a> {
    document: &'a Document,
    config: &'a VoteConfig,
}

impl<'a> Locator<'a> {
    pub fn new(document: &'a Document, config: &'a VoteConfig) -> Self {
        Self { document, config }
    }

    /// Element mirroring the post's vote total (`#vote-count-<id>`).
    pub fn counter(&self, post_id: &PostId) -> Option<NodeId> {
        let element_id = format!("{}{}", self.config.counter_id_prefix, post_id);
        self.document.element_by_id(&element_id)
    }

    pub fn button(&self, post_id: &PostId, direction: VoteDirection) -> Option<NodeId> {
        let doc = self.document;
        doc.find_descendant(doc.root(), |doc, node| {
            doc.attribute(node, &self.config.post_id_attribute)
                .and_then(PostId::parse)
                .is_some_and(|candidate| candidate == *post_id)
                && doc
                    .attribute(node, &self.config.vote_type_attribute)
                    .and_then(VoteDirection::parse)
                    == Some(direction)
        })
    }

    /// Page-level anti-forgery token: value of the first element named
    /// after the configured field.
    pub fn csrf_token(&self) -> Option<String> {
        let doc = self.document;
        doc.find_descendant(doc.root(), |doc, node| {
            doc.attribute(node, "name") == Some(self.config.csrf_field.as_str())
        })
        .and_then(|node| doc.attribute(node, "value"))
        .map(str::to_owned)
    }

    /// Control inside `form` that stands in for the submitter when the
    /// event does not name one.
    pub fn default_trigger(&self, form: NodeId) -> Option<NodeId> {
        let doc = self.document;
        doc.find_descendant(form, |doc, node| {
            doc.has_attribute(node, &self.config.post_id_attribute)
        })
        .or_else(|| doc.first_descendant_by_tag(form, "button"))
    }

    pub fn read_trigger(&self, control: NodeId) -> Result<VoteTrigger, VoteError> {
        let post_id = self
            .document
            .attribute(control, &self.config.post_id_attribute)
            .and_then(PostId::parse)
            .ok_or_else(|| {
                VoteError::ClientContract(format!(
                    "vote control has no `{}`",
                    self.config.post_id_attribute
                ))
            })?;

        let direction = self
            .document
            .attribute(control, &self.config.vote_type_attribute)
            .and_then(VoteDirection::parse)
            .ok_or_else(|| {
                VoteError::ClientContract(format!(
                    "vote control for post {post_id} has no valid `{}`",
                    self.config.vote_type_attribute
                ))
            })?;

        Ok(VoteTrigger { post_id, direction })
    }
}

#[cfg(test)]
mod tests {
    use super::Locator;
    use crate::config::VoteConfig;
    use crate::error::VoteError;
    use crate::model::PostId;
    use crate::model::VoteDirection;
    use tl_html::HtmlParser;

    const PAGE: &str = r#"
        <body>
          <input type="hidden" name="csrfmiddlewaretoken" value="page-token">
          <button data-post-id="1" data-vote-type="upvote" id="up-1">+</button>
          <span id="vote-count-1"><strong>3</strong></span>
          <button data-post-id="1" data-vote-type="downvote" id="down-1">-</button>
          <button data-post-id="12" data-vote-type="upvote" id="up-12">+</button>
          <button id="broken" data-vote-type="upvote">?</button>
        </body>
    "#;

    fn post(raw: &str) -> PostId {
        match PostId::parse(raw) {
            Some(id) => id,
            None => panic!("blank post id"),
        }
    }

    #[test]
    fn finds_counter_and_buttons_by_post() {
        let doc = HtmlParser.parse(PAGE);
        let config = VoteConfig::default();
        let locator = Locator::new(&doc, &config);

        assert_eq!(locator.counter(&post("1")), doc.element_by_id("vote-count-1"));
        assert_eq!(
            locator.button(&post("1"), VoteDirection::Downvote),
            doc.element_by_id("down-1")
        );
        assert_eq!(
            locator.button(&post("12"), VoteDirection::Upvote),
            doc.element_by_id("up-12")
        );
    }

    #[test]
    fn missing_nodes_yield_none() {
        let doc = HtmlParser.parse(PAGE);
        let config = VoteConfig::default();
        let locator = Locator::new(&doc, &config);

        assert_eq!(locator.counter(&post("99")), None);
        assert_eq!(locator.button(&post("12"), VoteDirection::Downvote), None);
    }

    #[test]
    fn reads_page_level_csrf_token() {
        let doc = HtmlParser.parse(PAGE);
        let config = VoteConfig::default();
        assert_eq!(Locator::new(&doc, &config).csrf_token().as_deref(), Some("page-token"));
    }

    #[test]
    fn trigger_without_post_id_is_a_contract_error() {
        let doc = HtmlParser.parse(PAGE);
        let config = VoteConfig::default();
        let broken = match doc.element_by_id("broken") {
            Some(node) => node,
            None => panic!("fixture missing"),
        };

        let read = Locator::new(&doc, &config).read_trigger(broken);
        assert!(matches!(read, Err(VoteError::ClientContract(_))));
    }
}
