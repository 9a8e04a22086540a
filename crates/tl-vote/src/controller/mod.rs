//! The vote submission controller.
//!
//! One controller serves one page. Forms become owned through
//! [`VoteController::attach`]; a submit on an owned form is turned into an
//! asynchronous `POST` and the reply, delivered later through
//! [`VoteController::pump`], is reconciled into the page.

use crate::config::VoteConfig;
use crate::error::VoteError;
use crate::locate::Locator;
use crate::locate::VoteTrigger;
use crate::model::PostId;
use crate::model::VoteDirection;
use crate::model::VoteOutcome;
use crate::notify::NoticeLevel;
use crate::notify::Notifier;
use crate::reconcile::apply_outcome;
use crate::response::interpret_response;
use crate::transport::RequestId;
use crate::transport::TransportReply;
use crate::transport::VoteTransport;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Instant;
use tl_core::TallyResult;
use tl_dom::Document;
use tl_dom::NodeId;
use tl_dom::Page;
use tl_dom::ScrollPosition;
use tl_net::FORM_URLENCODED;
use tl_net::FormBody;
use tl_net::HttpMethod;
use tl_net::HttpRequest;
use tl_net::NetStack;
use tl_net::RequestUrl;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

#[cfg(test)]
mod tests;

/// What became of a submit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDisposition {
    /// The form is not owned by this controller; native submission proceeds.
    NotHandled,
    Dispatched(RequestId),
    /// A request for this form is already in flight.
    Busy,
    /// Nothing was sent.
    Aborted(VoteError),
}

impl SubmitDisposition {
    pub fn default_prevented(&self) -> bool {
        !matches!(self, Self::NotHandled)
    }
}

/// How a completed request was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Reconciled(VoteOutcome),
    Failed(VoteError),
    /// The window was sent to the login page.
    Redirected(String),
    /// The reply matched no in-flight request and was dropped.
    Stale,
}

#[derive(Debug, Clone)]
struct InFlight {
    form: NodeId,
    trigger: NodeId,
    post_id: PostId,
    direction: VoteDirection,
    label: Vec<NodeId>,
    was_disabled: bool,
    scroll: ScrollPosition,
}

pub struct VoteController<T, N> {
    config: VoteConfig,
    net: NetStack,
    transport: T,
    notifier: N,
    owned_forms: HashSet<NodeId>,
    pending_forms: HashSet<NodeId>,
    in_flight: HashMap<RequestId, InFlight>,
    next_request_id: RequestId,
}

impl<T, N> VoteController<T, N>
where
    T: VoteTransport,
    N: Notifier,
{
    pub fn new(config: VoteConfig, net: NetStack, transport: T, notifier: N) -> Self {
        Self {
            config,
            net,
            transport,
            notifier,
            owned_forms: HashSet::new(),
            pending_forms: HashSet::new(),
            in_flight: HashMap::new(),
            next_request_id: 1,
        }
    }

    /// Takes ownership of every vote form at or below `root`. Returns how
    /// many forms were newly attached; forms already owned are skipped.
    pub fn attach(&mut self, page: &Page, root: NodeId) -> usize {
        let document = &page.document;
        let mut candidates = vec![root];
        candidates.extend(document.descendants(root));

        let before = self.owned_forms.len();
        for node in candidates {
            if document.is_element(node, "form") && document.has_class(node, &self.config.form_class) {
                self.owned_forms.insert(node);
            }
        }
        let attached = self.owned_forms.len() - before;
        debug!(attached, owned = self.owned_forms.len(), "vote forms attached");
        attached
    }

    pub fn owns(&self, form: NodeId) -> bool {
        self.owned_forms.contains(&form)
    }

    pub fn is_pending(&self, form: NodeId) -> bool {
        self.pending_forms.contains(&form)
    }

    pub fn has_pending(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Activates `button`: submits the form it belongs to with the button as
    /// submitter.
    pub fn click(&mut self, page: &mut Page, button: NodeId) -> SubmitDisposition {
        let form = page
            .document
            .closest(button, |doc, node| doc.is_element(node, "form"));
        match form {
            Some(form) => self.handle_submit(page, form, Some(button)),
            None => SubmitDisposition::NotHandled,
        }
    }

    pub fn handle_submit(
        &mut self,
        page: &mut Page,
        form: NodeId,
        submitter: Option<NodeId>,
    ) -> SubmitDisposition {
        if !self.owns(form) {
            return SubmitDisposition::NotHandled;
        }

        if self.is_pending(form) {
            debug!(form = form.index(), "vote already in flight for form");
            return SubmitDisposition::Busy;
        }

        let (trigger, vote, request) = {
            let locator = Locator::new(&page.document, &self.config);
            let trigger = match submitter.or_else(|| locator.default_trigger(form)) {
                Some(trigger) => trigger,
                None => {
                    return self.abort(
                        page,
                        VoteError::ClientContract("vote form has no control".to_owned()),
                    );
                }
            };
            let vote = match locator.read_trigger(trigger) {
                Ok(vote) => vote,
                Err(error) => return self.abort(page, error),
            };
            let request = match self.build_request(page, &locator, form, trigger) {
                Ok(request) => request,
                Err(error) => return self.abort(page, error),
            };
            (trigger, vote, request)
        };

        self.pending_forms.insert(form);
        let scroll = page.window.scroll_position();
        let was_disabled = page.document.is_disabled(trigger);
        let label = show_loading(&mut page.document, trigger, &self.config.loading_indicator);
        page.document.set_disabled(trigger, true);

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.saturating_add(1);
        let VoteTrigger { post_id, direction } = vote;
        debug!(
            request_id,
            post_id = %post_id,
            %direction,
            url = request.url.as_str(),
            "dispatching vote"
        );
        self.in_flight.insert(
            request_id,
            InFlight {
                form,
                trigger,
                post_id,
                direction,
                label,
                was_disabled,
                scroll,
            },
        );
        self.transport.dispatch(request_id, request);

        SubmitDisposition::Dispatched(request_id)
    }

    /// Resolves every reply the transport has ready. Returns how many were
    /// processed, stale ones included.
    pub fn pump(&mut self, page: &mut Page) -> usize {
        let replies = self.transport.drain_completed();
        let count = replies.len();
        for reply in replies {
            self.complete(page, reply);
        }
        count
    }

    pub fn complete(&mut self, page: &mut Page, reply: TransportReply) -> Resolution {
        let Some(flight) = self.in_flight.remove(&reply.request_id) else {
            debug!(request_id = reply.request_id, "dropping reply for unknown request");
            return Resolution::Stale;
        };

        self.pending_forms.remove(&flight.form);
        restore_trigger(&mut page.document, &flight);
        page.window.scroll_to(flight.scroll);

        let outcome = reply
            .result
            .map_err(VoteError::from)
            .and_then(|response| interpret_response(&response, page.window.location(), &self.config));

        match outcome {
            Ok(outcome) => {
                debug!(
                    request_id = reply.request_id,
                    post_id = %flight.post_id,
                    direction = %flight.direction,
                    total_votes = outcome.total_votes,
                    user_vote = outcome.user_vote.as_i8(),
                    "vote reconciled"
                );
                apply_outcome(&mut page.document, &self.config, &flight.post_id, outcome);
                Resolution::Reconciled(outcome)
            }
            Err(VoteError::AuthRequired { login_url }) => {
                info!(post_id = %flight.post_id, %login_url, "vote requires login, redirecting");
                page.window.navigate(&login_url);
                Resolution::Redirected(login_url)
            }
            Err(error) => {
                warn!(post_id = %flight.post_id, %error, "vote failed");
                if let Some(message) = error.notice_message() {
                    self.notifier
                        .show(&mut page.document, &message, NoticeLevel::Error);
                }
                Resolution::Failed(error)
            }
        }
    }

    /// Lets the notifier expire what it has shown.
    pub fn tick(&mut self, page: &mut Page, now: Instant) {
        self.notifier.tick(&mut page.document, now);
    }

    pub fn config(&self) -> &VoteConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    fn abort(&mut self, page: &mut Page, error: VoteError) -> SubmitDisposition {
        match &error {
            VoteError::ClientContract(_) => warn!(%error, "vote submit aborted"),
            _ => {
                warn!(%error, "vote request could not be built");
                if let Some(message) = error.notice_message() {
                    self.notifier
                        .show(&mut page.document, &message, NoticeLevel::Error);
                }
            }
        }
        SubmitDisposition::Aborted(error)
    }

    fn build_request(
        &self,
        page: &Page,
        locator: &Locator<'_>,
        form: NodeId,
        trigger: NodeId,
    ) -> Result<HttpRequest, VoteError> {
        let action = page
            .document
            .attribute(form, "action")
            .map(str::trim)
            .filter(|action| !action.is_empty())
            .ok_or_else(|| VoteError::ClientContract("vote form has no `action`".to_owned()))?;

        let body = collect_form_fields(&page.document, form, trigger).encode();
        let csrf_token = locator.csrf_token();

        let build = || -> TallyResult<HttpRequest> {
            let url = RequestUrl::resolve(page.window.location(), action)?;
            let mut builder = self
                .net
                .prepare(HttpMethod::Post, url)?
                .header("X-Requested-With", "XMLHttpRequest")?
                .header("Accept", "application/json")?
                .header("Content-Type", FORM_URLENCODED)?;
            if let Some(token) = csrf_token.as_deref() {
                builder = builder.header(&self.config.csrf_header, token)?;
            }
            builder.body(body.into_bytes()).build()
        };

        build().map_err(VoteError::from)
    }
}

/// Successful controls of `form`, in tree order. Submit buttons only count
/// when they are the submitter.
fn collect_form_fields(document: &Document, form: NodeId, submitter: NodeId) -> FormBody {
    let mut fields = FormBody::new();
    for node in document.descendants(form) {
        let Some(tag) = document.tag_name(node) else {
            continue;
        };
        if document.is_disabled(node) {
            continue;
        }
        let Some(name) = document.attribute(node, "name").filter(|name| !name.is_empty()) else {
            continue;
        };

        match tag {
            "input" => {
                let kind = document
                    .attribute(node, "type")
                    .unwrap_or("text")
                    .to_ascii_lowercase();
                let value = document.attribute(node, "value");
                match kind.as_str() {
                    "checkbox" | "radio" => {
                        if document.has_attribute(node, "checked") {
                            fields.append(name, value.unwrap_or("on"));
                        }
                    }
                    "submit" | "image" => {
                        if node == submitter {
                            fields.append(name, value.unwrap_or_default());
                        }
                    }
                    "button" | "reset" | "file" => {}
                    _ => fields.append(name, value.unwrap_or_default()),
                }
            }
            "button" if node == submitter => {
                fields.append(name, document.attribute(node, "value").unwrap_or_default());
            }
            "textarea" => fields.append(name, &document.text_content(node)),
            _ => {}
        }
    }
    fields
}

/// Swaps the trigger's children for the loading indicator and hands back the
/// original label nodes.
fn show_loading(document: &mut Document, trigger: NodeId, indicator: &str) -> Vec<NodeId> {
    let label = document.take_children(trigger);
    let loading = document.create_text(indicator);
    if let Err(error) = document.append_child(trigger, loading) {
        trace!(%error, "loading indicator not shown");
    }
    label
}

fn restore_trigger(document: &mut Document, flight: &InFlight) {
    if !document.contains(flight.trigger) {
        trace!(post_id = %flight.post_id, "vote control left the page before its reply");
        return;
    }
    if let Err(error) = document.replace_children(flight.trigger, flight.label.clone()) {
        trace!(%error, "vote control label not restored");
    }
    document.set_disabled(flight.trigger, flight.was_disabled);
}
