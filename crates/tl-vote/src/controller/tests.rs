use super::Resolution;
use super::SubmitDisposition;
use super::VoteController;
use crate::config::VoteConfig;
use crate::error::VoteError;
use crate::model::UserVote;
use crate::model::VoteOutcome;
use crate::notify::NoticeLevel;
use crate::notify::Notifier;
use crate::notify::ToastNotifier;
use crate::transport::RequestId;
use crate::transport::ThreadedTransport;
use crate::transport::TransportReply;
use crate::transport::VoteTransport;
use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use tl_core::TallyError;
use tl_dom::Document;
use tl_dom::NodeId;
use tl_dom::Page;
use tl_dom::ScrollPosition;
use tl_html::HtmlParser;
use tl_net::HttpRequest;
use tl_net::HttpResponse;
use tl_net::HttpStatusCode;
use tl_net::NetStack;
use tl_net::TransportPolicy;

const LOCATION: &str = "https://forum.example/posts/";

const FEED: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <input type="hidden" name="csrfmiddlewaretoken" value="tok123">
    <div class="card" id="post-1">
      <form class="vote-form" id="up-form" method="post" action="/posts/1/vote/upvote/">
        <input type="hidden" name="csrfmiddlewaretoken" value="tok123">
        <button type="submit" class="btn btn-sm btn-outline-success" data-post-id="1" data-vote-type="upvote" id="up-1">&#9650;</button>
      </form>
      <span id="vote-count-1"><strong>3</strong></span>
      <form class="vote-form" id="down-form" method="post" action="/posts/1/vote/downvote/">
        <input type="hidden" name="csrfmiddlewaretoken" value="tok123">
        <button type="submit" class="btn btn-sm btn-outline-danger" data-post-id="1" data-vote-type="downvote" id="down-1">&#9660;</button>
      </form>
    </div>
    <form class="vote-form" id="broken-form" method="post" action="/posts/2/vote/upvote/">
      <button type="submit" data-vote-type="upvote" id="broken">?</button>
    </form>
    <form class="vote-form" id="no-action-form" method="post">
      <button type="submit" data-post-id="3" data-vote-type="upvote" id="no-action">+</button>
    </form>
    <form id="search" action="/search/">
      <input name="q" value="rust">
      <button id="search-go">Go</button>
    </form>
  </body>
</html>"#;

#[derive(Debug, Default)]
struct ScriptedTransport {
    dispatched: Vec<(RequestId, HttpRequest)>,
    ready: Vec<TransportReply>,
}

impl ScriptedTransport {
    fn respond(&mut self, request_id: RequestId, status: u16, body: &str) {
        let status = match HttpStatusCode::new(status) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        self.ready.push(TransportReply {
            request_id,
            result: Ok(HttpResponse::new(status, body)),
        });
    }

    fn fail(&mut self, request_id: RequestId) {
        self.ready.push(TransportReply {
            request_id,
            result: Err(TallyError::new(
                "net.transport.connect_failed",
                "connection refused",
            )),
        });
    }
}

impl VoteTransport for ScriptedTransport {
    fn dispatch(&mut self, request_id: RequestId, request: HttpRequest) {
        self.dispatched.push((request_id, request));
    }

    fn drain_completed(&mut self) -> Vec<TransportReply> {
        std::mem::take(&mut self.ready)
    }
}

#[derive(Debug, Default)]
struct RecordingNotifier {
    shown: Vec<(NoticeLevel, String)>,
}

impl Notifier for RecordingNotifier {
    fn show(&mut self, _document: &mut Document, message: &str, level: NoticeLevel) {
        self.shown.push((level, message.to_owned()));
    }
}

type TestController = VoteController<ScriptedTransport, RecordingNotifier>;

fn setup() -> (Page, TestController) {
    setup_with(LOCATION, NetStack::default())
}

fn setup_with(location: &str, net: NetStack) -> (Page, TestController) {
    let page = Page::new(HtmlParser.parse(FEED), location);
    let mut controller = VoteController::new(
        VoteConfig::default(),
        net,
        ScriptedTransport::default(),
        RecordingNotifier::default(),
    );
    controller.attach(&page, page.document.root());
    (page, controller)
}

fn node(page: &Page, id: &str) -> NodeId {
    match page.document.element_by_id(id) {
        Some(node) => node,
        None => panic!("missing #{id}"),
    }
}

fn counter_text(page: &Page) -> String {
    page.document.text_content(node(page, "vote-count-1"))
}

fn dispatched_id(disposition: SubmitDisposition) -> RequestId {
    match disposition {
        SubmitDisposition::Dispatched(id) => id,
        other => panic!("expected a dispatch, got {other:?}"),
    }
}

fn vote(page: &mut Page, controller: &mut TestController, button: &str, status: u16, body: &str) {
    let button = node(page, button);
    let id = dispatched_id(controller.click(page, button));
    controller.transport_mut().respond(id, status, body);
    assert_eq!(controller.pump(page), 1);
}

#[test]
fn attach_owns_vote_forms_once() {
    let (page, mut controller) = setup();
    assert!(controller.owns(node(&page, "up-form")));
    assert!(controller.owns(node(&page, "down-form")));
    assert!(!controller.owns(node(&page, "search")));
    assert_eq!(controller.attach(&page, page.document.root()), 0);
}

#[test]
fn attach_accepts_the_form_itself_as_root() {
    let page = Page::new(HtmlParser.parse(FEED), LOCATION);
    let mut controller = VoteController::new(
        VoteConfig::default(),
        NetStack::default(),
        ScriptedTransport::default(),
        RecordingNotifier::default(),
    );
    assert_eq!(controller.attach(&page, node(&page, "up-form")), 1);
    assert!(!controller.owns(node(&page, "down-form")));
}

#[test]
fn upvote_then_downvote_reconciles_from_server_state() {
    let (mut page, mut controller) = setup();

    vote(&mut page, &mut controller, "up-1", 200, r#"{"totalVotes": 5, "userVote": 1}"#);
    let up = node(&page, "up-1");
    let down = node(&page, "down-1");
    assert_eq!(counter_text(&page), "5");
    assert!(page.document.has_class(up, "btn-success"));
    assert!(!page.document.has_class(up, "btn-outline-success"));
    assert!(page.document.has_class(down, "btn-outline-danger"));

    vote(&mut page, &mut controller, "down-1", 200, r#"{"totalVotes": 4, "userVote": -1}"#);
    assert_eq!(counter_text(&page), "4");
    assert!(page.document.has_class(down, "btn-danger"));
    assert!(!page.document.has_class(down, "btn-outline-danger"));
    assert!(page.document.has_class(up, "btn-outline-success"));
    assert!(!page.document.has_class(up, "btn-success"));

    vote(&mut page, &mut controller, "down-1", 500, "");
    assert_eq!(counter_text(&page), "4");
    assert!(page.document.has_class(down, "btn-danger"));
    assert_eq!(
        controller.notifier().shown,
        vec![(
            NoticeLevel::Error,
            "An error occurred while voting. Please try again.".to_owned()
        )]
    );
}

#[test]
fn unauthorized_reply_redirects_without_notification() {
    let (mut page, mut controller) = setup();
    let button = node(&page, "up-1");
    let id = dispatched_id(controller.click(&mut page, button));
    controller
        .transport_mut()
        .respond(id, 401, r#"{"loginUrl": "/login?next=/posts/1/"}"#);

    let replies = controller.transport_mut().drain_completed();
    let mut resolutions = Vec::new();
    for reply in replies {
        resolutions.push(controller.complete(&mut page, reply));
    }

    assert_eq!(
        resolutions,
        vec![Resolution::Redirected("/login?next=/posts/1/".to_owned())]
    );
    assert_eq!(page.window.last_navigation(), Some("/login?next=/posts/1/"));
    assert_eq!(page.window.location(), "https://forum.example/login?next=/posts/1/");
    assert!(controller.notifier().shown.is_empty());
    assert!(!page.document.is_disabled(button));
}

#[test]
fn unauthorized_reply_without_login_url_uses_default_login_page() {
    let (mut page, mut controller) = setup();
    vote(&mut page, &mut controller, "up-1", 401, "{}");
    assert_eq!(
        page.window.last_navigation(),
        Some("/users/login/?next=https%3A%2F%2Fforum.example%2Fposts%2F")
    );
}

#[test]
fn rapid_double_submit_sends_one_request() {
    let (mut page, mut controller) = setup();
    let form = node(&page, "up-form");
    let button = node(&page, "up-1");

    let first = controller.handle_submit(&mut page, form, Some(button));
    let second = controller.handle_submit(&mut page, form, Some(button));

    assert!(matches!(first, SubmitDisposition::Dispatched(_)));
    assert_eq!(second, SubmitDisposition::Busy);
    assert!(second.default_prevented());
    assert_eq!(controller.transport().dispatched.len(), 1);
    assert!(controller.is_pending(form));
}

#[test]
fn other_forms_may_vote_while_one_is_pending() {
    let (mut page, mut controller) = setup();
    let up = node(&page, "up-1");
    let down = node(&page, "down-1");

    assert!(matches!(controller.click(&mut page, up), SubmitDisposition::Dispatched(_)));
    assert!(matches!(controller.click(&mut page, down), SubmitDisposition::Dispatched(_)));
    assert_eq!(controller.transport().dispatched.len(), 2);
}

#[test]
fn control_without_post_id_sends_nothing_and_leaves_page_untouched() {
    let (mut page, mut controller) = setup();
    let before = page.document.clone();
    let form = node(&page, "broken-form");

    let disposition = controller.handle_submit(&mut page, form, None);

    assert!(matches!(
        disposition,
        SubmitDisposition::Aborted(VoteError::ClientContract(_))
    ));
    assert!(disposition.default_prevented());
    assert!(controller.transport().dispatched.is_empty());
    assert!(controller.notifier().shown.is_empty());
    assert!(!controller.is_pending(form));
    assert_eq!(page.document, before);
}

#[test]
fn form_without_action_is_a_contract_error() {
    let (mut page, mut controller) = setup();
    let button = node(&page, "no-action");
    let disposition = controller.click(&mut page, button);
    assert!(matches!(
        disposition,
        SubmitDisposition::Aborted(VoteError::ClientContract(_))
    ));
    assert!(controller.transport().dispatched.is_empty());
}

#[test]
fn unowned_form_is_not_intercepted() {
    let (mut page, mut controller) = setup();
    let button = node(&page, "search-go");
    let disposition = controller.click(&mut page, button);
    assert_eq!(disposition, SubmitDisposition::NotHandled);
    assert!(!disposition.default_prevented());
    assert!(controller.transport().dispatched.is_empty());
}

#[test]
fn trigger_shows_loading_state_until_reply_then_restores() {
    let (mut page, mut controller) = setup();
    let button = node(&page, "up-1");
    let label = page.document.text_content(button);

    let id = dispatched_id(controller.click(&mut page, button));
    assert_eq!(page.document.text_content(button), "\u{23f3}");
    assert!(page.document.is_disabled(button));
    assert!(controller.has_pending());

    controller.transport_mut().respond(id, 200, r#"{"totalVotes": 4, "userVote": 1}"#);
    controller.pump(&mut page);

    assert_eq!(page.document.text_content(button), label);
    assert!(!page.document.is_disabled(button));
    assert!(!controller.has_pending());
}

#[test]
fn trigger_is_restored_after_every_kind_of_failure() {
    let replies: [(u16, &str); 4] = [
        (500, ""),
        (200, "not json"),
        (200, r#"{"error": "Post not found"}"#),
        (401, ""),
    ];
    for (status, body) in replies {
        let (mut page, mut controller) = setup();
        let button = node(&page, "up-1");
        let label = page.document.text_content(button);

        vote(&mut page, &mut controller, "up-1", status, body);

        assert_eq!(page.document.text_content(button), label, "status {status}");
        assert!(!page.document.is_disabled(button), "status {status}");
        assert!(!controller.is_pending(node(&page, "up-form")));
    }

    let (mut page, mut controller) = setup();
    let button = node(&page, "up-1");
    let id = dispatched_id(controller.click(&mut page, button));
    controller.transport_mut().fail(id);
    controller.pump(&mut page);
    assert!(!page.document.is_disabled(button));
    assert_eq!(controller.notifier().shown.len(), 1);
}

#[test]
fn application_error_shows_server_message() {
    let (mut page, mut controller) = setup();
    vote(&mut page, &mut controller, "up-1", 200, r#"{"error": "Post not found"}"#);
    assert_eq!(counter_text(&page), "3");
    assert_eq!(
        controller.notifier().shown,
        vec![(NoticeLevel::Error, "Post not found".to_owned())]
    );
}

#[test]
fn scroll_offset_is_restored_on_completion() {
    let (mut page, mut controller) = setup();
    page.window.scroll_to(ScrollPosition::new(0.0, 640.0));
    let button = node(&page, "up-1");
    let id = dispatched_id(controller.click(&mut page, button));

    page.window.scroll_to(ScrollPosition::new(0.0, 0.0));
    controller.transport_mut().respond(id, 200, r#"{"totalVotes": 4, "userVote": 1}"#);
    controller.pump(&mut page);

    assert_eq!(page.window.scroll_position(), ScrollPosition::new(0.0, 640.0));
}

#[test]
fn replies_for_unknown_requests_are_stale() {
    let (mut page, mut controller) = setup();
    let before = page.document.clone();
    let reply = TransportReply {
        request_id: 42,
        result: Ok(HttpResponse::new(HttpStatusCode::OK, r#"{"totalVotes": 9, "userVote": 1}"#)),
    };
    assert_eq!(controller.complete(&mut page, reply.clone()), Resolution::Stale);
    assert_eq!(page.document, before);

    let button = node(&page, "up-1");
    let id = dispatched_id(controller.click(&mut page, button));
    let reconciled = TransportReply { request_id: id, ..reply };
    assert_eq!(
        controller.complete(&mut page, reconciled.clone()),
        Resolution::Reconciled(VoteOutcome {
            total_votes: 9,
            user_vote: UserVote::Upvoted
        })
    );
    assert_eq!(controller.complete(&mut page, reconciled), Resolution::Stale);
}

#[test]
fn request_carries_ajax_headers_csrf_token_and_form_body() {
    let (mut page, mut controller) = setup();
    let button = node(&page, "down-1");
    controller.click(&mut page, button);

    let request = match controller.transport().dispatched.first() {
        Some((_, request)) => request,
        None => panic!("nothing dispatched"),
    };
    assert_eq!(request.url.as_str(), "https://forum.example/posts/1/vote/downvote/");
    assert_eq!(request.header("X-Requested-With"), Some("XMLHttpRequest"));
    assert_eq!(request.header("X-CSRFToken"), Some("tok123"));
    assert_eq!(request.header("Accept"), Some("application/json"));
    assert_eq!(
        request.header("Content-Type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(request.body, b"csrfmiddlewaretoken=tok123".to_vec());
}

#[test]
fn blocked_endpoint_notifies_without_pending_state() {
    let (mut page, mut controller) = setup_with("http://forum.example/posts/", NetStack::default());
    let before = page.document.clone();
    let form = node(&page, "up-form");
    let button = node(&page, "up-1");

    let disposition = controller.click(&mut page, button);

    assert!(matches!(
        disposition,
        SubmitDisposition::Aborted(VoteError::Transport(_))
    ));
    assert!(!controller.is_pending(form));
    assert!(controller.transport().dispatched.is_empty());
    assert_eq!(controller.notifier().shown.len(), 1);

    let (mut page, mut controller) = setup_with(
        "http://forum.example/posts/",
        NetStack::new(TransportPolicy::permissive()),
    );
    assert!(matches!(
        controller.click(&mut page, button),
        SubmitDisposition::Dispatched(_)
    ));
    assert_ne!(page.document, before);
}

#[test]
fn oversized_chunked_reply_settles_the_form_through_worker_threads() {
    let listener = match TcpListener::bind("127.0.0.1:0") {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    };
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(error) => panic!("{error}"),
    };
    let server = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buffer = [0_u8; 4096];
            let _ = stream.read(&mut buffer);
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab",
            );
        }
    });

    let mut page = Page::new(HtmlParser.parse(FEED), &format!("http://127.0.0.1:{port}/posts/"));
    let net = NetStack::default();
    let transport = ThreadedTransport::new(net.client());
    let mut controller = VoteController::new(
        VoteConfig::default(),
        net,
        transport,
        RecordingNotifier::default(),
    );
    controller.attach(&page, page.document.root());

    let form = node(&page, "up-form");
    let button = node(&page, "up-1");
    let label = page.document.text_content(button);
    assert!(matches!(
        controller.click(&mut page, button),
        SubmitDisposition::Dispatched(_)
    ));

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.has_pending() && Instant::now() < deadline {
        controller.pump(&mut page);
        thread::sleep(Duration::from_millis(10));
    }
    let _ = server.join();

    assert!(!controller.has_pending());
    assert!(!controller.is_pending(form));
    assert!(!page.document.is_disabled(button));
    assert_eq!(page.document.text_content(button), label);
    assert_eq!(counter_text(&page), "3");
    assert_eq!(controller.notifier().shown.len(), 1);
    assert_eq!(controller.transport().outstanding(), 0);
}

#[test]
fn tick_lets_toasts_expire() {
    let mut page = Page::new(HtmlParser.parse(FEED), LOCATION);
    let mut controller = VoteController::new(
        VoteConfig::default(),
        NetStack::default(),
        ScriptedTransport::default(),
        ToastNotifier::new(Duration::from_millis(3000)),
    );
    controller.attach(&page, page.document.root());

    let button = node(&page, "up-1");
    let id = dispatched_id(controller.click(&mut page, button));
    controller.transport_mut().respond(id, 500, "");
    controller.pump(&mut page);
    assert_eq!(controller.notifier().live_count(), 1);

    controller.tick(&mut page, Instant::now());
    assert_eq!(controller.notifier().live_count(), 1);
    controller.tick(&mut page, Instant::now() + Duration::from_millis(3001));
    assert_eq!(controller.notifier().live_count(), 0);
}
