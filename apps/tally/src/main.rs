mod cli;

use clap::Parser;
use cli::Cli;
use std::fs;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use tl_core::TallyError;
use tl_core::TallyResult;
use tl_dom::Page;
use tl_dom::ScrollPosition;
use tl_html::HtmlParser;
use tl_net::NetStack;
use tl_net::TransportPolicy;
use tl_net::TrustStoreMode;
use tl_vote::Locator;
use tl_vote::PostId;
use tl_vote::Resolution;
use tl_vote::SubmitDisposition;
use tl_vote::ThreadedTransport;
use tl_vote::ToastNotifier;
use tl_vote::VoteConfig;
use tl_vote::VoteController;
use tl_vote::VoteDirection;
use tl_vote::VoteTransport;
use tracing::info;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

type CliController = VoteController<ThreadedTransport, ToastNotifier>;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("tally error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> TallyResult<()> {
    let config = match &cli.config {
        Some(path) => VoteConfig::load(path)?,
        None => VoteConfig::default(),
    };
    let post_id = PostId::parse(&cli.post)
        .ok_or_else(|| TallyError::new("app.post_invalid", "`--post` must not be blank"))?;
    let direction = VoteDirection::from(cli.vote);

    let html = fs::read_to_string(&cli.page).map_err(|error| {
        TallyError::new(
            "app.page_read_failed",
            format!("failed to read {}: {error}", cli.page.display()),
        )
    })?;
    let mut page = Page::new(HtmlParser.parse(&html), &cli.location);
    page.window.scroll_to(ScrollPosition::new(0.0, cli.scroll));

    let net = NetStack::new(transport_policy(cli));
    let transport =
        ThreadedTransport::new(net.client().with_timeout(Duration::from_millis(cli.timeout_ms)));
    let notifier = ToastNotifier::new(config.notice_ttl());
    let mut controller = VoteController::new(config, net, transport, notifier);

    let attached = controller.attach(&page, page.document.root());
    info!(attached, page = %cli.page.display(), "page loaded");

    let button = Locator::new(&page.document, controller.config())
        .button(&post_id, direction)
        .ok_or_else(|| {
            TallyError::new(
                "app.control_missing",
                format!("no {direction} control for post {post_id} on the page"),
            )
        })?;

    match controller.click(&mut page, button) {
        SubmitDisposition::Dispatched(request_id) => {
            info!(request_id, post_id = %post_id, %direction, "vote sent");
        }
        SubmitDisposition::NotHandled => {
            return Err(TallyError::new(
                "app.form_not_owned",
                format!("the {direction} control for post {post_id} is not inside a vote form"),
            ));
        }
        SubmitDisposition::Busy => {
            return Err(TallyError::new("app.vote_busy", "a vote is already in flight"));
        }
        SubmitDisposition::Aborted(error) => {
            print_report(&page, &controller, &post_id);
            return Err(TallyError::new("app.vote_aborted", error.to_string()));
        }
    }

    let resolutions = wait_for_replies(&mut controller, &mut page, Duration::from_millis(cli.wait_ms))?;
    for resolution in &resolutions {
        match resolution {
            Resolution::Reconciled(outcome) => println!(
                "result: reconciled (total {}, user vote {})",
                outcome.total_votes,
                outcome.user_vote.as_i8()
            ),
            Resolution::Failed(error) => println!("result: failed ({error})"),
            Resolution::Redirected(login_url) => println!("result: login required ({login_url})"),
            Resolution::Stale => {}
        }
    }
    print_report(&page, &controller, &post_id);
    Ok(())
}

fn transport_policy(cli: &Cli) -> TransportPolicy {
    let policy = if cli.allow_http {
        TransportPolicy::permissive()
    } else {
        TransportPolicy::default()
    };
    if cli.os_roots {
        policy.with_trust_store_mode(TrustStoreMode::WebPkiAndOs)
    } else {
        policy
    }
}

/// Drives the event loop until no vote is in flight or `wait` elapses.
/// Notices stay on screen for the report; nothing here expires them.
fn wait_for_replies(
    controller: &mut CliController,
    page: &mut Page,
    wait: Duration,
) -> TallyResult<Vec<Resolution>> {
    let deadline = Instant::now() + wait;
    let mut resolutions = Vec::new();
    while controller.has_pending() {
        let replies = controller.transport_mut().drain_completed();
        for reply in replies {
            resolutions.push(controller.complete(page, reply));
        }
        if !controller.has_pending() {
            break;
        }
        if Instant::now() >= deadline {
            return Err(TallyError::new(
                "app.vote_timeout",
                format!(
                    "no reply within {} ms ({} request(s) outstanding)",
                    wait.as_millis(),
                    controller.transport().outstanding()
                ),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
    Ok(resolutions)
}

fn print_report(page: &Page, controller: &CliController, post_id: &PostId) {
    let document = &page.document;
    let locator = Locator::new(document, controller.config());

    match locator.counter(post_id) {
        Some(counter) => println!("counter: {}", document.text_content(counter).trim()),
        None => println!("counter: (not on page)"),
    }
    for direction in VoteDirection::ALL {
        match locator.button(post_id, direction) {
            Some(button) => println!(
                "{direction}: class=\"{}\"{}",
                document.classes(button).join(" "),
                if document.is_disabled(button) { " disabled" } else { "" }
            ),
            None => println!("{direction}: (not on page)"),
        }
    }
    println!("scroll: {}", page.window.scroll_position().y);
    println!("location: {}", page.window.location());
    for (level, message) in controller.notifier().live_messages() {
        println!("notice [{}]: {message}", level.alert_class());
    }
}

#[cfg(test)]
mod tests {
    use super::transport_policy;
    use crate::cli::Cli;
    use clap::Parser;
    use tl_net::TrustStoreMode;

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "tally",
            "--page",
            "feed.html",
            "--location",
            "https://forum.example/",
            "--post",
            "1",
            "--vote",
            "upvote",
        ];
        args.extend_from_slice(extra);
        match Cli::try_parse_from(args) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn default_policy_is_https_only_with_bundled_roots() {
        let policy = transport_policy(&parse(&[]));
        assert!(policy.https_only);
        assert_eq!(policy.trust_store_mode, TrustStoreMode::WebPkiOnly);
    }

    #[test]
    fn flags_relax_scheme_and_widen_trust_store() {
        let policy = transport_policy(&parse(&["--allow-http", "--os-roots"]));
        assert!(!policy.https_only);
        assert_eq!(policy.trust_store_mode, TrustStoreMode::WebPkiAndOs);
    }
}
