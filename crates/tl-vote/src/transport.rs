//! Seam between the controller and whatever carries vote requests.

use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::thread;
use tl_core::TallyError;
use tl_core::TallyResult;
use tl_net::HttpRequest;
use tl_net::HttpResponse;
use tl_net::client::HttpClient;
use tracing::debug;

const VOTE_THREAD_NAME: &str = "tally-vote";

pub type RequestId = u64;

/// A finished request, tagged with the id it was dispatched under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub request_id: RequestId,
    pub result: TallyResult<HttpResponse>,
}

/// Carries requests off the event loop. `dispatch` must not block;
/// replies surface later through `drain_completed`.
pub trait VoteTransport {
    fn dispatch(&mut self, request_id: RequestId, request: HttpRequest);

    fn drain_completed(&mut self) -> Vec<TransportReply>;
}

/// Runs each request on its own worker thread with the blocking HTTP client.
#[derive(Debug)]
pub struct ThreadedTransport {
    client: HttpClient,
    sender: mpsc::Sender<TransportReply>,
    receiver: mpsc::Receiver<TransportReply>,
    spawn_failures: Vec<TransportReply>,
    outstanding: usize,
}

impl ThreadedTransport {
    pub fn new(client: HttpClient) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            client,
            sender,
            receiver,
            spawn_failures: Vec::new(),
            outstanding: 0,
        }
    }

    /// Requests dispatched whose replies have not been drained yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl VoteTransport for ThreadedTransport {
    fn dispatch(&mut self, request_id: RequestId, request: HttpRequest) {
        let client = self.client.clone();
        let sender = self.sender.clone();
        let job = move || {
            let _ = sender.send(settle(request_id, || client.execute(&request)));
        };

        self.outstanding += 1;
        if thread::Builder::new()
            .name(VOTE_THREAD_NAME.to_owned())
            .spawn(job)
            .is_err()
        {
            self.spawn_failures.push(TransportReply {
                request_id,
                result: Err(TallyError::new(
                    "vote.transport.spawn_failed",
                    "failed to spawn vote worker",
                )),
            });
        }
        debug!(request_id, "vote request handed to worker");
    }

    fn drain_completed(&mut self) -> Vec<TransportReply> {
        let mut replies = std::mem::take(&mut self.spawn_failures);
        replies.extend(self.receiver.try_iter());
        self.outstanding = self.outstanding.saturating_sub(replies.len());
        replies
    }
}

/// Runs one request to completion. A panic inside `work` still yields a
/// reply, carrying `vote.transport.worker_failed`.
fn settle<F>(request_id: RequestId, work: F) -> TransportReply
where
    F: FnOnce() -> TallyResult<HttpResponse>,
{
    let result = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
        Err(TallyError::new(
            "vote.transport.worker_failed",
            "vote worker panicked before producing a reply",
        ))
    });
    TransportReply { request_id, result }
}
