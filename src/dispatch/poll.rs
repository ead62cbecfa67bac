//! Long-poll hand-off.
//!
//! # Data Flow
//! ```text
//! classifier ── PollRequest ──▶ FIFO queue ──▶ worker (× poll.workers)
//!                                   ▲              │
//!                                   │   no events, │ has_events → get_events ─┐
//!                                   └── not yet ───┘ deadline   → no_events ──┤
//!                                       timed out                             ▼
//!                                                              grunt work → responder
//! ```
//!
//! # Design Decisions
//! - The classifier only enqueues; it never waits for a poll to finish
//! - A request whose client went away (responder closed) is dropped on the
//!   next check; that is the only cancellation the router has
//! - Re-queued requests wait `check_interval` before their next check, so an
//!   idle queue does not spin

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::PollConfig;
use crate::error::{panic_message, RouteError};
use crate::http::grunt::grunt_work;
use crate::http::pages::ErrorPages;
use crate::http::request::{HttpRequest, RequestBag};
use crate::http::response::{HttpResponse, ResponseDescriptor};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Event source behind a poll handler.
pub trait PollEvents: Send + Sync {
    /// Called synchronously when the request arrives, before it is queued.
    fn on_request(&self, _request_id: Uuid, _request: &RequestBag) {}

    fn has_events(&self, request_id: Uuid) -> bool;

    /// Response once events are available.
    fn get_events(&self, request_id: Uuid) -> ResponseDescriptor;

    /// Response when the poll times out with nothing to deliver.
    fn no_events(&self, request_id: Uuid) -> ResponseDescriptor;
}

/// Poll-table entry.
#[derive(Clone)]
pub struct PollServiceArgs {
    pub events: Arc<dyn PollEvents>,
    /// Overrides the configured poll timeout.
    pub timeout: Option<Duration>,
}

impl PollServiceArgs {
    pub fn new(events: Arc<dyn PollEvents>) -> Self {
        Self { events, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for PollServiceArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollServiceArgs")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A queued poll: the request token plus the channel its answer goes to.
pub struct PollRequest {
    pub id: Uuid,
    args: PollServiceArgs,
    request: HttpRequest,
    responder: oneshot::Sender<HttpResponse>,
    deadline: Option<Instant>,
    not_before: Instant,
}

impl PollRequest {
    pub fn new(args: PollServiceArgs, request: HttpRequest, responder: oneshot::Sender<HttpResponse>) -> Self {
        Self {
            id: Uuid::new_v4(),
            args,
            request,
            responder,
            deadline: None,
            not_before: Instant::now(),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }
}

/// Handle to the poll worker pool.
#[derive(Clone)]
pub struct PollServiceManager {
    tx: mpsc::UnboundedSender<PollRequest>,
    default_timeout: Duration,
}

impl PollServiceManager {
    /// Spawn the worker pool. Workers exit on shutdown.
    pub fn start(config: &PollConfig, pages: ErrorPages, shutdown: &Shutdown) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(rx));
        let pool = WorkerContext {
            tx: tx.clone(),
            queue,
            pages,
            check_interval: Duration::from_millis(config.check_interval_ms),
        };

        let workers = (0..config.workers)
            .map(|worker| {
                let pool = pool.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(async move { pool.run(worker, shutdown).await })
            })
            .collect();

        tracing::info!(workers = config.workers, timeout_secs = config.timeout_secs, "Poll service started");
        let manager = Self {
            tx,
            default_timeout: Duration::from_secs(config.timeout_secs),
        };
        (manager, workers)
    }

    /// Queue a poll request. Its timeout starts now.
    pub fn enqueue(&self, mut request: PollRequest) -> Result<(), RouteError> {
        let timeout = request.args.timeout.unwrap_or(self.default_timeout);
        request.deadline = Some(Instant::now() + timeout);
        self.tx.send(request).map_err(|_| RouteError::PollQueueClosed)
    }
}

#[derive(Clone)]
struct WorkerContext {
    tx: mpsc::UnboundedSender<PollRequest>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<PollRequest>>>,
    pages: ErrorPages,
    check_interval: Duration,
}

enum Check {
    Ready(ResponseDescriptor),
    Pending,
}

impl WorkerContext {
    async fn run(self, worker: usize, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        tracing::debug!(worker, "Poll worker started");
        loop {
            let next = tokio::select! {
                _ = shutdown.recv() => break,
                next = async { self.queue.lock().await.recv().await } => next,
            };
            let Some(item) = next else { break };

            if item.not_before > Instant::now() {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep_until(item.not_before) => {}
                }
            }
            self.check(item);
        }
        tracing::debug!(worker, "Poll worker stopped");
    }

    fn check(&self, mut item: PollRequest) {
        if item.responder.is_closed() {
            tracing::debug!(request_id = %item.id, "Poll client went away");
            metrics::record_poll("cancelled");
            return;
        }

        let events = item.args.events.clone();
        let id = item.id;
        let timed_out = item.deadline.is_some_and(|d| Instant::now() >= d);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if events.has_events(id) {
                Check::Ready(events.get_events(id))
            } else if timed_out {
                Check::Ready(events.no_events(id))
            } else {
                Check::Pending
            }
        }));

        let response = match outcome {
            Ok(Check::Pending) => {
                item.not_before = Instant::now() + self.check_interval;
                if self.tx.send(item).is_err() {
                    tracing::debug!(request_id = %id, "Poll queue closed while re-queueing");
                }
                return;
            }
            Ok(Check::Ready(descriptor)) => {
                let outcome = if timed_out { "timeout" } else { "events" };
                metrics::record_poll(outcome);
                match grunt_work(descriptor, &item.request) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(request_id = %id, error = %e, "Poll handler returned a bad response");
                        self.pages.server_error()
                    }
                }
            }
            Err(payload) => {
                tracing::error!(request_id = %id, panic = %panic_message(payload.as_ref()), "Poll handler panicked");
                self.pages.server_error()
            }
        };

        if item.responder.send(response).is_err() {
            tracing::debug!(request_id = %id, "Poll client went away before the response was sent");
        }
    }
}
