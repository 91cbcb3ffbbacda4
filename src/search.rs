/// Background search coordinator.
///
/// A `SearchHandle` is cloned into every Axum handler. Intents (submit,
/// cancel) are sent over a Tokio channel to a single worker task, which owns
/// the active `SearchSession`, runs the title search followed by one detail
/// lookup per hit, and publishes the outcome to a listener it only holds
/// weakly. Readers see the session through `watch` snapshots.
use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    models::{FailedLookup, MediaType, Movie, SessionSnapshot, SessionState},
    omdb::{
        ApiError, MovieApi,
        parse::{ParseError, SearchOutcome, parse_detail_response, parse_search_response},
    },
};

// ── Listener ───────────────────────────────────────────────────────────────────

/// Receives the outcome of each search session. `on_search_ended` fires
/// exactly once per session, after whichever terminal callback applies.
pub trait SearchListener: Send + Sync {
    fn on_search_started(&self, session_id: Uuid, query: &str);
    fn on_results_ready(&self, session_id: Uuid, results: &[Movie]);
    fn on_not_found(&self, session_id: Uuid);
    fn on_error(&self, session_id: Uuid, message: &str);
    fn on_search_ended(&self, session_id: Uuid);
}

/// Weak back-reference to the listener; every call is a no-op once the
/// listener has been dropped.
struct Publisher {
    listener: Weak<dyn SearchListener>,
}

impl Publisher {
    fn publish(&self, f: impl FnOnce(&dyn SearchListener)) {
        match self.listener.upgrade() {
            Some(listener) => f(listener.as_ref()),
            None => debug!("Search listener released, dropping event"),
        }
    }
}

// ── Errors / options ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Please enter a movie name!")]
    EmptyQuery,

    #[error("search worker is not running")]
    WorkerGone,
}

#[derive(Debug, Error)]
enum LookupError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Detail lookups allowed in flight at once.
    pub max_concurrent: usize,
    /// Cap on the number of hits whose details are fetched (0 = no cap).
    pub max_results: usize,
    /// How long `shutdown` waits at each stage.
    pub shutdown_grace: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_results: 0,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl SearchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_results: config.max_results,
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

// ── Public handle ──────────────────────────────────────────────────────────────

enum Command {
    Submit(Submission),
    Cancel,
    Shutdown,
}

struct Submission {
    id: Uuid,
    query: String,
    media_type: Option<MediaType>,
}

#[derive(Debug, Clone)]
pub struct SearchHandle {
    tx: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SearchHandle {
    /// Start a new search, superseding any that is still running.
    ///
    /// Blank input is rejected here, before anything reaches the worker.
    pub fn submit_search(
        &self,
        text: &str,
        media_type: Option<MediaType>,
    ) -> Result<Uuid, SearchError> {
        let query = text.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let id = Uuid::new_v4();
        self.tx
            .send(Command::Submit(Submission {
                id,
                query: query.to_string(),
                media_type,
            }))
            .map_err(|_| SearchError::WorkerGone)?;
        Ok(id)
    }

    /// Abandon the active search, if any. Nothing but `on_search_ended` is
    /// published for it.
    pub fn cancel_active_search(&self) {
        if self.tx.send(Command::Cancel).is_err() {
            debug!("Cancel requested after the search worker stopped");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker finished its current search and stopped.
    Graceful,
    /// The grace period ran out and the active search was cancelled.
    Forced,
    /// The worker ignored cancellation too and its task was aborted.
    Abandoned,
}

/// Owner of the worker task. Dropping it leaves the worker running until all
/// handles are gone; call [`SearchWorker::shutdown`] to stop it in bounded time.
pub struct SearchWorker {
    handle: SearchHandle,
    force: CancellationToken,
    task: JoinHandle<()>,
    grace: Duration,
}

impl SearchWorker {
    pub fn handle(&self) -> SearchHandle {
        self.handle.clone()
    }

    /// Stop accepting work, give the active search `grace` to finish, then
    /// force-cancel it and wait once more before aborting the task.
    pub async fn shutdown(self) -> ShutdownOutcome {
        let SearchWorker {
            handle,
            force,
            mut task,
            grace,
        } = self;

        let _ = handle.tx.send(Command::Shutdown);
        drop(handle);

        if tokio::time::timeout(grace, &mut task).await.is_ok() {
            info!("Search worker stopped");
            return ShutdownOutcome::Graceful;
        }

        warn!("Search still running after {grace:?}, forcing cancellation");
        force.cancel();
        if tokio::time::timeout(grace, &mut task).await.is_ok() {
            info!("Search worker stopped after forced cancellation");
            return ShutdownOutcome::Forced;
        }

        error!("Search did not terminate!");
        task.abort();
        ShutdownOutcome::Abandoned
    }

    /// Run [`SearchWorker::shutdown`] on its own task so the caller never
    /// waits on it.
    pub fn shutdown_detached(self) -> JoinHandle<ShutdownOutcome> {
        tokio::spawn(self.shutdown())
    }
}

// ── Worker startup ─────────────────────────────────────────────────────────────

pub fn start_worker(
    api: Arc<dyn MovieApi>,
    listener: Weak<dyn SearchListener>,
    options: SearchOptions,
) -> SearchWorker {
    let (tx, rx) = mpsc::unbounded_channel::<Command>();
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle());
    let force = CancellationToken::new();
    let grace = options.shutdown_grace;

    let worker = Worker {
        api,
        publisher: Publisher { listener },
        options,
        snapshots: snapshot_tx,
        force: force.clone(),
    };
    let task = tokio::spawn(worker.run(rx));

    SearchWorker {
        handle: SearchHandle {
            tx,
            snapshots: snapshot_rx,
        },
        force,
        task,
        grace,
    }
}

// ── Session ────────────────────────────────────────────────────────────────────

/// Bookkeeping for one search. Only the worker ever touches it.
struct SearchSession {
    id: Uuid,
    query: String,
    media_type: Option<MediaType>,
    state: SessionState,
    ids: Vec<String>,
    records: Vec<Movie>,
    failed: Vec<FailedLookup>,
    message: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SearchSession {
    fn new(submission: Submission) -> Self {
        Self {
            id: submission.id,
            query: submission.query,
            media_type: submission.media_type,
            state: SessionState::Idle,
            ids: Vec::new(),
            records: Vec::new(),
            failed: Vec::new(),
            message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Some(self.id),
            query: Some(self.query.clone()),
            media_type: self.media_type,
            state: self.state,
            in_flight: self.state.is_in_flight(),
            hits: self.ids.len(),
            results: if self.state == SessionState::Done {
                self.records.clone()
            } else {
                Vec::new()
            },
            failed: self.failed.clone(),
            message: self.message.clone(),
            started_at: Some(self.started_at),
            finished_at: self.finished_at,
        }
    }
}

/// How the search/detail phases ended, before side effects are applied.
enum Outcome {
    Done,
    NotFound,
    Failed(String),
    Cancelled,
}

// ── Worker loop ────────────────────────────────────────────────────────────────

struct Worker {
    api: Arc<dyn MovieApi>,
    publisher: Publisher,
    options: SearchOptions,
    snapshots: watch::Sender<SessionSnapshot>,
    force: CancellationToken,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!(
            "Search worker started (max {} concurrent lookups)",
            self.options.max_concurrent.max(1)
        );

        let mut next: Option<Submission> = None;
        let mut draining = false;

        loop {
            let submission = match next.take() {
                Some(s) => s,
                None if draining => break,
                None => tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(Command::Submit(s)) => s,
                        Some(Command::Cancel) => {
                            debug!("Cancel requested with no active search");
                            continue;
                        }
                        Some(Command::Shutdown) | None => break,
                    },
                    _ = self.force.cancelled() => break,
                },
            };

            let mut session = SearchSession::new(submission);
            self.begin(&mut session);

            let outcome = {
                let work = self.drive(&mut session);
                tokio::pin!(work);
                loop {
                    tokio::select! {
                        outcome = &mut work => break outcome,
                        cmd = rx.recv(), if !draining => match cmd {
                            Some(Command::Submit(s)) => {
                                info!("Search {} superseded by a new query", s.id);
                                next = Some(s);
                                break Outcome::Cancelled;
                            }
                            Some(Command::Cancel) => break Outcome::Cancelled,
                            // Let the current search finish, then stop.
                            Some(Command::Shutdown) | None => draining = true,
                        },
                        _ = self.force.cancelled() => {
                            draining = true;
                            break Outcome::Cancelled;
                        }
                    }
                }
            };

            self.finish(&mut session, outcome);
        }

        info!("Search worker exiting");
    }

    fn transition(&self, session: &mut SearchSession, state: SessionState) {
        debug!("Search {}: {} -> {}", session.id, session.state, state);
        session.state = state;
        self.snapshots.send_replace(session.snapshot());
    }

    fn begin(&self, session: &mut SearchSession) {
        info!("Searching for {:?} (session {})", session.query, session.id);
        self.transition(session, SessionState::Searching);
        self.publisher
            .publish(|l| l.on_search_started(session.id, &session.query));
    }

    async fn drive(&self, session: &mut SearchSession) -> Outcome {
        let body = match self
            .api
            .search_by_title(&session.query, session.media_type)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!("Title search failed for {:?}: {e}", session.query);
                return Outcome::Failed(format!("Search failed: {e}"));
            }
        };

        let mut ids = match parse_search_response(&body) {
            Ok(SearchOutcome::Found(ids)) => ids,
            Ok(SearchOutcome::NotFound { reason }) => {
                info!(
                    "No results for {:?} ({})",
                    session.query,
                    reason.as_deref().unwrap_or("no Search key")
                );
                return Outcome::NotFound;
            }
            Err(e) => {
                warn!("Unreadable search response for {:?}: {e}", session.query);
                return Outcome::Failed(format!("Search failed: {e}"));
            }
        };

        let cap = self.options.max_results;
        if cap > 0 && ids.len() > cap {
            info!("Capping {} hits to {cap} detail lookups", ids.len());
            ids.truncate(cap);
        }

        session.ids = ids;
        self.transition(session, SessionState::FetchingDetails);

        let fetched = self.fetch_details(&session.ids).await;
        for (id, result) in session.ids.iter().zip(fetched) {
            match result {
                Ok(movie) => session.records.push(movie),
                Err(e) => {
                    warn!("Detail lookup for {id} failed: {e}");
                    session.failed.push(FailedLookup {
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if session.records.is_empty() {
            Outcome::Failed(format!(
                "Could not load details for any of the {} result(s)",
                session.ids.len()
            ))
        } else {
            Outcome::Done
        }
    }

    /// Fetch every id with at most `max_concurrent` lookups in flight.
    /// Results come back in the order of `ids`, whatever order they finish in.
    async fn fetch_details(&self, ids: &[String]) -> Vec<Result<Movie, LookupError>> {
        let limit = self.options.max_concurrent.max(1);

        // Each lookup owns its id and API handle so the stream stays `Send`
        // inside the spawned worker.
        let mut fetched: Vec<(usize, Result<Movie, LookupError>)> =
            stream::iter(ids.iter().cloned().enumerate())
                .map(|(index, id)| {
                    let api = Arc::clone(&self.api);
                    async move { (index, fetch_one(api, id).await) }
                })
                .buffer_unordered(limit)
                .collect()
                .await;

        fetched.sort_by_key(|(index, _)| *index);
        fetched.into_iter().map(|(_, result)| result).collect()
    }

    fn finish(&self, session: &mut SearchSession, outcome: Outcome) {
        let id = session.id;
        session.finished_at = Some(Utc::now());

        match outcome {
            Outcome::Done => {
                info!(
                    "Search {id} done: {} result(s), {} failed lookup(s)",
                    session.records.len(),
                    session.failed.len()
                );
                self.transition(session, SessionState::Done);
                self.publisher
                    .publish(|l| l.on_results_ready(id, &session.records));
            }
            Outcome::NotFound => {
                session.message = Some("Movie not found!".to_string());
                self.transition(session, SessionState::Done);
                self.publisher.publish(|l| l.on_not_found(id));
            }
            Outcome::Failed(message) => {
                error!("Search {id} failed: {message}");
                session.message = Some(message);
                self.transition(session, SessionState::Error);
                if let Some(message) = session.message.as_deref() {
                    self.publisher.publish(|l| l.on_error(id, message));
                }
            }
            Outcome::Cancelled => {
                info!("Search {id} cancelled");
                session.records.clear();
                self.transition(session, SessionState::Cancelled);
            }
        }

        self.publisher.publish(|l| l.on_search_ended(id));
    }
}

async fn fetch_one(api: Arc<dyn MovieApi>, id: String) -> Result<Movie, LookupError> {
    let body = api.fetch_by_id(&id).await?;
    Ok(parse_detail_response(&body)?)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;

    use super::*;

    // ── Fakes ──────────────────────────────────────────────────────────────────

    #[derive(Clone)]
    enum Reply {
        Body(String),
        Fail(ApiError),
        Hang,
    }

    #[derive(Default)]
    struct FakeApi {
        search: Mutex<Option<Reply>>,
        details: Mutex<HashMap<String, (Duration, Reply)>>,
        search_calls: AtomicUsize,
        detail_calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FakeApi {
        fn searching(reply: Reply) -> Self {
            let api = Self::default();
            *api.search.lock().unwrap() = Some(reply);
            api
        }

        fn detail(self, id: &str, delay_ms: u64, reply: Reply) -> Self {
            self.details
                .lock()
                .unwrap()
                .insert(id.to_string(), (Duration::from_millis(delay_ms), reply));
            self
        }

        async fn answer(reply: Reply) -> Result<String, ApiError> {
            match reply {
                Reply::Body(body) => Ok(body),
                Reply::Fail(e) => Err(e),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl MovieApi for FakeApi {
        async fn search_by_title(
            &self,
            _query: &str,
            _media_type: Option<MediaType>,
        ) -> Result<String, ApiError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.search.lock().unwrap().clone();
            Self::answer(reply.unwrap_or(Reply::Body("{}".to_string()))).await
        }

        async fn fetch_by_id(&self, id: &str) -> Result<String, ApiError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            let entry = self.details.lock().unwrap().get(id).cloned();
            let (delay, reply) =
                entry.unwrap_or((Duration::ZERO, Reply::Fail(ApiError::Status(404))));
            tokio::time::sleep(delay).await;
            let result = Self::answer(reply).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Started(String),
        Results(Vec<Movie>),
        NotFound,
        Error(String),
        Ended,
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<(Uuid, Seen)>,
    }

    impl SearchListener for Recorder {
        fn on_search_started(&self, session_id: Uuid, query: &str) {
            let _ = self.tx.send((session_id, Seen::Started(query.to_string())));
        }
        fn on_results_ready(&self, session_id: Uuid, results: &[Movie]) {
            let _ = self.tx.send((session_id, Seen::Results(results.to_vec())));
        }
        fn on_not_found(&self, session_id: Uuid) {
            let _ = self.tx.send((session_id, Seen::NotFound));
        }
        fn on_error(&self, session_id: Uuid, message: &str) {
            let _ = self.tx.send((session_id, Seen::Error(message.to_string())));
        }
        fn on_search_ended(&self, session_id: Uuid) {
            let _ = self.tx.send((session_id, Seen::Ended));
        }
    }

    struct Harness {
        api: Arc<FakeApi>,
        worker: SearchWorker,
        _recorder: Arc<Recorder>,
        events: mpsc::UnboundedReceiver<(Uuid, Seen)>,
    }

    fn harness(api: FakeApi, options: SearchOptions) -> Harness {
        let api = Arc::new(api);
        let (tx, events) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder { tx });
        let listener = Arc::downgrade(&recorder) as Weak<dyn SearchListener>;
        let worker = start_worker(api.clone(), listener, options);
        Harness {
            api,
            worker,
            _recorder: recorder,
            events,
        }
    }

    /// Collect callbacks for `session` up to and including `on_search_ended`.
    async fn events_for(
        events: &mut mpsc::UnboundedReceiver<(Uuid, Seen)>,
        session: Uuid,
    ) -> Vec<Seen> {
        let mut seen = Vec::new();
        loop {
            let (id, event) = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("listener timed out")
                .expect("listener channel closed");
            if id != session {
                continue;
            }
            let ended = event == Seen::Ended;
            seen.push(event);
            if ended {
                return seen;
            }
        }
    }

    fn search_body(ids: &[&str]) -> Reply {
        let entries: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({ "Title": format!("Movie {id}"), "imdbID": id }))
            .collect();
        Reply::Body(serde_json::json!({ "Search": entries, "Response": "True" }).to_string())
    }

    fn detail_body(title: &str) -> Reply {
        Reply::Body(serde_json::json!({ "Title": title, "Response": "True" }).to_string())
    }

    fn titles(results: &[Movie]) -> Vec<&str> {
        results
            .iter()
            .map(|m| m.title.as_deref().unwrap_or(""))
            .collect()
    }

    // ── Tests ──────────────────────────────────────────────────────────────────

    #[test]
    fn worker_loop_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let (snapshots, _) = watch::channel(SessionSnapshot::idle());
        let listener: Weak<dyn SearchListener> = Weak::<Recorder>::new();
        let worker = Worker {
            api: Arc::new(FakeApi::default()),
            publisher: Publisher { listener },
            options: SearchOptions::default(),
            snapshots,
            force: CancellationToken::new(),
        };
        let (_tx, rx) = mpsc::unbounded_channel();

        assert_send(&worker.run(rx));
    }

    #[tokio::test]
    async fn blank_queries_never_reach_the_network() {
        let h = harness(FakeApi::default(), SearchOptions::default());
        let handle = h.worker.handle();

        for text in ["", "   ", "\t\n"] {
            assert_eq!(
                handle.submit_search(text, None),
                Err(SearchError::EmptyQuery)
            );
        }

        tokio::task::yield_now().await;
        assert_eq!(h.api.search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(handle.snapshot().state, SessionState::Idle);
        assert!(!handle.snapshot().in_flight);
    }

    #[tokio::test]
    async fn inception_scenario_publishes_one_record() {
        let api = FakeApi::searching(search_body(&["tt1375666"])).detail(
            "tt1375666",
            0,
            Reply::Body(r#"{"Title":"Inception","Year":"2010"}"#.to_string()),
        );
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();

        let session = handle.submit_search("  Inception ", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        let expected = Movie {
            title: Some("Inception".to_string()),
            year: Some("2010".to_string()),
            ..Default::default()
        };
        assert_eq!(
            seen,
            vec![
                Seen::Started("Inception".to_string()),
                Seen::Results(vec![expected.clone()]),
                Seen::Ended,
            ]
        );

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Done);
        assert!(!snapshot.in_flight);
        assert_eq!(snapshot.results, vec![expected]);
        assert!(snapshot.finished_at.is_some());
    }

    #[tokio::test]
    async fn results_keep_search_order_regardless_of_latency() {
        let ids = ["tt01", "tt02", "tt03", "tt04", "tt05"];
        let mut api = FakeApi::searching(search_body(&ids));
        // Earlier ids answer last.
        for (i, id) in ids.iter().enumerate() {
            api = api.detail(id, 20 * (ids.len() - i) as u64, detail_body(id));
        }
        let mut h = harness(
            api,
            SearchOptions {
                max_concurrent: 5,
                ..Default::default()
            },
        );

        let session = h.worker.handle().submit_search("order", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        let Seen::Results(results) = &seen[1] else {
            panic!("expected results, got {seen:?}");
        };
        assert_eq!(titles(results), ids.to_vec());
        assert_eq!(h.api.detail_calls.load(Ordering::SeqCst), ids.len());
    }

    #[tokio::test]
    async fn detail_lookups_respect_the_concurrency_limit() {
        let ids = ["a", "b", "c", "d", "e", "f"];
        let mut api = FakeApi::searching(search_body(&ids));
        for id in ids {
            api = api.detail(id, 15, detail_body(id));
        }
        let mut h = harness(
            api,
            SearchOptions {
                max_concurrent: 2,
                ..Default::default()
            },
        );

        let session = h.worker.handle().submit_search("limit", None).unwrap();
        events_for(&mut h.events, session).await;

        assert_eq!(h.api.detail_calls.load(Ordering::SeqCst), 6);
        assert!(h.api.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn missing_search_key_is_not_found_without_detail_calls() {
        let api = FakeApi::searching(Reply::Body(
            r#"{"Response":"False","Error":"Movie not found!"}"#.to_string(),
        ));
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();

        let session = handle.submit_search("zzzzqqq", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        assert_eq!(
            seen,
            vec![
                Seen::Started("zzzzqqq".to_string()),
                Seen::NotFound,
                Seen::Ended
            ]
        );
        assert_eq!(h.api.detail_calls.load(Ordering::SeqCst), 0);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Done);
        assert!(snapshot.results.is_empty());
        assert_eq!(snapshot.message.as_deref(), Some("Movie not found!"));
    }

    #[tokio::test]
    async fn malformed_search_response_is_an_error() {
        let api = FakeApi::searching(Reply::Body("<html>oops</html>".to_string()));
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();

        let session = handle.submit_search("Inception", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        assert_eq!(seen.len(), 3);
        assert!(matches!(&seen[1], Seen::Error(m) if m.contains("malformed")));
        assert!(!seen.iter().any(|s| matches!(s, Seen::Results(_))));
        assert_eq!(handle.snapshot().state, SessionState::Error);
        assert_eq!(h.api.detail_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_during_search_is_an_error() {
        let api = FakeApi::searching(Reply::Fail(ApiError::Status(503)));
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();

        let session = handle.submit_search("Inception", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        assert!(matches!(&seen[1], Seen::Error(m) if m.contains("HTTP 503")));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Error);
        assert!(!snapshot.in_flight);
    }

    #[tokio::test]
    async fn one_failed_lookup_does_not_sink_the_batch() {
        let ids = ["tt0000001", "tt0000002", "tt0000003", "tt0000004", "tt0000005"];
        let mut api = FakeApi::searching(search_body(&ids))
            .detail("tt0000001", 0, Reply::Fail(ApiError::Status(500)));
        for id in &ids[1..] {
            api = api.detail(id, 0, detail_body(id));
        }
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();

        let session = handle.submit_search("partial", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        let Seen::Results(results) = &seen[1] else {
            panic!("expected results, got {seen:?}");
        };
        assert_eq!(titles(results), ids[1..].to_vec());

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Done);
        assert_eq!(snapshot.results.len(), 4);
        assert_eq!(snapshot.failed.len(), 1);
        assert_eq!(snapshot.failed[0].id, "tt0000001");
    }

    #[tokio::test]
    async fn all_lookups_failing_is_an_error() {
        let api = FakeApi::searching(search_body(&["tt1", "tt2"]))
            .detail("tt1", 0, Reply::Fail(ApiError::Timeout))
            .detail(
                "tt2",
                0,
                Reply::Body(r#"{"Response":"False","Error":"Incorrect IMDb ID."}"#.to_string()),
            );
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();

        let session = handle.submit_search("nothing works", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        assert!(matches!(&seen[1], Seen::Error(_)));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Error);
        assert_eq!(snapshot.failed.len(), 2);
        assert!(snapshot.results.is_empty());
    }

    #[tokio::test]
    async fn max_results_caps_detail_lookups() {
        let ids = ["a", "b", "c", "d"];
        let mut api = FakeApi::searching(search_body(&ids));
        for id in ids {
            api = api.detail(id, 0, detail_body(id));
        }
        let mut h = harness(
            api,
            SearchOptions {
                max_results: 2,
                ..Default::default()
            },
        );

        let session = h.worker.handle().submit_search("cap", None).unwrap();
        let seen = events_for(&mut h.events, session).await;

        let Seen::Results(results) = &seen[1] else {
            panic!("expected results, got {seen:?}");
        };
        assert_eq!(titles(results), vec!["a", "b"]);
        assert_eq!(h.api.detail_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_mid_fetch_publishes_nothing_but_the_end() {
        let api = FakeApi::searching(search_body(&["tt1", "tt2"]))
            .detail("tt1", 0, detail_body("one"))
            .detail("tt2", 0, Reply::Hang);
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();
        let mut snapshots = handle.subscribe();

        let session = handle.submit_search("hang", None).unwrap();
        snapshots
            .wait_for(|s| s.state == SessionState::FetchingDetails)
            .await
            .unwrap();
        handle.cancel_active_search();

        let seen = events_for(&mut h.events, session).await;
        assert_eq!(seen, vec![Seen::Started("hang".to_string()), Seen::Ended]);

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Cancelled);
        assert!(!snapshot.in_flight);
        assert!(snapshot.results.is_empty());
    }

    #[tokio::test]
    async fn new_submission_supersedes_the_active_one() {
        let api = FakeApi::searching(search_body(&["slow"]))
            .detail("slow", 0, Reply::Hang);
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();
        let mut snapshots = handle.subscribe();

        let first = handle.submit_search("first", None).unwrap();
        snapshots
            .wait_for(|s| s.state == SessionState::FetchingDetails)
            .await
            .unwrap();

        *h.api.search.lock().unwrap() = Some(Reply::Fail(ApiError::Status(500)));
        let second = handle.submit_search("second", None).unwrap();

        let first_seen = events_for(&mut h.events, first).await;
        assert_eq!(first_seen, vec![Seen::Started("first".to_string()), Seen::Ended]);

        let second_seen = events_for(&mut h.events, second).await;
        assert_eq!(second_seen[0], Seen::Started("second".to_string()));
        assert_eq!(second_seen.last(), Some(&Seen::Ended));
        assert_eq!(handle.snapshot().session_id, Some(second));
    }

    #[tokio::test]
    async fn released_listener_makes_publishing_a_no_op() {
        let api = Arc::new(
            FakeApi::searching(search_body(&["tt1"])).detail("tt1", 0, detail_body("one")),
        );
        let (tx, mut events) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder { tx });
        let listener = Arc::downgrade(&recorder) as Weak<dyn SearchListener>;
        drop(recorder);

        let worker = start_worker(api, listener, SearchOptions::default());
        let handle = worker.handle();
        let mut snapshots = handle.subscribe();

        handle.submit_search("nobody listening", None).unwrap();
        snapshots
            .wait_for(|s| s.state.is_terminal())
            .await
            .unwrap();

        assert_eq!(handle.snapshot().state, SessionState::Done);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn idle_worker_shuts_down_gracefully() {
        let h = harness(FakeApi::default(), SearchOptions::default());
        let handle = h.worker.handle();

        assert_eq!(h.worker.shutdown().await, ShutdownOutcome::Graceful);
        assert_eq!(
            handle.submit_search("too late", None),
            Err(SearchError::WorkerGone)
        );
        handle.cancel_active_search();
        assert_eq!(handle.snapshot().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn shutdown_lets_the_active_search_finish() {
        let api = FakeApi::searching(search_body(&["tt1"])).detail("tt1", 50, detail_body("one"));
        let mut h = harness(api, SearchOptions::default());
        let handle = h.worker.handle();

        let session = handle.submit_search("finish me", None).unwrap();
        let outcome = h.worker.shutdown().await;

        assert_eq!(outcome, ShutdownOutcome::Graceful);
        let seen = events_for(&mut h.events, session).await;
        assert!(matches!(&seen[1], Seen::Results(r) if r.len() == 1));
    }

    #[tokio::test]
    async fn stuck_search_is_force_cancelled_within_the_grace_period() {
        let api = FakeApi::searching(search_body(&["tt1"])).detail("tt1", 0, Reply::Hang);
        let grace = Duration::from_millis(100);
        let mut h = harness(
            api,
            SearchOptions {
                shutdown_grace: grace,
                ..Default::default()
            },
        );
        let handle = h.worker.handle();
        let mut snapshots = handle.subscribe();

        let session = handle.submit_search("stuck", None).unwrap();
        snapshots
            .wait_for(|s| s.state == SessionState::FetchingDetails)
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let outcome = h.worker.shutdown_detached().await.unwrap();

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert!(started.elapsed() < grace * 2 + Duration::from_secs(1));
        let seen = events_for(&mut h.events, session).await;
        assert_eq!(seen, vec![Seen::Started("stuck".to_string()), Seen::Ended]);
        assert_eq!(handle.snapshot().state, SessionState::Cancelled);
    }
}
