//! One session to one backend, owned by a background task.
//!
//! `connect()` spawns the task, which opens the session, runs the handshake
//! and lists tools, then signals readiness through a oneshot. From then on the
//! task is the only owner of the session: `call_tool()` sends a command over
//! an mpsc channel and awaits a oneshot reply. `disconnect()` cancels the task
//! and waits for it (bounded), aborting it if it does not stop in time.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[cfg(feature = "metrics")]
use mcpbox_metrics::{counter, gauge, histogram, labels, mcp as mcp_metrics};
use {
    async_trait::async_trait,
    mcpbox_common::preview,
    secrecy::Secret,
    serde_json::Value,
    tokio::{
        sync::{mpsc, oneshot},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    client::HttpSessionFactory,
    error::{Error, Result},
    traits::{McpSession, SessionFactory, ToolBackend, ToolMap},
    types::{McpToolDef, ToolsCallResult},
};

/// Queued calls per session before senders wait.
const COMMAND_QUEUE: usize = 32;

/// Session lifecycle as seen from outside the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// No task has been started yet.
    Idle,
    /// Handshake in progress.
    Starting,
    /// Ready and serving calls.
    Alive,
    /// The task has exited (cancelled, failed, or finished).
    Terminated,
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Give up on handshake + listing after this long.
    pub handshake_timeout: Option<Duration>,
    /// How long `disconnect()` waits for the task before aborting it.
    pub disconnect_timeout: Duration,
    /// Extra HTTP headers for the session.
    pub headers: HashMap<String, Secret<String>>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: None,
            disconnect_timeout: Duration::from_secs(5),
            headers: HashMap::new(),
        }
    }
}

enum SessionCommand {
    CallTool {
        name: String,
        arguments: Value,
        reply: oneshot::Sender<Result<ToolsCallResult>>,
    },
}

struct SharedState {
    lifecycle: SessionLifecycle,
    tools: ToolMap,
    /// Last handshake or session failure, for diagnostics.
    last_error: Option<String>,
    /// Bumped by every `connect()`. Only the task holding the current value
    /// may write the fields above.
    generation: u64,
}

type Shared = Arc<Mutex<SharedState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock the state only while `generation` is still the live session.
fn lock_current(shared: &Shared, generation: u64) -> Option<MutexGuard<'_, SharedState>> {
    let state = lock(shared);
    (state.generation == generation).then_some(state)
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    commands: mpsc::Sender<SessionCommand>,
    generation: u64,
}

/// Clears the tool map and marks the session terminated however the task
/// ends, including abort and panic. A guard from a superseded task leaves
/// the newer session alone.
struct TerminationGuard {
    server: String,
    shared: Shared,
    generation: u64,
}

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        let Some(mut state) = lock_current(&self.shared, self.generation) else {
            debug!(server = %self.server, generation = self.generation, "stale session task exited");
            return;
        };
        #[cfg(feature = "metrics")]
        if state.lifecycle == SessionLifecycle::Alive {
            gauge!(mcp_metrics::SESSIONS_ALIVE).decrement(1.0);
        }
        state.lifecycle = SessionLifecycle::Terminated;
        state.tools.clear();
        debug!(server = %self.server, "session task exited");
    }
}

/// Everything the background task needs, moved into it at spawn.
struct SessionTask {
    server: String,
    url: String,
    factory: Arc<dyn SessionFactory>,
    headers: HashMap<String, Secret<String>>,
    handshake_timeout: Option<Duration>,
    shared: Shared,
    generation: u64,
}

impl SessionTask {
    async fn run(
        self,
        ready: oneshot::Sender<Result<ToolMap>>,
        mut commands: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) {
        let _guard = TerminationGuard {
            server: self.server.clone(),
            shared: Arc::clone(&self.shared),
            generation: self.generation,
        };

        let handshake = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(server = %self.server, "cancelled during handshake");
                return;
            },
            outcome = self.bounded_handshake() => outcome,
        };

        let (mut session, tools) = match handshake {
            Ok(ready) => ready,
            Err(e) => {
                warn!(server = %self.server, error = %e, "MCP handshake failed");
                if let Some(mut state) = lock_current(&self.shared, self.generation) {
                    state.lifecycle = SessionLifecycle::Terminated;
                    state.last_error = Some(e.to_string());
                }
                #[cfg(feature = "metrics")]
                counter!(mcp_metrics::CONNECTION_FAILURES_TOTAL, labels::SERVER => self.server.clone())
                    .increment(1);
                let _ = ready.send(Err(e));
                return;
            },
        };

        let tools: ToolMap = tools.into_iter().map(|t| (t.name.clone(), t)).collect();
        let current = match lock_current(&self.shared, self.generation) {
            Some(mut state) => {
                state.tools = tools.clone();
                state.lifecycle = SessionLifecycle::Alive;
                true
            },
            None => false,
        };
        if !current {
            debug!(server = %self.server, "session superseded during handshake");
            session.close().await;
            return;
        }
        #[cfg(feature = "metrics")]
        gauge!(mcp_metrics::SESSIONS_ALIVE).increment(1.0);
        info!(server = %self.server, tools = tools.len(), "MCP session ready");

        if ready.send(Ok(tools)).is_err() {
            debug!(server = %self.server, "connect() caller went away before readiness");
            session.close().await;
            return;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(SessionCommand::CallTool { name, arguments, reply }) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            result = session.call_tool(&name, arguments) => {
                                if let Err(ref e) = result
                                    && let Some(mut state) = lock_current(&self.shared, self.generation)
                                {
                                    state.last_error = Some(e.to_string());
                                }
                                let _ = reply.send(result);
                            },
                        }
                    },
                    None => break,
                },
            }
        }

        session.close().await;
    }

    async fn bounded_handshake(&self) -> Result<(Box<dyn McpSession>, Vec<McpToolDef>)> {
        match self.handshake_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.handshake())
                .await
                .map_err(|_| Error::HandshakeTimeout {
                    server: self.server.clone(),
                    timeout,
                })?,
            None => self.handshake().await,
        }
    }

    async fn handshake(&self) -> Result<(Box<dyn McpSession>, Vec<McpToolDef>)> {
        let mut session = self
            .factory
            .open(&self.server, &self.url, &self.headers)
            .await?;
        let listed = async {
            session.initialize().await?;
            session.list_tools().await
        }
        .await;
        match listed {
            Ok(tools) => Ok((session, tools)),
            Err(e) => {
                session.close().await;
                Err(e)
            },
        }
    }
}

/// Connection to one MCP backend over a [`SessionFactory`].
pub struct ServerConnection {
    name: String,
    url: String,
    factory: Arc<dyn SessionFactory>,
    options: ConnectionOptions,
    shared: Shared,
    worker: tokio::sync::Mutex<Option<Worker>>,
}

impl ServerConnection {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            factory,
            options,
            shared: Arc::new(Mutex::new(SharedState {
                lifecycle: SessionLifecycle::Idle,
                tools: ToolMap::new(),
                last_error: None,
                generation: 0,
            })),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Connection over streamable HTTP.
    pub fn http(name: impl Into<String>, url: impl Into<String>, options: ConnectionOptions) -> Self {
        Self::new(name, url, Arc::new(HttpSessionFactory::default()), options)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        lock(&self.shared).lifecycle
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared).last_error.clone()
    }

    fn not_connected(&self) -> Error {
        Error::NotConnected {
            server: self.name.clone(),
        }
    }

    fn session_closed(&self) -> Error {
        Error::SessionClosed {
            server: self.name.clone(),
        }
    }

    async fn send_call(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        let commands = self
            .worker
            .lock()
            .await
            .as_ref()
            .map(|w| w.commands.clone())
            .ok_or_else(|| self.not_connected())?;

        let (reply, response) = oneshot::channel();
        commands
            .send(SessionCommand::CallTool {
                name: name.to_string(),
                arguments,
                reply,
            })
            .await
            .map_err(|_| self.session_closed())?;
        response.await.map_err(|_| self.session_closed())?
    }
}

#[async_trait]
impl ToolBackend for ServerConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> ToolMap {
        lock(&self.shared).tools.clone()
    }

    async fn connect(&self) -> Result<ToolMap> {
        let ready = {
            let mut worker = self.worker.lock().await;
            // A task that already reported a failed handshake may still be
            // unwinding; its state reads Terminated.
            if let Some(w) = worker.as_ref()
                && !w.handle.is_finished()
                && self.lifecycle() != SessionLifecycle::Terminated
            {
                return Err(Error::AlreadyConnected {
                    server: self.name.clone(),
                });
            }
            if let Some(stale) = worker.take() {
                stale.cancel.cancel();
            }

            #[cfg(feature = "metrics")]
            counter!(mcp_metrics::CONNECTION_ATTEMPTS_TOTAL, labels::SERVER => self.name.clone())
                .increment(1);
            info!(server = %self.name, url = %self.url, "connecting to MCP backend");

            let generation = {
                let mut state = lock(&self.shared);
                state.generation += 1;
                state.lifecycle = SessionLifecycle::Starting;
                state.tools.clear();
                state.last_error = None;
                state.generation
            };

            let (ready_tx, ready_rx) = oneshot::channel();
            let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
            let cancel = CancellationToken::new();
            let task = SessionTask {
                server: self.name.clone(),
                url: self.url.clone(),
                factory: Arc::clone(&self.factory),
                headers: self.options.headers.clone(),
                handshake_timeout: self.options.handshake_timeout,
                shared: Arc::clone(&self.shared),
                generation,
            };
            let handle = tokio::spawn(task.run(ready_tx, commands_rx, cancel.clone()));
            *worker = Some(Worker {
                handle,
                cancel,
                commands: commands_tx,
                generation,
            });
            ready_rx
        };

        match ready.await {
            Ok(result) => result,
            // The task ended without signalling: cancelled or panicked.
            Err(_) => Err(self.session_closed()),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        {
            let state = lock(&self.shared);
            if state.lifecycle != SessionLifecycle::Alive {
                return Err(self.not_connected());
            }
            if !state.tools.contains_key(name) {
                return Err(Error::UnknownTool {
                    server: self.name.clone(),
                    tool: name.to_string(),
                });
            }
        }

        debug!(server = %self.name, tool = name, "calling MCP tool");
        let started = Instant::now();
        let mut flagged = false;
        let result = self.send_call(name, arguments).await.map(|r| {
            flagged = r.is_error;
            r.into_text()
        });

        #[cfg(feature = "metrics")]
        {
            counter!(
                mcp_metrics::TOOL_CALLS_TOTAL,
                labels::SERVER => self.name.clone(),
                labels::TOOL => name.to_string()
            )
            .increment(1);
            histogram!(mcp_metrics::TOOL_CALL_DURATION_SECONDS, labels::SERVER => self.name.clone())
                .record(started.elapsed().as_secs_f64());
            if result.is_err() || flagged {
                counter!(
                    mcp_metrics::TOOL_CALL_ERRORS_TOTAL,
                    labels::SERVER => self.name.clone(),
                    labels::TOOL => name.to_string()
                )
                .increment(1);
            }
        }

        match &result {
            Ok(text) => debug!(
                server = %self.name,
                tool = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                len = text.len(),
                preview = preview(text, 120),
                "MCP tool returned"
            ),
            Err(e) => warn!(server = %self.name, tool = name, error = %e, "MCP tool call failed"),
        }
        if flagged {
            warn!(server = %self.name, tool = name, "backend flagged the tool result as an error");
        }
        result
    }

    async fn disconnect(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            debug!(server = %self.name, "disconnect: never connected");
            return;
        };

        worker.cancel.cancel();
        drop(worker.commands);
        let generation = worker.generation;
        let mut handle = worker.handle;
        match tokio::time::timeout(self.options.disconnect_timeout, &mut handle).await {
            Ok(Ok(())) => debug!(server = %self.name, "session task stopped"),
            Ok(Err(e)) if e.is_cancelled() => {},
            Ok(Err(e)) => warn!(server = %self.name, error = %e, "session task panicked"),
            Err(_) => {
                warn!(
                    server = %self.name,
                    timeout_secs = self.options.disconnect_timeout.as_secs(),
                    "session task did not stop in time, aborting"
                );
                handle.abort();
            },
        }

        // The guard runs when an aborted task is dropped; make the state
        // visible now regardless.
        if let Some(mut state) = lock_current(&self.shared, generation) {
            #[cfg(feature = "metrics")]
            if state.lifecycle == SessionLifecycle::Alive {
                gauge!(mcp_metrics::SESSIONS_ALIVE).decrement(1.0);
            }
            state.lifecycle = SessionLifecycle::Terminated;
            state.tools.clear();
        }
        info!(server = %self.name, "MCP backend disconnected");
    }

    fn is_connected(&self) -> bool {
        self.lifecycle() == SessionLifecycle::Alive
    }
}

impl Drop for ServerConnection {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{ContentItem, InitializeResult},
        std::sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    #[derive(Clone, Default)]
    struct Seen {
        opened: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    #[derive(Clone)]
    enum Behaviour {
        Ok,
        FailInitialize,
        HangInitialize,
        HangCalls,
        HangClose,
    }

    struct FakeSession {
        behaviour: Behaviour,
        tools: Vec<McpToolDef>,
        result: ToolsCallResult,
        seen: Seen,
    }

    #[async_trait]
    impl McpSession for FakeSession {
        async fn initialize(&mut self) -> Result<InitializeResult> {
            match self.behaviour {
                Behaviour::FailInitialize => Err(Error::message("connection refused")),
                Behaviour::HangInitialize => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(Error::message("unreachable"))
                },
                _ => Ok(serde_json::from_value(serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {"name": "fake"}
                }))?),
            }
        }

        async fn list_tools(&mut self) -> Result<Vec<McpToolDef>> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&mut self, _name: &str, _arguments: Value) -> Result<ToolsCallResult> {
            self.seen.calls.fetch_add(1, Ordering::SeqCst);
            if matches!(self.behaviour, Behaviour::HangCalls) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(self.result.clone())
        }

        async fn close(&mut self) {
            self.seen.closed.store(true, Ordering::SeqCst);
            if matches!(self.behaviour, Behaviour::HangClose) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    struct FakeFactory {
        behaviour: Behaviour,
        result: ToolsCallResult,
        seen: Seen,
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open(
            &self,
            _server: &str,
            _url: &str,
            _headers: &HashMap<String, Secret<String>>,
        ) -> Result<Box<dyn McpSession>> {
            self.seen.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                behaviour: self.behaviour.clone(),
                tools: vec![
                    McpToolDef::new("search", "Search", serde_json::json!({"type": "object"})),
                    McpToolDef::new("upload", "Upload", Value::Null),
                ],
                result: self.result.clone(),
                seen: self.seen.clone(),
            }))
        }
    }

    fn text_result(items: &[&str]) -> ToolsCallResult {
        ToolsCallResult {
            content: items.iter().map(|t| ContentItem::text(*t)).collect(),
            is_error: false,
        }
    }

    fn connection(behaviour: Behaviour, result: ToolsCallResult) -> (ServerConnection, Seen) {
        connection_with(behaviour, result, ConnectionOptions {
            handshake_timeout: Some(Duration::from_millis(200)),
            disconnect_timeout: Duration::from_millis(200),
            ..Default::default()
        })
    }

    fn connection_with(
        behaviour: Behaviour,
        result: ToolsCallResult,
        options: ConnectionOptions,
    ) -> (ServerConnection, Seen) {
        let seen = Seen::default();
        let factory = Arc::new(FakeFactory {
            behaviour,
            result,
            seen: seen.clone(),
        });
        (
            ServerConnection::new("alpha", "http://fake/mcp", factory, options),
            seen,
        )
    }

    #[tokio::test]
    async fn connect_discovers_tools_and_calls_join_text() {
        let (conn, _seen) = connection(Behaviour::Ok, text_result(&["line one", "line two"]));
        assert!(conn.tools().is_empty());

        let tools = conn.connect().await.unwrap();
        assert_eq!(tools.keys().collect::<Vec<_>>(), vec!["search", "upload"]);
        assert!(conn.is_connected());
        assert_eq!(conn.tools().len(), 2);

        let text = conn
            .call_tool("search", serde_json::json!({"q": "rust"}))
            .await
            .unwrap();
        assert_eq!(text, "line one\nline two");
    }

    #[tokio::test]
    async fn empty_result_yields_sentinel() {
        let (conn, _seen) = connection(Behaviour::Ok, text_result(&[]));
        conn.connect().await.unwrap();
        let text = conn
            .call_tool("search", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(text, crate::types::NO_RESULT);
    }

    #[tokio::test]
    async fn error_flagged_results_still_return_text() {
        let mut result = text_result(&["Invalid query: missing field"]);
        result.is_error = true;
        let (conn, _seen) = connection(Behaviour::Ok, result);
        conn.connect().await.unwrap();
        let text = conn
            .call_tool("search", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(text, "Invalid query: missing field");
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn call_before_connect_is_not_connected() {
        let (conn, seen) = connection(Behaviour::Ok, text_result(&["x"]));
        let err = conn
            .call_tool("search", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected { .. }));
        assert_eq!(seen.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_rejected_before_sending() {
        let (conn, seen) = connection(Behaviour::Ok, text_result(&["x"]));
        conn.connect().await.unwrap();
        let err = conn
            .call_tool("download", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTool { ref tool, .. } if tool == "download"));
        assert_eq!(seen.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handshake_failure_surfaces_to_connect() {
        let (conn, seen) = connection(Behaviour::FailInitialize, text_result(&[]));
        let err = conn.connect().await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert!(!conn.is_connected());
        assert!(conn.tools().is_empty());
        assert!(seen.closed.load(Ordering::SeqCst));
        assert!(conn.last_error().is_some());

        // Disconnecting after a failed handshake is a no-op.
        conn.disconnect().await;
        assert_eq!(conn.lifecycle(), SessionLifecycle::Terminated);
    }

    #[tokio::test]
    async fn connect_retries_right_after_failed_handshake() {
        let (conn, seen) = connection(Behaviour::FailInitialize, text_result(&[]));
        for _ in 0..2 {
            let err = conn.connect().await.unwrap_err();
            assert!(!matches!(err, Error::AlreadyConnected { .. }), "{err}");
            assert!(err.to_string().contains("connection refused"));
        }
        assert_eq!(seen.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disconnect_during_unbounded_handshake() {
        let (conn, _seen) = connection_with(
            Behaviour::HangInitialize,
            text_result(&[]),
            ConnectionOptions {
                handshake_timeout: None,
                disconnect_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );
        let conn = Arc::new(conn);
        let connecting = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.lifecycle(), SessionLifecycle::Starting);

        conn.disconnect().await;

        let err = connecting.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::SessionClosed { .. }));
        assert!(conn.tools().is_empty());
        assert_eq!(conn.lifecycle(), SessionLifecycle::Terminated);
    }

    #[tokio::test]
    async fn handshake_timeout_is_reported() {
        let (conn, _seen) = connection(Behaviour::HangInitialize, text_result(&[]));
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, Error::HandshakeTimeout { .. }));
        assert!(conn.tools().is_empty());
    }

    #[tokio::test]
    async fn second_connect_while_alive_is_rejected() {
        let (conn, seen) = connection(Behaviour::Ok, text_result(&["x"]));
        conn.connect().await.unwrap();
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnected { .. }));
        assert_eq!(seen.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_closes_session() {
        let (conn, seen) = connection(Behaviour::Ok, text_result(&["x"]));

        // Never connected.
        conn.disconnect().await;
        assert_eq!(conn.lifecycle(), SessionLifecycle::Idle);

        conn.connect().await.unwrap();
        conn.disconnect().await;
        conn.disconnect().await;

        assert!(seen.closed.load(Ordering::SeqCst));
        assert!(!conn.is_connected());
        assert!(conn.tools().is_empty());
        tokio_test::assert_err!(conn.call_tool("search", serde_json::json!({})).await);
    }

    #[tokio::test]
    async fn reconnect_after_disconnect() {
        let (conn, seen) = connection(Behaviour::Ok, text_result(&["x"]));
        conn.connect().await.unwrap();
        conn.disconnect().await;
        tokio_test::assert_ok!(conn.connect().await);
        assert!(conn.is_connected());
        assert_eq!(seen.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_guard_leaves_newer_session_alone() {
        let (conn, _seen) = connection(Behaviour::Ok, text_result(&["x"]));
        conn.connect().await.unwrap();
        let live = lock(&conn.shared).generation;

        drop(TerminationGuard {
            server: "alpha".into(),
            shared: Arc::clone(&conn.shared),
            generation: live - 1,
        });

        assert!(conn.is_connected());
        assert_eq!(conn.tools().len(), 2);
    }

    #[tokio::test]
    async fn reconnect_after_aborted_disconnect_stays_alive() {
        let (conn, seen) = connection(Behaviour::HangClose, text_result(&["x"]));
        conn.connect().await.unwrap();

        // close() never returns, so disconnect gives up and aborts the task.
        conn.disconnect().await;
        assert!(seen.closed.load(Ordering::SeqCst));
        assert_eq!(conn.lifecycle(), SessionLifecycle::Terminated);

        conn.connect().await.unwrap();
        // Let the aborted task get dropped.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(conn.is_connected());
        assert_eq!(conn.tools().len(), 2);
        assert_eq!(
            conn.call_tool("search", serde_json::json!({})).await.unwrap(),
            "x"
        );
    }

    #[tokio::test]
    async fn disconnect_interrupts_inflight_call() {
        let (conn, _seen) = connection(Behaviour::HangCalls, text_result(&["x"]));
        let conn = Arc::new(conn);
        conn.connect().await.unwrap();

        let caller = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.call_tool("search", serde_json::json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.disconnect().await;

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::SessionClosed { .. }));
    }
}
