//! Session controller: one streaming turn at a time
//!
//! `send` drives the whole turn — open the stream, apply chunks in
//! arrival order, land in a terminal phase. Everything turn-fatal is
//! surfaced as `Phase::Failed` on the observable state, never as an
//! error thrown past this boundary; the caller inspects the phase.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use kaiwa_wire::ChatRequest;

use crate::error::{Error, Result};
use crate::state::{ConversationState, Phase};
use crate::ticker::{self, TickerConfig};
use crate::transport::Transport;

/// Turn defaults applied to every request this session sends
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Backend session to continue, when resuming one
    pub session_id: Option<String>,
    /// Scope retrieval to one client
    pub client_id: Option<String>,
    /// Retrieved-context size hint; `None` uses the wire default
    pub context_size: Option<u32>,
    pub ticker: TickerConfig,
}

/// Controller for one conversation.
///
/// Owns the conversation state and at most one open stream. The UI
/// collaborator calls [`send`](Session::send) and [`abort`](Session::abort)
/// and renders from [`state`](Session::state) snapshots.
pub struct Session {
    transport: Arc<dyn Transport>,
    state: Arc<Mutex<ConversationState>>,
    cancel: Arc<Mutex<CancellationToken>>,
    config: SessionConfig,
}

impl Session {
    /// Create a session over the given transport
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(ConversationState::new())),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            config,
        }
    }

    /// Snapshot of the current conversation state
    pub fn state(&self) -> ConversationState {
        self.state.lock().clone()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Cloneable handle for aborting and observing from other tasks
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cancel: Arc::clone(&self.cancel),
            state: Arc::clone(&self.state),
        }
    }

    /// Run one turn to its terminal phase.
    ///
    /// Returns `Err(Error::Busy)` if a turn is already in flight; every
    /// other outcome — completion, abort, backend error, transport
    /// failure — is reported through the state's phase.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        {
            let mut state = self.state.lock();
            if state.phase != Phase::Idle {
                return Err(Error::Busy);
            }
            state.begin_turn(text.clone());
        }

        // Fresh token per turn; the previous turn's token is dead either
        // way once its turn reached a terminal phase
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        let ticker = ticker::spawn(Arc::clone(&self.state), self.config.ticker.clone());

        let request = self.build_request(text);
        let mut stream = match self.transport.open(&request, cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("failed to open chat stream: {e}");
                {
                    let mut state = self.state.lock();
                    if cancel.is_cancelled() {
                        state.abort();
                    } else {
                        state.fail("failed to reach the chat backend");
                    }
                }
                let _ = ticker.await;
                return Ok(());
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = stream.next() => next,
            };
            let Some(item) = next else { break };
            if cancel.is_cancelled() {
                // Already-buffered chunks are not applied after abort
                break;
            }
            match item {
                Ok(chunk) => {
                    let terminal = chunk.is_terminal();
                    self.state.lock().apply(chunk);
                    if terminal {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("chat stream failed: {e}");
                    self.state.lock().fail(e.to_string());
                    break;
                }
            }
        }
        drop(stream);

        {
            let mut state = self.state.lock();
            if cancel.is_cancelled() {
                state.abort();
            } else if state.phase.is_active() {
                // The turn never completed explicitly
                state.fail("stream closed before completion");
            }
        }
        let _ = ticker.await;
        Ok(())
    }

    /// Cancel the in-flight turn.
    ///
    /// Cooperative: the read loop stops at its next check and no further
    /// chunk is applied; already-applied chunks are not undone.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
        self.state.lock().abort();
    }

    /// Return to `Idle` once a terminal phase has been observed
    pub fn reset(&self) {
        self.state.lock().reset();
    }

    fn build_request(&self, message: String) -> ChatRequest {
        let mut request = ChatRequest::new(message);
        request.session_id = self.config.session_id.clone();
        request.client_id = self.config.client_id.clone();
        if let Some(size) = self.config.context_size {
            request.context_size = size;
        }
        request
    }
}

/// A cloneable handle for poking the session from external code.
///
/// Both fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    state: Arc<Mutex<ConversationState>>,
}

impl SessionHandle {
    /// Cancel the in-flight turn
    pub fn abort(&self) {
        self.cancel.lock().cancel();
        self.state.lock().abort();
    }

    /// Snapshot of the current conversation state
    pub fn state(&self) -> ConversationState {
        self.state.lock().clone()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_stream::stream;
    use async_trait::async_trait;

    use kaiwa_wire::{Chunk, ChunkStream, Timing};

    fn delta(text: &str) -> kaiwa_wire::Result<Chunk> {
        Ok(Chunk::ContentDelta {
            text: text.to_string(),
        })
    }

    fn status(stage: &str, progress: u8) -> kaiwa_wire::Result<Chunk> {
        Ok(Chunk::Status {
            stage: stage.to_string(),
            message: None,
            progress,
        })
    }

    fn done(total_ms: u64) -> kaiwa_wire::Result<Chunk> {
        Ok(Chunk::Done {
            timing: Timing {
                total_ms: Some(total_ms),
                ..Timing::default()
            },
            suggested_terms: vec![],
        })
    }

    /// Yields pre-scripted items, one script per turn
    struct ScriptedTransport {
        turns: Mutex<VecDeque<Vec<kaiwa_wire::Result<Chunk>>>>,
    }

    impl ScriptedTransport {
        fn new(turns: Vec<Vec<kaiwa_wire::Result<Chunk>>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(
            &self,
            _request: &ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<ChunkStream> {
            let items = self.turns.lock().pop_front().expect("no scripted turn left");
            Ok(Box::pin(tokio_stream::iter(items)))
        }
    }

    /// Never yields anything; the turn only ends via abort
    struct PendingTransport;

    #[async_trait]
    impl Transport for PendingTransport {
        async fn open(
            &self,
            _request: &ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<ChunkStream> {
            Ok(Box::pin(futures::stream::pending()))
        }
    }

    /// Fails to open the stream at all
    struct RefusedTransport;

    #[async_trait]
    impl Transport for RefusedTransport {
        async fn open(
            &self,
            _request: &ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<ChunkStream> {
            Err(kaiwa_wire::Error::api(503, "unavailable").into())
        }
    }

    /// Aborts the session from inside the stream, then keeps yielding
    struct AbortMidstreamTransport {
        handle: Mutex<Option<SessionHandle>>,
    }

    #[async_trait]
    impl Transport for AbortMidstreamTransport {
        async fn open(
            &self,
            _request: &ChatRequest,
            _cancel: CancellationToken,
        ) -> Result<ChunkStream> {
            let handle = self.handle.lock().take().expect("handle not set");
            Ok(Box::pin(stream! {
                yield delta("Par");
                handle.abort();
                yield delta("tial never applied");
                yield done(500);
            }))
        }
    }

    // -- Full turn --

    #[tokio::test]
    async fn test_end_to_end_turn() {
        let transport = ScriptedTransport::new(vec![vec![
            status("searching", 30),
            status("generating", 80),
            delta("Hi"),
            delta(" there"),
            done(500),
        ]]);
        let session = Session::new(transport, SessionConfig::default());

        session.send("hello").await.unwrap();

        let state = session.state();
        assert_eq!(state.phase, Phase::Completed);
        assert_eq!(state.progress, 100);
        assert_eq!(state.timing.total_ms, Some(500));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].text, "Hi there");
    }

    #[tokio::test]
    async fn test_backend_error_preserves_partial_text() {
        let transport = ScriptedTransport::new(vec![vec![
            delta("Partial"),
            Ok(Chunk::Error {
                reason: "boom".to_string(),
            }),
        ]]);
        let session = Session::new(transport, SessionConfig::default());

        session.send("hello").await.unwrap();

        let state = session.state();
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.messages[1].text, "Partial");
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_stream_without_terminal_chunk_fails() {
        let transport = ScriptedTransport::new(vec![vec![
            delta("Hi"),
            Err(kaiwa_wire::Error::Sse(
                "stream closed before a done or error chunk".to_string(),
            )),
        ]]);
        let session = Session::new(transport, SessionConfig::default());

        session.send("hello").await.unwrap();

        let state = session.state();
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.messages[1].text, "Hi");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_failure_returns_promptly() {
        let session = Session::new(Arc::new(RefusedTransport), SessionConfig::default());

        tokio::time::timeout(std::time::Duration::from_secs(5), session.send("hello"))
            .await
            .expect("send must finish after an open failure")
            .unwrap();

        assert_eq!(session.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_open_failure_fails_turn_without_partial_text() {
        let session = Session::new(Arc::new(RefusedTransport), SessionConfig::default());

        session.send("hello").await.unwrap();

        let state = session.state();
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.messages[1].text, "");
        assert_eq!(state.error.as_deref(), Some("failed to reach the chat backend"));
    }

    // -- Abort --

    #[tokio::test]
    async fn test_abort_suppresses_late_chunks() {
        let transport = Arc::new(AbortMidstreamTransport {
            handle: Mutex::new(None),
        });
        let session = Session::new(Arc::clone(&transport) as Arc<dyn Transport>, SessionConfig::default());
        *transport.handle.lock() = Some(session.handle());

        session.send("hello").await.unwrap();

        let state = session.state();
        assert_eq!(state.phase, Phase::Aborted);
        assert_eq!(state.messages[1].text, "Par");
    }

    #[tokio::test]
    async fn test_abort_unblocks_pending_read() {
        let session = Arc::new(Session::new(Arc::new(PendingTransport), SessionConfig::default()));
        let handle = session.handle();

        let runner = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send("hello").await })
        };
        tokio::task::yield_now().await;
        handle.abort();

        runner.await.unwrap().unwrap();
        assert_eq!(session.phase(), Phase::Aborted);
        assert_eq!(session.state().messages[1].text, "");
    }

    // -- Gating and reuse --

    #[tokio::test]
    async fn test_send_while_busy_is_an_error() {
        let session = Arc::new(Session::new(Arc::new(PendingTransport), SessionConfig::default()));

        let runner = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send("first").await })
        };
        tokio::task::yield_now().await;

        assert!(matches!(session.send("second").await, Err(Error::Busy)));

        session.abort();
        runner.await.unwrap().unwrap();
        // The rejected send left no trace in the log
        assert_eq!(session.state().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_allows_next_turn() {
        let transport = ScriptedTransport::new(vec![
            vec![delta("one"), done(10)],
            vec![delta("two"), done(20)],
        ]);
        let session = Session::new(transport, SessionConfig::default());

        session.send("first").await.unwrap();
        assert_eq!(session.phase(), Phase::Completed);

        // Without reset, the session stays gated
        assert!(matches!(session.send("again").await, Err(Error::Busy)));

        session.reset();
        assert_eq!(session.phase(), Phase::Idle);
        session.send("second").await.unwrap();

        let state = session.state();
        assert_eq!(state.phase, Phase::Completed);
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.messages[3].text, "two");
        assert_eq!(state.timing.total_ms, Some(20));
    }

    #[tokio::test]
    async fn test_request_carries_session_defaults() {
        struct CapturingTransport {
            seen: Mutex<Option<ChatRequest>>,
        }

        #[async_trait]
        impl Transport for CapturingTransport {
            async fn open(
                &self,
                request: &ChatRequest,
                _cancel: CancellationToken,
            ) -> Result<ChunkStream> {
                *self.seen.lock() = Some(request.clone());
                Ok(Box::pin(tokio_stream::iter(vec![done(1)])))
            }
        }

        let transport = Arc::new(CapturingTransport {
            seen: Mutex::new(None),
        });
        let session = Session::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            SessionConfig {
                session_id: Some("s-1".to_string()),
                client_id: Some("c-9".to_string()),
                context_size: Some(10),
                ..SessionConfig::default()
            },
        );

        session.send("hello").await.unwrap();

        let seen = transport.seen.lock().clone().unwrap();
        assert_eq!(seen.message, "hello");
        assert_eq!(seen.session_id.as_deref(), Some("s-1"));
        assert_eq!(seen.client_id.as_deref(), Some("c-9"));
        assert_eq!(seen.context_size, 10);
        assert!(seen.stream);
    }
}
