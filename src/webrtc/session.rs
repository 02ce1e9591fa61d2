//! Video session registry and background candidate relay
//!
//! Each session owns the write half of its signaling socket and one relay
//! task reading the other half. Closing a session always runs in the same
//! order: cancel the relay, wait for it, close the socket.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::candidate::CandidateMap;
use super::signaling::{candidate_frame, InboundFrame};
use super::transport::SignalingSocket;

/// Callback receiving remote candidates, awaited before the next frame is read
pub type RemoteCandidateHandler =
    Arc<dyn Fn(CandidateMap) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`RemoteCandidateHandler`]
pub fn candidate_handler<F, Fut>(f: F) -> RemoteCandidateHandler
where
    F: Fn(CandidateMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |candidate| f(candidate).boxed())
}

type SocketSink = SplitSink<SignalingSocket, Message>;
type SocketStream = SplitStream<SignalingSocket>;

/// Video session info
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// False once the socket closed or the relay stopped
    pub open: bool,
}

struct VideoSession {
    sink: Arc<Mutex<SocketSink>>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
    relay: JoinHandle<()>,
    created_at: DateTime<Utc>,
}

impl VideoSession {
    fn start(
        session_id: &str,
        socket: SignalingSocket,
        early_candidates: Vec<CandidateMap>,
        handler: Option<RemoteCandidateHandler>,
    ) -> Self {
        let (sink, stream) = socket.split();
        let open = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let relay = tokio::spawn(run_relay(
            session_id.to_string(),
            stream,
            early_candidates,
            handler,
            open.clone(),
            cancel.clone(),
        ));

        Self {
            sink: Arc::new(Mutex::new(sink)),
            open,
            cancel,
            relay,
            created_at: Utc::now(),
        }
    }

    fn info(&self, session_id: &str) -> SessionInfo {
        SessionInfo {
            session_id: session_id.to_string(),
            created_at: self.created_at,
            open: self.open.load(Ordering::Acquire),
        }
    }

    /// Cancel the relay, wait for it, then close the socket
    async fn shutdown(mut self, session_id: &str) {
        self.cancel.cancel();
        match (&mut self.relay).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Relay task for session {} failed: {}", session_id, e),
        }

        self.open.store(false, Ordering::Release);
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Signaling socket for session {} already closed: {}", session_id, e);
        }
    }
}

impl Drop for VideoSession {
    // Without a shutdown the socket closes once the relay drops its half
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_relay(
    session_id: String,
    stream: SocketStream,
    early_candidates: Vec<CandidateMap>,
    handler: Option<RemoteCandidateHandler>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let relay = AssertUnwindSafe(relay_frames(
        &session_id,
        stream,
        early_candidates,
        handler,
    ))
    .catch_unwind();

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Relay for session {} cancelled", session_id);
        }
        result = relay => {
            if result.is_err() {
                warn!("Relay for session {} aborted by a panicking candidate handler", session_id);
            }
        }
    }

    open.store(false, Ordering::Release);
}

async fn relay_frames(
    session_id: &str,
    mut stream: SocketStream,
    early_candidates: Vec<CandidateMap>,
    handler: Option<RemoteCandidateHandler>,
) {
    for candidate in early_candidates {
        deliver(handler.as_ref(), candidate).await;
    }

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match InboundFrame::parse(text.as_str()) {
                InboundFrame::Candidate(candidate) => {
                    trace!("Remote candidate for session {}", session_id);
                    deliver(handler.as_ref(), candidate).await;
                }
                InboundFrame::Keepalive => trace!("Keepalive on session {}", session_id),
                InboundFrame::Answer(_) => {
                    debug!("Ignoring repeated answer on session {}", session_id)
                }
                InboundFrame::Other(kind) => {
                    debug!("Ignoring '{}' frame on session {}", kind, session_id)
                }
                InboundFrame::Malformed => {
                    debug!("Ignoring malformed frame on session {}", session_id)
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Signaling socket for session {} closed by appliance", session_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Signaling socket for session {} failed: {}", session_id, e);
                break;
            }
        }
    }
}

async fn deliver(handler: Option<&RemoteCandidateHandler>, candidate: CandidateMap) {
    if let Some(handler) = handler {
        handler(candidate).await;
    }
}

/// Registry of open video sessions keyed by correlation identifier
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, VideoSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open socket and start its relay task.
    ///
    /// A session already registered under the same id is closed.
    pub async fn register(
        &self,
        session_id: &str,
        socket: SignalingSocket,
        early_candidates: Vec<CandidateMap>,
        handler: Option<RemoteCandidateHandler>,
    ) {
        let session = VideoSession::start(session_id, socket, early_candidates, handler);
        let previous = self
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), session);

        if let Some(previous) = previous {
            warn!("Video session {} superseded by a new negotiation", session_id);
            previous.shutdown(session_id).await;
        }
        info!("Video session registered: {}", session_id);
    }

    /// Send a normalized candidate over a session's socket.
    ///
    /// Unknown or closed sessions are skipped; send failures are logged.
    pub async fn send_candidate(&self, session_id: &str, candidate: &CandidateMap) {
        let (sink, open) = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(session) => (session.sink.clone(), session.open.clone()),
                None => {
                    debug!("No video session {}, dropping local candidate", session_id);
                    return;
                }
            }
        };

        if !open.load(Ordering::Acquire) {
            debug!("Video session {} is closed, dropping local candidate", session_id);
            return;
        }

        let frame = candidate_frame(candidate);
        let mut sink = sink.lock().await;
        if let Err(e) = sink.send(Message::Text(frame.into())).await {
            open.store(false, Ordering::Release);
            warn!("Failed to send candidate on session {}: {}", session_id, e);
        }
    }

    /// Close one session. Unknown ids are a no-op.
    pub async fn close(&self, session_id: &str) {
        let session = self.sessions.write().await.remove(session_id);
        if let Some(session) = session {
            session.shutdown(session_id).await;
            info!("Video session closed: {}", session_id);
        }
    }

    /// Close every session, joining all relay tasks
    pub async fn close_all(&self) {
        let drained: Vec<(String, VideoSession)> =
            self.sessions.write().await.drain().collect();
        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        join_all(
            drained
                .into_iter()
                .map(|(id, session)| async move { session.shutdown(&id).await }),
        )
        .await;
        info!("Closed {} video session(s)", count);
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.info(session_id))
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| s.info(id))
            .collect()
    }
}
