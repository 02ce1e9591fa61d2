//! JetKVM client
//!
//! Owns the auth session, both signaling transports and the session
//! registry. [`KvmClient::create_offer`] tries the WebSocket transport first
//! and falls back to the legacy HTTP endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::error::{KvmError, Result};
use crate::webrtc::bridge::{AnswerGate, WebRtcSendMessage};
use crate::webrtc::candidate::{candidate_to_map, CandidateFields};
use crate::webrtc::http_transport::LegacyHttpSignaling;
use crate::webrtc::session::{RemoteCandidateHandler, SessionInfo, SessionRegistry};
use crate::webrtc::transport::{OfferRequest, SignalingTransport, TransportKind};
use crate::webrtc::ws_transport::WebSocketSignaling;

/// Answer returned by [`KvmClient::negotiate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferAnswer {
    pub answer_sdp: String,
    /// Transport that produced the answer
    pub transport: TransportKind,
    /// Whether a video session was registered for candidate relay
    pub session_registered: bool,
}

/// Client for one JetKVM appliance
pub struct KvmClient {
    config: Arc<ClientConfig>,
    auth: Arc<Authenticator>,
    /// Tried in order; only the last transport's error is returned
    transports: Vec<Box<dyn SignalingTransport>>,
    sessions: SessionRegistry,
    closed: AtomicBool,
}

impl KvmClient {
    /// Build a client. No network traffic happens until first use.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.signaling.request_timeout())
            .build()
            .map_err(|e| KvmError::Config(format!("failed to build HTTP client: {}", e)))?;

        let auth = Arc::new(Authenticator::new(&config, http.clone()));
        let transports: Vec<Box<dyn SignalingTransport>> = vec![
            Box::new(WebSocketSignaling::new(&config, auth.clone())),
            Box::new(LegacyHttpSignaling::new(&config, http, auth.clone())),
        ];

        Ok(Self {
            config: Arc::new(config),
            auth,
            transports,
            sessions: SessionRegistry::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        self.config.host()
    }

    /// Video is only available with a configured password
    pub fn has_video(&self) -> bool {
        self.auth.has_password()
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Log in unless already authenticated
    pub async fn ensure_authenticated(&self) -> Result<()> {
        self.auth.ensure_authenticated().await
    }

    /// Negotiate an offer and return the answer SDP.
    ///
    /// With a `session_id`, a successful WebSocket negotiation registers a
    /// video session whose remote candidates go to `on_remote_candidate`.
    pub async fn create_offer(
        &self,
        offer_sdp: &str,
        session_id: Option<&str>,
        on_remote_candidate: Option<RemoteCandidateHandler>,
    ) -> Result<String> {
        self.negotiate(offer_sdp, session_id, on_remote_candidate)
            .await
            .map(|answer| answer.answer_sdp)
    }

    /// Like [`KvmClient::create_offer`], also reporting which transport answered
    pub async fn negotiate(
        &self,
        offer_sdp: &str,
        session_id: Option<&str>,
        on_remote_candidate: Option<RemoteCandidateHandler>,
    ) -> Result<OfferAnswer> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvmError::ConnectionFailure("client closed".to_string()));
        }
        if !self.has_video() {
            return Err(KvmError::AuthUnavailable(
                "a password is required for video".to_string(),
            ));
        }

        let request = OfferRequest {
            offer_sdp,
            session_id,
        };
        let mut last_err = None;

        for transport in &self.transports {
            let kind = transport.kind();
            match transport.negotiate(request).await {
                Ok(negotiated) => {
                    let mut session_registered = false;
                    if let (Some(id), Some(socket)) = (session_id, negotiated.socket) {
                        self.sessions
                            .register(id, socket, negotiated.early_candidates, on_remote_candidate)
                            .await;
                        if self.closed.load(Ordering::Acquire) {
                            self.sessions.close(id).await;
                            return Err(KvmError::ConnectionFailure("client closed".to_string()));
                        }
                        session_registered = true;
                    }
                    info!(
                        "WebRTC answer from {} via {} ({} bytes)",
                        self.host(),
                        kind,
                        negotiated.answer_sdp.len()
                    );
                    return Ok(OfferAnswer {
                        answer_sdp: negotiated.answer_sdp,
                        transport: kind,
                        session_registered,
                    });
                }
                Err(e) => {
                    debug!("{} signaling failed: {}", kind, e);
                    last_err = Some((kind, e));
                }
            }

            if self.closed.load(Ordering::Acquire) {
                break;
            }
        }

        let (kind, err) = last_err.unwrap_or_else(|| {
            (
                TransportKind::LegacyHttp,
                KvmError::ConnectionFailure("no signaling transport configured".to_string()),
            )
        });
        warn!("WebRTC negotiation with {} failed ({}): {}", self.host(), kind, err);
        Err(err)
    }

    /// Forward a local ICE candidate to the appliance.
    ///
    /// Never fails: unknown or closed sessions are skipped and send errors are
    /// only logged.
    pub async fn send_candidate(&self, session_id: &str, candidate: &dyn CandidateFields) {
        let map = candidate_to_map(candidate);
        self.sessions.send_candidate(session_id, &map).await;
    }

    /// Close one video session. Idempotent.
    pub async fn close_session(&self, session_id: &str) {
        self.sessions.close(session_id).await;
    }

    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains(session_id).await
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.count().await
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.list().await
    }

    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.get(session_id).await
    }

    /// Handle a browser offer end to end, reporting through `send`.
    ///
    /// Sends an answer (then any remote candidates) on success, or an error
    /// message on failure. Never fails itself.
    pub async fn handle_webrtc_offer(
        &self,
        offer_sdp: &str,
        session_id: &str,
        send: WebRtcSendMessage,
    ) {
        let gate = AnswerGate::new(send);
        let handler = gate.candidate_handler(session_id);

        match self.create_offer(offer_sdp, Some(session_id), Some(handler)).await {
            Ok(answer) => gate.answer(session_id, answer),
            Err(e) => gate.fail(session_id, &e),
        }
    }

    /// Close all video sessions. Further negotiations fail.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sessions.close_all().await;
        self.auth.invalidate();
        info!("JetKVM client for {} closed", self.host());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
