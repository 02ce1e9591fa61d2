//! WebSocket signaling transport
//!
//! Connects to `/webrtc/signaling/client` with the session cookie, sends the
//! offer and waits a bounded number of receives for the answer. With a
//! correlation id the socket is handed back open so the session registry can
//! relay trickle candidates over it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::{header::COOKIE, HeaderValue, StatusCode},
    Error as WsError, Message,
};
use tracing::{debug, trace};

use super::candidate::CandidateMap;
use super::signaling::{decode_answer_payload, offer_frame, InboundFrame};
use super::transport::{Negotiated, OfferRequest, SignalingSocket, SignalingTransport, TransportKind};
use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::error::{KvmError, Result};

/// Answer extracted from the socket plus candidates that arrived before it
struct AnswerWait {
    answer_sdp: String,
    early_candidates: Vec<CandidateMap>,
}

pub struct WebSocketSignaling {
    url: String,
    auth: Arc<Authenticator>,
    connect_timeout: Duration,
    receive_timeout: Duration,
    max_receive_attempts: u32,
}

impl WebSocketSignaling {
    pub fn new(config: &ClientConfig, auth: Arc<Authenticator>) -> Self {
        Self {
            url: config.signaling_ws_url(),
            auth,
            connect_timeout: config.signaling.ws_connect_timeout(),
            receive_timeout: config.signaling.ws_receive_timeout(),
            max_receive_attempts: config.signaling.ws_max_receive_attempts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the socket with the current credential attached
    async fn connect(&self) -> Result<SignalingSocket> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| KvmError::Config(format!("invalid signaling URL {}: {}", self.url, e)))?;

        if let Some(cookie) = self.auth.cookie_header() {
            let value = HeaderValue::from_str(&cookie).map_err(|e| {
                KvmError::ProtocolFailure(format!("session cookie is not a valid header: {}", e))
            })?;
            request.headers_mut().insert(COOKIE, value);
        }

        debug!("Connecting to signaling socket {}", self.url);
        match timeout(self.connect_timeout, tokio_tungstenite::connect_async(request)).await {
            Err(_) => Err(KvmError::ConnectionFailure(format!(
                "signaling connect to {} timed out after {:?}",
                self.url, self.connect_timeout
            ))),
            Ok(Err(WsError::Http(resp)))
                if resp.status() == StatusCode::UNAUTHORIZED
                    || resp.status() == StatusCode::FORBIDDEN =>
            {
                Err(KvmError::Unauthorized(format!(
                    "signaling handshake rejected with HTTP {}",
                    resp.status().as_u16()
                )))
            }
            Ok(Err(WsError::Http(resp))) => Err(KvmError::ConnectionFailure(format!(
                "signaling handshake rejected with HTTP {}",
                resp.status().as_u16()
            ))),
            Ok(Err(e)) => Err(KvmError::ConnectionFailure(format!(
                "signaling connect to {} failed: {}",
                self.url, e
            ))),
            Ok(Ok((ws, _))) => Ok(ws),
        }
    }

    /// Connect, re-authenticating once if the handshake is rejected
    async fn connect_authenticated(&self) -> Result<SignalingSocket> {
        self.auth.ensure_authenticated().await?;
        match self.connect().await {
            Err(KvmError::Unauthorized(reason)) => {
                debug!("Signaling handshake unauthorized ({}), logging in again", reason);
                self.auth.invalidate();
                self.auth.authenticate().await?;
                self.connect().await.inspect_err(|e| {
                    if matches!(e, KvmError::Unauthorized(_)) {
                        self.auth.invalidate();
                    }
                })
            }
            other => other,
        }
    }

    /// Read frames until the answer arrives or the receive budget runs out.
    ///
    /// Every receive consumes one attempt, keepalives and timeouts included.
    async fn await_answer(&self, ws: &mut SignalingSocket) -> Result<AnswerWait> {
        let mut early_candidates = Vec::new();

        for attempt in 1..=self.max_receive_attempts {
            let msg = match timeout(self.receive_timeout, ws.next()).await {
                Err(_) => {
                    trace!("No signaling frame within {:?} (attempt {})", self.receive_timeout, attempt);
                    continue;
                }
                Ok(None) => {
                    return Err(KvmError::ProtocolFailure(
                        "signaling socket closed before answer".to_string(),
                    ))
                }
                Ok(Some(Err(e))) => {
                    return Err(KvmError::ProtocolFailure(format!(
                        "signaling socket error: {}",
                        e
                    )))
                }
                Ok(Some(Ok(msg))) => msg,
            };

            match msg {
                Message::Text(text) => match InboundFrame::parse(text.as_str()) {
                    InboundFrame::Answer(data) => {
                        let answer_sdp = decode_answer_payload(&data)?;
                        debug!(
                            "Signaling answer received after {} receive(s) ({} bytes)",
                            attempt,
                            answer_sdp.len()
                        );
                        return Ok(AnswerWait {
                            answer_sdp,
                            early_candidates,
                        });
                    }
                    InboundFrame::Candidate(candidate) => early_candidates.push(candidate),
                    InboundFrame::Keepalive => trace!("Signaling keepalive"),
                    InboundFrame::Other(kind) => debug!("Ignoring signaling frame '{}'", kind),
                    InboundFrame::Malformed => debug!("Ignoring malformed signaling frame"),
                },
                Message::Close(_) => {
                    return Err(KvmError::ProtocolFailure(
                        "signaling socket closed before answer".to_string(),
                    ))
                }
                _ => {}
            }
        }

        Err(KvmError::ProtocolFailure(format!(
            "no answer after {} receive attempts",
            self.max_receive_attempts
        )))
    }

    async fn close_quietly(&self, ws: &mut SignalingSocket) {
        match timeout(self.receive_timeout, ws.close(None)).await {
            Ok(Err(e)) => trace!("Signaling socket close: {}", e),
            Err(_) => trace!("Signaling socket close timed out"),
            Ok(Ok(())) => {}
        }
    }
}

#[async_trait]
impl SignalingTransport for WebSocketSignaling {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn negotiate(&self, request: OfferRequest<'_>) -> Result<Negotiated> {
        let mut ws = self.connect_authenticated().await?;

        if let Err(e) = ws.send(Message::Text(offer_frame(request.offer_sdp).into())).await {
            self.close_quietly(&mut ws).await;
            return Err(KvmError::ProtocolFailure(format!(
                "failed to send offer: {}",
                e
            )));
        }

        let wait = match self.await_answer(&mut ws).await {
            Ok(wait) => wait,
            Err(e) => {
                self.close_quietly(&mut ws).await;
                return Err(e);
            }
        };

        if request.session_id.is_some() {
            return Ok(Negotiated {
                answer_sdp: wait.answer_sdp,
                socket: Some(ws),
                early_candidates: wait.early_candidates,
            });
        }

        self.close_quietly(&mut ws).await;
        Ok(Negotiated {
            answer_sdp: wait.answer_sdp,
            socket: None,
            early_candidates: Vec::new(),
        })
    }
}
