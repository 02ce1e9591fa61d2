//! Legacy HTTP signaling transport
//!
//! Single-shot `POST /webrtc/session` exchange used by older firmware. Never
//! produces a video session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::signaling::{decode_answer_envelope, encode_envelope, SdEnvelope, SessionDescription};
use super::transport::{Negotiated, OfferRequest, SignalingTransport, TransportKind};
use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::error::{truncate_body, KvmError, Result};

/// Legacy session endpoint on the native API
pub const SESSION_PATH: &str = "/webrtc/session";

/// Body characters kept in protocol error messages
const ERROR_BODY_LIMIT: usize = 200;

/// Outcome of a single request attempt
enum Attempt {
    Answer(String),
    Unauthorized,
    ConnectionError(KvmError),
}

pub struct LegacyHttpSignaling {
    http: reqwest::Client,
    url: String,
    auth: Arc<Authenticator>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl LegacyHttpSignaling {
    pub fn new(config: &ClientConfig, http: reqwest::Client, auth: Arc<Authenticator>) -> Self {
        Self {
            http,
            url: format!("{}{}", config.native_base_url(), SESSION_PATH),
            auth,
            max_attempts: config.signaling.http_max_attempts.max(1),
            retry_delay: config.signaling.retry_delay(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post the offer envelope to the legacy endpoint and decode the answer
    pub async fn exchange(&self, offer_sdp: &str) -> Result<String> {
        let body = SdEnvelope {
            sd: encode_envelope(&SessionDescription::offer(offer_sdp)),
        };
        let mut last_connection_error = None;

        for attempt in 1..=self.max_attempts {
            debug!("Legacy signaling: POST {} (attempt {})", self.url, attempt);

            match self.attempt(&body).await? {
                Attempt::Answer(answer) => return Ok(answer),
                Attempt::Unauthorized => {
                    self.auth.invalidate();
                    if attempt == self.max_attempts {
                        return Err(KvmError::Unauthorized(format!(
                            "{} rejected the session after {} attempts",
                            SESSION_PATH, attempt
                        )));
                    }
                    debug!("Legacy signaling unauthorized, re-authenticating");
                }
                Attempt::ConnectionError(err) => {
                    self.auth.invalidate();
                    debug!("Legacy signaling attempt {} failed: {}", attempt, err);
                    last_connection_error = Some(err);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        let reason = last_connection_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "retry budget exhausted".to_string());
        warn!("Legacy signaling to {} failed: {}", self.url, reason);
        Err(KvmError::ConnectionFailure(format!(
            "cannot reach {} after {} attempts ({})",
            self.url, self.max_attempts, reason
        )))
    }

    /// One authenticated request. Errors returned here end the exchange.
    async fn attempt(&self, body: &SdEnvelope) -> Result<Attempt> {
        match self.auth.ensure_authenticated().await {
            Ok(()) => {}
            Err(err @ KvmError::ConnectionFailure(_)) => return Ok(Attempt::ConnectionError(err)),
            Err(err) => return Err(err),
        }

        let mut req = self.http.post(&self.url).json(body);
        if let Some(cookie) = self.auth.cookie_header() {
            req = req.header(COOKIE, cookie);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(Attempt::ConnectionError(KvmError::ConnectionFailure(format!(
                    "{} request failed: {}",
                    SESSION_PATH, e
                ))))
            }
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::Unauthorized);
        }
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            return Err(KvmError::ProtocolFailure(format!(
                "{} returned HTTP {}: {}",
                SESSION_PATH,
                status.as_u16(),
                truncate_body(&text, ERROR_BODY_LIMIT)
            )));
        }

        let envelope: SdEnvelope = resp
            .json()
            .await
            .map_err(|e| KvmError::from_reqwest("invalid legacy session response", e))?;
        decode_answer_envelope(&envelope.sd).map(Attempt::Answer)
    }
}

#[async_trait]
impl SignalingTransport for LegacyHttpSignaling {
    fn kind(&self) -> TransportKind {
        TransportKind::LegacyHttp
    }

    async fn negotiate(&self, request: OfferRequest<'_>) -> Result<Negotiated> {
        let answer_sdp = self.exchange(request.offer_sdp).await?;
        Ok(Negotiated {
            answer_sdp,
            socket: None,
            early_candidates: Vec::new(),
        })
    }
}
