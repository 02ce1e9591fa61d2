//! Signaling transport abstraction

use std::fmt;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::candidate::CandidateMap;
use crate::error::Result;

/// Signaling socket kept open after a successful negotiation
pub type SignalingSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which signaling path produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// `/webrtc/signaling/client` socket (current firmware)
    WebSocket,
    /// `/webrtc/session` request/response (older firmware)
    LegacyHttp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "websocket"),
            TransportKind::LegacyHttp => write!(f, "legacy-http"),
        }
    }
}

/// One offer/answer exchange request
#[derive(Debug, Clone, Copy)]
pub struct OfferRequest<'a> {
    pub offer_sdp: &'a str,
    /// Correlation identifier; when present a socket transport keeps its
    /// connection open for candidate relay
    pub session_id: Option<&'a str>,
}

/// Result of a successful negotiation
pub struct Negotiated {
    /// Non-empty answer SDP
    pub answer_sdp: String,
    /// Open socket, only for the WebSocket path with a correlation id
    pub socket: Option<SignalingSocket>,
    /// Remote candidates received on the socket before the answer
    pub early_candidates: Vec<CandidateMap>,
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("answer_len", &self.answer_sdp.len())
            .field("socket", &self.socket.is_some())
            .field("early_candidates", &self.early_candidates.len())
            .finish()
    }
}

/// A signaling strategy capable of one offer/answer exchange
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn negotiate(&self, request: OfferRequest<'_>) -> Result<Negotiated>;
}
