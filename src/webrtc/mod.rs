//! WebRTC signaling towards the JetKVM appliance
//!
//! The crate never touches media. It exchanges SDP with the appliance and
//! relays trickle ICE candidates between a caller and the appliance.
//!
//! Architecture:
//! ```text
//! caller offer
//!        |
//!        v
//! KvmClient ---- WebSocketSignaling (/webrtc/signaling/client)
//!        |              | on failure
//!        |              v
//!        |       LegacyHttpSignaling (POST /webrtc/session)
//!        |
//!        v
//! SessionRegistry (open socket + relay task per session id)
//!        |
//!        +------- remote candidates ------> caller callback
//! ```

pub mod bridge;
pub mod candidate;
pub mod http_transport;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod ws_transport;

pub use bridge::{WebRtcMessage, WebRtcSendMessage, OFFER_FAILED_CODE};
pub use candidate::{candidate_to_map, CandidateFields, CandidateMap, IceCandidate};
pub use http_transport::LegacyHttpSignaling;
pub use session::{candidate_handler, RemoteCandidateHandler, SessionInfo, SessionRegistry};
pub use signaling::{InboundFrame, SessionDescription};
pub use transport::{Negotiated, OfferRequest, SignalingSocket, SignalingTransport, TransportKind};
pub use ws_transport::WebSocketSignaling;
