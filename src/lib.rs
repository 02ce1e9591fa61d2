//! JetKVM bridge - WebRTC signaling client for JetKVM appliances
//!
//! This crate logs in to a JetKVM appliance, negotiates WebRTC offers over
//! the signaling socket (falling back to the legacy HTTP endpoint) and
//! relays ICE candidates for open video sessions.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod webrtc;

pub use client::{KvmClient, OfferAnswer};
pub use config::{ClientConfig, SignalingConfig};
pub use error::{KvmError, Result};
pub use webrtc::{
    candidate_handler, CandidateFields, CandidateMap, IceCandidate, RemoteCandidateHandler,
    SessionInfo, TransportKind, WebRtcMessage, WebRtcSendMessage,
};
