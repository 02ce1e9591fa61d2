//! Signaling wire format
//!
//! Socket frames are JSON objects tagged by `type`. SDP travels inside a
//! base64 envelope: `base64(json({"type": "offer"|"answer", "sdp": ...}))`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use super::candidate::CandidateMap;
use crate::error::{KvmError, Result};

/// Keepalive frame sent by the appliance as literal text
pub const KEEPALIVE_FRAME: &str = "pong";

pub const FRAME_OFFER: &str = "offer";
pub const FRAME_ANSWER: &str = "answer";
pub const FRAME_NEW_ICE_CANDIDATE: &str = "new-ice-candidate";

/// SDP session description as carried inside the envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: FRAME_OFFER.to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: FRAME_ANSWER.to_string(),
            sdp: sdp.into(),
        }
    }
}

/// Body of the legacy `/webrtc/session` exchange and of the socket offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdEnvelope {
    pub sd: String,
}

/// Encode a session description into the base64 envelope
pub fn encode_envelope(desc: &SessionDescription) -> String {
    // Serializing a struct of two strings cannot fail
    let json = serde_json::to_vec(desc).unwrap_or_default();
    BASE64.encode(json)
}

/// Decode a base64 envelope and extract the answer SDP.
///
/// An empty or missing SDP is a protocol failure.
pub fn decode_answer_envelope(encoded: &str) -> Result<String> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|e| KvmError::ProtocolFailure(format!("invalid base64 answer: {}", e)))?;
    let desc: SessionDescription = serde_json::from_slice(&raw)
        .map_err(|e| KvmError::ProtocolFailure(format!("invalid answer envelope: {}", e)))?;
    extract_answer_sdp(desc)
}

/// Extract the answer SDP from a socket `answer` frame payload.
///
/// Current firmware sends the base64 envelope as a string; a payload that is
/// already a decoded description object is accepted too.
pub fn decode_answer_payload(data: &Value) -> Result<String> {
    match data {
        Value::String(encoded) => decode_answer_envelope(encoded),
        Value::Object(_) => {
            let desc: SessionDescription = serde_json::from_value(data.clone()).map_err(|e| {
                KvmError::ProtocolFailure(format!("invalid answer payload: {}", e))
            })?;
            extract_answer_sdp(desc)
        }
        other => Err(KvmError::ProtocolFailure(format!(
            "unexpected answer payload: {}",
            other
        ))),
    }
}

fn extract_answer_sdp(desc: SessionDescription) -> Result<String> {
    if desc.kind != FRAME_ANSWER {
        warn!("Answer envelope has unexpected type '{}'", desc.kind);
    }
    if desc.sdp.trim().is_empty() {
        return Err(KvmError::ProtocolFailure(
            "answer contains no SDP".to_string(),
        ));
    }
    Ok(desc.sdp)
}

/// Socket offer frame: `{"type":"offer","data":{"sd": <envelope>}}`
pub fn offer_frame(offer_sdp: &str) -> String {
    json!({
        "type": FRAME_OFFER,
        "data": { "sd": encode_envelope(&SessionDescription::offer(offer_sdp)) },
    })
    .to_string()
}

/// Trickle candidate frame: `{"type":"new-ice-candidate","data":{...}}`
pub fn candidate_frame(candidate: &CandidateMap) -> String {
    json!({
        "type": FRAME_NEW_ICE_CANDIDATE,
        "data": candidate,
    })
    .to_string()
}

/// A frame received on the signaling socket
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Literal `"pong"` keepalive
    Keepalive,
    /// Answer with its raw payload
    Answer(Value),
    /// Remote trickle candidate, already normalized to a mapping
    Candidate(CandidateMap),
    /// Any other typed frame
    Other(String),
    /// Not JSON, or JSON without a usable shape
    Malformed,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed == KEEPALIVE_FRAME {
            return Self::Keepalive;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => return Self::Malformed,
        };
        // Some firmware wraps the keepalive as a JSON string
        if value.as_str() == Some(KEEPALIVE_FRAME) {
            return Self::Keepalive;
        }

        let Some(obj) = value.as_object() else {
            return Self::Malformed;
        };
        let Some(kind) = obj.get("type").and_then(Value::as_str) else {
            return Self::Malformed;
        };
        let data = obj.get("data").cloned().unwrap_or(Value::Null);

        match kind {
            FRAME_ANSWER => Self::Answer(data),
            FRAME_NEW_ICE_CANDIDATE => match remote_candidate(data) {
                Some(candidate) => Self::Candidate(candidate),
                None => Self::Malformed,
            },
            other => Self::Other(other.to_string()),
        }
    }
}

/// Candidate mapping from a `new-ice-candidate` payload.
///
/// When `candidate` is itself an object the inner object is the mapping.
fn remote_candidate(data: Value) -> Option<CandidateMap> {
    match data {
        Value::Object(map) => match map.get("candidate") {
            Some(Value::Object(inner)) => Some(inner.clone()),
            _ => Some(map),
        },
        _ => None,
    }
}
