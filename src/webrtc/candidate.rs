//! ICE candidate normalization
//!
//! Candidates cross this crate as plain JSON mappings with any subset of
//! `candidate`, `sdpMid`, `sdpMLineIndex` and `usernameFragment`. Caller
//! objects are probed field by field through [`CandidateFields`]; an object
//! exposing none of the fields is wrapped as `{"candidate": <description>}`
//! rather than dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalized candidate mapping as sent on the wire
pub type CandidateMap = Map<String, Value>;

pub const FIELD_CANDIDATE: &str = "candidate";
pub const FIELD_SDP_MID: &str = "sdpMid";
pub const FIELD_SDP_MLINE_INDEX: &str = "sdpMLineIndex";
pub const FIELD_USERNAME_FRAGMENT: &str = "usernameFragment";

/// Field accessors a caller-side candidate object may expose.
///
/// Every accessor defaults to "absent". Implementors that already hold a
/// plain mapping return it from [`CandidateFields::as_mapping`], which is then
/// used unchanged.
pub trait CandidateFields {
    fn candidate(&self) -> Option<String> {
        None
    }

    fn sdp_mid(&self) -> Option<String> {
        None
    }

    fn sdp_mline_index(&self) -> Option<u32> {
        None
    }

    fn username_fragment(&self) -> Option<String> {
        None
    }

    fn as_mapping(&self) -> Option<CandidateMap> {
        None
    }

    /// Human-readable fallback used when no field is present
    fn describe(&self) -> String;
}

/// Normalize any candidate-like value into a wire mapping.
///
/// The result is never empty.
pub fn candidate_to_map(candidate: &dyn CandidateFields) -> CandidateMap {
    if let Some(map) = candidate.as_mapping() {
        return map;
    }

    let mut map = CandidateMap::new();
    if let Some(c) = candidate.candidate() {
        map.insert(FIELD_CANDIDATE.to_string(), Value::String(c));
    }
    if let Some(mid) = candidate.sdp_mid() {
        map.insert(FIELD_SDP_MID.to_string(), Value::String(mid));
    }
    if let Some(index) = candidate.sdp_mline_index() {
        map.insert(FIELD_SDP_MLINE_INDEX.to_string(), Value::from(index));
    }
    if let Some(ufrag) = candidate.username_fragment() {
        map.insert(FIELD_USERNAME_FRAGMENT.to_string(), Value::String(ufrag));
    }

    if map.is_empty() {
        map.insert(
            FIELD_CANDIDATE.to_string(),
            Value::String(candidate.describe()),
        );
    }
    map
}

/// Typed ICE candidate (RTCIceCandidateInit)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u32>,
    #[serde(rename = "usernameFragment", skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: Some(candidate.into()),
            ..Default::default()
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, index: u32) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(index);
        self
    }

    pub fn with_username_fragment(mut self, ufrag: impl Into<String>) -> Self {
        self.username_fragment = Some(ufrag.into());
        self
    }

    /// Read the known fields out of a mapping, ignoring anything else
    pub fn from_map(map: &CandidateMap) -> Self {
        Self {
            candidate: map
                .get(FIELD_CANDIDATE)
                .and_then(Value::as_str)
                .map(str::to_string),
            sdp_mid: map
                .get(FIELD_SDP_MID)
                .and_then(Value::as_str)
                .map(str::to_string),
            sdp_mline_index: map
                .get(FIELD_SDP_MLINE_INDEX)
                .and_then(Value::as_u64)
                .and_then(|i| u32::try_from(i).ok()),
            username_fragment: map
                .get(FIELD_USERNAME_FRAGMENT)
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.candidate.as_deref().unwrap_or("<empty candidate>"))
    }
}

impl CandidateFields for IceCandidate {
    fn candidate(&self) -> Option<String> {
        self.candidate.clone()
    }

    fn sdp_mid(&self) -> Option<String> {
        self.sdp_mid.clone()
    }

    fn sdp_mline_index(&self) -> Option<u32> {
        self.sdp_mline_index
    }

    fn username_fragment(&self) -> Option<String> {
        self.username_fragment.clone()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl CandidateFields for CandidateMap {
    fn as_mapping(&self) -> Option<CandidateMap> {
        Some(self.clone())
    }

    fn describe(&self) -> String {
        Value::Object(self.clone()).to_string()
    }
}

impl CandidateFields for Value {
    fn candidate(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }

    fn as_mapping(&self) -> Option<CandidateMap> {
        self.as_object().cloned()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl CandidateFields for String {
    fn candidate(&self) -> Option<String> {
        Some(self.clone())
    }

    fn describe(&self) -> String {
        self.clone()
    }
}
