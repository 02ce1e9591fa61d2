//! Browser-facing message bridge
//!
//! Turns one negotiation into the messages a browser-facing layer forwards:
//! an answer or an error, followed by remote candidates. Candidates are held
//! back until the answer has been delivered, since a browser cannot add a
//! candidate before it has the remote description.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error};

use super::candidate::CandidateMap;
use super::session::{candidate_handler, RemoteCandidateHandler};

/// Error code reported when an offer could not be answered
pub const OFFER_FAILED_CODE: &str = "webrtc_offer_failed";

/// Message sent towards the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebRtcMessage {
    Answer { answer: String },
    Candidate { candidate: CandidateMap },
    Error { code: String, message: String },
}

/// Callback delivering [`WebRtcMessage`]s to the browser-facing layer
pub type WebRtcSendMessage = Arc<dyn Fn(WebRtcMessage) + Send + Sync>;

/// Gate ordering remote candidates after the answer
pub(crate) struct AnswerGate {
    tx: watch::Sender<bool>,
    send: WebRtcSendMessage,
}

impl AnswerGate {
    pub(crate) fn new(send: WebRtcSendMessage) -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx, send }
    }

    /// Handler forwarding candidates once the answer went out
    pub(crate) fn candidate_handler(&self, session_id: &str) -> RemoteCandidateHandler {
        let rx = self.tx.subscribe();
        let send = self.send.clone();
        let session_id = session_id.to_string();

        candidate_handler(move |candidate| {
            let mut rx = rx.clone();
            let send = send.clone();
            let session_id = session_id.clone();
            async move {
                if rx.wait_for(|answered| *answered).await.is_err() {
                    debug!("Negotiation for {} failed, dropping remote candidate", session_id);
                    return;
                }
                send(WebRtcMessage::Candidate { candidate });
            }
        })
    }

    /// Deliver the answer and release held-back candidates
    pub(crate) fn answer(self, session_id: &str, answer: String) {
        debug!("WebRTC OK (session {}, {} bytes)", session_id, answer.len());
        (self.send)(WebRtcMessage::Answer { answer });
        self.tx.send_replace(true);
    }

    /// Report the failure; held-back candidates are discarded
    pub(crate) fn fail(self, session_id: &str, err: &crate::error::KvmError) {
        error!("WebRTC error for session {}: {}", session_id, err);
        (self.send)(WebRtcMessage::Error {
            code: OFFER_FAILED_CODE.to_string(),
            message: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use crate::error::KvmError;

    fn recorder() -> (WebRtcSendMessage, Arc<Mutex<Vec<WebRtcMessage>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        let send: WebRtcSendMessage = Arc::new(move |msg| sink.lock().unwrap().push(msg));
        (send, messages)
    }

    fn candidate(value: &str) -> CandidateMap {
        let mut map = CandidateMap::new();
        map.insert("candidate".to_string(), json!(value));
        map
    }

    #[tokio::test]
    async fn test_candidates_wait_for_answer() {
        let (send, messages) = recorder();
        let gate = AnswerGate::new(send);
        let handler = gate.candidate_handler("s1");

        let pending = tokio::spawn(handler(candidate("candidate:0")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(messages.lock().unwrap().is_empty());

        gate.answer("s1", "v=0".to_string());
        pending.await.unwrap();

        // Later candidates pass straight through
        handler(candidate("candidate:1")).await;

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[0],
            WebRtcMessage::Answer {
                answer: "v=0".to_string()
            }
        );
        assert_eq!(
            messages[1],
            WebRtcMessage::Candidate {
                candidate: candidate("candidate:0")
            }
        );
    }

    #[tokio::test]
    async fn test_failure_drops_candidates() {
        let (send, messages) = recorder();
        let gate = AnswerGate::new(send);
        let handler = gate.candidate_handler("s1");

        let pending = tokio::spawn(handler(candidate("candidate:0")));
        gate.fail("s1", &KvmError::Unauthorized("login rejected".to_string()));
        pending.await.unwrap();

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            WebRtcMessage::Error { code, message } => {
                assert_eq!(code, OFFER_FAILED_CODE);
                assert!(message.contains("login rejected"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_message_serialization() {
        let msg = WebRtcMessage::Error {
            code: OFFER_FAILED_CODE.to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "error", "code": "webrtc_offer_failed", "message": "boom"})
        );
    }
}
