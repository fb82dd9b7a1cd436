//! Envelope codec
//!
//! Converts between transport strings and the router's message types.

use crate::error::{Error, Result};
use crate::models::{ChatThread, HistoryReply, InboundMessage, StoredMessage};

pub trait Codec: Send + Sync {
    fn decode(&self, raw: &str) -> Result<InboundMessage>;
    fn encode_message(&self, message: &StoredMessage) -> Result<String>;
    fn encode_history(&self, threads: &[ChatThread]) -> Result<String>;
}

/// JSON codec used on the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, raw: &str) -> Result<InboundMessage> {
        serde_json::from_str(raw).map_err(|e| Error::Codec(e.to_string()))
    }

    fn encode_message(&self, message: &StoredMessage) -> Result<String> {
        Ok(serde_json::to_string(message)?)
    }

    fn encode_history(&self, threads: &[ChatThread]) -> Result<String> {
        Ok(serde_json::to_string(&HistoryReply::new(threads.to_vec()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageEvent, MessageKind};

    #[test]
    fn test_decode_chat_envelope() {
        let msg = JsonCodec
            .decode(r#"{"kind":"chat","event":"send","sender_id":"3","content":"hi"}"#)
            .unwrap();
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.event, MessageEvent::Send);
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(JsonCodec.decode("{ not json"), Err(Error::Codec(_))));
        assert!(matches!(
            JsonCodec.decode(r#"{"kind":"chat"}"#),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_history_reply_shape() {
        let encoded = JsonCodec.encode_history(&[ChatThread::new("t1")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["kind"], "history_request");
        assert_eq!(value["threads"][0]["id"], "t1");
    }
}
