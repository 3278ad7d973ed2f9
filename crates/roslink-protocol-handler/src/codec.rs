//! Encoding of outgoing calls and decoding of inbound frames.

use crate::compression::{CborDecompressor, CompressedPayload, Decompressor, PngDecompressor};
use crate::messages::OutgoingCall;
use roslink_core::error::ProtocolError;
use roslink_transport::WireMessage;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The result of decoding one inbound frame.
pub enum DecodedFrame {
    Ready(Value),
    /// The frame must be decompressed before it can be dispatched.
    Deferred(DecompressJob),
}

/// A pending decompression, runnable on any thread.
pub struct DecompressJob {
    decompressor: Arc<dyn Decompressor>,
    payload: CompressedPayload,
}

impl DecompressJob {
    pub fn codec(&self) -> &str {
        self.decompressor.name()
    }

    pub fn run(self) -> Result<Value, ProtocolError> {
        self.decompressor.decompress(self.payload)
    }
}

impl fmt::Debug for DecompressJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompressJob")
            .field("codec", &self.codec())
            .finish()
    }
}

/// Serializes calls to JSON text and turns inbound frames back into JSON
/// objects, unwrapping compressed envelopes through registered decompressors.
#[derive(Clone)]
pub struct FrameCodec {
    envelopes: HashMap<String, Arc<dyn Decompressor>>,
    binary: Option<Arc<dyn Decompressor>>,
}

impl Default for FrameCodec {
    /// `png` envelopes and CBOR binary frames.
    fn default() -> Self {
        let mut codec = Self::empty();
        codec.register_envelope("png", Arc::new(PngDecompressor));
        codec.set_binary_decoder(Arc::new(CborDecompressor));
        codec
    }
}

impl FrameCodec {
    /// A codec with no decompressors.
    pub fn empty() -> Self {
        Self {
            envelopes: HashMap::new(),
            binary: None,
        }
    }

    /// Unwraps text frames whose `op` equals `op` by passing their `data`
    /// field to `decompressor`.
    pub fn register_envelope(&mut self, op: impl Into<String>, decompressor: Arc<dyn Decompressor>) {
        self.envelopes.insert(op.into(), decompressor);
    }

    pub fn set_binary_decoder(&mut self, decompressor: Arc<dyn Decompressor>) {
        self.binary = Some(decompressor);
    }

    pub fn encode(&self, call: &OutgoingCall) -> Result<String, ProtocolError> {
        serde_json::to_string(call).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(&self, message: WireMessage) -> Result<DecodedFrame, ProtocolError> {
        let (decompressor, payload) = match message {
            WireMessage::Text(text) => {
                let frame: Value = serde_json::from_str(&text)?;
                let Some(op) = frame.get("op") else {
                    return Err(if frame.is_object() {
                        ProtocolError::MissingField {
                            op: "<none>".to_string(),
                            field: "op",
                        }
                    } else {
                        ProtocolError::MalformedFrame("frame is not a JSON object".to_string())
                    });
                };
                let Some(decompressor) = op.as_str().and_then(|op| self.envelopes.get(op)) else {
                    return Ok(DecodedFrame::Ready(frame));
                };
                let data = frame
                    .get("data")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProtocolError::MissingField {
                        op: decompressor.name().to_string(),
                        field: "data",
                    })?;
                (decompressor.clone(), CompressedPayload::Text(data.to_string()))
            }
            WireMessage::Binary(bytes) => {
                let decompressor = self
                    .binary
                    .clone()
                    .ok_or_else(|| ProtocolError::NoDecoder("binary frames".to_string()))?;
                (decompressor, CompressedPayload::Binary(bytes))
            }
        };

        let job = DecompressJob {
            decompressor,
            payload,
        };
        if job.decompressor.is_blocking() {
            Ok(DecodedFrame::Deferred(job))
        } else {
            job.run().map(DecodedFrame::Ready)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::png::tests::pack;
    use serde_json::json;

    fn ready(frame: DecodedFrame) -> Value {
        match frame {
            DecodedFrame::Ready(value) => value,
            DecodedFrame::Deferred(job) => panic!("unexpected deferred {:?}", job),
        }
    }

    #[test]
    fn plain_frames_are_ready() {
        let codec = FrameCodec::default();
        let frame = codec
            .decode(WireMessage::from(r#"{"op":"publish","topic":"/a","msg":{}}"#))
            .unwrap();
        assert_eq!(ready(frame)["topic"], "/a");
    }

    #[test]
    fn png_envelopes_are_deferred() {
        let codec = FrameCodec::default();
        let inner = json!({"op": "publish", "topic": "/map", "msg": {"w": 4}});
        let envelope = json!({"op": "png", "data": pack(&inner)}).to_string();
        match codec.decode(WireMessage::Text(envelope)).unwrap() {
            DecodedFrame::Deferred(job) => {
                assert_eq!(job.codec(), "png");
                assert_eq!(job.run().unwrap(), inner);
            }
            DecodedFrame::Ready(_) => panic!("png frame was not deferred"),
        }
    }

    #[test]
    fn cbor_frames_decode_inline() {
        let codec = FrameCodec::default();
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&json!({"op": "publish", "topic": "/b", "msg": {}}), &mut bytes)
            .unwrap();
        assert_eq!(ready(codec.decode(WireMessage::Binary(bytes)).unwrap())["topic"], "/b");
    }

    #[test]
    fn rejects_malformed_frames() {
        let codec = FrameCodec::default();
        assert!(matches!(
            codec.decode(WireMessage::from("{not json")),
            Err(ProtocolError::MalformedFrame(_))
        ));
        assert!(matches!(
            codec.decode(WireMessage::from(r#"{"topic":"/a"}"#)),
            Err(ProtocolError::MissingField { field: "op", .. })
        ));
        assert!(matches!(
            codec.decode(WireMessage::from(r#"{"op":"png"}"#)),
            Err(ProtocolError::MissingField { field: "data", .. })
        ));
        assert!(matches!(
            FrameCodec::empty().decode(WireMessage::Binary(vec![0xa0])),
            Err(ProtocolError::NoDecoder(_))
        ));
    }

    #[test]
    fn encodes_calls_as_json_text() {
        let codec = FrameCodec::default();
        let text = codec
            .encode(&OutgoingCall::Unsubscribe {
                id: Some("unsubscribe:/a:2".into()),
                topic: "/a".into(),
            })
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"op": "unsubscribe", "id": "unsubscribe:/a:2", "topic": "/a"}));
    }
}
