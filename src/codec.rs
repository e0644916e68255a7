use bytes::Bytes;

use crate::domains::envelope::Envelope;
use crate::error::{DecodeError, IpcError, Result};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

/// JSON envelope codec.
///
/// Decoding rejects oversized and non-object payloads before handing anything to
/// the JSON parser, so foreign traffic on a shared bus costs next to nothing.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_payload_bytes: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl EnvelopeCodec {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn encode(&self, envelope: &Envelope) -> Result<Bytes> {
        let data =
            serde_json::to_vec(envelope).map_err(|e| IpcError::Serialization(e.to_string()))?;
        Ok(Bytes::from(data))
    }

    pub fn decode(&self, payload: &[u8]) -> std::result::Result<Envelope, DecodeError> {
        if payload.len() > self.max_payload_bytes {
            return Err(DecodeError::TooLarge {
                len: payload.len(),
                max: self.max_payload_bytes,
            });
        }
        match payload.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => {}
            _ => return Err(DecodeError::NotAnObject),
        }
        let envelope: Envelope =
            serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        if envelope.has_conflicting_outcome() {
            return Err(DecodeError::ConflictingOutcome);
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::envelope::{ErrorKind, ErrorPayload, Target};
    use serde_json::{json, Map};

    #[test]
    fn result_and_error_envelopes_survive_the_wire() {
        let codec = EnvelopeCodec::default();
        let mut args = Map::new();
        args.insert("guild_id".to_string(), json!("123"));
        let request = Envelope::request("splashtail", "modules", "id-1", args, Some(Target::Cluster(3)));

        let ok = request.success(Some(3), json!({"modules": ["core", "limits"]}));
        let decoded = codec.decode(&codec.encode(&ok).unwrap()).unwrap();
        assert_eq!(decoded, ok);

        let failed = request.failure(Some(3), ErrorPayload::unknown_action());
        let decoded = codec.decode(&codec.encode(&failed).unwrap()).unwrap();
        assert_eq!(decoded, failed);
        assert!(decoded.result().is_none());
    }

    #[test]
    fn arbitrary_floats_survive_the_wire() {
        use rand_core::{OsRng, RngCore};

        let codec = EnvelopeCodec::default();
        let request = Envelope::request("splashtail", "stats", "id-2", Map::new(), None);
        let mut checked = 0;
        while checked < 20_000 {
            let value = f64::from_bits(OsRng.next_u64());
            if !value.is_finite() {
                continue;
            }
            checked += 1;
            let ok = request.success(Some(1), json!({"value": value, "list": [value, -value]}));
            let decoded = codec.decode(&codec.encode(&ok).unwrap()).unwrap();
            assert_eq!(decoded, ok, "value {value:e} changed on the wire");

            let failed = request.failure(
                None,
                ErrorPayload::new(ErrorKind::HandlerFailed, format!("bad value {value}")),
            );
            let decoded = codec.decode(&codec.encode(&failed).unwrap()).unwrap();
            assert_eq!(decoded, failed);
        }
    }

    #[test]
    fn rejects_foreign_payloads() {
        let codec = EnvelopeCodec::new(64);
        assert_eq!(codec.decode(b"[1,2,3]"), Err(DecodeError::NotAnObject));
        assert_eq!(codec.decode(b""), Err(DecodeError::NotAnObject));
        assert_eq!(codec.decode(b"hello"), Err(DecodeError::NotAnObject));
        assert!(matches!(
            codec.decode(b"{\"scope\": 1}"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            codec.decode(&[b' '; 65]),
            Err(DecodeError::TooLarge { len: 65, max: 64 })
        ));
    }

    #[test]
    fn rejects_conflicting_outcome() {
        let codec = EnvelopeCodec::default();
        let raw = json!({
            "scope": "s",
            "action": "a",
            "correlation_id": "c",
            "reply": {"cluster_id": null},
            "result": 1,
            "error": {"kind": "handler_failed", "message": "boom"}
        });
        let payload = serde_json::to_vec(&raw).unwrap();
        assert_eq!(codec.decode(&payload), Err(DecodeError::ConflictingOutcome));
    }
}
