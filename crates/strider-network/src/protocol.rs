//! Message envelope and framing for Strider
//!
//! Envelopes are rkyv-serialized and length-prefixed. Step and correction
//! payloads inside them use the hand-packed layout from [`crate::codec`].

use crate::NetworkError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rkyv::{Archive, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum Message {
    /// First message from the predicting peer
    Hello { version: u32 },

    /// Authoritative peer's answer to `Hello`
    HelloAck { version: u32 },

    /// Batch of step records
    Steps {
        /// Compression wire id (0=none, 1=LZ4, 2=Zstd)
        algorithm: u8,
        payload: Vec<u8>,
    },

    /// Every step up to and including this timestamp was accepted
    StepAck { timestamp: f64 },

    /// Full authoritative state for one step
    Correction(Vec<u8>),

    /// Heartbeat, timestamp in microseconds
    Ping { timestamp: u64 },

    /// Echo of a ping's timestamp
    Pong { timestamp: u64 },
}

impl Message {
    /// Current wall-clock time in microseconds
    pub fn timestamp_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }

    pub fn to_bytes(&self) -> Result<Bytes, NetworkError> {
        let bytes = rkyv::to_bytes::<_, 256>(self)
            .map_err(|e| NetworkError::ProtocolError(format!("Serialization failed: {e}")))?;
        Ok(Bytes::from(bytes.to_vec()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetworkError> {
        // Datagram slices carry no alignment guarantee
        let mut aligned = rkyv::AlignedVec::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        let archived = rkyv::check_archived_root::<Self>(&aligned)
            .map_err(|e| NetworkError::ProtocolError(format!("Validation failed: {e}")))?;

        archived
            .deserialize(&mut rkyv::Infallible)
            .map_err(|e| NetworkError::ProtocolError(format!("Deserialization failed: {e}")))
    }
}

/// Length-prefixed message stream
pub struct FramedCodec;

impl FramedCodec {
    /// Append `msg` behind a 4-byte big-endian length.
    pub fn encode(msg: &Message, buf: &mut BytesMut) -> Result<(), NetworkError> {
        let payload = msg.to_bytes()?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(NetworkError::ProtocolError(format!(
                "Message too large: {} bytes",
                payload.len()
            )));
        }

        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        Ok(())
    }

    /// Take one message off the front of `buf`.
    ///
    /// Returns `Ok(None)` until a whole frame is buffered.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Message>, NetworkError> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if length > MAX_FRAME_LEN {
            return Err(NetworkError::ProtocolError(format!(
                "Frame length {length} exceeds limit"
            )));
        }

        if buf.len() < 4 + length {
            return Ok(None);
        }

        buf.advance(4);
        let frame = buf.split_to(length);
        Message::from_bytes(&frame).map(Some)
    }
}

/// Traffic counters for one peer
#[derive(Debug, Default, Clone)]
pub struct MessageStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub decode_failures: u64,
    pub last_rtt_micros: Option<u64>,
}

impl MessageStats {
    /// Record a pong echoing `sent_timestamp`.
    pub fn update_rtt(&mut self, sent_timestamp: u64) {
        let now = Message::timestamp_now();
        if now > sent_timestamp {
            self.last_rtt_micros = Some(now - sent_timestamp);
        }
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::StepAck { timestamp: 1.25 };
        let bytes = msg.to_bytes().expect("encode");
        assert_eq!(Message::from_bytes(&bytes).expect("decode"), msg);
    }

    #[test]
    fn test_framed_codec() {
        let steps = Message::Steps {
            algorithm: 0,
            payload: vec![1, 2, 3],
        };
        let ping = Message::Ping { timestamp: 2000 };

        let mut buf = BytesMut::new();
        FramedCodec::encode(&steps, &mut buf).expect("encode");
        FramedCodec::encode(&ping, &mut buf).expect("encode");

        assert_eq!(FramedCodec::decode(&mut buf).expect("decode"), Some(steps));
        assert_eq!(FramedCodec::decode(&mut buf).expect("decode"), Some(ping));
        assert_eq!(FramedCodec::decode(&mut buf).expect("decode"), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_LEN + 1) as u32);
        assert!(FramedCodec::decode(&mut buf).is_err());
    }
}
