//! Strider peers
//!
//! [`client::ClientPeer`] predicts locally and streams step batches;
//! [`server::ServerPeer`] re-simulates them and answers with acks or
//! corrections. [`session`] wires both together over in-process links.

pub mod client;
pub mod server;
pub mod session;

pub use client::ClientPeer;
pub use server::ServerPeer;
pub use session::{run_realtime, run_session, Scenario, ScenarioWorld, SessionConfig, SessionReport};

use bytes::{Bytes, BytesMut};
use strider_network::{FramedCodec, Message, NetworkError};

/// Frame `messages` into one datagram.
pub(crate) fn pack(messages: &[Message]) -> Result<Bytes, NetworkError> {
    let mut buf = BytesMut::new();
    for msg in messages {
        FramedCodec::encode(msg, &mut buf)?;
    }
    Ok(buf.freeze())
}

/// Split a datagram back into messages. A broken frame ends the datagram.
pub(crate) fn unpack(packet: &[u8]) -> (Vec<Message>, Option<NetworkError>) {
    let mut buf = BytesMut::from(packet);
    let mut messages = Vec::new();
    loop {
        match FramedCodec::decode(&mut buf) {
            Ok(Some(msg)) => messages.push(msg),
            Ok(None) if buf.is_empty() => return (messages, None),
            Ok(None) => {
                return (
                    messages,
                    Some(NetworkError::ProtocolError(format!(
                        "{} bytes of incomplete frame",
                        buf.len()
                    ))),
                )
            }
            Err(e) => return (messages, Some(e)),
        }
    }
}
