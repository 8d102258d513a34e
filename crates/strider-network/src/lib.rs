//! Wire layer for Strider
//!
//! Packs step records and corrections into compact payloads, wraps them in
//! framed envelopes and moves them over an unreliable packet transport.

pub mod codec;
pub mod compress;
pub mod protocol;
pub mod transport;

pub use codec::{
    decode_correction, encode_correction, presence, CodecError, StepCodec, StepDefaults,
};
pub use compress::{AdaptiveCompressor, CompressionAlgorithm, Compressor, MAX_DECOMPRESSED_LEN};
pub use protocol::{FramedCodec, Message, MessageStats, MAX_FRAME_LEN, PROTOCOL_VERSION};
pub use transport::{
    channel_pair, ChannelTransport, LinkConditions, LinkStats, SimulatedLink, Transport,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Peer disconnected")]
    Disconnected,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
