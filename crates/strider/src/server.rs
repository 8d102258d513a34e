//! Authoritative peer

use crate::{pack, unpack};
use anyhow::{Context, Result};
use bytes::BytesMut;
use strider_movement::CollisionQuery;
use strider_network::{
    encode_correction, AdaptiveCompressor, CompressionAlgorithm, Message, MessageStats,
    StepCodec, Transport, PROTOCOL_VERSION,
};
use strider_state::{AuthorityValidator, Response, ResponseQueue, StateError};
use tracing::{debug, info, warn};

/// Validates one client's steps and answers them.
pub struct ServerPeer<T> {
    validator: AuthorityValidator,
    outbox: ResponseQueue,
    codec: StepCodec,
    compressor: AdaptiveCompressor,
    transport: T,
    stats: MessageStats,
    steps_received: u64,
}

impl<T: Transport> ServerPeer<T> {
    pub fn new(
        validator: AuthorityValidator,
        codec: StepCodec,
        compressor: AdaptiveCompressor,
        transport: T,
    ) -> Self {
        Self {
            validator,
            outbox: ResponseQueue::default(),
            codec,
            compressor,
            transport,
            stats: MessageStats::default(),
            steps_received: 0,
        }
    }

    /// Handle every packet waiting on the transport.
    pub fn poll(&mut self, world: &dyn CollisionQuery) -> Result<usize> {
        let mut handled = 0;
        while let Some(packet) = self
            .transport
            .try_recv()
            .context("Lost connection to client")?
        {
            handled += self.handle_packet(&packet, world)?;
        }
        Ok(handled)
    }

    /// Handle one datagram. Returns the number of messages in it.
    pub fn handle_packet(&mut self, packet: &[u8], world: &dyn CollisionQuery) -> Result<usize> {
        self.stats.record_received(packet.len());
        let (messages, error) = unpack(packet);
        if let Some(e) = error {
            self.stats.decode_failures += 1;
            warn!("Dropping malformed frame from client: {e}");
        }
        let handled = messages.len();
        for msg in messages {
            self.handle(msg, world)?;
        }
        Ok(handled)
    }

    fn handle(&mut self, msg: Message, world: &dyn CollisionQuery) -> Result<()> {
        match msg {
            Message::Hello { version } => {
                if version == PROTOCOL_VERSION {
                    info!(version, "Client connected");
                } else {
                    warn!(version, expected = PROTOCOL_VERSION, "Client protocol mismatch");
                }
                self.send(&[Message::HelloAck {
                    version: PROTOCOL_VERSION,
                }])?;
            }
            Message::Steps { algorithm, payload } => self.handle_steps(algorithm, &payload, world),
            Message::Ping { timestamp } => self.send(&[Message::Pong { timestamp }])?,
            Message::Pong { timestamp } => self.stats.update_rtt(timestamp),
            Message::HelloAck { .. } | Message::StepAck { .. } | Message::Correction(_) => {
                warn!("Ignoring client-bound message sent to server");
            }
        }
        Ok(())
    }

    fn handle_steps(&mut self, algorithm: u8, payload: &[u8], world: &dyn CollisionQuery) {
        let batch = match CompressionAlgorithm::from_wire_id(algorithm)
            .and_then(|algorithm| self.compressor.decompress(algorithm, payload))
        {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!("Dropping step batch: {e}");
                return;
            }
        };
        let steps = match self.codec.decode_batch(&batch) {
            Ok(steps) => steps,
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!("Dropping step batch: {e}");
                return;
            }
        };

        for step in steps {
            let step = match step {
                Ok(step) => step,
                Err(e) => {
                    self.stats.decode_failures += 1;
                    warn!("Dropping undecodable step: {e}");
                    continue;
                }
            };
            self.steps_received += 1;
            match self.validator.validate(&step, world) {
                Ok(verdict) => self.outbox.record(step.timestamp, verdict),
                // Duplicated or overtaken by a later batch
                Err(StateError::OutOfOrder { timestamp, last }) => {
                    debug!(timestamp, last, "Ignoring stale step");
                }
                Err(e) => warn!(timestamp = step.timestamp, "Rejecting step: {e}"),
            }
        }
    }

    /// Send the pending correction and ack, if any.
    pub fn flush_responses(&mut self) -> Result<usize> {
        let responses = self.outbox.drain();
        if responses.is_empty() {
            return Ok(0);
        }

        let mut messages = Vec::with_capacity(responses.len());
        for response in responses {
            messages.push(match response {
                Response::Ack(timestamp) => Message::StepAck { timestamp },
                Response::Correction(correction) => {
                    let mut buf = BytesMut::new();
                    encode_correction(&correction, &mut buf)
                        .context("Failed to encode correction")?;
                    Message::Correction(buf.to_vec())
                }
            });
        }
        let sent = messages.len();
        self.send(&messages)?;
        Ok(sent)
    }

    fn send(&mut self, messages: &[Message]) -> Result<()> {
        let packet = pack(messages)?;
        let len = packet.len();
        self.transport
            .send(packet)
            .context("Failed to send to client")?;
        self.stats.record_sent(len);
        Ok(())
    }

    pub fn validator(&self) -> &AuthorityValidator {
        &self.validator
    }

    /// Server gameplay may change the authoritative actor between steps.
    pub fn validator_mut(&mut self) -> &mut AuthorityValidator {
        &mut self.validator
    }

    pub fn stats(&self) -> &MessageStats {
        &self.stats
    }

    pub fn steps_received(&self) -> u64 {
        self.steps_received
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use strider_movement::{ActorState, FlatGround, MoveInput, MovementConfig, MovementModel};
    use strider_network::{channel_pair, decode_correction, ChannelTransport};
    use strider_state::{StepRecord, ValidatorConfig};

    fn server() -> (ServerPeer<ChannelTransport>, ChannelTransport) {
        let (near, far) = channel_pair();
        let model = MovementModel::new(MovementConfig::default()).expect("config");
        let validator = AuthorityValidator::new(
            model.clone(),
            ActorState::new(model.config(), Vec3::ZERO),
            ValidatorConfig::default(),
        );
        (
            ServerPeer::new(validator, StepCodec::default(), AdaptiveCompressor::new(), near),
            far,
        )
    }

    fn steps_packet(steps: &[StepRecord]) -> bytes::Bytes {
        let batch = StepCodec::default().encode_batch(steps).expect("encode");
        pack(&[Message::Steps {
            algorithm: CompressionAlgorithm::None.wire_id(),
            payload: batch.to_vec(),
        }])
        .expect("pack")
    }

    fn replies(far: &mut ChannelTransport) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(packet) = far.try_recv().expect("recv") {
            out.extend(unpack(&packet).0);
        }
        out
    }

    /// A step claiming the actor teleported.
    fn teleport(timestamp: f64) -> StepRecord {
        let defaults = StepCodec::default();
        StepRecord {
            timestamp,
            delta: 1.0 / 60.0,
            input: MoveInput::new(Vec2::ZERO),
            position: Vec3::new(5000.0, 0.0, 0.0),
            grounded: true,
            end: strider_state::CustomState {
                stamina: defaults.defaults().stamina,
                charge: defaults.defaults().charge,
                grace_window_drained: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_hello_answered() {
        let (mut server, mut far) = server();
        far.send(
            pack(&[Message::Hello {
                version: PROTOCOL_VERSION,
            }])
            .expect("pack"),
        )
        .expect("send");
        assert_eq!(server.poll(&FlatGround::default()).expect("poll"), 1);
        assert_eq!(
            replies(&mut far),
            vec![Message::HelloAck {
                version: PROTOCOL_VERSION
            }]
        );
    }

    #[test]
    fn test_divergent_step_answered_with_correction() {
        let (mut server, mut far) = server();
        far.send(steps_packet(&[teleport(1.0 / 60.0)])).expect("send");
        server.poll(&FlatGround::default()).expect("poll");
        assert_eq!(server.flush_responses().expect("flush"), 1);

        match replies(&mut far).as_slice() {
            [Message::Correction(payload)] => {
                let correction = decode_correction(payload).expect("decode");
                assert_eq!(correction.timestamp, 1.0 / 60.0);
                assert_eq!(correction.snapshot.position, server.validator().actor().position);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_batch_ignored() {
        let (mut server, mut far) = server();
        let packet = steps_packet(&[teleport(0.5)]);
        far.send(packet.clone()).expect("send");
        far.send(packet).expect("send");
        server.poll(&FlatGround::default()).expect("poll");
        assert_eq!(server.steps_received(), 2);
        assert_eq!(server.validator().stats().rejected, 1);
        assert_eq!(server.validator().stats().corrected(), 1);
    }

    #[test]
    fn test_unknown_compression_counted() {
        let (mut server, mut far) = server();
        far.send(
            pack(&[Message::Steps {
                algorithm: 9,
                payload: vec![0, 0],
            }])
            .expect("pack"),
        )
        .expect("send");
        server.poll(&FlatGround::default()).expect("poll");
        assert_eq!(server.stats().decode_failures, 1);
        assert_eq!(server.flush_responses().expect("flush"), 0);
    }
}
