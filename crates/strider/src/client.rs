//! Predicting peer

use crate::{pack, unpack};
use anyhow::{bail, Context, Result};
use strider_movement::{ActorEvent, CollisionQuery, MoveInput};
use strider_network::{
    decode_correction, AdaptiveCompressor, Message, MessageStats, StepCodec, Transport,
    PROTOCOL_VERSION,
};
use strider_state::{CorrectionOutcome, Predictor, StepRecord};
use tracing::{debug, info, trace, warn};

/// Runs the predictor and keeps it in step with the server.
pub struct ClientPeer<T> {
    predictor: Predictor,
    codec: StepCodec,
    compressor: AdaptiveCompressor,
    transport: T,
    stats: MessageStats,
    connected: bool,
}

impl<T: Transport> ClientPeer<T> {
    pub fn new(
        predictor: Predictor,
        codec: StepCodec,
        compressor: AdaptiveCompressor,
        transport: T,
    ) -> Self {
        Self {
            predictor,
            codec,
            compressor,
            transport,
            stats: MessageStats::default(),
            connected: false,
        }
    }

    /// Announce the protocol version. Steps may be sent before the answer.
    pub fn hello(&mut self) -> Result<()> {
        self.send(&[Message::Hello {
            version: PROTOCOL_VERSION,
        }])
    }

    pub fn ping(&mut self) -> Result<()> {
        self.send(&[Message::Ping {
            timestamp: Message::timestamp_now(),
        }])
    }

    /// Predict one tick and send whatever is due.
    pub fn tick(&mut self, input: MoveInput, dt: f32, world: &dyn CollisionQuery) -> Result<f64> {
        let timestamp = self.predictor.tick(input, dt, world);
        if self.predictor.ready_to_send() {
            let steps = self.predictor.take_outgoing();
            self.send_steps(&steps)?;
        }
        Ok(timestamp)
    }

    /// Send every unsent step now, ignoring the send interval.
    pub fn flush(&mut self) -> Result<()> {
        let steps = self.predictor.flush();
        if steps.is_empty() {
            return Ok(());
        }
        self.send_steps(&steps)
    }

    fn send_steps(&mut self, steps: &[StepRecord]) -> Result<()> {
        let batch = self
            .codec
            .encode_batch(steps)
            .context("Failed to encode step batch")?;
        let (algorithm, payload) = self
            .compressor
            .compress(&batch)
            .context("Failed to compress step batch")?;
        trace!(
            steps = steps.len(),
            raw = batch.len(),
            wire = payload.len(),
            ?algorithm,
            "Sending steps"
        );
        self.send(&[Message::Steps {
            algorithm: algorithm.wire_id(),
            payload,
        }])
    }

    fn send(&mut self, messages: &[Message]) -> Result<()> {
        let packet = pack(messages)?;
        let len = packet.len();
        self.transport
            .send(packet)
            .context("Failed to send to server")?;
        self.stats.record_sent(len);
        Ok(())
    }

    /// Handle everything the server sent since the last poll.
    ///
    /// Returns the number of messages handled.
    pub fn poll(&mut self, world: &dyn CollisionQuery) -> Result<usize> {
        let mut handled = 0;
        while let Some(packet) = self
            .transport
            .try_recv()
            .context("Lost connection to server")?
        {
            self.stats.record_received(packet.len());
            let (messages, error) = unpack(&packet);
            if let Some(e) = error {
                self.stats.decode_failures += 1;
                warn!("Dropping malformed frame from server: {e}");
            }
            for msg in messages {
                self.handle(msg, world)?;
                handled += 1;
            }
        }
        Ok(handled)
    }

    fn handle(&mut self, msg: Message, world: &dyn CollisionQuery) -> Result<()> {
        match msg {
            Message::HelloAck { version } => {
                if version != PROTOCOL_VERSION {
                    bail!("Server speaks protocol {version}, expected {PROTOCOL_VERSION}");
                }
                if !self.connected {
                    info!(version, "Server accepted session");
                }
                self.connected = true;
            }
            Message::StepAck { timestamp } => self.predictor.acknowledge(timestamp),
            Message::Correction(payload) => match decode_correction(&payload) {
                Ok(correction) => {
                    if let CorrectionOutcome::Applied { replayed } =
                        self.predictor.apply_correction(&correction, world)
                    {
                        trace!(timestamp = correction.timestamp, replayed, "Resynced");
                    }
                }
                Err(e) => {
                    self.stats.decode_failures += 1;
                    warn!("Dropping undecodable correction: {e}");
                }
            },
            Message::Ping { timestamp } => self.send(&[Message::Pong { timestamp }])?,
            Message::Pong { timestamp } => {
                self.stats.update_rtt(timestamp);
                debug!(rtt_us = ?self.stats.last_rtt_micros, "Pong");
            }
            Message::Hello { .. } | Message::Steps { .. } => {
                warn!("Ignoring server-bound message sent to client");
            }
        }
        Ok(())
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn predictor_mut(&mut self) -> &mut Predictor {
        &mut self.predictor
    }

    pub fn stats(&self) -> &MessageStats {
        &self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Gameplay notifications raised by live ticks and corrections.
    pub fn drain_events(&mut self) -> Vec<ActorEvent> {
        self.predictor.drain_events()
    }

    pub fn into_parts(self) -> (Predictor, MessageStats) {
        (self.predictor, self.stats)
    }
}
