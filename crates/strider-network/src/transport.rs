//! Packet transports
//!
//! The core only needs "send these bytes" and "give me what arrived".
//! [`ChannelTransport`] connects two peers in one process; [`SimulatedLink`]
//! wraps any transport with loss, latency and duplication driven by a
//! virtual clock so runs are reproducible from a seed.

use crate::NetworkError;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// One end of a bidirectional, unreliable packet channel.
pub trait Transport {
    fn send(&mut self, packet: Bytes) -> Result<(), NetworkError>;

    /// Next delivered packet, if any. Never blocks.
    fn try_recv(&mut self) -> Result<Option<Bytes>, NetworkError>;
}

/// In-process transport over tokio channels.
pub struct ChannelTransport {
    tx: UnboundedSender<Bytes>,
    rx: UnboundedReceiver<Bytes>,
}

/// Two connected ends.
pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport { tx: a_tx, rx: a_rx },
        ChannelTransport { tx: b_tx, rx: b_rx },
    )
}

impl ChannelTransport {
    /// Wait for the next packet. `None` once the other end is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, packet: Bytes) -> Result<(), NetworkError> {
        self.tx
            .send(packet)
            .map_err(|_| NetworkError::Disconnected)
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, NetworkError> {
        match self.rx.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(NetworkError::Disconnected),
        }
    }
}

/// Impairments applied to outgoing packets.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConditions {
    /// Probability of losing a packet (0.0 to 1.0)
    pub packet_loss: f64,
    /// One-way delay in milliseconds
    pub latency_ms: u64,
    /// Extra random delay up to this many milliseconds
    pub jitter_ms: u64,
    /// Probability of delivering a packet twice
    pub duplicate_probability: f64,
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self {
            packet_loss: 0.0,
            latency_ms: 0,
            jitter_ms: 0,
            duplicate_probability: 0.0,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub delivered: u64,
}

/// Impairs the sending side of `inner`.
///
/// Packets are held until the virtual clock, moved by [`advance`], passes
/// their delivery time. Jitter can reorder them.
///
/// [`advance`]: SimulatedLink::advance
pub struct SimulatedLink<T> {
    inner: T,
    conditions: LinkConditions,
    rng: StdRng,
    now: f64,
    sequence: u64,
    /// (delivery time, sequence, packet)
    in_flight: Vec<(f64, u64, Bytes)>,
    stats: LinkStats,
}

impl<T: Transport> SimulatedLink<T> {
    pub fn new(inner: T, conditions: LinkConditions, seed: u64) -> Self {
        Self {
            inner,
            conditions,
            rng: StdRng::seed_from_u64(seed),
            now: 0.0,
            sequence: 0,
            in_flight: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    /// Move the virtual clock and hand over every packet now due.
    pub fn advance(&mut self, dt: f64) -> Result<(), NetworkError> {
        self.now += dt;
        self.in_flight
            .sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let due = self
            .in_flight
            .iter()
            .take_while(|(at, _, _)| *at <= self.now)
            .count();
        for (_, _, packet) in self.in_flight.drain(..due) {
            self.inner.send(packet)?;
            self.stats.delivered += 1;
        }
        Ok(())
    }

    fn delay(&mut self) -> f64 {
        let jitter = if self.conditions.jitter_ms > 0 {
            self.rng.gen_range(0..=self.conditions.jitter_ms)
        } else {
            0
        };
        (self.conditions.latency_ms + jitter) as f64 / 1000.0
    }

    fn schedule(&mut self, packet: Bytes) {
        let at = self.now + self.delay();
        self.sequence += 1;
        self.in_flight.push((at, self.sequence, packet));
    }

    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.conditions = conditions;
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Transport> Transport for SimulatedLink<T> {
    fn send(&mut self, packet: Bytes) -> Result<(), NetworkError> {
        self.stats.sent += 1;
        if self.rng.gen_bool(self.conditions.packet_loss.clamp(0.0, 1.0)) {
            self.stats.dropped += 1;
            trace!(len = packet.len(), "Dropping packet");
            return Ok(());
        }
        if self
            .rng
            .gen_bool(self.conditions.duplicate_probability.clamp(0.0, 1.0))
        {
            self.stats.duplicated += 1;
            self.schedule(packet.clone());
        }
        self.schedule(packet);

        if self.conditions.latency_ms == 0 && self.conditions.jitter_ms == 0 {
            self.advance(0.0)?;
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, NetworkError> {
        self.inner.try_recv()
    }
}
