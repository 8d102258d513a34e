//! Ordering of acknowledgments and corrections
//!
//! The transport may drop messages, so both ends keep only the newest
//! information: the server coalesces what it owes the client, and the client
//! ignores anything older than what it already applied.

use crate::validator::{Correction, Verdict};
use tracing::trace;

/// Client-side filter for incoming acks and corrections.
#[derive(Debug, Default, Clone)]
pub struct CorrectionGate {
    last_ack: Option<f64>,
    last_correction: Option<f64>,
}

impl CorrectionGate {
    /// Record an acknowledgment. Returns false if it was stale.
    pub fn acknowledge(&mut self, timestamp: f64) -> bool {
        match self.last_ack {
            Some(last) if timestamp <= last => false,
            _ => {
                self.last_ack = Some(timestamp);
                true
            }
        }
    }

    /// Decide whether a correction for `timestamp` may be applied.
    ///
    /// A correction is superseded by any newer correction already applied
    /// and by an acknowledgment of a later step.
    pub fn accept(&mut self, timestamp: f64) -> bool {
        if self.last_correction.map_or(false, |last| timestamp <= last) {
            return false;
        }
        if self.last_ack.map_or(false, |last| timestamp < last) {
            return false;
        }
        self.last_correction = Some(timestamp);
        true
    }

    pub fn last_ack(&self) -> Option<f64> {
        self.last_ack
    }

    pub fn last_correction(&self) -> Option<f64> {
        self.last_correction
    }
}

/// What the server sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ack(f64),
    Correction(Correction),
}

/// Server-side outbox for one client.
///
/// Holds at most one correction: a newer one replaces an unsent older one.
#[derive(Debug, Default, Clone)]
pub struct ResponseQueue {
    ack: Option<f64>,
    correction: Option<Correction>,
}

impl ResponseQueue {
    pub fn record(&mut self, timestamp: f64, verdict: Verdict) {
        match verdict {
            Verdict::Accept => {
                self.ack = Some(self.ack.map_or(timestamp, |a| a.max(timestamp)));
            }
            Verdict::Correct { correction, .. } => {
                if let Some(old) = self.correction.replace(correction) {
                    trace!(old = old.timestamp, new = timestamp, "Correction superseded before send");
                }
            }
        }
    }

    /// Everything owed, correction first. An ack older than the pending
    /// correction carries nothing the correction doesn't.
    pub fn drain(&mut self) -> Vec<Response> {
        let mut out = Vec::with_capacity(2);
        let correction = self.correction.take();
        let correction_ts = correction.as_ref().map(|c| c.timestamp);
        if let Some(correction) = correction {
            out.push(Response::Correction(correction));
        }
        if let Some(ack) = self.ack.take() {
            if correction_ts.map_or(true, |ts| ack > ts) {
                out.push(Response::Ack(ack));
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.ack.is_none() && self.correction.is_none()
    }
}
