//! Bounded, hysteretic resource accumulator
//!
//! Stamina, charge and the grace window share this type. The value is
//! clamped to `[0, max]` on every write. The drained flag is set when the
//! value reaches zero and is only cleared at the configured recovery point.

use crate::config::{DrainRecovery, GraceConfig, ResourceConfig};
use crate::events::{ActorEvent, NotificationSink};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

/// Values this close to zero or max snap onto the bound.
const SNAP_TOLERANCE: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Stamina,
    Charge,
    GraceWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundedResource {
    kind: ResourceKind,
    value: f32,
    max: f32,
    drained: bool,
    recovery: DrainRecovery,
}

impl BoundedResource {
    /// Create a resource holding `initial`, clamped to `[0, max]`.
    pub fn new(kind: ResourceKind, max: f32, initial: f32, recovery: DrainRecovery) -> Self {
        let max = max.max(0.0);
        let value = if initial.is_finite() {
            initial.clamp(0.0, max)
        } else {
            0.0
        };
        Self {
            kind,
            value,
            max,
            drained: value <= 0.0,
            recovery,
        }
    }

    /// Full resource built from configuration.
    pub fn full(kind: ResourceKind, config: &ResourceConfig) -> Self {
        Self::new(kind, config.max, config.max, config.recovery)
    }

    /// Empty grace window.
    pub fn grace_window(config: &GraceConfig) -> Self {
        Self::new(ResourceKind::GraceWindow, config.max, 0.0, config.recovery)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn is_full(&self) -> bool {
        self.value >= self.max
    }

    /// Write a new value. Notifies only when the clamped value actually moves.
    pub fn set(&mut self, value: f32, sink: &mut dyn NotificationSink) {
        if !value.is_finite() {
            error!(kind = ?self.kind, value, "Ignoring non-finite resource value");
            return;
        }

        let previous = self.value;
        self.value = value.clamp(0.0, self.max);
        if self.value == previous {
            return;
        }

        if self.value < SNAP_TOLERANCE {
            self.value = 0.0;
        } else if self.max - self.value < SNAP_TOLERANCE {
            self.value = self.max;
        }

        if self.value != previous {
            sink.notify(ActorEvent::ValueChanged {
                kind: self.kind,
                previous,
                current: self.value,
            });
        }

        if self.value == 0.0 {
            self.set_drained(true, sink);
        } else if self.drained && self.recovered() {
            self.set_drained(false, sink);
        }
    }

    /// Apply `rate` per second for `dt` seconds.
    pub fn tick(&mut self, rate: f32, dt: f32, sink: &mut dyn NotificationSink) {
        if rate != 0.0 {
            self.set(self.value + rate * dt, sink);
        }
    }

    /// Change the upper bound, re-clamping the value.
    pub fn set_max(&mut self, max: f32, sink: &mut dyn NotificationSink) {
        let max = if max.is_finite() { max.max(0.0) } else { self.max };
        if max == self.max {
            return;
        }

        let previous = self.max;
        self.max = max;
        sink.notify(ActorEvent::MaxChanged {
            kind: self.kind,
            previous,
            current: max,
        });
        if self.value > max {
            self.set(max, sink);
        }
    }

    /// Force the drained flag. Used when an authoritative snapshot overrides it.
    pub fn set_drained(&mut self, drained: bool, sink: &mut dyn NotificationSink) {
        if self.drained == drained {
            return;
        }

        self.drained = drained;
        trace!(kind = ?self.kind, drained, value = self.value, "Drained state changed");
        sink.notify(if drained {
            ActorEvent::Drained(self.kind)
        } else {
            ActorEvent::DrainRecovered(self.kind)
        });
    }

    /// Clamp back into range if something slipped past `set`.
    ///
    /// Returns true if the value had to be repaired. That is a logic fault,
    /// so debug builds stop here.
    pub fn enforce_bounds(&mut self) -> bool {
        if (0.0..=self.max).contains(&self.value) {
            return false;
        }

        debug_assert!(
            false,
            "{:?} value {} escaped [0, {}]",
            self.kind, self.value, self.max
        );
        error!(kind = ?self.kind, value = self.value, max = self.max, "Resource out of bounds, clamping");
        self.value = if self.value.is_finite() {
            self.value.clamp(0.0, self.max)
        } else {
            0.0
        };
        true
    }

    fn recovered(&self) -> bool {
        match self.recovery {
            DrainRecovery::Full => self.value == self.max,
            DrainRecovery::Fraction(fraction) => {
                self.value > 0.0 && self.value >= self.max * fraction
            }
        }
    }
}
