//! Motion overrides and their completion pulse
//!
//! An override (a dash, an animation-driven lunge) reports completion at an
//! arbitrary point inside a tick. Consumers must not key off that raw flag:
//! it is not edge-triggered and lands on different ticks on each peer.
//! Instead the edge turns it into `finished_last_step`, which is true for
//! exactly the one tick after completion was reported.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Independent override channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionChannel {
    /// Motion driven by animation playback.
    Animation,
    /// Motion driven by a scripted force such as a dash.
    External,
}

impl TransitionChannel {
    pub const ALL: [TransitionChannel; 2] =
        [TransitionChannel::Animation, TransitionChannel::External];

    pub fn index(self) -> usize {
        match self {
            TransitionChannel::Animation => 0,
            TransitionChannel::External => 1,
        }
    }
}

impl fmt::Display for TransitionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionChannel::Animation => write!(f, "animation"),
            TransitionChannel::External => write!(f, "external"),
        }
    }
}

/// What a step record remembers about one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionMark {
    pub name: String,
    pub finished_last_step: bool,
}

impl TransitionMark {
    pub fn pulse(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            finished_last_step: true,
        }
    }
}

/// Per-channel edge detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionEdge {
    name: String,
    completed: bool,
    finished_last_step: bool,
}

impl TransitionEdge {
    /// A new override took over the channel.
    pub fn start(&mut self, name: &str) {
        self.name.clear();
        self.name.push_str(name);
        self.completed = false;
        self.finished_last_step = false;
    }

    /// Raw completion report from whatever drives the override.
    pub fn report_completion(&mut self) {
        self.completed = true;
    }

    /// Called first thing every live tick.
    ///
    /// Clears last tick's pulse, then raises a new one if completion was
    /// reported since. Returns the name when a pulse starts this tick.
    pub fn begin_step(&mut self) -> Option<&str> {
        if self.finished_last_step {
            self.finished_last_step = false;
            self.name.clear();
        }
        if std::mem::take(&mut self.completed) {
            self.finished_last_step = true;
            Some(&self.name)
        } else {
            None
        }
    }

    pub fn finished_last_step(&self) -> bool {
        self.finished_last_step
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mark(&self) -> TransitionMark {
        TransitionMark {
            name: self.name.clone(),
            finished_last_step: self.finished_last_step,
        }
    }

    /// Replay path: take the flags as originally observed.
    pub fn apply_mark(&mut self, mark: &TransitionMark) {
        self.name.clone_from(&mark.name);
        self.finished_last_step = mark.finished_last_step;
        self.completed = false;
    }
}

/// Velocity imposed on the actor for a fixed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionOverride {
    pub name: String,
    pub velocity: Vec3,
    pub remaining: f32,
}

impl MotionOverride {
    pub fn new(name: impl Into<String>, velocity: Vec3, duration: f32) -> Self {
        Self {
            name: name.into(),
            velocity,
            remaining: duration.max(0.0),
        }
    }

    /// Burn `dt`. Returns true when the override has run out.
    pub fn advance(&mut self, dt: f32) -> bool {
        self.remaining = (self.remaining - dt).max(0.0);
        self.remaining <= 0.0
    }
}
