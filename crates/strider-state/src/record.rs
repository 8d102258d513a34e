//! One recorded tick

use glam::Vec3;
use strider_movement::{
    ActorState, CompressedFlags, MoveInput, StepOutcome, TransitionChannel, TransitionMark,
};

/// Replicated custom state at one edge of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CustomState {
    pub stamina: f32,
    pub stamina_drained: bool,
    pub charge: f32,
    pub charge_drained: bool,
    pub grace_window: f32,
    pub grace_window_drained: bool,
    pub crouch_progress: f32,
    pub crouch_transitioning: bool,
}

impl CustomState {
    pub fn capture(actor: &ActorState) -> Self {
        Self {
            stamina: actor.stamina.value(),
            stamina_drained: actor.stamina.is_drained(),
            charge: actor.charge.value(),
            charge_drained: actor.charge.is_drained(),
            grace_window: actor.grace.value(),
            grace_window_drained: actor.grace.is_drained(),
            crouch_progress: actor.crouch.progress(),
            crouch_transitioning: actor.crouch.is_transitioning(),
        }
    }

    pub fn drained_flags(&self) -> [bool; 3] {
        [
            self.stamina_drained,
            self.charge_drained,
            self.grace_window_drained,
        ]
    }
}

/// A tick's input and the state it produced.
///
/// `start_*` fields describe the actor before the tick and are only used
/// locally (combining and replay). Everything else is what the client
/// claims to the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRecord {
    /// Client clock at the end of the step, in seconds.
    pub timestamp: f64,
    /// Simulated seconds. Grows when records are combined.
    pub delta: f32,
    pub input: MoveInput,

    pub start_position: Vec3,
    pub start_velocity: Vec3,
    pub start_grounded: bool,
    pub start: CustomState,

    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    pub end: CustomState,

    /// Edge marks, indexed by [`TransitionChannel::index`].
    pub marks: [TransitionMark; 2],

    /// Never merged with a neighbour.
    pub important: bool,
}

impl StepRecord {
    /// Capture the start of a tick.
    pub fn begin(timestamp: f64, delta: f32, input: MoveInput, actor: &ActorState) -> Self {
        Self {
            timestamp,
            delta,
            input,
            start_position: actor.position,
            start_velocity: actor.velocity,
            start_grounded: actor.grounded,
            start: CustomState::capture(actor),
            ..Default::default()
        }
    }

    /// Capture the end of the tick.
    pub fn finish(&mut self, actor: &ActorState, outcome: &StepOutcome) {
        self.marks = outcome.marks.clone();
        self.refresh(actor);
    }

    /// Re-capture start values before the tick is re-run from `actor`.
    pub fn rebase(&mut self, actor: &ActorState) {
        self.start_position = actor.position;
        self.start_velocity = actor.velocity;
        self.start_grounded = actor.grounded;
        self.start = CustomState::capture(actor);
    }

    /// Re-capture end values after the tick was re-run.
    pub fn refresh(&mut self, actor: &ActorState) {
        self.position = actor.position;
        self.velocity = actor.velocity;
        self.grounded = actor.grounded;
        self.end = CustomState::capture(actor);
        self.important = self.detect_important();
    }

    pub fn compressed_flags(&self) -> CompressedFlags {
        self.input.compressed_flags()
    }

    pub fn mark(&self, channel: TransitionChannel) -> &TransitionMark {
        &self.marks[channel.index()]
    }

    pub fn has_pulse(&self) -> bool {
        self.marks.iter().any(|m| m.finished_last_step)
    }

    /// Absorb `newer`, which directly follows this record.
    ///
    /// Start values stay; end values, input and timestamp come from `newer`.
    pub fn combine_with(&mut self, newer: &StepRecord) {
        self.timestamp = newer.timestamp;
        self.delta += newer.delta;
        self.input = newer.input;
        self.position = newer.position;
        self.velocity = newer.velocity;
        self.grounded = newer.grounded;
        self.end = newer.end;
        self.marks = newer.marks.clone();
        self.important = self.detect_important();
    }

    /// A drained flag or the crouch transition flipped during the step, or
    /// a transition pulse is riding on it.
    fn detect_important(&self) -> bool {
        self.start.drained_flags() != self.end.drained_flags()
            || self.start.crouch_transitioning != self.end.crouch_transitioning
            || self.has_pulse()
    }
}
