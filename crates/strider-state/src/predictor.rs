//! Client-side prediction and reconciliation
//!
//! Every tick is simulated immediately and logged. When the server corrects
//! a step, the actor is reset to the authoritative snapshot and the logged
//! steps after it are replayed on top.

use crate::buffer::{CombineConfig, StepBuffer};
use crate::record::StepRecord;
use crate::sync::CorrectionGate;
use crate::validator::Correction;
use crate::StateError;
use strider_movement::{
    ActorEvent, ActorSnapshot, ActorState, CollisionQuery, DiscardSink, MoveInput, MovementConfig,
    MovementModel, NotificationSink, ResourceKind, StepMode,
};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
    pub combine: CombineConfig,
    /// Seconds between regular sends. Important steps go out right away.
    pub send_interval: f32,
    /// Unacknowledged steps past which a warning is logged. Nothing is
    /// dropped; records leave only when acknowledged or corrected.
    pub max_pending: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            combine: CombineConfig::default(),
            send_interval: 1.0 / 30.0,
            max_pending: 96,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PredictionStats {
    pub ticks: u64,
    pub combined: u64,
    pub important: u64,
    pub corrections_applied: u64,
    pub corrections_superseded: u64,
    pub replayed_steps: u64,
    /// Important records sent again because no ack covered them yet.
    pub resent_important: u64,
    /// Most unacknowledged records held at once.
    pub peak_pending: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    Applied { replayed: usize },
    /// Older than something already applied or acknowledged; ignored.
    Superseded,
}

pub struct Predictor {
    model: MovementModel,
    actor: ActorState,
    buffer: StepBuffer,
    gate: CorrectionGate,
    /// Actor state before the unsent tail record, for re-simulating a merge.
    tail_start: Option<ActorState>,
    clock: f64,
    since_send: f32,
    send_interval: f32,
    events: Vec<ActorEvent>,
    stats: PredictionStats,
}

impl Predictor {
    pub fn new(model: MovementModel, actor: ActorState, config: PredictorConfig) -> Self {
        Self {
            model,
            actor,
            buffer: StepBuffer::new(config.max_pending, config.combine),
            gate: CorrectionGate::default(),
            tail_start: None,
            clock: 0.0,
            since_send: 0.0,
            send_interval: config.send_interval,
            events: Vec::new(),
            stats: PredictionStats::default(),
        }
    }

    /// Build the model from configuration and spawn a fresh actor.
    pub fn spawn(
        movement: MovementConfig,
        position: glam::Vec3,
        config: PredictorConfig,
    ) -> Result<Self, StateError> {
        let model = MovementModel::new(movement)?;
        let actor = ActorState::new(model.config(), position);
        Ok(Self::new(model, actor, config))
    }

    /// Simulate one tick and log it. Returns the step's timestamp.
    pub fn tick(&mut self, input: MoveInput, dt: f32, world: &dyn CollisionQuery) -> f64 {
        self.clock += f64::from(dt);
        self.since_send += dt;
        self.stats.ticks += 1;

        let before = self.actor.clone();
        let mut record = StepRecord::begin(self.clock, dt, input, &self.actor);
        let outcome = self.model.step(
            &mut self.actor,
            &input,
            dt,
            StepMode::Live,
            world,
            &mut self.events,
        );
        record.finish(&self.actor, &outcome);

        let merge_from = if self.buffer.can_combine_tail(&record) {
            self.tail_start.clone()
        } else {
            None
        };

        match (merge_from, self.buffer.unsent_tail().map(|t| t.delta)) {
            (Some(mut merged), Some(tail_delta)) => {
                // Redo both ticks as one wider tick so the server, which only
                // sees the merged record, lands on the same state.
                let outcome = self.model.step(
                    &mut merged,
                    &input,
                    tail_delta + dt,
                    StepMode::Live,
                    world,
                    &mut DiscardSink,
                );
                record.finish(&merged, &outcome);
                report_resource_changes(&self.actor.snapshot(), &merged, &mut self.events);
                self.actor = merged;
                self.buffer.combine_tail(&record);
                self.stats.combined += 1;
                trace!(timestamp = record.timestamp, "Combined step into tail");
            }
            _ => {
                if record.important {
                    self.stats.important += 1;
                    debug!(timestamp = record.timestamp, "Important step recorded");
                }
                self.tail_start = Some(before);
                self.buffer.append(record);
                self.stats.peak_pending = self.buffer.peak();
            }
        }

        self.clock
    }

    /// True when a send is due.
    pub fn ready_to_send(&self) -> bool {
        self.buffer.unsent().next().is_some()
            && (self.since_send >= self.send_interval || self.buffer.has_unsent_important())
    }

    /// Steps to transmit now, if a send is due.
    ///
    /// The oldest important record still waiting for an ack rides in front
    /// of every batch until one covers it. Drained and transition edges
    /// must reach the server even when the datagram carrying them is lost.
    /// The server refuses the copy if it already has the original.
    pub fn take_outgoing(&mut self) -> Vec<StepRecord> {
        if !self.ready_to_send() {
            return Vec::new();
        }
        self.flush()
    }

    /// Everything unsent, regardless of the interval.
    pub fn flush(&mut self) -> Vec<StepRecord> {
        self.since_send = 0.0;
        let resend = self.buffer.oldest_sent_important().cloned();
        let mut steps = self.buffer.take_unsent();
        if let Some(step) = resend {
            trace!(timestamp = step.timestamp, "Resending unacknowledged important step");
            self.stats.resent_important += 1;
            steps.insert(0, step);
        }
        steps
    }

    /// The server accepted everything up to `timestamp`.
    pub fn acknowledge(&mut self, timestamp: f64) {
        if self.gate.acknowledge(timestamp) {
            let pruned = self.buffer.prune_acked(timestamp);
            trace!(timestamp, pruned, "Steps acknowledged");
        }
    }

    /// Reset to the server's snapshot and replay the steps after it.
    ///
    /// Replay re-runs each logged step with its recorded input and delta.
    /// Transition pulses are taken from the records rather than recomputed,
    /// and the live edge state is put back afterwards. Only the net effect on
    /// resources is reported to the notification sink.
    pub fn apply_correction(
        &mut self,
        correction: &Correction,
        world: &dyn CollisionQuery,
    ) -> CorrectionOutcome {
        if !self.gate.accept(correction.timestamp) {
            self.stats.corrections_superseded += 1;
            debug!(timestamp = correction.timestamp, "Ignoring superseded correction");
            return CorrectionOutcome::Superseded;
        }

        self.buffer.prune_acked(correction.timestamp);

        let before = self.actor.snapshot();
        let live_edges = self.actor.edges().clone();
        self.actor.restore(&correction.snapshot, &mut DiscardSink);

        let mut replayed = 0;
        for step in self.buffer.iter_mut() {
            step.rebase(&self.actor);
            self.model.step(
                &mut self.actor,
                &step.input,
                step.delta,
                StepMode::Replay {
                    marks: &step.marks,
                },
                world,
                &mut DiscardSink,
            );
            step.refresh(&self.actor);
            replayed += 1;
        }

        self.actor.restore_edges(live_edges);
        // The tail's starting state predates the correction.
        self.tail_start = None;
        report_resource_changes(&before, &self.actor, &mut self.events);

        self.stats.corrections_applied += 1;
        self.stats.replayed_steps += replayed as u64;
        debug!(
            timestamp = correction.timestamp,
            replayed,
            "Applied correction"
        );
        CorrectionOutcome::Applied { replayed }
    }

    pub fn actor(&self) -> &ActorState {
        &self.actor
    }

    /// Gameplay code may change state directly; the server will correct it
    /// if it disagrees.
    pub fn actor_mut(&mut self) -> &mut ActorState {
        &mut self.actor
    }

    pub fn model(&self) -> &MovementModel {
        &self.model
    }

    pub fn buffer(&self) -> &StepBuffer {
        &self.buffer
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn stats(&self) -> &PredictionStats {
        &self.stats
    }

    pub fn drain_events(&mut self) -> Vec<ActorEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Emit value and drained notifications for what differs between `before`
/// and `after`.
fn report_resource_changes(
    before: &ActorSnapshot,
    after: &ActorState,
    sink: &mut dyn NotificationSink,
) {
    let old = [
        (ResourceKind::Stamina, before.stamina, before.stamina_drained),
        (ResourceKind::Charge, before.charge, before.charge_drained),
        (
            ResourceKind::GraceWindow,
            before.grace_window,
            before.grace_window_drained,
        ),
    ];
    for (kind, previous, was_drained) in old {
        let resource = after.resource(kind);
        if resource.value() != previous {
            sink.notify(ActorEvent::ValueChanged {
                kind,
                previous,
                current: resource.value(),
            });
        }
        if resource.is_drained() != was_drained {
            sink.notify(if resource.is_drained() {
                ActorEvent::Drained(kind)
            } else {
                ActorEvent::DrainRecovered(kind)
            });
        }
    }
}
