//! Authoritative re-simulation and divergence checks

use crate::record::{CustomState, StepRecord};
use crate::StateError;
use glam::Vec3;
use strider_movement::{
    ActorEvent, ActorSnapshot, ActorState, CollisionQuery, MovementModel, StepMode,
};
use tracing::{debug, warn};

/// Consecutive corrections after which the validator starts warning.
const PERSISTENT_DIVERGENCE: u32 = 10;

/// Per-field tolerances. A field diverges when the absolute difference is
/// strictly greater than its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    pub position_tolerance: f32,
    pub velocity_tolerance: f32,
    pub stamina_threshold: f32,
    pub charge_threshold: f32,
    pub grace_window_threshold: f32,
    /// Longest step the server will simulate. Combined steps must fit.
    pub max_step_delta: f32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 1.0,
            velocity_tolerance: 10.0,
            stamina_threshold: 2.0,
            charge_threshold: 2.0,
            grace_window_threshold: 0.1,
            max_step_delta: 0.25,
        }
    }
}

/// The values compared between client and server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Claim {
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    pub stamina: f32,
    pub charge: f32,
    pub grace_window: f32,
}

impl Claim {
    pub fn from_record(step: &StepRecord) -> Self {
        Self {
            position: step.position,
            velocity: step.velocity,
            grounded: step.grounded,
            stamina: step.end.stamina,
            charge: step.end.charge,
            grace_window: step.end.grace_window,
        }
    }

    pub fn from_actor(actor: &ActorState) -> Self {
        Self {
            position: actor.position,
            velocity: actor.velocity,
            grounded: actor.grounded,
            stamina: actor.stamina.value(),
            charge: actor.charge.value(),
            grace_window: actor.grace.value(),
        }
    }
}

/// First reason found for correcting a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Divergence {
    Position { error: f32 },
    Velocity { error: f32 },
    MovementMode { claimed_grounded: bool },
    Stamina { claimed: f32, authoritative: f32 },
    Charge { claimed: f32, authoritative: f32 },
    GraceWindow { claimed: f32, authoritative: f32 },
}

fn exceeds(claimed: f32, authoritative: f32, threshold: f32) -> bool {
    // NaN claims never pass.
    !((claimed - authoritative).abs() <= threshold)
}

impl ValidatorConfig {
    /// Compare a claim with the authoritative result.
    ///
    /// Any single cause is enough. Base movement is checked first, then each
    /// custom field on its own threshold.
    pub fn check(&self, claimed: &Claim, authoritative: &Claim) -> Option<Divergence> {
        let error = claimed.position.distance(authoritative.position);
        if !(error <= self.position_tolerance) {
            return Some(Divergence::Position { error });
        }
        let error = claimed.velocity.distance(authoritative.velocity);
        if !(error <= self.velocity_tolerance) {
            return Some(Divergence::Velocity { error });
        }
        if claimed.grounded != authoritative.grounded {
            return Some(Divergence::MovementMode {
                claimed_grounded: claimed.grounded,
            });
        }

        if exceeds(claimed.stamina, authoritative.stamina, self.stamina_threshold) {
            return Some(Divergence::Stamina {
                claimed: claimed.stamina,
                authoritative: authoritative.stamina,
            });
        }
        if exceeds(claimed.charge, authoritative.charge, self.charge_threshold) {
            return Some(Divergence::Charge {
                claimed: claimed.charge,
                authoritative: authoritative.charge,
            });
        }
        if exceeds(
            claimed.grace_window,
            authoritative.grace_window,
            self.grace_window_threshold,
        ) {
            return Some(Divergence::GraceWindow {
                claimed: claimed.grace_window,
                authoritative: authoritative.grace_window,
            });
        }

        None
    }
}

/// Full authoritative state, tagged with the step it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub timestamp: f64,
    pub snapshot: ActorSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Correct {
        correction: Correction,
        cause: Divergence,
    },
}

#[derive(Debug, Default, Clone)]
pub struct ValidationStats {
    pub accepted: u64,
    pub rejected: u64,
    pub position: u64,
    pub velocity: u64,
    pub movement_mode: u64,
    pub stamina: u64,
    pub charge: u64,
    pub grace_window: u64,
    /// Claimed drained flags or pulses that differ from the server's own.
    /// Informational: the values above decide corrections.
    pub edge_mismatches: u64,
}

impl ValidationStats {
    pub fn corrected(&self) -> u64 {
        self.position
            + self.velocity
            + self.movement_mode
            + self.stamina
            + self.charge
            + self.grace_window
    }

    fn count(&mut self, cause: &Divergence) {
        let counter = match cause {
            Divergence::Position { .. } => &mut self.position,
            Divergence::Velocity { .. } => &mut self.velocity,
            Divergence::MovementMode { .. } => &mut self.movement_mode,
            Divergence::Stamina { .. } => &mut self.stamina,
            Divergence::Charge { .. } => &mut self.charge,
            Divergence::GraceWindow { .. } => &mut self.grace_window,
        };
        *counter += 1;
    }
}

/// Server-side owner of one actor's authoritative state.
pub struct AuthorityValidator {
    model: MovementModel,
    actor: ActorState,
    config: ValidatorConfig,
    last_timestamp: Option<f64>,
    consecutive: u32,
    events: Vec<ActorEvent>,
    stats: ValidationStats,
}

impl AuthorityValidator {
    pub fn new(model: MovementModel, actor: ActorState, config: ValidatorConfig) -> Self {
        Self {
            model,
            actor,
            config,
            last_timestamp: None,
            consecutive: 0,
            events: Vec::new(),
            stats: ValidationStats::default(),
        }
    }

    /// Re-simulate `step` and judge the client's claim.
    ///
    /// Steps must arrive with strictly increasing timestamps; anything else
    /// is rejected without touching state.
    pub fn validate(
        &mut self,
        step: &StepRecord,
        world: &dyn CollisionQuery,
    ) -> Result<Verdict, StateError> {
        if let Some(last) = self.last_timestamp {
            if !(step.timestamp > last) {
                self.stats.rejected += 1;
                return Err(StateError::OutOfOrder {
                    timestamp: step.timestamp,
                    last,
                });
            }
        }
        if !(step.delta > 0.0 && step.delta <= self.config.max_step_delta) {
            self.stats.rejected += 1;
            return Err(StateError::InvalidDelta(step.delta));
        }
        self.last_timestamp = Some(step.timestamp);

        let outcome = self.model.step(
            &mut self.actor,
            &step.input,
            step.delta,
            StepMode::Live,
            world,
            &mut self.events,
        );

        let drained = CustomState::capture(&self.actor).drained_flags();
        let pulses = outcome.marks.iter().map(|m| m.finished_last_step);
        if step.end.drained_flags() != drained
            || !step.marks.iter().map(|m| m.finished_last_step).eq(pulses)
        {
            self.stats.edge_mismatches += 1;
            debug!(
                timestamp = step.timestamp,
                claimed_drained = ?step.end.drained_flags(),
                ?drained,
                "Claimed edges differ from server"
            );
        }

        let claimed = Claim::from_record(step);
        let authoritative = Claim::from_actor(&self.actor);
        match self.config.check(&claimed, &authoritative) {
            None => {
                self.stats.accepted += 1;
                self.consecutive = 0;
                Ok(Verdict::Accept)
            }
            Some(cause) => {
                self.stats.count(&cause);
                self.consecutive += 1;
                if self.consecutive >= PERSISTENT_DIVERGENCE {
                    warn!(
                        timestamp = step.timestamp,
                        consecutive = self.consecutive,
                        ?cause,
                        "Client keeps diverging"
                    );
                } else {
                    debug!(timestamp = step.timestamp, ?cause, "Queueing correction");
                }
                Ok(Verdict::Correct {
                    correction: Correction {
                        timestamp: step.timestamp,
                        snapshot: self.actor.snapshot(),
                    },
                    cause,
                })
            }
        }
    }

    pub fn actor(&self) -> &ActorState {
        &self.actor
    }

    /// Gameplay code on the server may change state directly.
    pub fn actor_mut(&mut self) -> &mut ActorState {
        &mut self.actor
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Correction cycles in a row, for an external abuse layer.
    pub fn consecutive_corrections(&self) -> u32 {
        self.consecutive
    }

    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    pub fn drain_events(&mut self) -> Vec<ActorEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(stamina: f32) -> Claim {
        Claim {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            grounded: true,
            stamina,
            charge: 100.0,
            grace_window: 0.0,
        }
    }

    #[test]
    fn test_stamina_threshold_scenario() {
        let config = ValidatorConfig::default();
        let authoritative = claim(50.0);

        assert_eq!(
            config.check(&claim(53.0), &authoritative),
            Some(Divergence::Stamina {
                claimed: 53.0,
                authoritative: 50.0
            })
        );
        assert_eq!(config.check(&claim(51.5), &authoritative), None);
        // Exactly on the threshold is still fine.
        assert_eq!(config.check(&claim(52.0), &authoritative), None);
    }

    #[test]
    fn test_position_checked_first() {
        let config = ValidatorConfig::default();
        let mut claimed = claim(90.0);
        claimed.position = Vec3::new(5.0, 0.0, 0.0);
        assert!(matches!(
            config.check(&claimed, &claim(50.0)),
            Some(Divergence::Position { .. })
        ));
    }

    #[test]
    fn test_each_field_triggers_alone() {
        let config = ValidatorConfig::default();
        let base = claim(50.0);

        let mut c = base;
        c.charge = 97.0;
        assert!(matches!(config.check(&c, &base), Some(Divergence::Charge { .. })));

        let mut c = base;
        c.grace_window = 0.2;
        assert!(matches!(config.check(&c, &base), Some(Divergence::GraceWindow { .. })));

        let mut c = base;
        c.grounded = false;
        assert!(matches!(config.check(&c, &base), Some(Divergence::MovementMode { .. })));

        let mut c = base;
        c.velocity = Vec3::new(0.0, 0.0, 50.0);
        assert!(matches!(config.check(&c, &base), Some(Divergence::Velocity { .. })));
    }

    #[test]
    fn test_claimed_edges_are_counted_not_corrected() {
        use strider_movement::{FlatGround, MoveInput, MovementConfig};

        let model = MovementModel::new(MovementConfig::default()).expect("config");
        let mut validator = AuthorityValidator::new(
            model.clone(),
            ActorState::new(model.config(), Vec3::ZERO),
            ValidatorConfig::default(),
        );
        let world = FlatGround::default();

        let mut shadow = ActorState::new(model.config(), Vec3::ZERO);
        let input = MoveInput::default();
        let mut step = StepRecord::begin(0.1, 0.1, input, &shadow);
        let outcome = model.step(
            &mut shadow,
            &input,
            0.1,
            StepMode::Live,
            &world,
            &mut strider_movement::DiscardSink,
        );
        step.finish(&shadow, &outcome);
        step.marks[1].finished_last_step = true;

        assert_eq!(validator.validate(&step, &world), Ok(Verdict::Accept));
        assert_eq!(validator.stats().edge_mismatches, 1);
        assert_eq!(validator.stats().corrected(), 0);
    }

    #[test]
    fn test_nan_claim_diverges() {
        let config = ValidatorConfig::default();
        assert!(config.check(&claim(f32::NAN), &claim(50.0)).is_some());
    }
}
