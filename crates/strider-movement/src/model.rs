//! The movement step
//!
//! One call advances one actor by one tick. The order inside a tick is
//! fixed and identical on every peer:
//!
//! 1. transition edges (clear last pulse, raise a new one)
//! 2. resource regeneration and drain
//! 3. crouch timer, then crouch/uncrouch requests, then commit
//! 4. dash and jump requests
//! 5. velocity and position integration
//! 6. motion override timers (may report completion)
//! 7. ground probe (landing, leaving ground, grace window)

use crate::actor::ActorState;
use crate::collision::{Capsule, CollisionQuery, ResizeOutcome};
use crate::config::MovementConfig;
use crate::crouch::CrouchPhase;
use crate::events::{ActorEvent, NotificationSink};
use crate::input::MoveInput;
use crate::transition::{TransitionChannel, TransitionMark};
use crate::MovementError;
use glam::Vec2;
use tracing::{debug, trace};

/// Name of the motion override started by a dash.
pub const DASH_MOTION: &str = "Dash";

/// Horizontal speeds below this count as stopped when braking.
const STOP_SPEED: f32 = 1.0;

/// How transition edges are driven during a step.
#[derive(Debug, Clone, Copy)]
pub enum StepMode<'a> {
    /// Normal simulation: edges advance from completion reports.
    Live,
    /// Re-running a recorded step: edges take the recorded flags, indexed by
    /// [`TransitionChannel::index`].
    Replay { marks: &'a [TransitionMark; 2] },
}

/// What a step observed at its start.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Edge state for each channel, indexed by [`TransitionChannel::index`].
    pub marks: [TransitionMark; 2],
    pub crouch_transitioning_at_start: bool,
}

impl StepOutcome {
    pub fn has_pulse(&self) -> bool {
        self.marks.iter().any(|m| m.finished_last_step)
    }
}

#[derive(Debug, Clone)]
pub struct MovementModel {
    config: MovementConfig,
}

impl MovementModel {
    pub fn new(config: MovementConfig) -> Result<Self, MovementError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn standing_capsule(&self) -> Capsule {
        Capsule::new(self.config.crouch.radius, self.config.crouch.standing_half_height)
    }

    pub fn crouched_capsule(&self) -> Capsule {
        Capsule::new(self.config.crouch.radius, self.config.crouch.crouched_half_height)
    }

    /// Advance `actor` by `dt` seconds of `input`.
    pub fn step(
        &self,
        actor: &mut ActorState,
        input: &MoveInput,
        dt: f32,
        mode: StepMode<'_>,
        world: &dyn CollisionQuery,
        sink: &mut dyn NotificationSink,
    ) -> StepOutcome {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let marks = self.update_edges(actor, mode, sink);
        let crouch_transitioning_at_start = actor.crouch.is_transitioning();

        self.update_resources(actor, input, dt, sink);
        self.update_crouch(actor, input, dt, world, sink);
        self.try_dash(actor, input, sink);
        self.try_jump(actor, input, sink);
        self.update_velocity(actor, input, dt);
        actor.position += actor.velocity * dt;
        self.advance_overrides(actor, dt, matches!(mode, StepMode::Live));
        self.probe_ground(actor, world, sink);

        actor.enforce_bounds();

        StepOutcome {
            marks,
            crouch_transitioning_at_start,
        }
    }

    fn update_edges(
        &self,
        actor: &mut ActorState,
        mode: StepMode<'_>,
        sink: &mut dyn NotificationSink,
    ) -> [TransitionMark; 2] {
        for channel in TransitionChannel::ALL {
            match mode {
                StepMode::Live => {
                    if let Some(name) = actor.edge_mut(channel).begin_step() {
                        debug!(%channel, name, "Transition finished");
                        sink.notify(ActorEvent::TransitionFinished {
                            channel,
                            name: name.to_string(),
                        });
                    }
                }
                StepMode::Replay { marks } => {
                    actor.edge_mut(channel).apply_mark(&marks[channel.index()]);
                }
            }
        }

        [
            actor.edge(TransitionChannel::Animation).mark(),
            actor.edge(TransitionChannel::External).mark(),
        ]
    }

    fn update_resources(
        &self,
        actor: &mut ActorState,
        input: &MoveInput,
        dt: f32,
        sink: &mut dyn NotificationSink,
    ) {
        let sprinting = input.sprint && input.is_moving() && !actor.stamina.is_drained();
        let stamina_rate = if sprinting {
            -self.config.sprint_drain_rate
        } else {
            self.config.stamina.regen_rate
        };

        actor.stamina.tick(stamina_rate, dt, sink);
        actor.charge.tick(self.config.charge.regen_rate, dt, sink);
        // The grace window is measured in seconds.
        actor.grace.tick(-1.0, dt, sink);
    }

    fn update_crouch(
        &self,
        actor: &mut ActorState,
        input: &MoveInput,
        dt: f32,
        world: &dyn CollisionQuery,
        sink: &mut dyn NotificationSink,
    ) {
        actor.crouch.advance(dt);

        let duration = self.config.crouch_duration(actor.grounded);
        if input.crouch && !actor.crouch.is_crouched() {
            actor.crouch.begin_crouch(duration);
            sink.notify(ActorEvent::CrouchStarted);
        } else if !input.crouch && actor.crouch.is_crouched() {
            // Only a fully crouched actor has the small capsule to grow out of.
            let outcome = if actor.crouch.phase() == CrouchPhase::Crouched {
                world.resize_capsule(actor.position, self.crouched_capsule(), self.standing_capsule())
            } else {
                ResizeOutcome::Clear
            };

            match outcome {
                ResizeOutcome::Blocked => {
                    trace!(position = ?actor.position, "No room to stand up");
                    sink.notify(ActorEvent::UncrouchBlocked);
                }
                ResizeOutcome::Adjusted(position) => {
                    actor.position = position;
                    actor.crouch.begin_uncrouch(duration);
                    sink.notify(ActorEvent::UncrouchStarted);
                }
                ResizeOutcome::Clear => {
                    actor.crouch.begin_uncrouch(duration);
                    sink.notify(ActorEvent::UncrouchStarted);
                }
            }
        }

        if let Some(phase) = actor.crouch.commit() {
            if phase == CrouchPhase::Crouched {
                // Shrinking never blocks, but may still nudge the actor.
                if let ResizeOutcome::Adjusted(position) = world.resize_capsule(
                    actor.position,
                    self.standing_capsule(),
                    self.crouched_capsule(),
                ) {
                    actor.position = position;
                }
            }
            trace!(?phase, "Crouch transition committed");
            sink.notify(ActorEvent::CrouchCommitted(phase));
        }
    }

    fn try_dash(&self, actor: &mut ActorState, input: &MoveInput, sink: &mut dyn NotificationSink) {
        if !input.dash || actor.motion(TransitionChannel::External).is_some() {
            return;
        }
        if actor.charge.is_drained() || actor.charge.value() < self.config.dash_cost {
            trace!(charge = actor.charge.value(), "Dash refused");
            return;
        }

        let direction = if input.is_moving() {
            input.direction.normalize_or_zero()
        } else {
            actor.velocity.truncate().normalize_or_zero()
        };
        if direction == Vec2::ZERO {
            return;
        }

        let charge = actor.charge.value() - self.config.dash_cost;
        actor.charge.set(charge, sink);
        actor.start_motion(
            TransitionChannel::External,
            DASH_MOTION,
            direction.extend(0.0) * self.config.dash_speed,
            self.config.dash_duration,
            sink,
        );
    }

    fn try_jump(&self, actor: &mut ActorState, input: &MoveInput, sink: &mut dyn NotificationSink) {
        if !input.jump {
            return;
        }
        let upright = matches!(
            actor.crouch.phase(),
            CrouchPhase::Standing | CrouchPhase::TransitioningToStanding
        );
        if !upright || !(actor.grounded || !actor.grace.is_drained()) {
            return;
        }

        actor.velocity.z = self.config.jump_velocity;
        actor.grounded = false;
        actor.grace.set(0.0, sink);
        sink.notify(ActorEvent::Jumped);
    }

    fn update_velocity(&self, actor: &mut ActorState, input: &MoveInput, dt: f32) {
        let overriding = actor
            .motion(TransitionChannel::External)
            .or_else(|| actor.motion(TransitionChannel::Animation))
            .map(|o| o.velocity);

        let mut horizontal = actor.velocity.truncate();
        let mut vertical = actor.velocity.z;

        if let Some(velocity) = overriding {
            horizontal = velocity.truncate();
            if velocity.z != 0.0 {
                vertical = velocity.z;
            }
        } else if actor.grounded {
            let max_speed = self.max_ground_speed(actor, input);
            if input.is_moving() {
                let wish_dir = input.direction.normalize_or_zero();
                let speed = horizontal.length();
                let turn = (dt * self.config.braking_friction).min(1.0);
                horizontal -= (horizontal - wish_dir * speed) * turn;
                horizontal = accelerate(
                    horizontal,
                    wish_dir,
                    max_speed * input.direction.length(),
                    self.config.max_acceleration * dt,
                );
                horizontal = horizontal.clamp_length_max(max_speed);
            } else {
                horizontal *= (1.0 - self.config.braking_friction * dt).max(0.0);
                if horizontal.length() < STOP_SPEED {
                    horizontal = Vec2::ZERO;
                }
            }
        } else if input.is_moving() {
            horizontal = accelerate(
                horizontal,
                input.direction.normalize_or_zero(),
                self.config.air_speed,
                self.config.max_acceleration * dt,
            );
        }

        if !actor.grounded && overriding.map_or(true, |v| v.z == 0.0) {
            vertical -= self.config.gravity * dt;
        }

        actor.velocity = horizontal.extend(vertical);
    }

    fn max_ground_speed(&self, actor: &ActorState, input: &MoveInput) -> f32 {
        if actor.crouch.is_crouched() {
            self.config.crouched_speed
        } else if input.sprint && !actor.stamina.is_drained() {
            self.config.sprint_speed
        } else {
            self.config.walk_speed
        }
    }

    fn advance_overrides(&self, actor: &mut ActorState, dt: f32, live: bool) {
        for channel in TransitionChannel::ALL {
            let finished = match actor.motion_mut(channel) {
                Some(motion) => motion.advance(dt),
                None => continue,
            };
            if finished {
                *actor.motion_mut(channel) = None;
                // Replay takes edge flags from the record instead.
                if live {
                    actor.edge_mut(channel).report_completion();
                }
            }
        }
    }

    fn probe_ground(
        &self,
        actor: &mut ActorState,
        world: &dyn CollisionQuery,
        sink: &mut dyn NotificationSink,
    ) {
        let trace_distance = self.config.ground_trace_distance;
        let ground = world.ground_height(actor.position, trace_distance);

        if actor.grounded {
            match ground {
                Some(height) if actor.position.z - height <= self.config.ground_snap_distance => {
                    actor.position.z = height;
                    actor.velocity.z = 0.0;
                }
                _ => {
                    actor.grounded = false;
                    let speed = actor.velocity.truncate().length();
                    actor.grace.set(self.config.grace_for_speed(speed), sink);
                    debug!(speed, grace = actor.grace.value(), "Left ground");
                    sink.notify(ActorEvent::LeftGround);
                }
            }
        } else if actor.velocity.z <= 0.0 {
            if let Some(height) = ground.filter(|h| actor.position.z <= *h) {
                actor.position.z = height;
                actor.velocity.z = 0.0;
                actor.grounded = true;
                sink.notify(ActorEvent::Landed);
            }
        }
    }
}

/// Add speed along `dir` up to `wish_speed`, at most `max_add` this tick.
fn accelerate(velocity: Vec2, dir: Vec2, wish_speed: f32, max_add: f32) -> Vec2 {
    let current = velocity.dot(dir);
    let add = (wish_speed - current).clamp(0.0, max_add);
    velocity + dir * add
}
