//! Simulated actor for Strider
//!
//! Everything that runs inside a single movement tick lives here: the
//! bounded resources (stamina, charge, grace window), the crouch transition,
//! the one-tick transition pulses, and the step function that advances them
//! together with position and velocity. The same code runs on the predicting
//! client, during replay, and on the authoritative server.

pub mod actor;
pub mod collision;
pub mod config;
pub mod crouch;
pub mod events;
pub mod input;
pub mod model;
pub mod resource;
pub mod transition;

pub use actor::{ActorSnapshot, ActorState};
pub use collision::{Capsule, CollisionQuery, FlatGround, Ledge, LowCeiling, ResizeOutcome};
pub use config::{CrouchConfig, DrainRecovery, GraceConfig, MovementConfig, ResourceConfig};
pub use crouch::{CrouchPhase, CrouchState};
pub use events::{ActorEvent, DiscardSink, NotificationSink};
pub use input::{CompressedFlags, MoveInput};
pub use model::{MovementModel, StepMode, StepOutcome, DASH_MOTION};
pub use resource::{BoundedResource, ResourceKind};
pub use transition::{MotionOverride, TransitionChannel, TransitionEdge, TransitionMark};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MovementError {
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: &'static str, value: f32 },

    #[error("Recovery fraction for {0} must lie in [0, 1]")]
    InvalidRecoveryFraction(&'static str),
}
