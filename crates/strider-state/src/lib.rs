//! State synchronization for Strider
//!
//! The predicting peer records every tick as a [`StepRecord`], merges
//! adjacent records when nothing important happened in between, and replays
//! what is still unacknowledged when a correction arrives. The authoritative
//! peer re-simulates each record and decides whether to correct.

pub mod buffer;
pub mod predictor;
pub mod record;
pub mod sync;
pub mod validator;

pub use buffer::{try_combine, CombineConfig, StepBuffer};
pub use predictor::{CorrectionOutcome, PredictionStats, Predictor, PredictorConfig};
pub use record::{CustomState, StepRecord};
pub use sync::{CorrectionGate, Response, ResponseQueue};
pub use validator::{
    AuthorityValidator, Claim, Correction, Divergence, ValidationStats, ValidatorConfig, Verdict,
};

use strider_movement::MovementError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Step at {timestamp} is not newer than last processed step {last}")]
    OutOfOrder { timestamp: f64, last: f64 },

    #[error("Invalid step delta: {0}")]
    InvalidDelta(f32),

    #[error("Movement error: {0}")]
    Movement(#[from] MovementError),
}
