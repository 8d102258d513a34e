//! Crouch transition timer
//!
//! The capsule only changes size when a transition commits. In between, the
//! phase and a progress timer describe how far the actor has gone, which is
//! what gets replicated.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrouchPhase {
    Standing,
    TransitioningToCrouched,
    Crouched,
    TransitioningToStanding,
}

impl CrouchPhase {
    pub fn to_u8(self) -> u8 {
        match self {
            CrouchPhase::Standing => 0,
            CrouchPhase::TransitioningToCrouched => 1,
            CrouchPhase::Crouched => 2,
            CrouchPhase::TransitioningToStanding => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CrouchPhase::Standing),
            1 => Some(CrouchPhase::TransitioningToCrouched),
            2 => Some(CrouchPhase::Crouched),
            3 => Some(CrouchPhase::TransitioningToStanding),
            _ => None,
        }
    }
}

/// Phase plus timer.
///
/// Settled phases keep `progress == duration`, so "transitioning" is exactly
/// `progress < duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrouchState {
    phase: CrouchPhase,
    progress: f32,
    duration: f32,
}

impl Default for CrouchState {
    fn default() -> Self {
        Self::standing()
    }
}

impl CrouchState {
    pub fn standing() -> Self {
        Self {
            phase: CrouchPhase::Standing,
            progress: 0.0,
            duration: 0.0,
        }
    }

    /// Rebuild from replicated parts, restoring the phase/timer invariant.
    pub fn from_parts(phase: CrouchPhase, progress: f32, duration: f32) -> Self {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        let progress = if progress.is_finite() {
            progress.clamp(0.0, duration)
        } else {
            0.0
        };
        match phase {
            CrouchPhase::Standing | CrouchPhase::Crouched => Self {
                phase,
                progress: duration,
                duration,
            },
            CrouchPhase::TransitioningToCrouched | CrouchPhase::TransitioningToStanding
                if progress < duration =>
            {
                Self {
                    phase,
                    progress,
                    duration,
                }
            }
            // A finished timer is a settled phase.
            CrouchPhase::TransitioningToCrouched => Self {
                phase: CrouchPhase::Crouched,
                progress: duration,
                duration,
            },
            CrouchPhase::TransitioningToStanding => Self {
                phase: CrouchPhase::Standing,
                progress: duration,
                duration,
            },
        }
    }

    pub fn phase(&self) -> CrouchPhase {
        self.phase
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn is_transitioning(&self) -> bool {
        self.progress < self.duration
    }

    /// Crouched, or on the way there. Drives the speed cap.
    pub fn is_crouched(&self) -> bool {
        matches!(
            self.phase,
            CrouchPhase::Crouched | CrouchPhase::TransitioningToCrouched
        )
    }

    /// 0 when standing, 1 when crouched.
    pub fn crouch_fraction(&self) -> f32 {
        let t = if self.duration > 0.0 {
            self.progress / self.duration
        } else {
            1.0
        };
        match self.phase {
            CrouchPhase::Standing => 0.0,
            CrouchPhase::Crouched => 1.0,
            CrouchPhase::TransitioningToCrouched => t,
            CrouchPhase::TransitioningToStanding => 1.0 - t,
        }
    }

    /// Start moving toward `Crouched`.
    pub fn begin_crouch(&mut self, duration: f32) {
        self.begin(CrouchPhase::TransitioningToCrouched, duration);
    }

    /// Start moving toward `Standing`.
    pub fn begin_uncrouch(&mut self, duration: f32) {
        self.begin(CrouchPhase::TransitioningToStanding, duration);
    }

    /// Advance the timer. Never overshoots the duration.
    pub fn advance(&mut self, dt: f32) {
        if self.is_transitioning() {
            self.progress = (self.progress + dt).min(self.duration);
        }
    }

    /// True once a transition has run its full duration and must commit.
    pub fn ready_to_commit(&self) -> bool {
        matches!(
            self.phase,
            CrouchPhase::TransitioningToCrouched | CrouchPhase::TransitioningToStanding
        ) && !self.is_transitioning()
    }

    /// Settle a finished transition. Returns the phase it settled into.
    pub fn commit(&mut self) -> Option<CrouchPhase> {
        if !self.ready_to_commit() {
            return None;
        }
        self.phase = match self.phase {
            CrouchPhase::TransitioningToCrouched => CrouchPhase::Crouched,
            _ => CrouchPhase::Standing,
        };
        Some(self.phase)
    }

    fn begin(&mut self, phase: CrouchPhase, duration: f32) {
        let duration = duration.max(0.0);
        // Reversing mid-way keeps the time already spent: undoing a partial
        // transition takes as long as the part that was done.
        let progress = if self.is_transitioning() {
            (duration - self.progress).clamp(0.0, duration)
        } else {
            0.0
        };
        self.phase = phase;
        self.progress = progress;
        self.duration = duration;
    }
}
