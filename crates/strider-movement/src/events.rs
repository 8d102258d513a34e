//! Edge-triggered notifications
//!
//! State machines never call back into gameplay code directly. They push
//! events into a sink owned by the caller, which keeps the step function free
//! of side effects and lets replay throw its events away.

use crate::crouch::CrouchPhase;
use crate::resource::ResourceKind;
use crate::transition::TransitionChannel;

#[derive(Debug, Clone, PartialEq)]
pub enum ActorEvent {
    ValueChanged {
        kind: ResourceKind,
        previous: f32,
        current: f32,
    },
    MaxChanged {
        kind: ResourceKind,
        previous: f32,
        current: f32,
    },
    Drained(ResourceKind),
    DrainRecovered(ResourceKind),

    CrouchStarted,
    UncrouchStarted,
    /// Crouch transition committed to `Crouched` or `Standing`.
    CrouchCommitted(CrouchPhase),
    UncrouchBlocked,

    MotionStarted {
        channel: TransitionChannel,
        name: String,
    },
    /// One-tick pulse after a motion override reported completion.
    TransitionFinished {
        channel: TransitionChannel,
        name: String,
    },

    Jumped,
    LeftGround,
    Landed,
}

/// Receiver for [`ActorEvent`]s.
pub trait NotificationSink {
    fn notify(&mut self, event: ActorEvent);
}

impl NotificationSink for Vec<ActorEvent> {
    fn notify(&mut self, event: ActorEvent) {
        self.push(event);
    }
}

/// Sink that drops everything. Used while replaying.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl NotificationSink for DiscardSink {
    fn notify(&mut self, _event: ActorEvent) {}
}
