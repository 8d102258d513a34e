//! Complete simulated state of one actor

use crate::config::MovementConfig;
use crate::crouch::CrouchState;
use crate::events::{ActorEvent, NotificationSink};
use crate::resource::{BoundedResource, ResourceKind};
use crate::transition::{MotionOverride, TransitionChannel, TransitionEdge};
use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct ActorState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    pub stamina: BoundedResource,
    pub charge: BoundedResource,
    pub grace: BoundedResource,
    pub crouch: CrouchState,
    edges: [TransitionEdge; 2],
    overrides: [Option<MotionOverride>; 2],
}

impl ActorState {
    /// Fresh actor standing at `position` with full stamina and charge.
    pub fn new(config: &MovementConfig, position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            grounded: true,
            stamina: BoundedResource::full(ResourceKind::Stamina, &config.stamina),
            charge: BoundedResource::full(ResourceKind::Charge, &config.charge),
            grace: BoundedResource::grace_window(&config.grace),
            crouch: CrouchState::standing(),
            edges: Default::default(),
            overrides: Default::default(),
        }
    }

    pub fn resource(&self, kind: ResourceKind) -> &BoundedResource {
        match kind {
            ResourceKind::Stamina => &self.stamina,
            ResourceKind::Charge => &self.charge,
            ResourceKind::GraceWindow => &self.grace,
        }
    }

    pub fn resource_mut(&mut self, kind: ResourceKind) -> &mut BoundedResource {
        match kind {
            ResourceKind::Stamina => &mut self.stamina,
            ResourceKind::Charge => &mut self.charge,
            ResourceKind::GraceWindow => &mut self.grace,
        }
    }

    pub fn edge(&self, channel: TransitionChannel) -> &TransitionEdge {
        &self.edges[channel.index()]
    }

    pub fn edge_mut(&mut self, channel: TransitionChannel) -> &mut TransitionEdge {
        &mut self.edges[channel.index()]
    }

    /// Both edges, for saving around a replay.
    pub fn edges(&self) -> &[TransitionEdge; 2] {
        &self.edges
    }

    pub fn restore_edges(&mut self, edges: [TransitionEdge; 2]) {
        self.edges = edges;
    }

    pub fn motion(&self, channel: TransitionChannel) -> Option<&MotionOverride> {
        self.overrides[channel.index()].as_ref()
    }

    pub(crate) fn motion_mut(&mut self, channel: TransitionChannel) -> &mut Option<MotionOverride> {
        &mut self.overrides[channel.index()]
    }

    /// Impose `velocity` for `duration` seconds on `channel`.
    ///
    /// Replaces whatever was running there. Completion is reported to the
    /// channel's edge when the time runs out.
    pub fn start_motion(
        &mut self,
        channel: TransitionChannel,
        name: &str,
        velocity: Vec3,
        duration: f32,
        sink: &mut dyn NotificationSink,
    ) {
        self.overrides[channel.index()] = Some(MotionOverride::new(name, velocity, duration));
        self.edges[channel.index()].start(name);
        sink.notify(ActorEvent::MotionStarted {
            channel,
            name: name.to_string(),
        });
    }

    pub fn has_motion_override(&self) -> bool {
        self.overrides.iter().any(Option::is_some)
    }

    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            position: self.position,
            velocity: self.velocity,
            grounded: self.grounded,
            stamina: self.stamina.value(),
            stamina_drained: self.stamina.is_drained(),
            charge: self.charge.value(),
            charge_drained: self.charge.is_drained(),
            grace_window: self.grace.value(),
            grace_window_drained: self.grace.is_drained(),
            crouch: self.crouch,
            overrides: self.overrides.clone(),
        }
    }

    /// Overwrite with an authoritative snapshot.
    ///
    /// Resources go through their setters so value and drained notifications
    /// still fire. Transition edges are left alone.
    pub fn restore(&mut self, snapshot: &ActorSnapshot, sink: &mut dyn NotificationSink) {
        self.position = snapshot.position;
        self.velocity = snapshot.velocity;
        self.grounded = snapshot.grounded;

        for (resource, value, drained) in [
            (&mut self.stamina, snapshot.stamina, snapshot.stamina_drained),
            (&mut self.charge, snapshot.charge, snapshot.charge_drained),
            (
                &mut self.grace,
                snapshot.grace_window,
                snapshot.grace_window_drained,
            ),
        ] {
            resource.set(value, sink);
            resource.set_drained(drained, sink);
        }

        self.crouch = snapshot.crouch;
        self.overrides = snapshot.overrides.clone();
    }

    /// Repair any resource that escaped its bounds. Returns true if one did.
    pub fn enforce_bounds(&mut self) -> bool {
        let stamina = self.stamina.enforce_bounds();
        let charge = self.charge.enforce_bounds();
        let grace = self.grace.enforce_bounds();
        stamina || charge || grace
    }
}

/// Full authoritative state carried by a correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    pub stamina: f32,
    pub stamina_drained: bool,
    pub charge: f32,
    pub charge_drained: bool,
    pub grace_window: f32,
    pub grace_window_drained: bool,
    pub crouch: CrouchState,
    pub overrides: [Option<MotionOverride>; 2],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DiscardSink;

    #[test]
    fn test_new_actor_is_rested() {
        let actor = ActorState::new(&MovementConfig::default(), Vec3::ZERO);
        assert_eq!(actor.stamina.value(), 100.0);
        assert!(!actor.stamina.is_drained());
        assert_eq!(actor.grace.value(), 0.0);
        assert!(actor.grace.is_drained());
        assert!(!actor.has_motion_override());
    }

    #[test]
    fn test_restore_forces_drained_flag() {
        let config = MovementConfig::default();
        let mut actor = ActorState::new(&config, Vec3::ZERO);
        let mut snapshot = actor.snapshot();
        snapshot.stamina = 50.0;
        snapshot.stamina_drained = true;
        snapshot.position = Vec3::new(10.0, 0.0, 0.0);

        let mut events = Vec::new();
        actor.restore(&snapshot, &mut events);
        assert_eq!(actor.stamina.value(), 50.0);
        assert!(actor.stamina.is_drained());
        assert_eq!(actor.position.x, 10.0);
        assert!(events.contains(&ActorEvent::Drained(ResourceKind::Stamina)));
        assert_eq!(actor.snapshot(), snapshot);
    }

    #[test]
    fn test_start_motion_claims_channel() {
        let mut actor = ActorState::new(&MovementConfig::default(), Vec3::ZERO);
        actor.start_motion(
            TransitionChannel::Animation,
            "Vault",
            Vec3::X * 300.0,
            0.5,
            &mut DiscardSink,
        );
        assert_eq!(
            actor.motion(TransitionChannel::Animation).map(|m| m.name.as_str()),
            Some("Vault")
        );
        assert_eq!(actor.edge(TransitionChannel::Animation).name(), "Vault");
        assert!(actor.motion(TransitionChannel::External).is_none());
    }
}
