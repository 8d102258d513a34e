//! Collision collaborator
//!
//! The movement step never owns geometry. It asks a [`CollisionQuery`] two
//! questions: does a resized capsule fit here, and where is the ground. The
//! worlds below are small enough for the simulator and for tests.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub radius: f32,
    pub half_height: f32,
}

impl Capsule {
    pub fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    pub fn height(&self) -> f32 {
        self.half_height * 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeOutcome {
    /// The new shape fits where the actor stands.
    Clear,
    /// The new shape fits once the actor moves here.
    Adjusted(Vec3),
    /// No non-overlapping placement was found.
    Blocked,
}

/// Positions are the bottom of the capsule (the feet).
pub trait CollisionQuery {
    /// Try to swap `from` for `to` at `position`.
    fn resize_capsule(&self, position: Vec3, from: Capsule, to: Capsule) -> ResizeOutcome;

    /// Height of the walkable surface under `position`, if one lies within
    /// `max_distance` below it.
    fn ground_height(&self, position: Vec3, max_distance: f32) -> Option<f32>;
}

fn surface_within(position: Vec3, surface: f32, max_distance: f32) -> Option<f32> {
    (position.z - surface <= max_distance).then_some(surface)
}

/// Infinite floor with nothing overhead.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlatGround {
    pub height: f32,
}

impl CollisionQuery for FlatGround {
    fn resize_capsule(&self, _position: Vec3, _from: Capsule, _to: Capsule) -> ResizeOutcome {
        ResizeOutcome::Clear
    }

    fn ground_height(&self, position: Vec3, max_distance: f32) -> Option<f32> {
        surface_within(position, self.height, max_distance)
    }
}

/// Raised platform for `x < edge_x`, lower floor beyond it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ledge {
    pub edge_x: f32,
    pub upper: f32,
    pub lower: f32,
}

impl CollisionQuery for Ledge {
    fn resize_capsule(&self, _position: Vec3, _from: Capsule, _to: Capsule) -> ResizeOutcome {
        ResizeOutcome::Clear
    }

    fn ground_height(&self, position: Vec3, max_distance: f32) -> Option<f32> {
        let surface = if position.x < self.edge_x {
            self.upper
        } else {
            self.lower
        };
        surface_within(position, surface, max_distance)
    }
}

/// Floor under a ceiling that covers `x` in `[start_x, end_x)`.
///
/// Growing a capsule under the ceiling is blocked; shrinking always fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowCeiling {
    pub floor: f32,
    pub ceiling: f32,
    pub start_x: f32,
    pub end_x: f32,
}

impl CollisionQuery for LowCeiling {
    fn resize_capsule(&self, position: Vec3, from: Capsule, to: Capsule) -> ResizeOutcome {
        let covered = (self.start_x..self.end_x).contains(&position.x);
        if !covered || to.height() <= from.height() {
            return ResizeOutcome::Clear;
        }
        if position.z + to.height() > self.ceiling {
            ResizeOutcome::Blocked
        } else {
            ResizeOutcome::Clear
        }
    }

    fn ground_height(&self, position: Vec3, max_distance: f32) -> Option<f32> {
        surface_within(position, self.floor, max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledge_surfaces() {
        let ledge = Ledge {
            edge_x: 100.0,
            upper: 50.0,
            lower: 0.0,
        };
        assert_eq!(ledge.ground_height(Vec3::new(0.0, 0.0, 50.0), 10.0), Some(50.0));
        assert_eq!(ledge.ground_height(Vec3::new(150.0, 0.0, 50.0), 100.0), Some(0.0));
        assert_eq!(ledge.ground_height(Vec3::new(150.0, 0.0, 50.0), 10.0), None);
    }

    #[test]
    fn test_ceiling_blocks_growth_only() {
        let world = LowCeiling {
            floor: 0.0,
            ceiling: 150.0,
            start_x: 0.0,
            end_x: 100.0,
        };
        let crouched = Capsule::new(34.0, 70.0);
        let standing = Capsule::new(34.0, 88.0);

        assert_eq!(
            world.resize_capsule(Vec3::new(50.0, 0.0, 0.0), crouched, standing),
            ResizeOutcome::Blocked
        );
        assert_eq!(
            world.resize_capsule(Vec3::new(50.0, 0.0, 0.0), standing, crouched),
            ResizeOutcome::Clear
        );
        assert_eq!(
            world.resize_capsule(Vec3::new(150.0, 0.0, 0.0), crouched, standing),
            ResizeOutcome::Clear
        );
    }
}
