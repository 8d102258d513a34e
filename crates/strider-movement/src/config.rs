//! Movement tunables
//!
//! All values are plain data so a session can load them from JSON and hand
//! the same configuration to the client and the server.

use crate::MovementError;
use serde::{Deserialize, Serialize};

/// When a drained resource is considered recovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum DrainRecovery {
    /// Leave the drained state only once the value is back at exactly max.
    #[default]
    Full,
    /// Leave the drained state once the value reaches `max * fraction`.
    /// The value must also be above zero, so `Fraction(0.0)` means any refill.
    Fraction(f32),
}

/// One bounded accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub max: f32,
    /// Passive change per second. Negative values decay.
    pub regen_rate: f32,
    pub recovery: DrainRecovery,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max: 100.0,
            regen_rate: 10.0,
            recovery: DrainRecovery::Full,
        }
    }
}

/// Post-leaving-ground jump window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraceConfig {
    /// Longest window in seconds, granted at `full_duration_speed`.
    pub max: f32,
    /// Horizontal speed that earns the full window.
    pub full_duration_speed: f32,
    pub recovery: DrainRecovery,
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            max: 0.4,
            full_duration_speed: 1200.0,
            recovery: DrainRecovery::Fraction(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrouchConfig {
    /// Transition time when the transition starts on the ground.
    pub grounded_duration: f32,
    /// Transition time when the transition starts in the air.
    pub airborne_duration: f32,
    pub radius: f32,
    pub standing_half_height: f32,
    pub crouched_half_height: f32,
}

impl Default for CrouchConfig {
    fn default() -> Self {
        Self {
            grounded_duration: 0.2,
            airborne_duration: 0.2,
            radius: 34.0,
            standing_half_height: 88.0,
            crouched_half_height: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub stamina: ResourceConfig,
    /// Stamina spent per second while sprinting.
    pub sprint_drain_rate: f32,

    pub charge: ResourceConfig,
    pub dash_cost: f32,
    pub dash_speed: f32,
    pub dash_duration: f32,

    pub grace: GraceConfig,
    pub crouch: CrouchConfig,

    pub walk_speed: f32,
    pub crouched_speed: f32,
    pub sprint_speed: f32,
    pub air_speed: f32,
    pub max_acceleration: f32,
    pub braking_friction: f32,
    pub jump_velocity: f32,
    pub gravity: f32,

    /// How far below the actor the ground probe looks.
    pub ground_trace_distance: f32,
    /// Height above ground within which a grounded actor sticks to it.
    pub ground_snap_distance: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            stamina: ResourceConfig::default(),
            sprint_drain_rate: 25.0,
            charge: ResourceConfig {
                max: 100.0,
                regen_rate: 5.0,
                recovery: DrainRecovery::Full,
            },
            dash_cost: 50.0,
            dash_speed: 1200.0,
            dash_duration: 0.25,
            grace: GraceConfig::default(),
            crouch: CrouchConfig::default(),
            walk_speed: 400.0,
            crouched_speed: 200.0,
            sprint_speed: 600.0,
            air_speed: 200.0,
            max_acceleration: 2048.0,
            braking_friction: 8.0,
            jump_velocity: 500.0,
            gravity: 1470.0,
            ground_trace_distance: 100_000.0,
            ground_snap_distance: 2.0,
        }
    }
}

impl MovementConfig {
    /// Reject values the step function cannot work with.
    pub fn validate(&self) -> Result<(), MovementError> {
        let non_negative = [
            ("stamina.max", self.stamina.max),
            ("charge.max", self.charge.max),
            ("grace.max", self.grace.max),
            ("grace.full_duration_speed", self.grace.full_duration_speed),
            ("sprint_drain_rate", self.sprint_drain_rate),
            ("dash_cost", self.dash_cost),
            ("dash_speed", self.dash_speed),
            ("dash_duration", self.dash_duration),
            ("crouch.grounded_duration", self.crouch.grounded_duration),
            ("crouch.airborne_duration", self.crouch.airborne_duration),
            ("crouch.radius", self.crouch.radius),
            ("crouch.standing_half_height", self.crouch.standing_half_height),
            ("crouch.crouched_half_height", self.crouch.crouched_half_height),
            ("walk_speed", self.walk_speed),
            ("crouched_speed", self.crouched_speed),
            ("sprint_speed", self.sprint_speed),
            ("air_speed", self.air_speed),
            ("max_acceleration", self.max_acceleration),
            ("braking_friction", self.braking_friction),
            ("jump_velocity", self.jump_velocity),
            ("gravity", self.gravity),
            ("ground_trace_distance", self.ground_trace_distance),
            ("ground_snap_distance", self.ground_snap_distance),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(MovementError::InvalidConfig { field, value });
            }
        }

        for (field, value) in [
            ("stamina.regen_rate", self.stamina.regen_rate),
            ("charge.regen_rate", self.charge.regen_rate),
        ] {
            if !value.is_finite() {
                return Err(MovementError::InvalidConfig { field, value });
            }
        }

        if self.grace.full_duration_speed == 0.0 {
            return Err(MovementError::InvalidConfig {
                field: "grace.full_duration_speed",
                value: 0.0,
            });
        }

        for (name, recovery) in [
            ("stamina", self.stamina.recovery),
            ("charge", self.charge.recovery),
            ("grace", self.grace.recovery),
        ] {
            if let DrainRecovery::Fraction(f) = recovery {
                if !(0.0..=1.0).contains(&f) {
                    return Err(MovementError::InvalidRecoveryFraction(name));
                }
            }
        }

        Ok(())
    }

    /// Grace window granted when leaving the ground at `horizontal_speed`.
    pub fn grace_for_speed(&self, horizontal_speed: f32) -> f32 {
        self.grace.max * horizontal_speed / self.grace.full_duration_speed
    }

    /// Crouch transition time for a transition starting now.
    pub fn crouch_duration(&self, grounded: bool) -> f32 {
        if grounded {
            self.crouch.grounded_duration
        } else {
            self.crouch.airborne_duration
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MovementConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_value_rejected() {
        let config = MovementConfig {
            dash_cost: -1.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(MovementError::InvalidConfig {
                field: "dash_cost",
                value: -1.0
            })
        );
    }

    #[test]
    fn test_recovery_fraction_out_of_range() {
        let mut config = MovementConfig::default();
        config.stamina.recovery = DrainRecovery::Fraction(1.5);
        assert_eq!(
            config.validate(),
            Err(MovementError::InvalidRecoveryFraction("stamina"))
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MovementConfig =
            serde_json::from_str(r#"{"walk_speed": 350.0, "stamina": {"recovery": {"Fraction": 0.1}}}"#)
                .expect("parse");
        assert_eq!(config.walk_speed, 350.0);
        assert_eq!(config.stamina.max, 100.0);
        assert_eq!(config.stamina.recovery, DrainRecovery::Fraction(0.1));
        assert_eq!(config.crouch, CrouchConfig::default());
    }

    #[test]
    fn test_grace_scales_with_speed() {
        let config = MovementConfig::default();
        assert!((config.grace_for_speed(600.0) - 0.2).abs() < 1e-6);
        assert!((config.grace_for_speed(1200.0) - 0.4).abs() < 1e-6);
    }
}
