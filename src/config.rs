// ==============================================================================
// config.rs — PER-VEHICLE TUNING (IMMUTABLE AFTER VALIDATION)
// ------------------------------------------------------------------------------
// Everything a vehicle needs to know about itself lives here. A config is
// plain data: loaded externally (JSON) or taken from one of the built-in
// presets, validated once at vehicle construction, and never mutated at
// runtime.
//
// Validation covers only the invariants that would make the force math
// undefined (zero mass, zero wheel radius, broken gear table). Everything
// else is a tuning preference, not an error.
// ==============================================================================

use serde::Deserialize;
use thiserror::Error;

pub const GEAR_COUNT: usize = 6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("vehicle mass must be positive, got {0}")]
    NonPositiveMass(f32),

    #[error("wheel radius must be positive, got {0}")]
    NonPositiveWheelRadius(f32),

    #[error("max speed must be positive, got {0}")]
    NonPositiveMaxSpeed(f32),

    #[error("gear table entry {index} is not finite or not positive")]
    BadGearRatio { index: usize },

    #[error("pursuit agent requires a target vehicle")]
    MissingTarget,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    pub mass: f32,                  // kg
    pub max_motor_torque: f32,      // N*m, per driven wheel, before gear scaling
    pub brake_force: f32,           // N*m brake torque per wheel
    pub max_speed: f32,             // m/s
    pub linear_damping: f32,        // drag
    pub angular_damping: f32,       // rotational drag

    // --- Steering ---
    pub max_steer_angle: f32,       // radians
    pub steer_rate: f32,            // radians / sec rate limit

    // --- Torque smoothing (speed governance) ---
    pub acceleration_rate: f32,     // 1/s, throttle ramp toward target torque
    pub deceleration_rate: f32,     // 1/s, ramp toward zero

    // --- Body forces ---
    pub anti_roll: f32,             // N per unit travel-ratio delta
    pub drift_stabilizer: f32,      // lateral damping coefficient (m/s^2 per m/s)
    pub drift_deadzone: f32,        // m/s lateral speed below which we do nothing
    pub traction_slip_threshold: f32, // normalized demand, wheel counts as slipping above this

    // --- Friction ---
    pub forward_friction: f32,      // longitudinal capacity coefficient
    pub sideways_friction: f32,     // lateral capacity coefficient

    // --- Geometry ---
    pub wheelbase: f32,             // meters (front axle to rear axle)
    pub track_width: f32,           // meters (left to right)
    pub wheel_radius: f32,          // meters
    pub chassis_half_extents: [f32; 3], // [hx, hy, hz] meters
    pub chassis_com_offset: [f32; 3],   // local offset from collider center

    // --- Suspension ---
    pub suspension_rest_length: f32,   // meters
    pub suspension_max_travel: f32,    // meters
    pub suspension_stiffness: f32,     // N/m
    pub suspension_damping: f32,       // N*s/m

    // --- Gear system ---
    // gear_speeds[i] is the speed at which gear i engages; gear_ratios[i]
    // multiplies motor torque while that gear is active.
    pub gear_speeds: [f32; GEAR_COUNT], // m/s thresholds, ascending
    pub gear_ratios: [f32; GEAR_COUNT], // torque multipliers
}

/// Player car. Numbers track the original tune: quick, light, modest brakes.
pub const ROADSTER: VehicleConfig = VehicleConfig {
    mass: 1350.0,
    max_motor_torque: 500.0,
    brake_force: 1000.0,
    max_speed: 55.0,              // m/s (~200 km/h)
    linear_damping: 0.08,
    angular_damping: 0.6,

    max_steer_angle: 0.44,        // ~25 degrees
    steer_rate: 2.5,

    acceleration_rate: 10.0,
    deceleration_rate: 5.0,

    anti_roll: 6000.0,
    drift_stabilizer: 1.2,
    drift_deadzone: 0.5,
    traction_slip_threshold: 0.85,

    forward_friction: 0.9,
    sideways_friction: 0.9,

    wheelbase: 2.5,
    track_width: 1.5,
    wheel_radius: 0.35,
    chassis_half_extents: [0.9, 0.35, 2.0],
    chassis_com_offset: [0.0, -0.5, 0.0], // low COM for stability

    suspension_rest_length: 0.5,
    suspension_max_travel: 0.9,
    suspension_stiffness: 66_000.0,
    suspension_damping: 4_200.0,

    gear_speeds: [0.0, 5.5, 11.0, 16.5, 22.0, 33.0],
    gear_ratios: [1.0, 1.0, 1.5, 2.0, 2.5, 3.0],
};

/// Pursuer car. Heavier, faster top end, much stronger brakes so the
/// overshoot-recovery maneuver actually stops it.
pub const INTERCEPTOR: VehicleConfig = VehicleConfig {
    mass: 1500.0,
    max_motor_torque: 800.0,
    brake_force: 3000.0,
    max_speed: 69.0,              // m/s (~250 km/h), faster than the player
    linear_damping: 0.08,
    angular_damping: 0.8,

    max_steer_angle: 0.55,
    steer_rate: 3.0,

    acceleration_rate: 12.0,
    deceleration_rate: 6.0,

    anti_roll: 8000.0,
    drift_stabilizer: 1.6,
    drift_deadzone: 0.5,
    traction_slip_threshold: 0.85,

    forward_friction: 1.0,
    sideways_friction: 1.0,

    wheelbase: 2.7,
    track_width: 1.6,
    wheel_radius: 0.35,
    chassis_half_extents: [0.9, 0.35, 2.1],
    chassis_com_offset: [0.0, -0.5, 0.0],

    suspension_rest_length: 0.5,
    suspension_max_travel: 0.9,
    suspension_stiffness: 74_000.0,
    suspension_damping: 4_600.0,

    gear_speeds: [0.0, 5.5, 11.0, 16.5, 22.0, 33.0],
    gear_ratios: [1.0, 1.0, 1.5, 2.0, 2.5, 3.0],
};

impl VehicleConfig {
    /// Reject configs the force math cannot run on. Fatal at setup, never at
    /// runtime (see error policy).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mass > 0.0) {
            return Err(ConfigError::NonPositiveMass(self.mass));
        }
        if !(self.wheel_radius > 0.0) {
            return Err(ConfigError::NonPositiveWheelRadius(self.wheel_radius));
        }
        if !(self.max_speed > 0.0) {
            return Err(ConfigError::NonPositiveMaxSpeed(self.max_speed));
        }
        for (index, ratio) in self.gear_ratios.iter().enumerate() {
            if !ratio.is_finite() || *ratio <= 0.0 {
                return Err(ConfigError::BadGearRatio { index });
            }
        }
        Ok(())
    }

    /// Load a config from externally persisted JSON.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Torque multiplier for the gear engaged at `speed` (m/s). Walks the
    /// table from the top so the highest qualifying gear wins.
    pub fn gear_ratio_at(&self, speed: f32) -> f32 {
        for i in (0..GEAR_COUNT).rev() {
            if speed >= self.gear_speeds[i] {
                return self.gear_ratios[i];
            }
        }
        self.gear_ratios[0]
    }
}
