// ==============================================================================
// vehicle.rs — WHEEL UNITS + VEHICLE BODY
// ------------------------------------------------------------------------------
// A VehicleBody owns exactly four WheelUnits (FL/FR/RL/RR), its rapier body
// handle, its validated config, and the per-step control intent. The rigid
// body itself lives in the rapier set; this struct is everything the dynamics
// pipeline needs to turn intent into forces.
//
// Chassis convention: +Z forward, +Y up, +X right. Rear wheels are driven,
// front wheels steer.
// ==============================================================================

use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;
use std::fmt;

use crate::config::{ConfigError, VehicleConfig};
use crate::contact::{ContactModel, SuspensionRayHit};

const WHEEL_MOUNT_HEIGHT: f32 = -0.3; // chassis-local y of the wheel mounts
pub const TRAVEL_EPS: f32 = 1e-3;     // below this, suspension is rigid

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WheelId {
    FL,
    FR,
    RL,
    RR,
}

impl WheelId {
    pub const ALL: [WheelId; 4] = [WheelId::FL, WheelId::FR, WheelId::RL, WheelId::RR];

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::RL)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        }
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One wheel: suspension geometry, per-step torque command, and the contact
/// state computed this step.
#[derive(Clone, Debug)]
pub struct WheelUnit {
    pub id: WheelId,
    pub mount: Point<Real>,   // chassis-local mount position
    pub radius: Real,
    pub rest_length: Real,    // suspension neutral length
    pub max_travel: Real,     // full extension length
    pub stiffness: Real,      // spring constant, N/m
    pub damping: Real,        // damper constant, N*s/m
    pub driven: bool,
    pub steerable: bool,

    // Per-step command (set by the motor controller).
    pub motor_torque: f32,
    pub brake_torque: f32,
    pub steer_angle: f32,

    // Last computed contact state.
    pub grounded: bool,
    pub travel_ratio: f32,    // clamped [0, 1]; 1.0 = fully extended
    pub forward_slip: f32,    // signed; + acceleration slip, - deceleration slip
}

impl WheelUnit {
    pub fn new(id: WheelId, mount: Point<Real>, config: &VehicleConfig) -> Self {
        Self {
            id,
            mount,
            radius: config.wheel_radius,
            rest_length: config.suspension_rest_length,
            max_travel: config.suspension_max_travel,
            stiffness: config.suspension_stiffness,
            damping: config.suspension_damping,
            driven: !id.is_front(),
            steerable: id.is_front(),
            motor_torque: 0.0,
            brake_torque: 0.0,
            steer_angle: 0.0,
            grounded: false,
            travel_ratio: 1.0,
            forward_slip: 0.0,
        }
    }

    /// Set this step's torque command. Brake strictly overrides motor: a
    /// braking wheel never drives, whatever the caller passed.
    pub fn apply_torque(&mut self, motor: f32, brake: f32) {
        let brake = brake.max(0.0);
        self.brake_torque = brake;
        self.motor_torque = if brake > 0.0 { 0.0 } else { motor };
    }

    /// Cast the suspension ray and update grounded / travel ratio.
    ///
    /// Travel ratio is `clamp01((hit_dist - radius) / max_travel)`: 0 = fully
    /// compressed, 1.0 = fully extended. A miss leaves the wheel airborne at
    /// full extension. A wheel with no travel is rigid: ratio 0 whenever it
    /// touches ground.
    pub fn compute_ground_contact(
        &mut self,
        model: &dyn ContactModel,
        origin: Point<Real>,
        axis: Vector<Real>,
    ) -> (bool, f32) {
        let max_dist = self.max_travel + self.radius;

        match model.cast_suspension_ray(origin, axis, max_dist) {
            Some(hit) => {
                let ratio = if self.max_travel <= TRAVEL_EPS {
                    0.0
                } else {
                    ((hit.distance - self.radius) / self.max_travel.max(TRAVEL_EPS))
                        .clamp(0.0, 1.0)
                };
                self.grounded = true;
                self.travel_ratio = ratio;
                (true, ratio)
            }
            None => {
                self.grounded = false;
                self.travel_ratio = 1.0;
                (false, 1.0)
            }
        }
    }

    /// Delegate slip measurement to the contact model and record the result.
    pub fn report_slip(
        &mut self,
        model: &dyn ContactModel,
        hit: &SuspensionRayHit,
        v_long: f32,
        normal_force: f32,
        forward_friction: f32,
    ) -> f32 {
        let state = crate::contact::WheelContactState {
            motor_torque: self.motor_torque,
            brake_torque: self.brake_torque,
            radius: self.radius,
            v_long,
            normal_force,
            forward_friction,
        };
        let slip = model.compute_forward_slip(&state, hit);
        self.forward_slip = slip;
        slip
    }
}

/// Read-only rigid-body snapshot. The pursuit machinery works entirely on
/// these, which keeps it independent of the physics backend.
#[derive(Clone, Copy, Debug)]
pub struct BodyFrame {
    pub position: Point<Real>,
    pub rotation: UnitQuaternion<Real>,
    pub linvel: Vector<Real>,
    pub angvel: Vector<Real>,
}

impl BodyFrame {
    pub fn from_body(body: &RigidBody) -> Self {
        let iso = body.position();
        Self {
            position: Point::from(iso.translation.vector),
            rotation: iso.rotation,
            linvel: *body.linvel(),
            angvel: *body.angvel(),
        }
    }

    pub fn forward(&self) -> Vector<Real> {
        self.rotation * vector![0.0, 0.0, 1.0]
    }

    pub fn right(&self) -> Vector<Real> {
        self.rotation * vector![1.0, 0.0, 0.0]
    }

    pub fn speed(&self) -> f32 {
        self.linvel.magnitude()
    }
}

pub struct VehicleBody {
    pub body: RigidBodyHandle,
    pub config: VehicleConfig,
    pub wheels: [WheelUnit; 4],

    // Control intent, clamped each step.
    pub throttle: f32,        // -1..1
    pub steer: f32,           // -1..1
    pub brake: f32,           // 0..1

    pub steer_angle: f32,     // current rate-limited steering angle, radians
    pub motor_torque_smoothed: f32, // speed-governance state, N*m
}

impl VehicleBody {
    /// Build a vehicle around an existing rigid body. Fails fast on config
    /// invariant violations; a vehicle must refuse to exist rather than run
    /// with undefined force math.
    pub fn new(body: RigidBodyHandle, config: VehicleConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let half_track = config.track_width * 0.5;
        let half_base = config.wheelbase * 0.5;
        let mount = |x: f32, z: f32| point![x, WHEEL_MOUNT_HEIGHT, z];

        let wheels = [
            WheelUnit::new(WheelId::FL, mount(-half_track, half_base), &config),
            WheelUnit::new(WheelId::FR, mount(half_track, half_base), &config),
            WheelUnit::new(WheelId::RL, mount(-half_track, -half_base), &config),
            WheelUnit::new(WheelId::RR, mount(half_track, -half_base), &config),
        ];

        Ok(Self {
            body,
            config,
            wheels,
            throttle: 0.0,
            steer: 0.0,
            brake: 0.0,
            steer_angle: 0.0,
            motor_torque_smoothed: 0.0,
        })
    }

    pub fn set_input(&mut self, throttle: f32, steer: f32, brake: f32) {
        self.throttle = throttle.clamp(-1.0, 1.0);
        self.steer = steer.clamp(-1.0, 1.0);
        self.brake = brake.clamp(0.0, 1.0);
    }

    /// Rate-limit the steering angle toward the current intent. Speed-
    /// sensitive: less lock available at speed.
    pub fn update_steering(&mut self, speed: f32, dt: f32) {
        let steer_scale = (1.0 - (speed / 30.0)).clamp(0.35, 1.0);
        let target = self.steer * self.config.max_steer_angle * steer_scale;

        let max_step = self.config.steer_rate * dt;
        let delta = (target - self.steer_angle).clamp(-max_step, max_step);
        self.steer_angle += delta;

        for wheel in self.wheels.iter_mut() {
            wheel.steer_angle = if wheel.steerable { self.steer_angle } else { 0.0 };
        }
    }

    /// World-space forward direction of a wheel, steering included.
    pub fn wheel_forward(&self, wheel: &WheelUnit, rot: &UnitQuaternion<Real>) -> Vector<Real> {
        let steer_rot = UnitQuaternion::from_axis_angle(&Vector::y_axis(), wheel.steer_angle);
        (*rot * steer_rot) * vector![0.0, 0.0, 1.0]
    }

    pub fn wheel(&self, id: WheelId) -> &WheelUnit {
        &self.wheels[Self::index(id)]
    }

    pub fn wheel_mut(&mut self, id: WheelId) -> &mut WheelUnit {
        &mut self.wheels[Self::index(id)]
    }

    fn index(id: WheelId) -> usize {
        match id {
            WheelId::FL => 0,
            WheelId::FR => 1,
            WheelId::RL => 2,
            WheelId::RR => 3,
        }
    }
}
