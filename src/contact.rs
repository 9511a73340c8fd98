// ==============================================================================
// contact.rs — CONTACT / FRICTION MODEL BOUNDARY
// ------------------------------------------------------------------------------
// The dynamics core never talks to a physics backend directly: it asks a
// ContactModel two questions per wheel per step:
//
// 1) cast_suspension_ray(origin, axis, max_dist) — where is the ground along
//    the suspension axis, if anywhere?
// 2) compute_forward_slip(wheel, hit) — signed slip ratio for that wheel:
//    positive = acceleration slip, negative = deceleration slip.
//
// Any backend answering both satisfies the contract. RapierContactModel is
// the production implementation; tests use FlatGround.
//
// Slip here is not a wheel-spin measurement (we track no wheel angular
// velocity). It is normalized longitudinal demand vs. capacity: how much of
// the contact patch's friction budget the commanded torque is asking for.
// Above 1.0 the wheel cannot deliver the demand and is, for traction-control
// purposes, slipping.
// ==============================================================================

use rapier3d::prelude::*;

/// Result of a suspension ray query.
#[derive(Debug, Clone, Copy)]
pub struct SuspensionRayHit {
    pub distance: Real,         // along the ray, from origin
    pub normal: Vector<Real>,   // ground normal at the hit
}

/// Per-wheel state the slip computation needs. Kept minimal so the trait can
/// be implemented without seeing the whole wheel.
#[derive(Debug, Clone, Copy)]
pub struct WheelContactState {
    pub motor_torque: f32,      // N*m, this step, after brake dominance
    pub brake_torque: f32,      // N*m, this step
    pub radius: f32,            // meters
    pub v_long: f32,            // m/s, contact-point velocity along wheel forward
    pub normal_force: f32,      // N, from the suspension spring
    pub forward_friction: f32,  // longitudinal capacity coefficient
}

pub trait ContactModel {
    fn cast_suspension_ray(
        &self,
        origin: Point<Real>,
        axis: Vector<Real>,
        max_dist: Real,
    ) -> Option<SuspensionRayHit>;

    /// Signed forward slip ratio. Default implementation is demand/capacity;
    /// backends with real wheel-spin state may override.
    fn compute_forward_slip(&self, wheel: &WheelContactState, hit: &SuspensionRayHit) -> f32 {
        demand_slip_ratio(wheel, hit)
    }
}

/// Normalized longitudinal demand vs. capacity, signed by whether the torque
/// is accelerating or decelerating the contact patch.
pub fn demand_slip_ratio(wheel: &WheelContactState, _hit: &SuspensionRayHit) -> f32 {
    let capacity = (wheel.forward_friction * wheel.normal_force).max(1e-6);

    // Brake overrides motor upstream, so at most one of these is nonzero.
    if wheel.brake_torque > 0.0 {
        let demand = wheel.brake_torque / wheel.radius.max(1e-3);
        return -(demand / capacity);
    }

    let demand = wheel.motor_torque / wheel.radius.max(1e-3);
    let ratio = demand.abs() / capacity;

    // Reverse torque against forward motion is deceleration slip.
    if wheel.motor_torque * wheel.v_long < 0.0 && wheel.v_long.abs() > 0.05 {
        -ratio
    } else {
        ratio
    }
}

/// Production contact model backed by the rapier query pipeline. Borrows the
/// sets for one step; the excluded body keeps a vehicle from hitting its own
/// chassis collider.
pub struct RapierContactModel<'a> {
    pub query: &'a QueryPipeline,
    pub bodies: &'a RigidBodySet,
    pub colliders: &'a ColliderSet,
    pub exclude: RigidBodyHandle,
}

impl ContactModel for RapierContactModel<'_> {
    fn cast_suspension_ray(
        &self,
        origin: Point<Real>,
        axis: Vector<Real>,
        max_dist: Real,
    ) -> Option<SuspensionRayHit> {
        let ray = Ray::new(origin, axis);
        let filter = QueryFilter::default().exclude_rigid_body(self.exclude);

        let (_hit, toi) = self
            .query
            .cast_ray(self.bodies, self.colliders, &ray, max_dist, true, filter)?;

        // Flat-up normal assumption, same as the suspension force path. For
        // sloped terrain, switch to cast_ray_and_get_normal and thread the
        // normal through.
        Some(SuspensionRayHit {
            distance: toi,
            normal: vector![0.0, 1.0, 0.0],
        })
    }
}

/// Infinite flat ground at a fixed height, for tests and headless tuning.
pub struct FlatGround {
    pub height: Real,
}

impl ContactModel for FlatGround {
    fn cast_suspension_ray(
        &self,
        origin: Point<Real>,
        axis: Vector<Real>,
        max_dist: Real,
    ) -> Option<SuspensionRayHit> {
        // Only meaningful for downward-pointing rays.
        if axis.y >= 0.0 {
            return None;
        }
        let toi = (self.height - origin.y) / axis.y;
        if toi >= 0.0 && toi <= max_dist {
            Some(SuspensionRayHit {
                distance: toi,
                normal: vector![0.0, 1.0, 0.0],
            })
        } else {
            None
        }
    }
}
