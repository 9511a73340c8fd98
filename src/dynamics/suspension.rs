// ==============================================================================
// suspension.rs — SPRING + DAMPER SUPPORT FORCE
// ------------------------------------------------------------------------------
// Converts one wheel's ray hit into a scalar support force along the ground
// normal. The caller turns it into an impulse (force * dt at the contact
// point) and feeds it to anti-roll and slip as the wheel's normal load.
// ==============================================================================

use rapier3d::prelude::*;

use crate::contact::SuspensionRayHit;
use crate::vehicle::{WheelUnit, TRAVEL_EPS};

/// Everything one wheel's suspension solve produced this step.
#[derive(Clone, Copy, Debug)]
pub struct SuspensionOutput {
    pub contact_point: Point<Real>,
    pub normal: Vector<Real>,
    pub normal_force: f32,   // N, >= 0
    pub compression: f32,    // meters
}

/// Spring + damper scalar. Small suspension velocities are ignored, rebound
/// is softened, and the damper can never exceed 60% of the spring term, so
/// the force stays a support force and never yanks the chassis down.
pub(crate) fn spring_damper_force(
    compression: f32,
    suspension_vel: f32,
    stiffness: f32,
    damping: f32,
) -> f32 {
    let v = if suspension_vel.abs() < 0.05 { 0.0 } else { suspension_vel };
    let v = if v > 0.0 { v * 0.4 } else { v };

    let spring = stiffness * compression;
    let damper = (-damping * v).clamp(-spring * 0.6, spring * 0.6);

    (spring + damper).max(0.0)
}

/// Solve one wheel's suspension from its ray hit.
///
/// `origin` is the world-space ray origin, `point_vel` the world velocity of
/// the contact point (linvel + angvel x r). Returns None when the spring is
/// not loaded (wheel at or beyond rest length).
pub fn solve_suspension(
    wheel: &WheelUnit,
    hit: &SuspensionRayHit,
    origin: Point<Real>,
    axis: Vector<Real>,
    point_vel: Vector<Real>,
) -> Option<SuspensionOutput> {
    if hit.distance <= wheel.radius {
        // Buried wheel; treat as fully compressed.
        let force = spring_damper_force(
            wheel.max_travel.max(TRAVEL_EPS),
            0.0,
            wheel.stiffness,
            wheel.damping,
        );
        return Some(SuspensionOutput {
            contact_point: origin + axis * hit.distance,
            normal: hit.normal,
            normal_force: force,
            compression: wheel.max_travel,
        });
    }

    let length = hit.distance - wheel.radius;
    let compression = (wheel.rest_length - length).clamp(0.0, wheel.max_travel.max(TRAVEL_EPS));
    if compression <= 0.0 {
        return None;
    }

    let suspension_vel = point_vel.dot(&hit.normal);
    let normal_force =
        spring_damper_force(compression, suspension_vel, wheel.stiffness, wheel.damping);

    Some(SuspensionOutput {
        contact_point: origin + axis * hit.distance,
        normal: hit.normal,
        normal_force,
        compression,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ROADSTER;
    use crate::vehicle::{WheelId, WheelUnit};

    fn wheel() -> WheelUnit {
        WheelUnit::new(WheelId::FL, point![0.0, -0.3, 1.25], &ROADSTER)
    }

    fn hit_at(distance: f32) -> SuspensionRayHit {
        SuspensionRayHit {
            distance,
            normal: vector![0.0, 1.0, 0.0],
        }
    }

    #[test]
    fn support_force_is_never_negative() {
        for compression in [0.0, 0.1, 0.5, 0.9] {
            for vel in [-5.0, -0.5, 0.0, 0.5, 5.0] {
                let f = spring_damper_force(compression, vel, 66_000.0, 4_200.0);
                assert!(f >= 0.0, "force {f} at c={compression} v={vel}");
            }
        }
    }

    #[test]
    fn damper_never_overpowers_spring() {
        let spring_only = spring_damper_force(0.3, 0.0, 66_000.0, 4_200.0);
        let heavy_rebound = spring_damper_force(0.3, 100.0, 66_000.0, 4_200.0);
        assert!(heavy_rebound >= spring_only * 0.4);
    }

    #[test]
    fn unloaded_spring_produces_no_output() {
        // Ground exactly at rest length + radius: no compression.
        let w = wheel();
        let hit = hit_at(w.rest_length + w.radius);
        let out = solve_suspension(
            &w,
            &hit,
            point![0.0, 1.0, 0.0],
            vector![0.0, -1.0, 0.0],
            vector![0.0, 0.0, 0.0],
        );
        assert!(out.is_none());
    }

    #[test]
    fn compressed_spring_pushes_up() {
        let w = wheel();
        let hit = hit_at(w.radius + 0.1); // 0.4 m compression
        let out = solve_suspension(
            &w,
            &hit,
            point![0.0, 1.0, 0.0],
            vector![0.0, -1.0, 0.0],
            vector![0.0, 0.0, 0.0],
        )
        .unwrap();
        assert!(out.normal_force > 0.0);
        assert!((out.compression - (w.rest_length - 0.1)).abs() < 1e-6);
    }

    #[test]
    fn buried_wheel_saturates_at_full_compression() {
        let w = wheel();
        let out = solve_suspension(
            &w,
            &hit_at(w.radius * 0.5),
            point![0.0, 1.0, 0.0],
            vector![0.0, -1.0, 0.0],
            vector![0.0, 0.0, 0.0],
        )
        .unwrap();
        assert!((out.compression - w.max_travel).abs() < 1e-6);
        assert!(out.normal_force > 0.0);
    }
}
