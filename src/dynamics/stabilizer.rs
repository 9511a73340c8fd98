// ==============================================================================
// stabilizer.rs — DRIFT STABILIZATION + QUICK-TURN VELOCITY SHAPING
// ------------------------------------------------------------------------------
// Two body-level corrections that live outside the per-wheel tire math:
//
// - Drift stabilization: a lateral counter-force at the center of mass,
//   proportional to sideways velocity, active only above a deadzone so
//   small-angle cornering stays untouched and real slides get damped.
//
// - Quick-turn shaping: during hard steering or reverse maneuvers the linear
//   velocity is decayed exponentially, letting the body rotate toward its new
//   heading without carrying the full old momentum through the turn.
// ==============================================================================

use rapier3d::prelude::*;

use crate::vehicle::BodyFrame;

/// Counter-force against lateral sliding, world space, to apply at the COM.
/// Returns None inside the deadzone.
pub fn drift_counter_force(
    frame: &BodyFrame,
    mass: f32,
    coefficient: f32,
    deadzone: f32,
) -> Option<Vector<Real>> {
    let right = frame.right();
    let lateral_vel = frame.linvel.dot(&right);
    if lateral_vel.abs() <= deadzone {
        return None;
    }
    Some(right * (-lateral_vel * coefficient * mass))
}

/// Exponential velocity decay used while quick-turning. `strength` is the
/// decay rate in 1/s; dt-scaled so the behavior is tick-rate independent.
pub fn damp_linear_velocity(linvel: Vector<Real>, strength: f32, dt: f32) -> Vector<Real> {
    linvel * (-strength * dt).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::na::UnitQuaternion;
    use approx::assert_relative_eq;

    fn frame_with_linvel(linvel: Vector<Real>) -> BodyFrame {
        BodyFrame {
            position: point![0.0, 0.0, 0.0],
            rotation: UnitQuaternion::identity(),
            linvel,
            angvel: vector![0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn small_lateral_velocity_is_left_alone() {
        let frame = frame_with_linvel(vector![0.3, 0.0, 20.0]);
        assert!(drift_counter_force(&frame, 1350.0, 1.2, 0.5).is_none());
    }

    #[test]
    fn slide_produces_an_opposing_force() {
        // Sliding toward +X; the correction must point toward -X.
        let frame = frame_with_linvel(vector![4.0, 0.0, 20.0]);
        let force = drift_counter_force(&frame, 1350.0, 1.2, 0.5).unwrap();
        assert!(force.x < 0.0);
        assert_relative_eq!(force.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(force.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn correction_scales_with_lateral_speed() {
        let slow = frame_with_linvel(vector![1.0, 0.0, 0.0]);
        let fast = frame_with_linvel(vector![5.0, 0.0, 0.0]);
        let f_slow = drift_counter_force(&slow, 1000.0, 1.0, 0.5).unwrap();
        let f_fast = drift_counter_force(&fast, 1000.0, 1.0, 0.5).unwrap();
        assert_relative_eq!(f_fast.x, f_slow.x * 5.0, epsilon = 1e-3);
    }

    #[test]
    fn damping_shrinks_velocity_monotonically() {
        let mut v = vector![10.0, 0.0, 10.0];
        for _ in 0..100 {
            let next = damp_linear_velocity(v, 3.0, 1.0 / 60.0);
            assert!(next.magnitude() < v.magnitude());
            v = next;
        }
        assert!(v.magnitude() < 1.0);
    }
}
