// ==============================================================================
// anti_roll.rs — ANTI-ROLL BAR LOAD TRANSFER
// ------------------------------------------------------------------------------
// An anti-roll bar couples the two wheels of one axle: the more one side's
// suspension extends relative to the other, the harder the bar pulls that
// side down and pushes the other up. Net vertical force is zero; only the
// distribution changes, which is what keeps the chassis flat in corners.
//
// Travel ratio convention matches vehicle.rs: 1.0 = fully extended, and an
// airborne wheel reads 1.0, so a two-wheel liftoff produces zero transfer.
// ==============================================================================

use rapier3d::prelude::*;

use crate::vehicle::{VehicleBody, WheelId};

/// One force to apply at a wheel's world position.
#[derive(Clone, Copy, Debug)]
pub struct AxleForce {
    pub wheel: WheelId,
    pub force: Vector<Real>,
    pub at: Point<Real>,
}

const AXLES: [(WheelId, WheelId); 2] = [
    (WheelId::FL, WheelId::FR),
    (WheelId::RL, WheelId::RR),
];

/// Compute anti-roll forces for both axles. `up` is the chassis up axis in
/// world space; wheel positions are the world-space mounts. A wheel only
/// receives its share while grounded, so single-wheel liftoff transfers the
/// whole correction to the loaded side.
pub fn anti_roll_forces(
    vehicle: &VehicleBody,
    body_pos: &Isometry<Real>,
    up: Vector<Real>,
) -> Vec<AxleForce> {
    let coeff = vehicle.config.anti_roll;
    let mut forces = Vec::with_capacity(4);

    for (left_id, right_id) in AXLES {
        let left = vehicle.wheel(left_id);
        let right = vehicle.wheel(right_id);

        let transfer = (left.travel_ratio - right.travel_ratio) * coeff;
        if transfer.abs() < 1e-6 {
            continue;
        }

        if left.grounded {
            forces.push(AxleForce {
                wheel: left_id,
                force: up * -transfer,
                at: body_pos * left.mount,
            });
        }
        if right.grounded {
            forces.push(AxleForce {
                wheel: right_id,
                force: up * transfer,
                at: body_pos * right.mount,
            });
        }
    }

    forces
}
