// ==============================================================================
// motor.rs — MOTOR TORQUE GOVERNANCE + BRAKE DISTRIBUTION
// ------------------------------------------------------------------------------
// Turns throttle/brake intent into per-wheel torque commands:
//
// 1) Target torque = throttle * max torque * gear ratio at current speed,
//    forced to zero once the speed limiter engages.
// 2) The commanded torque chases the target exponentially, throttle ramps
//    with acceleration_rate and lift-off decays with deceleration_rate, so
//    torque never steps discontinuously.
// 3) Distribution: motor torque to driven wheels, brake torque to all four.
//    WheelUnit::apply_torque enforces brake dominance.
// ==============================================================================

use crate::vehicle::{VehicleBody, WheelUnit};

/// Advance the speed-governed motor torque one step and distribute torques
/// to the wheels. `forward_speed` is signed m/s along the chassis forward
/// axis; the limiter only cuts torque that would push past max_speed.
pub fn update_drive(vehicle: &mut VehicleBody, forward_speed: f32, dt: f32) {
    let config = &vehicle.config;

    let mut target = vehicle.throttle * config.max_motor_torque
        * config.gear_ratio_at(forward_speed.abs());

    // Speed limiter: no torque in the direction of travel at/above max_speed.
    if forward_speed.abs() >= config.max_speed && target * forward_speed > 0.0 {
        target = 0.0;
    }

    let rate = if target.abs() > vehicle.motor_torque_smoothed.abs() {
        config.acceleration_rate
    } else {
        config.deceleration_rate
    };
    let blend = (rate * dt).clamp(0.0, 1.0);
    vehicle.motor_torque_smoothed += (target - vehicle.motor_torque_smoothed) * blend;

    let motor = vehicle.motor_torque_smoothed;
    let brake = vehicle.brake * config.brake_force;

    for wheel in vehicle.wheels.iter_mut() {
        let drive = if wheel.driven { motor } else { 0.0 };
        wheel.apply_torque(drive, brake);
    }
}

/// Traction control: halve a wheel's motor torque when its measured slip is
/// over the threshold. The contact pass calls this per wheel right after
/// slip is measured, so the reduced torque is what sizes the drive impulse
/// and what the wheel reports afterwards.
pub fn apply_traction_cut(wheel: &mut WheelUnit, threshold: f32) {
    if wheel.grounded && wheel.forward_slip.abs() > threshold {
        wheel.motor_torque *= 0.5;
    }
}
