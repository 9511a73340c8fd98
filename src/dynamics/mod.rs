//! Per-wheel and whole-body force computations, impulse domain.
//!
//! Every function here is pure: it reads wheel/body state and returns forces
//! or impulses for the caller to apply. Nothing in this module touches the
//! rapier sets directly.

pub mod anti_roll;
pub mod motor;
pub mod stabilizer;
pub mod suspension;
