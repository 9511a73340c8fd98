//! chase-sim - headless vehicle dynamics + pursuit AI core.
//!
//! A fixed-tick rapier3d world hosting raycast-suspension vehicles, a
//! pursuit state machine that drives interceptor vehicles toward a target,
//! and a speed-monitoring side task that escalates the threat level by
//! spawning pursuers.

pub mod config;
pub mod contact;
pub mod dynamics;
pub mod monitor;
pub mod physics;
pub mod pursuit;
pub mod session;
pub mod spawn;
pub mod stuck;
pub mod threat;
pub mod vehicle;
