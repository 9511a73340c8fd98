// ==============================================================================
// physics.rs — WORLD STATE + FIXED-TICK STEP PIPELINE
// ------------------------------------------------------------------------------
// PhysicsWorld owns the rapier sets, the ground, every vehicle, and the
// pursuit agents attached to the interceptor vehicles. One step runs, in
// order:
//
//   1) pursuit command resolution (agents read snapshots, emit commands)
//   2) control clamping + rate-limited steering
//   3) motor governance + brake distribution
//   4) suspension ray pass: contact, travel, normal force, slip
//   5) anti-roll load transfer
//   6) traction cut, then drive/brake/lateral impulses at the contact
//   7) drift stabilization at the COM
//   8) quick-turn velocity shaping + one-shot push impulses
//   9) rapier pipeline step
//  10) runaway-body reset + player snapshot commit
//
// All wheel forces are applied as impulses (force * dt) at the contact
// point. Nothing before stage 9 mutates rapier's solver state.
// ==============================================================================

use log::{debug, warn};
use rapier3d::prelude::*;
use std::collections::HashMap;

use crate::config::{ConfigError, VehicleConfig};
use crate::contact::{ContactModel, RapierContactModel};
use crate::dynamics::{anti_roll, motor, stabilizer, suspension};
use crate::pursuit::{yaw_toward, PursuitAgent, PursuitCommand, PursuitTuning};
use crate::stuck::{StuckMonitorConfig, StuckRecoveryMonitor};
use crate::threat::SpeedSnapshot;
use crate::vehicle::{BodyFrame, VehicleBody};

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

// Bodies past this coordinate are considered numerically broken.
const WORLD_BOUND: f32 = 5_000.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VehicleId(u32);

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vehicle-{}", self.0)
    }
}

/// An interceptor vehicle's AI attachments.
struct PursuerUnit {
    agent: PursuitAgent,
    stuck: StuckRecoveryMonitor,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,

    vehicles: HashMap<VehicleId, VehicleBody>,
    pursuers: HashMap<VehicleId, PursuerUnit>,
    player: Option<VehicleId>,
    next_id: u32,

    time: f64,                       // accumulated simulated seconds
    player_snapshot: SpeedSnapshot,  // committed at the end of each step
    runaway_resets: Vec<RigidBodyHandle>, // bodies reset during the last step
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Static ground slab, top surface at y = 0.
        let ground_rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let ground_handle = bodies.insert(ground_rb);

        let ground_collider = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        debug!(
            "world created: bodies = {}, colliders = {}",
            bodies.len(),
            colliders.len()
        );

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            vehicles: HashMap::new(),
            pursuers: HashMap::new(),
            player: None,
            next_id: 0,
            time: 0.0,
            player_snapshot: SpeedSnapshot::default(),
            runaway_resets: Vec::new(),
        }
    }

    // ==========================================================================
    // SPAWNING / REMOVAL
    // ==========================================================================

    /// Insert a dynamic chassis body + collider and wrap it in a VehicleBody.
    pub fn spawn_vehicle(
        &mut self,
        config: VehicleConfig,
        position: [f32; 3],
        heading: f32,
    ) -> Result<VehicleId, ConfigError> {
        config.validate()?;

        let [hx, hy, hz] = config.chassis_half_extents;
        let [cx, cy, cz] = config.chassis_com_offset;
        let volume = 8.0 * hx * hy * hz;
        let density = config.mass / volume;

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![position[0], position[1], position[2]])
            .rotation(vector![0.0, heading, 0.0])
            .linear_damping(config.linear_damping)
            .angular_damping(config.angular_damping)
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(rb);

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![cx, cy, cz])
            .collision_groups(InteractionGroups::new(
                GROUP_CHASSIS,
                GROUP_GROUND | GROUP_CHASSIS,
            ))
            .density(density)
            .friction(0.0) // wheel impulses own all ground interaction
            .restitution(0.0)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        let id = VehicleId(self.next_id);
        self.next_id += 1;
        self.vehicles.insert(id, VehicleBody::new(handle, config)?);

        debug!("{id} spawned at {position:?}");
        Ok(id)
    }

    pub fn spawn_player(
        &mut self,
        config: VehicleConfig,
        position: [f32; 3],
    ) -> Result<VehicleId, ConfigError> {
        let id = self.spawn_vehicle(config, position, 0.0)?;
        self.player = Some(id);
        Ok(id)
    }

    /// Spawn an interceptor with a pursuit agent wired to the player.
    pub fn spawn_pursuer(
        &mut self,
        config: VehicleConfig,
        position: [f32; 3],
        heading: f32,
        tuning: PursuitTuning,
    ) -> Result<VehicleId, ConfigError> {
        if self.player.is_none() {
            return Err(ConfigError::MissingTarget);
        }
        let id = self.spawn_vehicle(config, position, heading)?;
        self.pursuers.insert(
            id,
            PursuerUnit {
                agent: PursuitAgent::new(tuning),
                stuck: StuckRecoveryMonitor::new(StuckMonitorConfig::default()),
            },
        );
        Ok(id)
    }

    pub fn remove_vehicle(&mut self, id: VehicleId) {
        self.pursuers.remove(&id);
        if self.player == Some(id) {
            self.player = None;
        }
        if let Some(vehicle) = self.vehicles.remove(&id) {
            self.bodies.remove(
                vehicle.body,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.joints,
                &mut self.multibody_joints,
                true,
            );
            debug!("{id} removed");
        }
    }

    // ==========================================================================
    // ACCESS
    // ==========================================================================

    pub fn set_player_input(&mut self, throttle: f32, steer: f32, brake: f32) {
        if let Some(id) = self.player {
            if let Some(vehicle) = self.vehicles.get_mut(&id) {
                vehicle.set_input(throttle, steer, brake);
            }
        }
    }

    pub fn player_id(&self) -> Option<VehicleId> {
        self.player
    }

    pub fn pursuer_count(&self) -> usize {
        self.pursuers.len()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleBody> {
        self.vehicles.get(&id)
    }

    pub fn body_frame(&self, id: VehicleId) -> Option<BodyFrame> {
        let vehicle = self.vehicles.get(&id)?;
        self.bodies.get(vehicle.body).map(BodyFrame::from_body)
    }

    /// Immutable view of the player committed by the last step. This is what
    /// the monitor task samples; it never reads the live sets.
    pub fn player_snapshot(&self) -> SpeedSnapshot {
        self.player_snapshot
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    // ==========================================================================
    // STEP PIPELINE
    // ==========================================================================

    pub fn step(&mut self, dt: Real) {
        self.resolve_pursuit_commands(dt);
        self.apply_vehicle_controls(dt);
        self.apply_wheel_forces(dt);
        self.run_pipeline(dt);
        self.reset_runaway_bodies();
        self.time += dt as f64;
        self.commit_player_snapshot();
    }

    /// Stage 1: agents read frozen frames and emit commands; commands become
    /// vehicle inputs, push impulses, and quick-turn shaping requests.
    fn resolve_pursuit_commands(&mut self, dt: Real) {
        let Some(player_id) = self.player else {
            return;
        };
        let Some(target) = self
            .vehicles
            .get(&player_id)
            .and_then(|v| self.bodies.get(v.body))
            .map(BodyFrame::from_body)
        else {
            return;
        };
        let player_body = self.vehicles[&player_id].body;

        let mut commands: Vec<(VehicleId, PursuitCommand)> =
            Vec::with_capacity(self.pursuers.len());

        for (id, unit) in self.pursuers.iter_mut() {
            let Some(own) = self
                .vehicles
                .get(id)
                .and_then(|v| self.bodies.get(v.body))
                .map(BodyFrame::from_body)
            else {
                continue;
            };

            if unit
                .stuck
                .observe(dt, own.position, unit.agent.is_recovering())
            {
                debug!("{id} flagged stuck, starting escape");
                unit.agent.notify_stuck();
            }

            commands.push((*id, unit.agent.step(dt, &own, &target)));
        }

        for (id, command) in commands {
            if let Some(vehicle) = self.vehicles.get_mut(&id) {
                vehicle.set_input(command.throttle, command.steer, command.brake);
            }

            if let Some(push) = command.push {
                if let Some(body) = self.bodies.get_mut(player_body) {
                    body.apply_impulse(push.impulse, true);
                    debug!("{id} rammed the target");
                }
            }

            if let Some(turn) = command.quick_turn {
                let handle = self.vehicles[&id].body;
                if let Some(body) = self.bodies.get_mut(handle) {
                    let damped =
                        stabilizer::damp_linear_velocity(*body.linvel(), turn.damp_strength, dt);
                    body.set_linvel(damped, true);

                    let desired = yaw_toward(turn.heading);
                    let blend = (4.0 * dt).clamp(0.0, 1.0);
                    let rotation = body.rotation().slerp(&desired, blend);
                    body.set_rotation(rotation, true);
                }
            }
        }
    }

    /// Stage 2 + 3: clamp inputs, advance steering, run motor governance.
    fn apply_vehicle_controls(&mut self, dt: Real) {
        for vehicle in self.vehicles.values_mut() {
            let Some(body) = self.bodies.get(vehicle.body) else {
                continue;
            };
            let frame = BodyFrame::from_body(body);
            let forward_speed = frame.linvel.dot(&frame.forward());

            vehicle.update_steering(frame.speed(), dt);
            motor::update_drive(vehicle, forward_speed, dt);
        }
    }

    /// Stages 4-7: the per-wheel contact pass. Collects every impulse first,
    /// applies them in a second sweep so the ray queries see a consistent
    /// world.
    fn apply_wheel_forces(&mut self, dt: Real) {
        self.query_pipeline.update(&self.colliders);

        let mut impulses: Vec<(RigidBodyHandle, Vector<Real>, Option<Point<Real>>)> = Vec::new();

        for vehicle in self.vehicles.values_mut() {
            let Some(body) = self.bodies.get(vehicle.body) else {
                continue;
            };
            let pos = *body.position();
            let rot = pos.rotation;
            let linvel = *body.linvel();
            let angvel = *body.angvel();
            let com = pos * body.mass_properties().local_mprops.local_com;
            let mass = body.mass();
            let up = rot * vector![0.0, 1.0, 0.0];
            let fz_share = mass * 9.81 / 4.0;

            let model = RapierContactModel {
                query: &self.query_pipeline,
                bodies: &self.bodies,
                colliders: &self.colliders,
                exclude: vehicle.body,
            };

            // --- Suspension ray pass -------------------------------------
            for i in 0..vehicle.wheels.len() {
                let wheel = &mut vehicle.wheels[i];
                let origin = pos * wheel.mount;
                let axis = -up;

                let (grounded, _ratio) = wheel.compute_ground_contact(&model, origin, axis);
                if !grounded {
                    wheel.forward_slip = 0.0;
                    continue;
                }

                let max_dist = wheel.max_travel + wheel.radius;
                let Some(hit) = model.cast_suspension_ray(origin, axis, max_dist) else {
                    continue;
                };

                let contact_point = origin + axis * hit.distance;
                let r = contact_point.coords - com.coords;
                let point_vel = linvel + angvel.cross(&r);

                let Some(out) = suspension::solve_suspension(wheel, &hit, origin, axis, point_vel)
                else {
                    continue;
                };

                impulses.push((
                    vehicle.body,
                    out.normal * (out.normal_force * dt),
                    Some(out.contact_point),
                ));

                // --- Slip measurement + drive/brake/lateral ---------------
                let steer_rot = rapier3d::na::UnitQuaternion::from_axis_angle(
                    &Vector::y_axis(),
                    wheel.steer_angle,
                );
                let wheel_forward = (rot * steer_rot) * vector![0.0, 0.0, 1.0];
                let wheel_right = (rot * steer_rot) * vector![1.0, 0.0, 0.0];
                let v_long = point_vel.dot(&wheel_forward);
                let v_lat = point_vel.dot(&wheel_right);

                let normal_force = out.normal_force.max(fz_share * 0.2);
                wheel.report_slip(
                    &model,
                    &hit,
                    v_long,
                    normal_force,
                    vehicle.config.forward_friction,
                );

                motor::apply_traction_cut(wheel, vehicle.config.traction_slip_threshold);

                let capacity = vehicle.config.forward_friction * normal_force * dt;

                if wheel.motor_torque.abs() > 0.0 {
                    let drive = (wheel.motor_torque / wheel.radius * dt).clamp(-capacity, capacity);
                    impulses.push((
                        vehicle.body,
                        wheel_forward * drive,
                        Some(out.contact_point),
                    ));
                }

                if wheel.brake_torque > 0.0 && v_long.abs() > 0.05 {
                    // Brake opposes longitudinal motion, never reverses it.
                    let desired = -(v_long * mass / 4.0);
                    let max_brake = (wheel.brake_torque / wheel.radius * dt).min(capacity);
                    let brake = desired.clamp(-max_brake, max_brake);
                    impulses.push((
                        vehicle.body,
                        wheel_forward * brake,
                        Some(out.contact_point),
                    ));
                }

                // Lateral grip: cancel sideways point velocity up to the
                // friction budget.
                let lat_capacity = vehicle.config.sideways_friction * normal_force * dt;
                let lateral = (-v_lat * mass / 4.0).clamp(-lat_capacity, lat_capacity);
                impulses.push((
                    vehicle.body,
                    wheel_right * lateral,
                    Some(out.contact_point),
                ));
            }

            // --- Anti-roll -----------------------------------------------
            for axle_force in anti_roll::anti_roll_forces(vehicle, &pos, up) {
                impulses.push((vehicle.body, axle_force.force * dt, Some(axle_force.at)));
            }

            // --- Drift stabilization -------------------------------------
            let frame = BodyFrame::from_body(body);
            if let Some(force) = stabilizer::drift_counter_force(
                &frame,
                mass,
                vehicle.config.drift_stabilizer,
                vehicle.config.drift_deadzone,
            ) {
                impulses.push((vehicle.body, force * dt, None));
            }
        }

        for (handle, impulse, at) in impulses {
            if let Some(body) = self.bodies.get_mut(handle) {
                match at {
                    Some(point) => body.apply_impulse_at_point(impulse, point, true),
                    None => body.apply_impulse(impulse, true),
                }
            }
        }
    }

    fn run_pipeline(&mut self, dt: Real) {
        let hooks = ();
        let mut events = ();
        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &mut events,
            &hooks,
        );
    }

    /// Pursuers whose bodies went numerically runaway last step are culled
    /// from the world. The session reports each one to the threat policy so
    /// its slot goes through the respawn delay instead of leaking.
    pub fn drain_lost_pursuers(&mut self) -> Vec<VehicleId> {
        if self.runaway_resets.is_empty() {
            return Vec::new();
        }
        let resets = std::mem::take(&mut self.runaway_resets);
        let lost: Vec<VehicleId> = self
            .pursuers
            .keys()
            .filter(|id| {
                self.vehicles
                    .get(id)
                    .is_some_and(|v| resets.contains(&v.body))
            })
            .copied()
            .collect();
        for id in &lost {
            self.remove_vehicle(*id);
        }
        lost
    }

    /// Any body with non-finite or absurd coordinates gets parked back at
    /// the origin instead of poisoning the solver.
    fn reset_runaway_bodies(&mut self) {
        for (handle, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !pos.x.is_finite()
                || !pos.y.is_finite()
                || !pos.z.is_finite()
                || pos.x.abs() > WORLD_BOUND
                || pos.y.abs() > WORLD_BOUND
                || pos.z.abs() > WORLD_BOUND;

            if bad {
                body.set_translation(vector![0.0, 1.0, 0.0], true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                self.runaway_resets.push(handle);
                warn!("reset runaway body from {pos:?}");
            }
        }
    }

    fn commit_player_snapshot(&mut self) {
        let Some(frame) = self.player.and_then(|id| self.body_frame(id)) else {
            return;
        };
        let forward = frame.forward();
        self.player_snapshot = SpeedSnapshot {
            time: self.time,
            speed: frame.speed(),
            position: [frame.position.x, frame.position.y, frame.position.z],
            forward: [forward.x, forward.y, forward.z],
        };
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}
