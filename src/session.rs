// ==============================================================================
// session.rs — SESSION LIFECYCLE
// ------------------------------------------------------------------------------
// A SessionContext ties one PhysicsWorld to its side tasks: the snapshot
// channel the monitor samples, the directive queue it answers on, and the
// monitor task itself. Construction brings the whole arrangement up;
// shutdown tears it down with bounded waits so teardown can never hang.
// ==============================================================================

use log::info;
use tokio::sync::{mpsc, watch};

use crate::config::{ConfigError, VehicleConfig, INTERCEPTOR, ROADSTER};
use crate::monitor::SpeedMonitor;
use crate::physics::{PhysicsWorld, VehicleId};
use crate::pursuit::PursuitTuning;
use crate::spawn::resolve_spawn_pose;
use crate::threat::{SpawnDirective, SpeedSnapshot, ThreatEscalationPolicy, ThreatPolicyConfig};

pub struct SessionConfig {
    pub player: VehicleConfig,
    pub pursuer: VehicleConfig,
    pub policy: ThreatPolicyConfig,
    pub tuning: PursuitTuning,
    pub player_spawn: [f32; 3],
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            player: ROADSTER,
            pursuer: INTERCEPTOR,
            policy: ThreatPolicyConfig::default(),
            tuning: PursuitTuning::default(),
            player_spawn: [0.0, 1.3, 0.0],
        }
    }
}

pub struct SessionContext {
    pub world: PhysicsWorld,
    pub player: VehicleId,
    snapshot_tx: watch::Sender<SpeedSnapshot>,
    directives: mpsc::Receiver<SpawnDirective>,
    loss_tx: mpsc::Sender<f64>,
    monitor: SpeedMonitor,
    pursuer_config: VehicleConfig,
    tuning: PursuitTuning,
}

impl SessionContext {
    /// Bring up the world, the player vehicle, and the monitor task.
    pub fn start(config: SessionConfig) -> Result<Self, ConfigError> {
        let mut world = PhysicsWorld::new();
        let player = world.spawn_player(config.player, config.player_spawn)?;

        let (snapshot_tx, snapshot_rx) = watch::channel(world.player_snapshot());
        let policy = ThreatEscalationPolicy::new(config.policy);
        let (monitor, directives, loss_tx) = SpeedMonitor::spawn(snapshot_rx, policy);

        info!("session started, player = {player}");
        Ok(Self {
            world,
            player,
            snapshot_tx,
            directives,
            loss_tx,
            monitor,
            pursuer_config: config.pursuer,
            tuning: config.tuning,
        })
    }

    /// One sim tick: drain pending spawn directives, step the world, report
    /// any pursuers culled during the step, publish the fresh snapshot. The
    /// publish never blocks; the watch channel keeps only the latest value.
    pub fn step(&mut self, dt: f32) {
        while let Ok(directive) = self.directives.try_recv() {
            let pose = resolve_spawn_pose(&self.world.player_snapshot(), &directive);
            match self.world.spawn_pursuer(
                self.pursuer_config.clone(),
                pose.position,
                pose.heading,
                self.tuning,
            ) {
                Ok(id) => info!("pursuer {id} entered at {:?}", pose.position),
                Err(err) => log::warn!("pursuer spawn failed: {err}"),
            }
        }

        self.world.step(dt);

        for id in self.world.drain_lost_pursuers() {
            info!("pursuer {id} lost");
            if self.loss_tx.try_send(self.world.time()).is_err() {
                log::warn!("loss report queue full, dropping report for {id}");
            }
        }

        let _ = self.snapshot_tx.send(self.world.player_snapshot());
    }

    pub fn set_player_input(&mut self, throttle: f32, steer: f32, brake: f32) {
        self.world.set_player_input(throttle, steer, brake);
    }

    /// Stop the side tasks with bounded waits, then drop the world.
    pub async fn shutdown(self) {
        self.monitor.shutdown().await;
        info!("session stopped at t = {:.2}s", self.world.time());
    }
}
