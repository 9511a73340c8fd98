// ==============================================================================
// threat.rs — SPEED-TRIGGERED THREAT ESCALATION
// ------------------------------------------------------------------------------
// Pure decision logic for the monitor task: given a stream of speed
// snapshots, decide when a new pursuer should enter the world. The policy
// holds no references into the physics state; it sees immutable snapshots
// and emits spawn directives.
//
// Rules:
// - A snapshot over the speed limit requests a spawn.
// - At most one spawn per cooldown window, however long the speeding lasts.
// - Never more than max_pursuers at once.
// - A lost pursuer re-enters only after the respawn delay, and still counts
//   against the cap until its slot is released.
// ==============================================================================

use serde::Serialize;

/// Immutable view of the player body published after each sim step.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpeedSnapshot {
    pub time: f64,              // s, simulated time
    pub speed: f32,             // m/s
    pub position: [f32; 3],
    pub forward: [f32; 3],
}

/// Instruction for the sim loop: put a pursuer into the world behind the
/// player. Placement geometry is resolved at drain time against the player's
/// pose in that step.
#[derive(Clone, Copy, Debug)]
pub struct SpawnDirective {
    pub behind_offset: f32,     // m behind the player
    pub lift: f32,              // m above ground at spawn
}

/// Bookkeeping the policy exposes for logging and tests.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ThreatEscalationRecord {
    pub active_pursuers: usize,
    pub total_spawned: u64,
    pub last_spawn_time: f64,
    pub pending_respawns: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct ThreatPolicyConfig {
    pub speed_limit: f32,       // m/s, above this the player is a threat
    pub spawn_cooldown: f64,    // s between spawns
    pub respawn_delay: f64,     // s before a lost pursuer's slot refills
    pub max_pursuers: usize,
    pub behind_offset: f32,     // m, placement distance behind the player
    pub spawn_lift: f32,        // m, drop-in height
}

impl Default for ThreatPolicyConfig {
    fn default() -> Self {
        Self {
            speed_limit: 30.0,
            spawn_cooldown: 10.0,
            respawn_delay: 15.0,
            max_pursuers: 4,
            behind_offset: 12.0,
            spawn_lift: 1.0,
        }
    }
}

pub struct ThreatEscalationPolicy {
    config: ThreatPolicyConfig,
    active_pursuers: usize,
    total_spawned: u64,
    last_spawn_time: Option<f64>,
    // Times at which lost pursuers become eligible again.
    respawn_queue: Vec<f64>,
}

impl ThreatEscalationPolicy {
    pub fn new(config: ThreatPolicyConfig) -> Self {
        Self {
            config,
            active_pursuers: 0,
            total_spawned: 0,
            last_spawn_time: None,
            respawn_queue: Vec::new(),
        }
    }

    /// Evaluate one snapshot. At most one directive per call.
    pub fn assess(&mut self, snapshot: &SpeedSnapshot) -> Option<SpawnDirective> {
        // Release matured respawn slots first so they can be refilled below.
        self.respawn_queue.retain(|ready_at| *ready_at > snapshot.time);

        if snapshot.speed <= self.config.speed_limit {
            return None;
        }
        if self.active_pursuers + self.respawn_queue.len() >= self.config.max_pursuers {
            return None;
        }
        if let Some(last) = self.last_spawn_time {
            if snapshot.time - last < self.config.spawn_cooldown {
                return None;
            }
        }

        self.last_spawn_time = Some(snapshot.time);
        self.active_pursuers += 1;
        self.total_spawned += 1;

        Some(SpawnDirective {
            behind_offset: self.config.behind_offset,
            lift: self.config.spawn_lift,
        })
    }

    /// A pursuer left the world (destroyed or culled). Its slot stays
    /// reserved for respawn_delay seconds.
    pub fn note_pursuer_lost(&mut self, time: f64) {
        if self.active_pursuers > 0 {
            self.active_pursuers -= 1;
            self.respawn_queue.push(time + self.config.respawn_delay);
        }
    }

    pub fn record(&self) -> ThreatEscalationRecord {
        ThreatEscalationRecord {
            active_pursuers: self.active_pursuers,
            total_spawned: self.total_spawned,
            last_spawn_time: self.last_spawn_time.unwrap_or(0.0),
            pending_respawns: self.respawn_queue.len(),
        }
    }
}
