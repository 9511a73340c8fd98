// ==============================================================================
// spawn.rs — PURSUER PLACEMENT
// ------------------------------------------------------------------------------
// Resolves a spawn directive against the player's pose at drain time: the
// pursuer drops in behind the player, facing the same way, slightly lifted
// so it settles onto its suspension instead of spawning intersected with
// the ground.
// ==============================================================================

use crate::threat::{SpawnDirective, SpeedSnapshot};

#[derive(Clone, Copy, Debug)]
pub struct SpawnPose {
    pub position: [f32; 3],
    pub heading: f32, // yaw, radians
}

pub fn resolve_spawn_pose(player: &SpeedSnapshot, directive: &SpawnDirective) -> SpawnPose {
    let [px, py, pz] = player.position;
    let [fx, _fy, fz] = player.forward;

    // Degenerate forward (player mid-tumble): fall back to world +Z.
    let norm = (fx * fx + fz * fz).sqrt();
    let (fx, fz) = if norm > 1e-4 {
        (fx / norm, fz / norm)
    } else {
        (0.0, 1.0)
    };

    SpawnPose {
        position: [
            px - fx * directive.behind_offset,
            py + directive.lift,
            pz - fz * directive.behind_offset,
        ],
        heading: fx.atan2(fz),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn directive() -> SpawnDirective {
        SpawnDirective {
            behind_offset: 12.0,
            lift: 1.0,
        }
    }

    #[test]
    fn spawns_directly_behind_a_forward_facing_player() {
        let player = SpeedSnapshot {
            position: [10.0, 0.5, 50.0],
            forward: [0.0, 0.0, 1.0],
            ..SpeedSnapshot::default()
        };
        let pose = resolve_spawn_pose(&player, &directive());
        assert_relative_eq!(pose.position[0], 10.0, epsilon = 1e-5);
        assert_relative_eq!(pose.position[1], 1.5, epsilon = 1e-5);
        assert_relative_eq!(pose.position[2], 38.0, epsilon = 1e-5);
        assert_relative_eq!(pose.heading, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn heading_matches_a_turned_player() {
        let player = SpeedSnapshot {
            position: [0.0, 0.0, 0.0],
            forward: [1.0, 0.0, 0.0],
            ..SpeedSnapshot::default()
        };
        let pose = resolve_spawn_pose(&player, &directive());
        assert_relative_eq!(pose.position[0], -12.0, epsilon = 1e-4);
        assert_relative_eq!(pose.heading, std::f32::consts::FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn tumbling_player_still_gets_a_sane_pose() {
        let player = SpeedSnapshot {
            position: [0.0, 0.0, 0.0],
            forward: [0.0, 1.0, 0.0], // straight up
            ..SpeedSnapshot::default()
        };
        let pose = resolve_spawn_pose(&player, &directive());
        assert!(pose.position.iter().all(|c| c.is_finite()));
        assert_relative_eq!(pose.position[2], -12.0, epsilon = 1e-5);
    }
}
