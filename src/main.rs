// ==============================================================================
// main.rs — HEADLESS SIMULATION ENTRY POINT
// ------------------------------------------------------------------------------
// Fixed-tick driver: ~60 Hz sim steps on a tokio interval, with the speed
// monitor running as a side task inside the SessionContext. The player is
// driven by a simple scripted input so a bare `cargo run` produces a full
// chase: accelerate past the limit, get a pursuer, keep running.
// ==============================================================================

use std::time::Duration;

use chase_sim::session::{SessionConfig, SessionContext};
use log::info;
use tokio::time::interval;

const TICK_DT: f32 = 1.0 / 60.0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    info!("starting chase-sim");

    let mut session = SessionContext::start(SessionConfig::default())?;

    let mut ticker = interval(Duration::from_millis(16));
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Scripted player: floor it, with a long weaving steer so the
                // pursuit has something to chase.
                let t = tick as f32 * TICK_DT;
                let steer = (t * 0.25).sin() * 0.3;
                session.set_player_input(1.0, steer, 0.0);

                session.step(TICK_DT);
                tick += 1;

                if tick % 300 == 0 {
                    let snapshot = session.world.player_snapshot();
                    info!(
                        "t={:6.1}s speed={:5.1} m/s pursuers={}",
                        snapshot.time,
                        snapshot.speed,
                        session.world.pursuer_count()
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
