// ==============================================================================
// monitor.rs — SPEED MONITOR TASK
// ------------------------------------------------------------------------------
// A tokio task that samples the player's published speed snapshot on a fixed
// wall-clock interval and runs the threat escalation policy over it. The sim
// loop never blocks on this task:
//
//   sim step --commit--> watch<SpeedSnapshot> --sample--> monitor task
//   sim step <--drain--- mpsc<SpawnDirective> <--emit---- monitor task
//   sim step --report--> mpsc<f64 loss time>  --recv----> monitor task
//
// The watch channel always holds the latest snapshot, so a slow monitor only
// skips samples, never backs up the producer. Directives go the other way
// over a bounded queue; when it is full the directive is dropped and the
// next over-limit sample will retry. Pursuer losses travel on a third queue
// so the policy can hold the slot through its respawn delay.
// ==============================================================================

use log::{debug, warn};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::threat::{SpawnDirective, SpeedSnapshot, ThreatEscalationPolicy, ThreatEscalationRecord};

pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(50);
pub const DIRECTIVE_QUEUE_DEPTH: usize = 8;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub struct SpeedMonitor {
    join: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

fn record_json(record: &ThreatEscalationRecord) -> String {
    serde_json::to_string(record).unwrap_or_default()
}

impl SpeedMonitor {
    /// Start the sampler. Directives arrive on the returned receiver; the
    /// sim loop drains it once per step and reports culled pursuers back
    /// through the returned loss sender (sim time in seconds).
    pub fn spawn(
        snapshot_rx: watch::Receiver<SpeedSnapshot>,
        mut policy: ThreatEscalationPolicy,
    ) -> (Self, mpsc::Receiver<SpawnDirective>, mpsc::Sender<f64>) {
        let (directive_tx, directive_rx) = mpsc::channel(DIRECTIVE_QUEUE_DEPTH);
        let (loss_tx, mut loss_rx) = mpsc::channel::<f64>(DIRECTIVE_QUEUE_DEPTH);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = *snapshot_rx.borrow();
                        if let Some(directive) = policy.assess(&snapshot) {
                            debug!(
                                "threat escalation at {:.1} m/s, record: {}",
                                snapshot.speed,
                                record_json(&policy.record())
                            );
                            if directive_tx.try_send(directive).is_err() {
                                warn!("spawn directive queue full, dropping");
                            }
                        }
                    }
                    Some(time) = loss_rx.recv() => {
                        policy.note_pursuer_lost(time);
                        debug!(
                            "pursuer lost at {time:.1}s, record: {}",
                            record_json(&policy.record())
                        );
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });

        (Self { join, stop_tx }, directive_rx, loss_tx)
    }

    /// Stop the task and wait for it, bounded. A wedged task is abandoned
    /// after the grace period rather than hanging teardown.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, self.join).await.is_err() {
            warn!("speed monitor did not stop within {SHUTDOWN_GRACE:?}");
        }
    }
}
