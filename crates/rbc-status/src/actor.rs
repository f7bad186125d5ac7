use rbc_protocol::{RoboticsMode, RoboticsStatus};
use tokio::sync::{broadcast, mpsc};

use crate::msg::{StatusError, StatusMsg};

/// Channel depths mirror `services/server/src/state.rs`'s dashboard
/// broadcast sizing: generous enough that a slow subscriber can't
/// backpressure the actor.
const MAILBOX_DEPTH: usize = 64;
const CHANGE_FEED_DEPTH: usize = 256;

/// Spawn the status actor and return a cheap-to-clone [`StatusHandle`]
/// plus a subscription to status-changed notifications.
pub fn spawn(initial: RoboticsStatus) -> (crate::handle::StatusHandle, broadcast::Receiver<RoboticsStatus>) {
    let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
    let (changed_tx, changed_rx) = broadcast::channel(CHANGE_FEED_DEPTH);
    tokio::spawn(run(initial, rx, changed_tx));
    (crate::handle::StatusHandle::new(tx), changed_rx)
}

async fn run(
    mut status: RoboticsStatus,
    mut rx: mpsc::Receiver<StatusMsg>,
    changed_tx: broadcast::Sender<RoboticsStatus>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            StatusMsg::Snapshot(reply) => {
                let _ = reply.send(status.clone());
            }
            StatusMsg::SetMode(mode, reply) => {
                let result = apply_set_mode(&mut status, mode);
                if result.is_ok() {
                    let _ = changed_tx.send(status.clone());
                }
                let _ = reply.send(result);
            }
            StatusMsg::SetArmState {
                connected,
                error_code,
                warn_code,
                state,
                reply,
            } => {
                if let Some(c) = connected {
                    status.arm.connected = c;
                }
                if let Some(e) = error_code {
                    status.arm.error_code = e;
                }
                if let Some(w) = warn_code {
                    status.arm.warn_code = w;
                }
                if let Some(s) = state {
                    status.arm.state = s;
                }
                let _ = changed_tx.send(status.clone());
                let _ = reply.send(());
            }
            StatusMsg::SetOctoConnected(name, connected, reply) => {
                status.octoprint.insert(name, connected);
                let _ = changed_tx.send(status.clone());
                let _ = reply.send(());
            }
            StatusMsg::SetPrime { influx, efflux, reply } => {
                if let Some(i) = influx {
                    status.prime_status.influx = i;
                }
                if let Some(e) = efflux {
                    status.prime_status.efflux = e;
                }
                let _ = changed_tx.send(status.clone());
                let _ = reply.send(());
            }
            StatusMsg::SetWindow {
                active_quad,
                vial_window,
                active_pumps,
                reply,
            } => {
                status.active_quad = active_quad;
                status.vial_window = vial_window;
                status.active_pumps = active_pumps;
                let _ = changed_tx.send(status.clone());
                let _ = reply.send(());
            }
            StatusMsg::Override(reply) => {
                status.mode = RoboticsMode::Idle;
                let _ = changed_tx.send(status.clone());
                let _ = reply.send(());
            }
        }
    }
}

/// `EmergencyStop` is latched: once entered, every `SetMode` is
/// rejected until [`StatusMsg::Override`] resets the mode directly.
/// Outside that latch, a routine-start mode may only be entered from
/// `Idle` or `Pause`. Re-affirming the mode a routine is already in is
/// always allowed — `fluidic_event` sets `mode` again ahead of both
/// its aspirate and dispense phases.
fn apply_set_mode(status: &mut RoboticsStatus, mode: RoboticsMode) -> Result<(), StatusError> {
    if status.mode == RoboticsMode::EmergencyStop {
        return Err(StatusError::Latched);
    }
    if mode == status.mode {
        return Ok(());
    }
    let is_routine_start = !matches!(
        mode,
        RoboticsMode::Idle | RoboticsMode::Pause | RoboticsMode::EmergencyStop
    );
    if is_routine_start && !status.mode.accepts_routine_start() {
        return Err(StatusError::RoutineNotStartable { from: status.mode });
    }
    status.mode = mode;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emergency_stop_latches_until_override() {
        let (handle, _rx) = spawn(RoboticsStatus::default());

        handle.set_mode(RoboticsMode::Dilution).await.unwrap().unwrap();
        handle.set_mode(RoboticsMode::EmergencyStop).await.unwrap().unwrap();

        let rejected = handle.set_mode(RoboticsMode::Idle).await.unwrap();
        assert_eq!(rejected, Err(StatusError::Latched));

        handle.override_status().await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().mode, RoboticsMode::Idle);

        handle.set_mode(RoboticsMode::Dilution).await.unwrap().unwrap();
        assert_eq!(handle.snapshot().await.unwrap().mode, RoboticsMode::Dilution);
    }

    #[tokio::test]
    async fn re_affirming_the_current_mode_is_allowed() {
        let (handle, _rx) = spawn(RoboticsStatus::default());
        handle.set_mode(RoboticsMode::Dilution).await.unwrap().unwrap();

        // fluidic_event sets the routine's mode again ahead of its
        // dispense phase; this must not be rejected as a fresh
        // routine-start attempt.
        handle.set_mode(RoboticsMode::Dilution).await.unwrap().unwrap();
        assert_eq!(handle.snapshot().await.unwrap().mode, RoboticsMode::Dilution);
    }

    #[tokio::test]
    async fn routine_cannot_start_mid_routine() {
        let (handle, _rx) = spawn(RoboticsStatus::default());
        handle.set_mode(RoboticsMode::Dilution).await.unwrap().unwrap();

        let rejected = handle.set_mode(RoboticsMode::Influx).await.unwrap();
        assert_eq!(
            rejected,
            Err(StatusError::RoutineNotStartable {
                from: RoboticsMode::Dilution
            })
        );
    }

    #[tokio::test]
    async fn status_changed_feed_observes_mutations() {
        let (handle, mut rx) = spawn(RoboticsStatus::default());
        handle
            .set_octo_connected("print_server_0", true)
            .await
            .unwrap();
        let seen = rx.recv().await.unwrap();
        assert_eq!(seen.octoprint.get("print_server_0"), Some(&true));
    }
}
