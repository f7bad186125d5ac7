use std::sync::Arc;

use rbc_status::{RoboticsMode, StatusHandle};
use tokio::sync::watch;
use tracing::{error, warn};

use crate::error::ArmError;
use crate::transport::{ArmPosition, ArmTransport};

/// The arm's state code that the vendor SDK reports as "faulted".
const FAULT_STATE: i32 = 4;

/// Orientation/speed/acceleration defaults applied to every move; only
/// x/y/z vary per call.
#[derive(Debug, Clone, Copy)]
pub struct ArmDefaults {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub speed: f64,
    pub acc: f64,
}

/// One vendor-SDK callback event, marshalled off the SDK's own thread
/// into a message the driver applies on the async runtime.
#[derive(Debug, Clone, Copy)]
pub enum ArmCallbackEvent {
    ErrorCode(i32),
    WarnCode(i32),
    State(i32),
    Connected(bool),
}

/// Typed wrapper over the vendor arm API. Mirrors callback state into
/// the status actor and exposes the one motion primitive the fluidics
/// engine needs.
pub struct ArmDriver<T: ArmTransport> {
    transport: Arc<T>,
    status: StatusHandle,
    defaults: ArmDefaults,
    estop_tx: watch::Sender<u64>,
}

impl<T: ArmTransport + 'static> ArmDriver<T> {
    /// Returns the driver plus a receiver that changes value every
    /// time the arm forces an emergency stop, for dispense/prime
    /// routines to observe alongside `check_pause`.
    pub fn new(transport: T, status: StatusHandle, defaults: ArmDefaults) -> (Self, watch::Receiver<u64>) {
        let (estop_tx, estop_rx) = watch::channel(0);
        (
            ArmDriver {
                transport: Arc::new(transport),
                status,
                defaults,
                estop_tx,
            },
            estop_rx,
        )
    }

    /// Move to `(x, y, z)` using the configured defaults for
    /// orientation/speed/acceleration. Fails fast without touching the
    /// transport if the arm is already faulted or the process is
    /// latched in `EmergencyStop`.
    pub async fn move_arm(&self, target: (f64, f64, f64), wait: bool) -> Result<i32, ArmError> {
        let snapshot = self.status.snapshot().await?;
        if snapshot.mode == RoboticsMode::EmergencyStop || snapshot.arm.state == FAULT_STATE {
            return Err(ArmError::ArmBusyOrFaulted);
        }
        let pos = ArmPosition {
            x: target.0,
            y: target.1,
            z: target.2,
            roll: self.defaults.roll,
            pitch: self.defaults.pitch,
            yaw: self.defaults.yaw,
            speed: self.defaults.speed,
            acc: self.defaults.acc,
        };
        let code = self.transport.move_to(pos, wait).await?;
        if code < 0 {
            return Err(ArmError::ArmMoveFailed(code));
        }
        Ok(code)
    }

    pub async fn emergency_stop(&self) -> Result<(), ArmError> {
        self.transport.emergency_stop().await?;
        Ok(())
    }

    /// Apply one vendor callback event: update the status mirror, and
    /// on a fault condition force `EmergencyStop` and wake any routine
    /// watching the estop signal. Warnings are logged but never change
    /// mode.
    pub async fn handle_callback(&self, event: ArmCallbackEvent) {
        let (connected, error_code, warn_code, state) = match event {
            ArmCallbackEvent::ErrorCode(c) => (None, Some(c), None, None),
            ArmCallbackEvent::WarnCode(c) => {
                warn!(warn_code = c, "arm warning (mode unchanged)");
                (None, None, Some(c), None)
            }
            ArmCallbackEvent::State(s) => (None, None, None, Some(s)),
            ArmCallbackEvent::Connected(c) => (Some(c), None, None, None),
        };
        if let Err(e) = self
            .status
            .set_arm_state(connected, error_code, warn_code, state)
            .await
        {
            error!(error = %e, "failed to mirror arm callback into status actor");
            return;
        }

        let faulted = matches!(event, ArmCallbackEvent::ErrorCode(c) if c != 0)
            || matches!(event, ArmCallbackEvent::State(s) if s == FAULT_STATE);
        if faulted {
            // EmergencyStop is latched; while already latched, SetMode
            // is a no-op rejection and arm callbacks must not clear it.
            let _ = self.status.set_mode(RoboticsMode::EmergencyStop).await;
            self.estop_tx.send_modify(|tick| *tick += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockArmTransport;
    use rbc_status::RoboticsStatus;

    fn defaults() -> ArmDefaults {
        ArmDefaults {
            roll: 180.0,
            pitch: 0.0,
            yaw: 0.0,
            speed: 100.0,
            acc: 2000.0,
        }
    }

    #[tokio::test]
    async fn move_arm_uses_configured_defaults() {
        let (status, _rx) = rbc_status::spawn(RoboticsStatus::default());
        let transport = MockArmTransport::new([0]);
        let (driver, _estop_rx) = ArmDriver::new(transport, status, defaults());

        driver.move_arm((10.0, 20.0, 5.0), true).await.unwrap();

        let moves = driver.transport.moves.lock().unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].x, 10.0);
        assert_eq!(moves[0].roll, 180.0);
        assert_eq!(moves[0].acc, 2000.0);
    }

    #[tokio::test]
    async fn negative_result_code_raises_arm_move_failed() {
        let (status, _rx) = rbc_status::spawn(RoboticsStatus::default());
        let transport = MockArmTransport::new([-3]);
        let (driver, _estop_rx) = ArmDriver::new(transport, status, defaults());

        let err = driver.move_arm((0.0, 0.0, 0.0), true).await.unwrap_err();
        assert!(matches!(err, ArmError::ArmMoveFailed(-3)));
    }

    #[tokio::test]
    async fn fault_state_callback_latches_emergency_stop_and_signals_estop() {
        let (status, _rx) = rbc_status::spawn(RoboticsStatus::default());
        let transport = MockArmTransport::new([0]);
        let (driver, mut estop_rx) = ArmDriver::new(transport, status.clone(), defaults());

        driver.handle_callback(ArmCallbackEvent::State(4)).await;

        assert_eq!(status.snapshot().await.unwrap().mode, RoboticsMode::EmergencyStop);
        assert!(*estop_rx.borrow_and_update() >= 1);
    }

    #[tokio::test]
    async fn warning_callback_does_not_change_mode() {
        let (status, _rx) = rbc_status::spawn(RoboticsStatus::default());
        let transport = MockArmTransport::new([0]);
        let (driver, _estop_rx) = ArmDriver::new(transport, status.clone(), defaults());

        driver.handle_callback(ArmCallbackEvent::WarnCode(7)).await;

        let snapshot = status.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, RoboticsMode::Idle);
        assert_eq!(snapshot.arm.warn_code, 7);
    }

    #[tokio::test]
    async fn move_arm_refuses_when_already_faulted() {
        let (status, _rx) = rbc_status::spawn(RoboticsStatus::default());
        let transport = MockArmTransport::new([0]);
        let (driver, _estop_rx) = ArmDriver::new(transport, status, defaults());

        driver.handle_callback(ArmCallbackEvent::State(4)).await;

        let err = driver.move_arm((1.0, 1.0, 1.0), true).await.unwrap_err();
        assert!(matches!(err, ArmError::ArmBusyOrFaulted));
        assert!(driver.transport.moves.lock().unwrap().is_empty());
    }
}
