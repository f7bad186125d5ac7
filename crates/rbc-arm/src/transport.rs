use async_trait::async_trait;

/// A target pose for the arm, in the vendor's native units (mm for
/// position, degrees for orientation). `roll`/`pitch`/`yaw`/`speed`/
/// `acc` normally come from the robotics config's defaults; only
/// `x`/`y`/`z` vary per move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub speed: f64,
    pub acc: f64,
}

/// The synchronous-feeling operations the driver needs from the
/// vendor arm SDK, narrowed to what this coordination layer actually
/// calls. A real implementation wraps the vendor's blocking C API on a
/// `spawn_blocking` worker, the same way [`rbc_serial`] wraps the
/// serial port; tests substitute a scripted mock.
#[async_trait]
pub trait ArmTransport: Send + Sync {
    /// Returns the vendor SDK's result code: negative means failure.
    async fn move_to(&self, pos: ArmPosition, wait: bool) -> std::io::Result<i32>;
    async fn emergency_stop(&self) -> std::io::Result<()>;
}

#[cfg(any(test, feature = "test-util"))]
pub struct MockArmTransport {
    pub moves: std::sync::Mutex<Vec<ArmPosition>>,
    pub estops: std::sync::Mutex<u32>,
    pub next_result: std::sync::Mutex<std::collections::VecDeque<i32>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MockArmTransport {
    pub fn new(results: impl IntoIterator<Item = i32>) -> Self {
        MockArmTransport {
            moves: std::sync::Mutex::new(Vec::new()),
            estops: std::sync::Mutex::new(0),
            next_result: std::sync::Mutex::new(results.into_iter().collect()),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl ArmTransport for MockArmTransport {
    async fn move_to(&self, pos: ArmPosition, _wait: bool) -> std::io::Result<i32> {
        self.moves.lock().unwrap().push(pos);
        Ok(self.next_result.lock().unwrap().pop_front().unwrap_or(0))
    }

    async fn emergency_stop(&self) -> std::io::Result<()> {
        *self.estops.lock().unwrap() += 1;
        Ok(())
    }
}
