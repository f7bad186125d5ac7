use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::transport::{ArmPosition, ArmTransport};

/// Talks to the vendor six-axis arm controller over its TCP API: one
/// newline-delimited JSON request per call, one newline-delimited JSON
/// response carrying the vendor's numeric result `code`. The socket is
/// a single blocking stream guarded by a mutex and driven from a
/// `spawn_blocking` worker, the same shape [`rbc_serial::SerialPortTransport`]
/// uses for the microcontroller link.
pub struct TcpArmTransport {
    stream: Arc<Mutex<BufReader<TcpStream>>>,
}

impl TcpArmTransport {
    pub fn connect(addr: &str, timeout: Duration) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(TcpArmTransport {
            stream: Arc::new(Mutex::new(BufReader::new(stream))),
        })
    }

    fn roundtrip(stream: &Mutex<BufReader<TcpStream>>, request: serde_json::Value) -> std::io::Result<serde_json::Value> {
        let mut guard = stream.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let line = format!("{request}\n");
        guard.get_mut().write_all(line.as_bytes())?;
        let mut response = String::new();
        guard.read_line(&mut response)?;
        serde_json::from_str(response.trim())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[async_trait]
impl ArmTransport for TcpArmTransport {
    async fn move_to(&self, pos: ArmPosition, wait: bool) -> std::io::Result<i32> {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let request = serde_json::json!({
                "cmd": "move",
                "x": pos.x,
                "y": pos.y,
                "z": pos.z,
                "roll": pos.roll,
                "pitch": pos.pitch,
                "yaw": pos.yaw,
                "speed": pos.speed,
                "acc": pos.acc,
                "wait": wait,
            });
            let response = Self::roundtrip(&stream, request)?;
            response
                .get("code")
                .and_then(serde_json::Value::as_i64)
                .map(|c| c as i32)
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "arm response missing 'code'"))
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?
    }

    async fn emergency_stop(&self) -> std::io::Result<()> {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            Self::roundtrip(&stream, serde_json::json!({ "cmd": "estop" })).map(|_| ())
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?
    }
}
