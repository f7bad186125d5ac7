//! Loads configuration, opens the hardware transports, and wires the
//! serial, arm, fluidics, and status engines into one [`AppState`].

use std::sync::Arc;
use std::time::Duration;

use rbc_arm::{ArmDefaults, ArmDriver, TcpArmTransport};
use rbc_broadcast::BroadcastEngine;
use rbc_config::{CalibrationStore, RoboticsConfig, RootConfig};
use rbc_fluidics::FluidicsEngine;
use rbc_serial::SerialPortTransport;
use rbc_status::RoboticsStatus;
use thiserror::Error;
use tracing::info;

use crate::config_paths::ConfigPaths;
use crate::state::{AppState, BroadcastSink};

const ARM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ARM_PORT: u16 = 6000;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("loading config: {0}")]
    Config(#[from] rbc_config::ConfigError),
    #[error("opening serial port '{device}': {source}")]
    Serial {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connecting to arm at '{addr}': {source}")]
    Arm {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub async fn build_app_state(paths: ConfigPaths) -> Result<AppState, StartupError> {
    let root_config = RootConfig::load(&paths.root_config)?;
    let robotics_config = RoboticsConfig::load(&paths.robotics_config)?;
    let calibrations = CalibrationStore::load(&paths.calibrations)?;

    let serial = SerialPortTransport::open(
        &root_config.serial.device_path,
        root_config.serial.baud_rate,
        Duration::from_millis(root_config.serial.io_timeout_ms),
    )
    .map_err(|source| StartupError::Serial {
        device: root_config.serial.device_path.clone(),
        source,
    })?;
    let (broadcast_engine, _broadcast_rx) = BroadcastEngine::new(serial, root_config, "0.0.0.0");
    let broadcast_engine = Arc::new(broadcast_engine);

    let (status, status_changed) = rbc_status::spawn(RoboticsStatus::default());

    let arm_addr = format!("{}:{}", robotics_config.arm_ip, ARM_PORT);
    info!(addr = %arm_addr, "connecting to arm controller");
    let arm_transport =
        TcpArmTransport::connect(&arm_addr, ARM_CONNECT_TIMEOUT).map_err(|source| StartupError::Arm {
            addr: arm_addr,
            source,
        })?;
    let arm_defaults = ArmDefaults {
        roll: robotics_config.default_roll,
        pitch: robotics_config.default_pitch,
        yaw: robotics_config.default_yaw,
        speed: robotics_config.default_speed,
        acc: robotics_config.default_acc,
    };
    let (arm_driver, _arm_callbacks) = ArmDriver::new(arm_transport, status.clone(), arm_defaults);

    let sink = Arc::new(BroadcastSink(Arc::clone(&broadcast_engine)));
    let fluidics = Arc::new(FluidicsEngine::new(
        arm_driver,
        status.clone(),
        robotics_config,
        sink,
    ));

    let engine_for_loop = Arc::clone(&broadcast_engine);
    tokio::spawn(async move {
        engine_for_loop.run_forever().await;
    });

    Ok(AppState {
        broadcast: broadcast_engine,
        fluidics,
        status,
        status_changed: Arc::new(status_changed),
        calibrations: Arc::new(tokio::sync::RwLock::new(calibrations)),
        paths: Arc::new(paths),
    })
}
