//! Shared application state for the client event surface, grounded in
//! `services/server/src/state.rs`'s `#[derive(Clone)] AppState` wrapping
//! `Arc`-shared registries and a broadcast feed.

use std::sync::Arc;

use async_trait::async_trait;
use rbc_arm::TcpArmTransport;
use rbc_broadcast::BroadcastEngine;
use rbc_config::{CalibrationStore, RoboticsConfig, RootConfig};
use rbc_fluidics::{FluidicsEngine, ImmediateSink};
use rbc_protocol::{BroadcastMessage, Command, RoboticsStatus};
use rbc_serial::SerialPortTransport;
use rbc_status::StatusHandle;
use tokio::sync::{broadcast, RwLock};

use crate::config_paths::ConfigPaths;

/// Newtype bridging the foreign [`ImmediateSink`] trait onto the
/// foreign [`BroadcastEngine`] type — neither is local to this crate,
/// so a direct `impl ImmediateSink for Arc<BroadcastEngine<_>>` would
/// violate the orphan rule.
pub struct BroadcastSink(pub Arc<BroadcastEngine<SerialPortTransport>>);

#[async_trait]
impl ImmediateSink for BroadcastSink {
    async fn push_immediate(&self, cmd: Command) {
        self.0.push_immediate(cmd).await;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub broadcast: Arc<BroadcastEngine<SerialPortTransport>>,
    pub fluidics: Arc<FluidicsEngine<TcpArmTransport>>,
    pub status: StatusHandle,
    /// Kept only so `status_feed` can mint fresh subscriptions via
    /// `resubscribe`; `spawn` hands back a single receiver, not a sender.
    pub status_changed: Arc<broadcast::Receiver<RoboticsStatus>>,
    pub calibrations: Arc<RwLock<CalibrationStore>>,
    pub paths: Arc<ConfigPaths>,
}

impl AppState {
    pub fn broadcast_feed(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast.subscribe()
    }

    pub fn status_feed(&self) -> broadcast::Receiver<RoboticsStatus> {
        self.status_changed.resubscribe()
    }

    pub async fn status_snapshot(&self) -> Result<RoboticsStatus, rbc_status::StatusHandleError> {
        self.status.snapshot().await
    }

    pub async fn reload_root_config(&self, config: RootConfig) {
        self.broadcast.reload_config(config).await;
    }

    pub async fn reload_robotics_config(&self, config: RoboticsConfig) {
        self.fluidics.reload_config(config).await;
    }
}
