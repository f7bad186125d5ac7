use rbc_protocol::{RoboticsMode, RoboticsStatus};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::msg::{StatusError, StatusMsg};

/// Errors from talking to the status actor: either the actor itself
/// rejected the request, or (should never happen in a running process)
/// the actor task is gone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusHandleError {
    #[error(transparent)]
    Rejected(#[from] StatusError),
    #[error("status actor is not running")]
    ActorGone,
}

async fn ask<T>(
    tx: &mpsc::Sender<StatusMsg>,
    build: impl FnOnce(oneshot::Sender<T>) -> StatusMsg,
) -> Result<T, StatusHandleError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(build(reply_tx))
        .await
        .map_err(|_| StatusHandleError::ActorGone)?;
    reply_rx.await.map_err(|_| StatusHandleError::ActorGone)
}

/// Cheap `Clone` wrapper around an `mpsc::Sender<StatusMsg>`, exactly
/// as `AppState`'s `ForwarderCommandSenders` wrap channel senders in
/// the teacher.
#[derive(Clone)]
pub struct StatusHandle {
    tx: mpsc::Sender<StatusMsg>,
}

impl StatusHandle {
    pub(crate) fn new(tx: mpsc::Sender<StatusMsg>) -> Self {
        StatusHandle { tx }
    }

    pub async fn snapshot(&self) -> Result<RoboticsStatus, StatusHandleError> {
        ask(&self.tx, StatusMsg::Snapshot).await
    }

    pub async fn set_mode(&self, mode: RoboticsMode) -> Result<(), StatusHandleError> {
        ask(&self.tx, |reply| StatusMsg::SetMode(mode, reply)).await?
            .map_err(StatusHandleError::from)
    }

    pub async fn set_arm_state(
        &self,
        connected: Option<bool>,
        error_code: Option<i32>,
        warn_code: Option<i32>,
        state: Option<i32>,
    ) -> Result<(), StatusHandleError> {
        ask(&self.tx, |reply| StatusMsg::SetArmState {
            connected,
            error_code,
            warn_code,
            state,
            reply,
        })
        .await
    }

    pub async fn set_octo_connected(
        &self,
        name: impl Into<String>,
        connected: bool,
    ) -> Result<(), StatusHandleError> {
        let name = name.into();
        ask(&self.tx, |reply| {
            StatusMsg::SetOctoConnected(name, connected, reply)
        })
        .await
    }

    pub async fn set_prime(
        &self,
        influx: Option<bool>,
        efflux: Option<bool>,
    ) -> Result<(), StatusHandleError> {
        ask(&self.tx, |reply| StatusMsg::SetPrime {
            influx,
            efflux,
            reply,
        })
        .await
    }

    pub async fn set_window(
        &self,
        active_quad: Option<String>,
        vial_window: Vec<u32>,
        active_pumps: Vec<String>,
    ) -> Result<(), StatusHandleError> {
        ask(&self.tx, |reply| StatusMsg::SetWindow {
            active_quad,
            vial_window,
            active_pumps,
            reply,
        })
        .await
    }

    pub async fn override_status(&self) -> Result<(), StatusHandleError> {
        ask(&self.tx, StatusMsg::Override).await
    }
}
