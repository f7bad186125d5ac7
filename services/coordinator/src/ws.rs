//! The two WS routes of the client-facing event surface:
//! `/ws/dpu-evolver` for broadcast/config/calibration/device-name
//! traffic, `/ws/robotics` for fluidic routine triggers and the
//! status/pump-conf surface. Both share one connection loop, grounded
//! in `ws_forwarder.rs`'s `tokio::select!` over socket receive,
//! a heartbeat interval, and a side-channel feed of outbound pushes —
//! here the side channel is the broadcast/status feed rather than an
//! `mpsc` of operator commands.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use rbc_protocol::{Command, RoboticsMode};
use tracing::{info, warn};

use crate::events::{EgressEvent, IngressEvent, NamedType, SetCalibrationAck};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECV_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    DpuEvolver,
    Robotics,
}

pub async fn dpu_evolver_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Namespace::DpuEvolver))
}

pub async fn robotics_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Namespace::Robotics))
}

async fn send_event(socket: &mut WebSocket, event: &EgressEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to serialize egress event");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, namespace: Namespace) {
    let namespace_label = match namespace {
        Namespace::DpuEvolver => "dpu-evolver",
        Namespace::Robotics => "robotics",
    };
    info!(namespace = namespace_label, "client connected");

    let mut broadcast_rx = (namespace == Namespace::DpuEvolver).then(|| state.broadcast_feed());
    let mut status_rx = (namespace == Namespace::Robotics).then(|| state.status_feed());
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            msg = tokio::time::timeout(RECV_TIMEOUT, socket.recv()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        match serde_json::from_str::<IngressEvent>(&text) {
                            Ok(event) => {
                                if let Some(reply) = dispatch(&state, event).await {
                                    if !send_event(&mut socket, &reply).await {
                                        break;
                                    }
                                }
                            }
                            Err(e) => warn!(error = %e, "unrecognized client event"),
                        }
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                        info!("client disconnected");
                        break;
                    }
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "WS transport error");
                        break;
                    }
                    Err(_) => {
                        warn!("client idle past timeout");
                        break;
                    }
                    Ok(Some(Ok(_))) => {}
                }
            }
            Some(Ok(msg)) = recv_optional(&mut broadcast_rx) => {
                if !send_event(&mut socket, &EgressEvent::Broadcast(msg)).await {
                    break;
                }
            }
            Some(Ok(status)) = recv_optional(&mut status_rx) => {
                if !send_event(&mut socket, &EgressEvent::ActiveRoboticsStatus(status)).await {
                    break;
                }
            }
            _ = heartbeat.tick() => {}
        }
    }
}

/// Lets the `select!` arm above stay inert when this connection has no
/// subscription of this kind, instead of needing a third branch
/// variant per namespace.
async fn recv_optional<T: Clone>(
    rx: &mut Option<tokio::sync::broadcast::Receiver<T>>,
) -> Option<Result<T, tokio::sync::broadcast::error::RecvError>> {
    match rx {
        Some(rx) => Some(rx.recv().await),
        None => std::future::pending().await,
    }
}

async fn dispatch(state: &AppState, event: IngressEvent) -> Option<EgressEvent> {
    match event {
        IngressEvent::Command(payload) => {
            handle_command(state, payload).await;
            None
        }
        IngressEvent::Getconfig => {
            read_root_config(state).await.map(|c| EgressEvent::Config(Box::new(c)))
        }
        IngressEvent::Getcalibrationnames => {
            let store = state.calibrations.read().await;
            Some(EgressEvent::Calibrationnames(
                store.names().into_iter().map(NamedType::from).collect(),
            ))
        }
        IngressEvent::Getfitnames => {
            let store = state.calibrations.read().await;
            Some(EgressEvent::Fitnames(
                store.fit_names().into_iter().map(NamedType::from).collect(),
            ))
        }
        IngressEvent::Getcalibration(payload) => {
            let store = state.calibrations.read().await;
            Some(EgressEvent::Calibration(store.get(&payload.name).cloned()))
        }
        IngressEvent::Setrawcalibration(payload) => {
            let ack = {
                let mut store = state.calibrations.write().await;
                store.set_raw(rbc_config::CalibrationRecord {
                    name: payload.name.clone(),
                    calibration_type: payload.calibration_type,
                    raw: payload.raw,
                    fits: Vec::new(),
                });
                save_calibrations(state, &store).await
            };
            Some(EgressEvent::Calibrationrawcallback(SetCalibrationAck {
                name: payload.name,
                ok: ack.is_ok(),
                error: ack.err(),
            }))
        }
        IngressEvent::Setfitcalibration(payload) => {
            let ack = {
                let mut store = state.calibrations.write().await;
                let result = store
                    .set_fit(&payload.calibration_name, payload.fit.clone())
                    .map_err(|e| e.to_string());
                match result {
                    Ok(()) => save_calibrations(state, &store).await,
                    Err(e) => Err(e),
                }
            };
            Some(EgressEvent::Calibrationrawcallback(SetCalibrationAck {
                name: payload.fit.name,
                ok: ack.is_ok(),
                error: ack.err(),
            }))
        }
        IngressEvent::Setactivecal(payload) => {
            let mut store = state.calibrations.write().await;
            let active = store.set_active(&payload.fit_names);
            let _ = save_calibrations(state, &store).await;
            Some(EgressEvent::Activecalibrations(active))
        }
        IngressEvent::Getactivecal => {
            let store = state.calibrations.read().await;
            Some(EgressEvent::Activecalibrations(store.active()))
        }
        IngressEvent::Getdevicename => {
            rbc_config::device_name::load(&state.paths.device_name)
                .ok()
                .map(EgressEvent::Broadcastname)
        }
        IngressEvent::Setdevicename(payload) => {
            let _ = rbc_config::device_name::save(&state.paths.device_name, &payload.value);
            Some(EgressEvent::Broadcastname(payload.value))
        }
        IngressEvent::FillTubingRoutine => {
            let _ = state.fluidics.fill_tubing("fill_tubing_routine").await;
            status_reply(state).await
        }
        IngressEvent::PrimeInfluxRoutine => {
            let _ = state.fluidics.prime_influx("prime_influx_routine").await;
            status_reply(state).await
        }
        IngressEvent::PrimeEffluxRoutine(payload) => {
            let _ = state
                .fluidics
                .prime_efflux("prime_efflux_routine", &payload.quads)
                .await;
            status_reply(state).await
        }
        IngressEvent::InfluxRoutine(payload) => {
            let mode = match payload.mode.as_str() {
                "dilution" => RoboticsMode::Dilution,
                "vial_setup" => RoboticsMode::VialSetup,
                _ => RoboticsMode::Influx,
            };
            let _ = state
                .fluidics
                .run_snake(
                    "influx_routine",
                    mode,
                    &payload.quads,
                    &payload.requests,
                    payload.uniform,
                    payload.wash,
                )
                .await;
            status_reply(state).await
        }
        IngressEvent::RequestRoboticsStatus => status_reply(state).await,
        IngressEvent::RequestPumpConf => read_robotics_config(state)
            .await
            .map(|c| EgressEvent::ActivePumpConf(Box::new(c))),
        IngressEvent::OverrideRoboticsStatus => {
            let _ = state.status.override_status().await;
            status_reply(state).await
        }
        IngressEvent::StopRobotics => {
            state.fluidics.stop_robotics().await;
            status_reply(state).await
        }
        IngressEvent::ReconnectRobotics => status_reply(state).await,
        IngressEvent::PauseRobotics => {
            let _ = state.status.set_mode(RoboticsMode::Pause).await;
            status_reply(state).await
        }
        IngressEvent::ResumeRobotics => {
            let _ = state.status.set_mode(RoboticsMode::Idle).await;
            status_reply(state).await
        }
    }
}

async fn status_reply(state: &AppState) -> Option<EgressEvent> {
    state.status_snapshot().await.ok().map(EgressEvent::ActiveRoboticsStatus)
}

/// Handles the `command` event: merges the update into the persisted
/// parameter descriptor, rewrites `conf.yml`, and — when `immediate`
/// is set — pushes the param's now-current value onto the broadcast
/// engine's immediate queue so it jumps ahead of the next phase's
/// recurring commands, grounded in `evolver_server.py`'s `on_command`,
/// which enqueues onto `command_queue` and runs it inline whenever no
/// broadcast is live.
async fn handle_command(state: &AppState, payload: crate::events::CommandPayload) {
    let Ok(mut config) = read_root_config(state).await else {
        return;
    };
    let param = payload.param.clone();
    let immediate = payload.immediate.unwrap_or(false);
    if config
        .apply_command(
            &param,
            payload.value,
            payload.recurring,
            payload.fields_expected_outgoing,
            payload.fields_expected_incoming,
        )
        .is_ok()
    {
        let current_value = config.experimental_params.get(&param).map(|p| p.value.clone());
        if config.save(&state.paths.root_config).is_ok() {
            state.reload_root_config(config).await;
        }
        if immediate {
            if let Some(value) = current_value {
                state.broadcast.push_immediate(Command::immediate(param, value)).await;
            }
        }
    }
}

async fn read_root_config(state: &AppState) -> Result<rbc_config::RootConfig, rbc_config::ConfigError> {
    rbc_config::RootConfig::load(&state.paths.root_config)
}

async fn read_robotics_config(state: &AppState) -> Option<rbc_config::RoboticsConfig> {
    rbc_config::RoboticsConfig::load(&state.paths.robotics_config).ok()
}

async fn save_calibrations(state: &AppState, store: &rbc_config::CalibrationStore) -> Result<(), String> {
    store.save(&state.paths.calibrations).map_err(|e| e.to_string())
}
