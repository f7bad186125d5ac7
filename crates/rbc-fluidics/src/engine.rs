use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use rbc_arm::{ArmDriver, ArmError, ArmTransport};
use rbc_config::RoboticsConfig;
use rbc_protocol::{Command, ParamValue, PumpInstruction, RoboticsMode};
use rbc_pump_client::PumpClient;
use rbc_status::StatusHandle;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{FluidicEventError, HelperEventError};
use crate::grid::{self, WindowPlan};
use crate::immediate::ImmediateSink;
use crate::result::{RoutineDone, RoutineResult};
use crate::steps::PumpStepQueues;
use crate::transform::QuadTransform;

/// Fixed aspirate/dispense step count used by `fill_tubing`.
const FILL_TUBING_STEPS: u32 = 350;
/// Length of the efflux command vector sent to the microcontroller.
const EFFLUX_SLOTS: usize = 48;
const EFFLUX_PARAM: &str = "efflux_pump";
const POLL_PAUSE: Duration = Duration::from_millis(100);
const POLL_STATUS: Duration = Duration::from_secs(1);

/// Drives the snake-path dispense/prime routines: the atomic
/// two-phase fluidic event, the per-quad snake walk, and the
/// prime/fill/emergency-stop helpers built on top of it.
pub struct FluidicsEngine<T: ArmTransport + 'static> {
    arm: Arc<ArmDriver<T>>,
    status: StatusHandle,
    config: RwLock<RoboticsConfig>,
    pump_clients: BTreeMap<usize, PumpClient>,
    immediate_sink: Arc<dyn ImmediateSink>,
}

impl<T: ArmTransport + 'static> FluidicsEngine<T> {
    pub fn new(
        arm: ArmDriver<T>,
        status: StatusHandle,
        config: RoboticsConfig,
        immediate_sink: Arc<dyn ImmediateSink>,
    ) -> Self {
        let pump_clients = config
            .print_servers
            .iter()
            .map(|server| {
                (
                    server.index,
                    PumpClient::new(server, config.post_gcode_timeout_attempts),
                )
            })
            .collect();
        FluidicsEngine {
            arm: Arc::new(arm),
            status,
            config: RwLock::new(config),
            pump_clients,
            immediate_sink,
        }
    }

    pub async fn reload_config(&self, config: RoboticsConfig) {
        *self.config.write().await = config;
    }

    /// Block with 100 ms polling while `mode == Pause`; unwind the
    /// enclosing routine the moment `mode` becomes `EmergencyStop`.
    async fn check_pause(&self) -> Result<(), FluidicEventError> {
        loop {
            let snapshot = self.status.snapshot().await?;
            match snapshot.mode {
                RoboticsMode::EmergencyStop => return Err(FluidicEventError::EmergencyStop),
                RoboticsMode::Pause => tokio::time::sleep(POLL_PAUSE).await,
                _ => return Ok(()),
            }
        }
    }

    async fn post_all(&self, programs: &BTreeMap<usize, PathBuf>) -> Result<(), FluidicEventError> {
        let uploads = programs.iter().map(|(index, path)| {
            let client = &self.pump_clients[index];
            async move { client.post_gcode(path).await }
        });
        futures_util::future::try_join_all(uploads).await?;
        Ok(())
    }

    async fn wait_until_done(&self, programs: &BTreeMap<usize, PathBuf>) -> Result<(), FluidicEventError> {
        let timeout_secs = self.config.read().await.check_status_timeout_secs;
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            let mut all_done = true;
            for (index, path) in programs {
                let status = self.pump_clients[index].status().await?;
                if !PumpClient::is_done(&status, path) {
                    all_done = false;
                }
            }
            if all_done {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FluidicEventError::CheckStatusTimeout { timeout_secs });
            }
            tokio::time::sleep(POLL_STATUS).await;
        }
    }

    /// The atomic two-phase aspirate/dispense operation. `arm_move`,
    /// when present, runs alongside the aspirate upload and must
    /// complete before the dispense phase starts.
    async fn fluidic_event(
        &self,
        mode: RoboticsMode,
        aspirate: &BTreeMap<usize, PathBuf>,
        dispense: &BTreeMap<usize, PathBuf>,
        arm_move: Option<BoxFuture<'_, Result<(), ArmError>>>,
    ) -> Result<(), FluidicEventError> {
        self.check_pause().await?;
        self.status.set_mode(mode).await?;
        match arm_move {
            Some(arm_move) => {
                let (upload, arm) = tokio::join!(self.post_all(aspirate), arm_move);
                upload?;
                arm?;
            }
            None => self.post_all(aspirate).await?,
        }
        self.wait_until_done(aspirate).await?;

        self.check_pause().await?;
        self.status.set_mode(mode).await?;
        self.post_all(dispense).await?;
        self.wait_until_done(dispense).await?;
        Ok(())
    }

    /// Three-segment move: lift above the current window, translate at
    /// the "out" plane to the target, then submerge into the target.
    async fn arm_path(
        &self,
        current_out: (f64, f64, f64),
        target_out: (f64, f64, f64),
        target_in: (f64, f64, f64),
        wash_dry_delay: Option<Duration>,
    ) -> Result<(), ArmError> {
        self.arm.move_arm(current_out, true).await?;
        if let Some(delay) = wash_dry_delay {
            tokio::time::sleep(delay).await;
        }
        self.arm.move_arm(target_out, true).await?;
        self.arm.move_arm(target_in, true).await?;
        Ok(())
    }

    fn active_pump_names(requests: &PumpInstruction) -> Vec<String> {
        requests.keys().cloned().collect()
    }

    fn window_centre(row: usize, window: &WindowPlan) -> (f64, f64) {
        let xs: Vec<f64> = window
            .vial_cols
            .iter()
            .map(|&c| grid::vial_xy(row, c).0)
            .collect();
        let x = xs.iter().sum::<f64>() / xs.len() as f64;
        let y = grid::vial_xy(row, window.vial_cols[0]).1;
        (x, y)
    }

    fn vial_ids(row: usize, window: &WindowPlan) -> Vec<u32> {
        window.vial_cols.iter().map(|&c| grid::ROWS[row][c]).collect()
    }

    /// The snake-path influx/dilution/vial-setup routine. `uniform`
    /// selects the window-sliding strategy; `wash` requests a
    /// valve-only wash excursion before each window's first fluidic
    /// event.
    pub async fn run_snake(
        &self,
        routine_name: &str,
        mode: RoboticsMode,
        quads: &[String],
        requests: &PumpInstruction,
        uniform: bool,
        wash: bool,
    ) -> Result<RoutineResult, HelperEventError> {
        let start = Instant::now();
        let outcome = self.run_snake_inner(mode, quads, requests, uniform, wash).await;
        Ok(self.finish(routine_name, start, outcome).await)
    }

    async fn run_snake_inner(
        &self,
        mode: RoboticsMode,
        quads: &[String],
        requests: &PumpInstruction,
        uniform: bool,
        wash: bool,
    ) -> Result<(), FluidicEventError> {
        self.check_pause().await?;
        self.status.set_mode(mode).await?;

        let config = self.config.read().await.clone();
        let active_pumps = Self::active_pump_names(requests);

        for quad in quads {
            let homing = config
                .quads
                .get(quad)
                .ok_or_else(|| FluidicEventError::UnknownQuad(quad.clone()))?;
            let transform = QuadTransform::fit(homing);
            let mut queues = PumpStepQueues::new(requests, |pump| {
                config.pumps.get(pump).map(|p| p.max_steps).unwrap_or(0)
            });
            let mut current_out = transform.arm_out((0.0, grid::vial_xy(0, 0).1));

            for row in 0..grid::ROWS.len() {
                let row_pumps = grid::row_pumps(row, &active_pumps);
                let windows = grid::generate_windows(&row_pumps, grid::ROW_LEN, uniform);

                for window in &windows {
                    let centre = Self::window_centre(row, window);
                    let target_out = transform.arm_out(centre);
                    let target_in = transform.arm_in(centre);

                    self.status
                        .set_window(Some(quad.clone()), Self::vial_ids(row, window), window.pumps.clone())
                        .await?;

                    if wash {
                        self.wash_excursion(mode, &transform, current_out, target_out).await?;
                    }

                    let mut first_event = true;
                    while first_event || queues.window_active(&window.pumps) {
                        let event = queues.next_event(&window.pumps);
                        let aspirate_programs = rbc_gcode::build_aspirate(&event, &config)?;
                        let dispense_programs = rbc_gcode::build_dispense(&event, &config, true)?;
                        let aspirate_paths =
                            rbc_gcode::write_files(&aspirate_programs, &config, "aspirate.gcode")?;
                        let dispense_paths =
                            rbc_gcode::write_files(&dispense_programs, &config, "dispense.gcode")?;

                        let arm_move = first_event
                            .then(|| self.arm_path(current_out, target_out, target_in, None).boxed());
                        self.fluidic_event(mode, &aspirate_paths, &dispense_paths, arm_move)
                            .await?;
                        first_event = false;
                    }
                    current_out = target_out;
                }
                debug!(quad = %quad, row, "change_row");
            }

            self.arm.move_arm(current_out, true).await?;
            if mode == RoboticsMode::Dilution {
                if let Err(e) = self.send_efflux_pulse(quad).await {
                    warn!(quad = %quad, error = %e, "efflux pulse (first) failed");
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
                if let Err(e) = self.send_efflux_pulse(quad).await {
                    warn!(quad = %quad, error = %e, "efflux pulse (retransmit) failed");
                }
            }
        }
        Ok(())
    }

    /// Valve-only wash excursion: move from the current window to the
    /// wash station, perform a zero-step fluidic event, then move back
    /// to the (about to be serviced) target window.
    async fn wash_excursion(
        &self,
        mode: RoboticsMode,
        transform: &QuadTransform,
        current_out: (f64, f64, f64),
        back_to_out: (f64, f64, f64),
    ) -> Result<(), FluidicEventError> {
        let wash_out = (transform.wash_xyz_out.0, transform.wash_xyz_out.1, transform.wash_xyz_out.2);
        let wash_in = (transform.wash_xyz_in.0, transform.wash_xyz_in.1, transform.wash_xyz_in.2);
        let config = self.config.read().await.clone();
        let zero: PumpInstruction = config.pumps.keys().map(|p| (p.clone(), 0)).collect();
        let aspirate_programs = rbc_gcode::build_aspirate(&zero, &config)?;
        let dispense_programs = rbc_gcode::build_dispense(&zero, &config, false)?;
        let aspirate_paths = rbc_gcode::write_files(&aspirate_programs, &config, "aspirate.gcode")?;
        let dispense_paths = rbc_gcode::write_files(&dispense_programs, &config, "dispense.gcode")?;

        let wash_delay = Duration::from_millis(config.wash_dry_delay_ms);
        let to_wash = self.arm_path(current_out, wash_out, wash_in, Some(wash_delay)).boxed();
        self.fluidic_event(mode, &aspirate_paths, &dispense_paths, Some(to_wash)).await?;
        self.arm.move_arm(wash_out, true).await?;
        self.arm.move_arm(back_to_out, true).await?;
        Ok(())
    }

    async fn send_efflux_pulse(&self, quad: &str) -> Result<(), FluidicEventError> {
        let config = self.config.read().await;
        let Some(addr) = config.quad_efflux.get(quad).copied() else {
            return Ok(());
        };
        drop(config);
        let mut slots = vec!["NaN".to_owned(); EFFLUX_SLOTS];
        let idx = (addr.ipp_idx as usize).min(EFFLUX_SLOTS - 1);
        slots[idx] = format!("1|{}|{}|1", addr.ipp_num, addr.ipp_idx);
        self.immediate_sink
            .push_immediate(Command::immediate(EFFLUX_PARAM, ParamValue::Vector(slots)))
            .await;
        Ok(())
    }

    /// Fixed-step aspirate+dispense per pump with no arm move. Pre:
    /// `mode == Idle`.
    pub async fn fill_tubing(&self, routine_name: &str) -> Result<RoutineResult, HelperEventError> {
        let start = Instant::now();
        let outcome = self.fill_tubing_inner().await;
        Ok(self.finish(routine_name, start, outcome).await)
    }

    async fn fill_tubing_inner(&self) -> Result<(), FluidicEventError> {
        self.check_pause().await?;
        let config = self.config.read().await.clone();
        let steps: PumpInstruction = config
            .pumps
            .keys()
            .map(|p| (p.clone(), FILL_TUBING_STEPS))
            .collect();
        let aspirate_programs = rbc_gcode::build_aspirate(&steps, &config)?;
        let dispense_programs = rbc_gcode::build_dispense(&steps, &config, true)?;
        let aspirate_paths = rbc_gcode::write_files(&aspirate_programs, &config, "aspirate.gcode")?;
        let dispense_paths = rbc_gcode::write_files(&dispense_programs, &config, "dispense.gcode")?;
        self.fluidic_event(RoboticsMode::FillTubing, &aspirate_paths, &dispense_paths, None)
            .await
    }

    /// Upload `prime_pumps.gcode` to every print-server and wait for
    /// completion. Pre: `mode == Idle && !prime_status.influx`. Post:
    /// `prime_status.influx = true`. Calling this twice in a row is a
    /// no-op on the second call rather than re-priming the pumps.
    pub async fn prime_influx(&self, routine_name: &str) -> Result<RoutineResult, HelperEventError> {
        let start = Instant::now();
        let snapshot = match self.status.snapshot().await {
            Ok(s) => s,
            Err(e) => return Ok(self.finish(routine_name, start, Err(e.into())).await),
        };
        if snapshot.prime_status.influx {
            return Ok(RoutineResult {
                done: RoutineDone::Bool(false),
                routine: routine_name.to_owned(),
                robotics_status: snapshot,
                elapsed_time: start.elapsed().as_secs_f64(),
                message: "already primed".to_owned(),
            });
        }
        let outcome = self.prime_influx_inner().await;
        Ok(self.finish(routine_name, start, outcome).await)
    }

    async fn prime_influx_inner(&self) -> Result<(), FluidicEventError> {
        self.check_pause().await?;
        self.status.set_mode(RoboticsMode::Priming).await?;
        let config = self.config.read().await.clone();
        let programs = rbc_gcode::build_prime_pumps(&config);
        let paths = rbc_gcode::write_files(&programs, &config, "prime_pumps.gcode")?;
        self.post_all(&paths).await?;
        self.wait_until_done(&paths).await?;
        self.status.set_prime(Some(true), None).await?;
        self.status.set_mode(RoboticsMode::Idle).await?;
        Ok(())
    }

    /// Assembles the efflux command vector for the named quads and
    /// sends it through the microcontroller immediate queue. Sets
    /// `prime_status.efflux = true` on success.
    pub async fn prime_efflux(&self, routine_name: &str, quads: &[String]) -> Result<RoutineResult, HelperEventError> {
        let start = Instant::now();
        let outcome = self.prime_efflux_inner(quads).await;
        Ok(self.finish(routine_name, start, outcome).await)
    }

    async fn prime_efflux_inner(&self, quads: &[String]) -> Result<(), FluidicEventError> {
        for quad in quads {
            self.send_efflux_pulse(quad).await?;
        }
        self.status.set_prime(None, Some(true)).await?;
        Ok(())
    }

    /// Latch `EmergencyStop`, stop the arm, and disconnect every
    /// print-server. Best-effort — a sub-step failing does not stop
    /// the rest from running.
    pub async fn stop_robotics(&self) {
        let _ = self.status.set_mode(RoboticsMode::EmergencyStop).await;
        if let Err(e) = self.arm.emergency_stop().await {
            warn!(error = %e, "arm emergency_stop failed");
        }
        for client in self.pump_clients.values() {
            if let Err(e) = client.cancel().await {
                warn!(error = %e, "print-server cancel failed during stop_robotics");
            }
            if let Err(e) = client.disconnect().await {
                warn!(error = %e, "print-server disconnect failed during stop_robotics");
            }
        }
    }

    async fn finish(
        &self,
        routine_name: &str,
        start: Instant,
        outcome: Result<(), FluidicEventError>,
    ) -> RoutineResult {
        let elapsed_time = start.elapsed().as_secs_f64();
        match outcome {
            Ok(()) => RoutineResult {
                done: RoutineDone::Bool(true),
                routine: routine_name.to_owned(),
                robotics_status: self.status.snapshot().await.unwrap_or_default(),
                elapsed_time,
                message: "completed".to_owned(),
            },
            Err(e) => {
                self.stop_robotics().await;
                RoutineResult {
                    done: RoutineDone::Error("error".to_owned()),
                    routine: routine_name.to_owned(),
                    robotics_status: self.status.snapshot().await.unwrap_or_default(),
                    elapsed_time,
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbc_arm::{ArmDefaults, MockArmTransport};
    use rbc_status::RoboticsStatus as Status;

    struct NullSink;

    #[async_trait::async_trait]
    impl ImmediateSink for NullSink {
        async fn push_immediate(&self, _cmd: Command) {}
    }

    fn config() -> RoboticsConfig {
        let yaml = r#"
arm_ip: "192.168.1.50"
default_speed: 100.0
default_acc: 2000.0
pumps:
  pump_a:
    print_server_index: 0
    plunger_axis: "X"
    valve_axis: "Y"
    valve_steps: 100
    max_steps: 500
    plunger_speed_in: 15000
    plunger_speed_out: 15000
    priming_steps: 50
print_servers:
  - index: 0
    base_url: "http://127.0.0.1:9"
    api_key: "abc123"
    gcode_folder: "GCODE_DIR"
quads:
  quad_0:
    vial_0: { x_out: 0, x_in: 5, y: 36, z_out: 10, z_in: -5 }
    vial_17: { x_out: 90, x_in: 95, y: 0, z_out: 10, z_in: -5 }
    wash: { x_out: -10, x_in: -10, y: -10, z_out: 10, z_in: -5 }
"#;
        RoboticsConfig::from_str(yaml).unwrap()
    }

    fn engine(dir: &std::path::Path) -> FluidicsEngine<MockArmTransport> {
        let mut cfg = config();
        cfg.print_servers[0].gcode_folder = dir.display().to_string();
        cfg.pumps.get_mut("pump_a").unwrap().print_server_index = 0;

        let (status, _rx) = rbc_status::spawn(Status::default());
        let (arm, _estop_rx) = ArmDriver::new(
            MockArmTransport::new([0i32; 64]),
            status.clone(),
            ArmDefaults {
                roll: 180.0,
                pitch: 0.0,
                yaw: 0.0,
                speed: 100.0,
                acc: 2000.0,
            },
        );
        FluidicsEngine::new(arm, status, cfg, Arc::new(NullSink))
    }

    #[test]
    fn fill_tubing_builds_fixed_step_instructions() {
        let steps: PumpInstruction = [("pump_a".to_string(), FILL_TUBING_STEPS)].into();
        assert_eq!(steps["pump_a"], 350);
    }

    #[tokio::test]
    async fn stop_robotics_latches_emergency_stop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.stop_robotics().await;
        let snapshot = engine.status.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, RoboticsMode::EmergencyStop);
    }

    #[tokio::test]
    async fn prime_influx_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.status.set_prime(Some(true), None).await.unwrap();

        let result = engine.prime_influx("prime_influx").await.unwrap();
        assert!(matches!(result.done, RoutineDone::Bool(false)));
        assert_eq!(result.message, "already primed");
    }

    #[tokio::test]
    async fn window_centre_averages_vial_columns() {
        let window = WindowPlan {
            vial_cols: vec![0, 1],
            pumps: vec!["pump_a".to_string(), "pump_b".to_string()],
        };
        let (x, y) = FluidicsEngine::<MockArmTransport>::window_centre(0, &window);
        assert_eq!(x, 9.0);
        assert_eq!(y, 36.0);
    }
}
