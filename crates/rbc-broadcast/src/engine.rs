use std::collections::BTreeMap;
use std::time::Duration;

use rbc_config::RootConfig;
use rbc_protocol::{BroadcastMessage, Command, PhaseTag};
use rbc_scheduler::CommandQueue;
use rbc_serial::{SerialFramer, SerialTransport};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::Instant;
use tracing::warn;

use crate::state::BroadcastState;

const EVENTS_CAPACITY: usize = 64;
const WAIT_POLL: Duration = Duration::from_millis(200);

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Drives the serial framer and command queue through the
/// three-phase broadcast cycle, and arbitrates the exclusive serial
/// resource between broadcast phases and externally injected
/// immediates.
pub struct BroadcastEngine<T: SerialTransport + 'static> {
    framer: SerialFramer<T>,
    queue: Mutex<CommandQueue>,
    state: Mutex<BroadcastState>,
    config: RwLock<RootConfig>,
    events_tx: broadcast::Sender<BroadcastMessage>,
    ip: String,
    settle: Duration,
    period: Duration,
    last_cycle: Mutex<Instant>,
}

impl<T: SerialTransport + 'static> BroadcastEngine<T> {
    pub fn new(
        transport: T,
        config: RootConfig,
        ip: impl Into<String>,
    ) -> (Self, broadcast::Receiver<BroadcastMessage>) {
        let framer = SerialFramer::new(transport, &config.serial);
        let settle = Duration::from_secs(config.settle_delay_secs);
        let period = Duration::from_secs(config.broadcast_timing_secs);
        let (events_tx, events_rx) = broadcast::channel(EVENTS_CAPACITY);
        (
            BroadcastEngine {
                framer,
                queue: Mutex::new(CommandQueue::new()),
                state: Mutex::new(BroadcastState::Idle),
                config: RwLock::new(config),
                events_tx,
                ip: ip.into(),
                settle,
                period,
                last_cycle: Mutex::new(Instant::now() - period),
            },
            events_rx,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.events_tx.subscribe()
    }

    /// Replace the live config snapshot (a `reload_conf` event affects
    /// only the next broadcast cycle).
    pub async fn reload_config(&self, config: RootConfig) {
        *self.config.write().await = config;
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Enqueue an externally injected immediate command. If the
    /// serial port is idle, it runs right away; if a broadcast phase
    /// is in flight, it is buffered and drained at the start of the
    /// next phase's run.
    pub async fn push_immediate(&self, cmd: Command) {
        self.queue.lock().await.push_immediate(cmd);
        self.try_run_immediate().await;
    }

    async fn try_run_immediate(&self) {
        {
            let mut state = self.state.lock().await;
            if *state != BroadcastState::Idle {
                return;
            }
            *state = BroadcastState::RunningImmediate;
        }
        let pending = { self.queue.lock().await.drain_immediates() };
        for cmd in pending {
            if let Err(e) = self.execute(&cmd).await {
                warn!(param = %cmd.param, error = %e, "immediate command failed");
            }
        }
        *self.state.lock().await = BroadcastState::Idle;
    }

    async fn execute(&self, cmd: &Command) -> Result<Option<Vec<String>>, rbc_serial::SerialError> {
        let descriptor = {
            let config = self.config.read().await;
            config
                .params_for_tag(cmd.phase_tag.and_then(PhaseTag::tag_name))
                .get(&cmd.param)
                .cloned()
        };
        let Some(descriptor) = descriptor else {
            return Err(rbc_serial::SerialError::ShapeMismatch {
                param: cmd.param.clone(),
                detail: "no descriptor for this param in the active parameter set".to_owned(),
            });
        };
        let values = cmd.value.as_fields();
        self.framer
            .send(
                &cmd.param,
                &values,
                cmd.kind,
                descriptor.fields_expected_outgoing,
                descriptor.fields_expected_incoming,
            )
            .await
    }

    /// Run one phase of a broadcast cycle. Refuses (returns `false`)
    /// if an immediate dispatch is in flight; otherwise drains pending
    /// immediates, then the phase's recurring commands, in order.
    /// A serial error aborts the remainder of the recurring pass but
    /// not the phase's emitted message.
    pub async fn run_phase(&self, tag: PhaseTag) -> bool {
        {
            let mut state = self.state.lock().await;
            if *state == BroadcastState::RunningImmediate {
                return false;
            }
            *state = BroadcastState::RunningBroadcast;
        }

        let config_snapshot = self.config.read().await.clone();
        let is_data_phase = tag == PhaseTag::Data;
        let mut data = BTreeMap::new();

        let pending = { self.queue.lock().await.drain_immediates() };
        for cmd in pending {
            match self.execute(&cmd).await {
                Ok(Some(payload)) if is_data_phase => {
                    data.insert(cmd.param.clone(), payload);
                }
                Ok(_) => {}
                Err(e) => warn!(param = %cmd.param, error = %e, "immediate command failed mid-broadcast"),
            }
        }

        for cmd in rbc_scheduler::drain_recurring(tag, &config_snapshot) {
            match self.execute(&cmd).await {
                Ok(Some(payload)) if is_data_phase => {
                    data.insert(cmd.param.clone(), payload);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(param = %cmd.param, error = %e, "recurring command failed, aborting rest of phase");
                    break;
                }
            }
        }

        let message = BroadcastMessage {
            data,
            config: config_snapshot.params_for_tag(tag.tag_name()).clone(),
            ip: self.ip.clone(),
            timestamp: now_secs(),
            tag: tag.tag_name().map(str::to_owned),
            dummy: !is_data_phase,
        };
        let _ = self.events_tx.send(message);

        *self.state.lock().await = BroadcastState::Idle;
        true
    }

    /// One full pre -> settle -> data -> post cycle.
    pub async fn run_cycle(&self) {
        self.run_phase(PhaseTag::PreReading).await;
        tokio::time::sleep(self.settle).await;
        self.run_phase(PhaseTag::Data).await;
        self.run_phase(PhaseTag::PostReading).await;
    }

    /// Drive the periodic cycle forever: wait until either the period
    /// has elapsed or the queue is non-empty, then run a cycle.
    /// Intended to be spawned as its own task.
    pub async fn run_forever(&self) {
        loop {
            self.wait_until_due().await;
            self.run_cycle().await;
            *self.last_cycle.lock().await = Instant::now();
        }
    }

    async fn wait_until_due(&self) {
        loop {
            let elapsed = self.last_cycle.lock().await.elapsed();
            let queue_nonempty = !self.queue.lock().await.is_empty();
            if elapsed >= self.period || queue_nonempty {
                return;
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}
