//! Command queue and recurring-command generator.
//!
//! A single FIFO of immediate commands, plus a stateless generator
//! that reads the recurring parameter set for a broadcast phase out of
//! a config snapshot. The broadcast engine owns when these two get
//! merged and executed.

use std::collections::VecDeque;
use std::time::Instant;

use rbc_config::RootConfig;
use rbc_protocol::{Command, PhaseTag};

/// FIFO of externally injected immediate commands.
///
/// `push_immediate` enqueues at the tail and `drain_immediates` drains
/// from the head, so commands pushed in order c1, c2 are returned in
/// the same order c1, c2. Concurrent pushes while a broadcast is
/// mid-cycle simply accumulate here; the broadcast engine drains the
/// whole queue at the start of the next `run()`.
#[derive(Default)]
pub struct CommandQueue {
    pending: VecDeque<(Command, Instant)>,
}

impl CommandQueue {
    pub fn new() -> Self {
        CommandQueue::default()
    }

    pub fn push_immediate(&mut self, cmd: Command) {
        self.pending.push_back((cmd, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Empty the queue, returning its commands in drain order.
    pub fn drain_immediates(&mut self) -> Vec<Command> {
        self.pending.drain(..).map(|(cmd, _)| cmd).collect()
    }

    /// How long the oldest still-queued immediate has been waiting.
    pub fn oldest_wait(&self) -> Option<std::time::Duration> {
        self.pending.front().map(|(_, arrived)| arrived.elapsed())
    }
}

/// Generate `Recurring` commands for every parameter in `phase_tag`'s
/// descriptor set whose `recurring` flag is set, in parameter-map
/// iteration order. `config` is a read snapshot taken at
/// broadcast-cycle start; this function does not mutate it.
pub fn drain_recurring(phase_tag: PhaseTag, config: &RootConfig) -> Vec<Command> {
    config
        .params_for_tag(phase_tag.tag_name())
        .iter()
        .filter(|(_, param)| param.recurring)
        .map(|(name, param)| Command::recurring(name.clone(), param.value.clone(), phase_tag))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbc_protocol::ParamValue;

    fn sample_config() -> RootConfig {
        RootConfig::from_str(
            r#"
evolver_ip: "192.168.1.2"
experimental_params:
  stir:
    name: stir
    value: ["8", "8"]
    recurring: true
    fields_expected_outgoing: 17
    fields_expected_incoming: 2
  temp:
    name: temp
    value: ["30"]
    recurring: false
    fields_expected_outgoing: 2
    fields_expected_incoming: 2
broadcast_tags:
  pre_reading:
    stir:
      name: stir
      value: ["0", "0"]
      recurring: true
      fields_expected_outgoing: 17
      fields_expected_incoming: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn push_immediate_drains_in_arrival_order() {
        let mut q = CommandQueue::new();
        q.push_immediate(Command::immediate("a", ParamValue::Scalar("1".into())));
        q.push_immediate(Command::immediate("b", ParamValue::Scalar("2".into())));
        q.push_immediate(Command::immediate("c", ParamValue::Scalar("3".into())));

        let drained = q.drain_immediates();
        assert_eq!(
            drained.iter().map(|c| c.param.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn drain_leaves_queue_empty() {
        let mut q = CommandQueue::new();
        q.push_immediate(Command::immediate("a", ParamValue::Scalar("1".into())));
        assert_eq!(q.len(), 1);
        q.drain_immediates();
        assert!(q.is_empty());
    }

    #[test]
    fn drain_recurring_only_includes_recurring_params() {
        let config = sample_config();
        let cmds = drain_recurring(PhaseTag::Data, &config);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].param, "stir");
    }

    #[test]
    fn drain_recurring_uses_tag_bundle_override() {
        let config = sample_config();
        let cmds = drain_recurring(PhaseTag::PreReading, &config);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].value, ParamValue::Vector(vec!["0".into(), "0".into()]));
    }
}
