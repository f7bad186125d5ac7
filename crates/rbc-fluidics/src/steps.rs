//! Per-pump step decomposition queues.

use std::collections::{BTreeMap, VecDeque};

use rbc_protocol::{decompose_steps, PumpInstruction};

/// Holds one decomposed event queue per pump named in a requested
/// step map, consumed one event at a time as the snake path advances
/// through a window. A pump not named in the current window simply
/// isn't asked for an event.
#[derive(Debug, Clone, Default)]
pub struct PumpStepQueues {
    queues: BTreeMap<String, VecDeque<u32>>,
}

impl PumpStepQueues {
    pub fn new(requests: &PumpInstruction, max_steps: impl Fn(&str) -> u32) -> Self {
        let queues = requests
            .iter()
            .map(|(pump, &steps)| (pump.clone(), decompose_steps(steps, max_steps(pump)).into()))
            .collect();
        PumpStepQueues { queues }
    }

    /// Pop the next event for every pump named in `pumps`, substituting
    /// 0 for a pump with no queue or an already-exhausted one so it
    /// still participates as a no-op in a shared window.
    pub fn next_event(&mut self, pumps: &[String]) -> PumpInstruction {
        pumps
            .iter()
            .map(|pump| {
                let steps = self
                    .queues
                    .get_mut(pump)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(0);
                (pump.clone(), steps)
            })
            .collect()
    }

    /// Whether any pump in `pumps` still has a queued event (a window
    /// stays active until every one of its pumps' budgets is
    /// exhausted).
    pub fn window_active(&self, pumps: &[String]) -> bool {
        pumps
            .iter()
            .any(|pump| self.queues.get(pump).is_some_and(|q| !q.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requests() -> PumpInstruction {
        let mut r = PumpInstruction::new();
        r.insert("pump_a".into(), 750);
        r.insert("pump_b".into(), 0);
        r
    }

    #[test]
    fn pump_with_remainder_emits_full_stroke_then_fraction() {
        let pumps = vec!["pump_a".to_string(), "pump_b".to_string()];
        let mut queues = PumpStepQueues::new(&requests(), |_| 500);

        let first = queues.next_event(&pumps);
        assert_eq!(first["pump_a"], 500);
        assert_eq!(first["pump_b"], 0);
        assert!(queues.window_active(&pumps));

        let second = queues.next_event(&pumps);
        assert_eq!(second["pump_a"], 250);
        assert_eq!(second["pump_b"], 0);
        assert!(!queues.window_active(&pumps));
    }

    #[test]
    fn pump_absent_from_window_is_simply_not_asked() {
        let mut queues = PumpStepQueues::new(&requests(), |_| 500);
        let event = queues.next_event(&["pump_a".to_string()]);
        assert_eq!(event.len(), 1);
        assert_eq!(event["pump_a"], 500);
    }
}
