use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The sentinel string that means "leave this vector slot unchanged"
/// in a partial update.
pub const NAN_SENTINEL: &str = "NaN";

/// A parameter's value: either a lone scalar field or a fixed-length
/// vector of per-vial fields. Values are kept as their wire-format
/// strings (the serial protocol is entirely CSV text); numeric
/// interpretation happens at the edges that need it (gcode builder,
/// calibration fits), not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(String),
    Vector(Vec<String>),
}

impl ParamValue {
    /// Apply an incoming update, preserving vector length and treating
    /// [`NAN_SENTINEL`] entries as "keep the previous value at this slot".
    ///
    /// Mirrors `evolver_server.py`'s `on_command` value-merge loop:
    /// a scalar update always replaces; a vector update only replaces
    /// non-NaN slots, in place, preserving the original length.
    pub fn apply_update(&mut self, update: ParamValue) {
        match (self, update) {
            (ParamValue::Vector(current), ParamValue::Vector(incoming)) => {
                for (slot, new_val) in current.iter_mut().zip(incoming.into_iter()) {
                    if new_val != NAN_SENTINEL {
                        *slot = new_val;
                    }
                }
            }
            (slot @ ParamValue::Scalar(_), update) => {
                *slot = update;
            }
            (slot @ ParamValue::Vector(_), update @ ParamValue::Scalar(_)) => {
                // A scalar value was sent for a vector-valued parameter:
                // replace wholesale, matching the Python fallback branch
                // (`evolver_conf[...]['value'] = value`) for non-list values.
                *slot = update;
            }
        }
    }

    pub fn as_fields(&self) -> Vec<String> {
        match self {
            ParamValue::Scalar(v) => vec![v.clone()],
            ParamValue::Vector(v) => v.clone(),
        }
    }

    pub fn field_count(&self) -> usize {
        match self {
            ParamValue::Scalar(_) => 1,
            ParamValue::Vector(v) => v.len(),
        }
    }
}

/// An experiment parameter descriptor, as stored under
/// `experimental_params` (or a `broadcast_tags` override bundle) in
/// `conf.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentParameter {
    pub name: String,
    pub value: ParamValue,
    pub recurring: bool,
    pub fields_expected_outgoing: usize,
    pub fields_expected_incoming: usize,
}

/// An outgoing broadcast event, emitted once per completed phase of a
/// broadcast cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// param -> returned fields, populated only in the Data phase.
    pub data: BTreeMap<String, Vec<String>>,
    /// The param descriptor set that was active for this phase.
    pub config: BTreeMap<String, ExperimentParameter>,
    pub ip: String,
    pub timestamp: f64,
    pub tag: Option<String>,
    /// True for non-data phases (pre/post reading) so clients can tell
    /// a broadcast without a data payload from an empty data broadcast.
    pub dummy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_sentinel_preserves_slot() {
        let mut v = ParamValue::Vector(vec!["a".into(), "b".into(), "c".into()]);
        v.apply_update(ParamValue::Vector(vec![
            NAN_SENTINEL.into(),
            "x".into(),
            NAN_SENTINEL.into(),
        ]));
        assert_eq!(
            v,
            ParamValue::Vector(vec!["a".into(), "x".into(), "c".into()])
        );
    }

    #[test]
    fn scalar_update_replaces() {
        let mut v = ParamValue::Scalar("1".into());
        v.apply_update(ParamValue::Scalar("2".into()));
        assert_eq!(v, ParamValue::Scalar("2".into()));
    }

    #[test]
    fn vector_preserves_length_across_partial_updates() {
        let mut v = ParamValue::Vector(vec!["1".into(), "2".into(), "3".into(), "4".into()]);
        v.apply_update(ParamValue::Vector(vec![NAN_SENTINEL.into(), "9".into()]));
        assert_eq!(v.field_count(), 4);
        assert_eq!(
            v,
            ParamValue::Vector(vec!["1".into(), "9".into(), "3".into(), "4".into()])
        );
    }
}
