use std::collections::BTreeMap;

/// `{pump_id -> steps}`, as handed to the G-code builder for one
/// fluidic event.
pub type PumpInstruction = BTreeMap<String, u32>;

/// Decompose a requested step count into full-stroke events bounded by
/// `max_steps`, plus one trailing fractional event.
///
/// For `max_steps = M` and requested `S`, returns `⌊S/M⌋` entries
/// equal to `M` followed by one entry
/// equal to `S mod M`. The fractional entry is omitted only when `S`
/// is an exact multiple of `M` and nonzero, so that a fully-consumed
/// budget doesn't emit a trailing zero-step no-op event; a request of
/// `S == 0` returns a single `[0]` event so the pump can still
/// participate (as a no-op) in a shared window.
pub fn decompose_steps(requested: u32, max_steps: u32) -> Vec<u32> {
    if max_steps == 0 {
        return vec![requested];
    }
    if requested == 0 {
        return vec![0];
    }
    let full = requested / max_steps;
    let remainder = requested % max_steps;
    let mut events = vec![max_steps; full as usize];
    if remainder > 0 {
        events.push(remainder);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_into_full_strokes_plus_fraction() {
        assert_eq!(decompose_steps(250, 500), vec![250]);
        assert_eq!(decompose_steps(1250, 500), vec![500, 500, 250]);
        assert_eq!(decompose_steps(1000, 500), vec![500, 500]);
    }

    #[test]
    fn sum_of_events_equals_requested() {
        for (requested, max) in [(1250u32, 500u32), (999, 100), (1, 1), (501, 500)] {
            let events = decompose_steps(requested, max);
            assert_eq!(events.iter().sum::<u32>(), requested);
        }
    }

    #[test]
    fn zero_request_emits_single_noop_event() {
        assert_eq!(decompose_steps(0, 500), vec![0]);
    }

    #[test]
    fn zero_max_steps_passes_through() {
        assert_eq!(decompose_steps(42, 0), vec![42]);
    }
}
