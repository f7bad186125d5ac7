use std::collections::BTreeMap;

use rbc_config::{PumpConfig, RoboticsConfig};
use rbc_protocol::PumpInstruction;

use crate::error::GcodeError;

/// Dwell inserted between the valve-open move and the plunger stroke.
const DWELL_PRE_MS: u32 = 100;
/// Dwell inserted between the plunger stroke and the valve-close move.
const DWELL_POST_MS: u32 = 150;

fn aspirate_block(pump: &PumpConfig, steps: u32) -> String {
    if steps == 0 {
        return "; pump skipped this event\nM18\n".to_owned();
    }
    format!(
        "G91\nG1 {axis}{steps} F{speed}\nM18\n",
        axis = pump.plunger_axis,
        speed = pump.plunger_speed_in,
    )
}

/// Unprimed: open valve, plunger out by `steps`, close valve.
/// Primed: the out-stroke is extended by `priming_steps`, and a
/// compensating in-stroke of `priming_steps` follows it so the syringe
/// is left pre-loaded for the next aspirate.
///
/// `steps == 0` is a no-op: the valve move amplitude drops to zero
/// rather than `valve_steps`, so a skipped pump still emits a block
/// (keeping per-pump accounting in its own `Vec`, never a shared
/// accumulator) without actuating hardware.
fn dispense_block(pump: &PumpConfig, steps: u32, primed: bool) -> String {
    let valve_amount = if steps == 0 { 0 } else { pump.valve_steps };
    let mut out = String::new();
    out.push_str("G91\n");
    out.push_str(&format!(
        "G1 {valve}{valve_amount} F{speed}\n",
        valve = pump.valve_axis,
        speed = pump.plunger_speed_out
    ));
    out.push_str(&format!("G4 P{DWELL_PRE_MS}\n"));
    if steps == 0 {
        out.push_str("; pump skipped this event\n");
    } else if primed {
        let total = steps + pump.priming_steps;
        out.push_str(&format!(
            "G1 {axis}-{total} F{speed}\n",
            axis = pump.plunger_axis,
            speed = pump.plunger_speed_out
        ));
        out.push_str(&format!("G4 P{DWELL_PRE_MS}\n"));
        out.push_str(&format!(
            "G1 {axis}{priming} F{speed}\n",
            axis = pump.plunger_axis,
            priming = pump.priming_steps,
            speed = pump.plunger_speed_in
        ));
    } else {
        out.push_str(&format!(
            "G1 {axis}-{steps} F{speed}\n",
            axis = pump.plunger_axis,
            speed = pump.plunger_speed_out
        ));
    }
    out.push_str(&format!("G4 P{DWELL_POST_MS}\n"));
    out.push_str(&format!(
        "G1 {valve}-{valve_amount} F{speed}\n",
        valve = pump.valve_axis,
        speed = pump.plunger_speed_out
    ));
    out.push_str("M18\n");
    out
}

fn prime_block(pump: &PumpConfig) -> String {
    format!(
        "G91\nG1 {valve}{vsteps} F{speed}\nG4 P{DWELL_PRE_MS}\nG1 {axis}{priming} F{speed_in}\nG4 P{DWELL_POST_MS}\nG1 {valve}-{vsteps} F{speed}\nM18\n",
        valve = pump.valve_axis,
        vsteps = pump.valve_steps,
        speed = pump.plunger_speed_out,
        axis = pump.plunger_axis,
        priming = pump.priming_steps,
        speed_in = pump.plunger_speed_in,
    )
}

/// Group per-pump blocks by print-server index. Each pump's block is
/// pushed onto that server's own `Vec`, so a zero-step pump on a
/// shared board can never overwrite a sibling pump's valve command.
fn group_by_print_server(
    instructions: &PumpInstruction,
    config: &RoboticsConfig,
    block: impl Fn(&PumpConfig, u32) -> String,
) -> Result<BTreeMap<usize, String>, GcodeError> {
    let mut segments: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (pump_id, &steps) in instructions {
        let pump = config
            .pumps
            .get(pump_id)
            .ok_or_else(|| GcodeError::UnknownPump(pump_id.clone()))?;
        segments
            .entry(pump.print_server_index)
            .or_default()
            .push(block(pump, steps));
    }
    Ok(segments
        .into_iter()
        .map(|(index, blocks)| (index, blocks.join("\n")))
        .collect())
}

/// Build the `aspirate.gcode` program for each print-server touched by
/// `instructions`.
pub fn build_aspirate(
    instructions: &PumpInstruction,
    config: &RoboticsConfig,
) -> Result<BTreeMap<usize, String>, GcodeError> {
    group_by_print_server(instructions, config, aspirate_block)
}

/// Build the `dispense.gcode` program for each print-server touched by
/// `instructions`. `primed` selects the priming-compensated out-stroke
/// shape.
pub fn build_dispense(
    instructions: &PumpInstruction,
    config: &RoboticsConfig,
    primed: bool,
) -> Result<BTreeMap<usize, String>, GcodeError> {
    group_by_print_server(instructions, config, move |pump, steps| {
        dispense_block(pump, steps, primed)
    })
}

/// Build `prime_pumps.gcode` for every configured pump, unconditionally
/// drawing in `priming_steps`.
pub fn build_prime_pumps(config: &RoboticsConfig) -> BTreeMap<usize, String> {
    let mut segments: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for pump in config.pumps.values() {
        segments
            .entry(pump.print_server_index)
            .or_default()
            .push(prime_block(pump));
    }
    segments
        .into_iter()
        .map(|(index, blocks)| (index, blocks.join("\n")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn config_with_two_pumps_on_one_board() -> RoboticsConfig {
        let yaml = r#"
arm_ip: "192.168.1.50"
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
  pump_b:
    print_server_index: 0
    plunger_axis: "Z"
    valve_axis: "E"
    valve_steps: 80
    max_steps: 500
    plunger_speed_in: 15000
    plunger_speed_out: 15000
    priming_steps: 50
print_servers:
  - index: 0
    base_url: "http://192.168.1.15:5000"
    api_key: "abc123"
    gcode_folder: "/gcode/0"
quads: {}
"#;
        RoboticsConfig::from_str(yaml).unwrap()
    }

    #[test]
    fn aspirate_emits_plunger_move_with_requested_steps() {
        let config = config_with_two_pumps_on_one_board();
        let mut instructions: PumpInstruction = Map::new();
        instructions.insert("pump_a".into(), 250);
        let programs = build_aspirate(&instructions, &config).unwrap();
        assert_eq!(programs.len(), 1);
        assert!(programs[&0].contains("G1 X250 F15000"));
    }

    #[test]
    fn unprimed_dispense_moves_plunger_negative_by_exact_steps() {
        let config = config_with_two_pumps_on_one_board();
        let mut instructions: PumpInstruction = Map::new();
        instructions.insert("pump_a".into(), 250);
        let programs = build_dispense(&instructions, &config, false).unwrap();
        assert!(programs[&0].contains("G1 X-250 F15000"));
        assert!(!programs[&0].contains("G1 X50"));
    }

    #[test]
    fn primed_dispense_extends_outstroke_and_adds_compensating_instroke() {
        let config = config_with_two_pumps_on_one_board();
        let mut instructions: PumpInstruction = Map::new();
        instructions.insert("pump_a".into(), 250);
        let programs = build_dispense(&instructions, &config, true).unwrap();
        let text = &programs[&0];
        assert!(text.contains("G1 X-300 F15000"));
        assert!(text.contains("G1 X50 F15000"));
    }

    #[test]
    fn zero_step_pump_drops_valve_amplitude_without_clobbering_sibling() {
        let config = config_with_two_pumps_on_one_board();
        let mut instructions: PumpInstruction = Map::new();
        instructions.insert("pump_a".into(), 0);
        instructions.insert("pump_b".into(), 300);
        let programs = build_dispense(&instructions, &config, false).unwrap();
        let text = &programs[&0];
        // pump_a (skipped) contributes a zero-amplitude valve move...
        assert!(text.contains("G1 Y0 F15000"));
        // ...but pump_b's real valve actuation on its own axis survives.
        assert!(text.contains("G1 E80 F15000"));
        assert!(text.contains("G1 Z-300 F15000"));
    }

    #[test]
    fn unknown_pump_id_is_rejected() {
        let config = config_with_two_pumps_on_one_board();
        let mut instructions: PumpInstruction = Map::new();
        instructions.insert("ghost_pump".into(), 10);
        let err = build_aspirate(&instructions, &config).unwrap_err();
        assert!(matches!(err, GcodeError::UnknownPump(_)));
    }

    #[test]
    fn prime_pumps_covers_every_configured_pump() {
        let config = config_with_two_pumps_on_one_board();
        let programs = build_prime_pumps(&config);
        assert_eq!(programs.len(), 1);
        assert!(programs[&0].contains("G1 X50 F15000"));
        assert!(programs[&0].contains("G1 Z50 F15000"));
    }
}
