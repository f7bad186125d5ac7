use std::collections::BTreeMap;
use std::path::PathBuf;

use rbc_config::RoboticsConfig;

use crate::error::GcodeError;

/// Write one program per print-server into its configured gcode
/// folder, named `filename` (e.g. `aspirate.gcode`, `dispense.gcode`,
/// `prime_pumps.gcode`). Returns the path written for each print-server
/// index, for the caller to hand to [`rbc_pump_client`]'s `post_gcode`.
pub fn write_files(
    programs: &BTreeMap<usize, String>,
    config: &RoboticsConfig,
    filename: &str,
) -> Result<BTreeMap<usize, PathBuf>, GcodeError> {
    let mut paths = BTreeMap::new();
    for (&server_index, text) in programs {
        let server = config
            .print_servers
            .get(server_index)
            .ok_or_else(|| GcodeError::UnknownPump(format!("print_server index {server_index}")))?;
        let path = std::path::Path::new(&server.gcode_folder).join(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GcodeError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(&path, text).map_err(|e| GcodeError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        paths.insert(server_index, path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> RoboticsConfig {
        let yaml = format!(
            r#"
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
print_servers:
  - index: 0
    base_url: "http://192.168.1.15:5000"
    api_key: "abc123"
    gcode_folder: "{}"
quads: {{}}
"#,
            dir.display()
        );
        RoboticsConfig::from_str(&yaml).unwrap()
    }

    #[test]
    fn writes_one_file_per_touched_print_server() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut programs = BTreeMap::new();
        programs.insert(0usize, "G91\nM18\n".to_owned());

        let paths = write_files(&programs, &config, "aspirate.gcode").unwrap();
        let written = std::fs::read_to_string(&paths[&0]).unwrap();
        assert_eq!(written, "G91\nM18\n");
        assert!(paths[&0].ends_with("aspirate.gcode"));
    }
}
