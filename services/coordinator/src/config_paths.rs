//! Resolves the on-disk config/calibration files under a single base
//! directory, the way `services/forwarder/src/config.rs`'s caller
//! resolves `/etc/rusty-timer/forwarder.toml` with an env override —
//! here the override is a whole directory rather than one file, since
//! this process owns four sibling files.

use std::path::{Path, PathBuf};

const ENV_VAR: &str = "RBC_CONFIG_DIR";
const DEFAULT_DIR: &str = "/etc/evolver-robotics";

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub root_config: PathBuf,
    pub robotics_config: PathBuf,
    pub calibrations: PathBuf,
    pub device_name: PathBuf,
}

impl ConfigPaths {
    pub fn resolve() -> Self {
        let base = std::env::var(ENV_VAR).unwrap_or_else(|_| DEFAULT_DIR.to_owned());
        Self::under(Path::new(&base))
    }

    pub fn under(base: &Path) -> Self {
        ConfigPaths {
            root_config: base.join("conf.yml"),
            robotics_config: base.join("robotics_server_conf.yml"),
            calibrations: base.join("calibrations.json"),
            device_name: base.join("device_name.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_joins_all_four_sibling_files() {
        let paths = ConfigPaths::under(Path::new("/etc/evolver-robotics"));
        assert_eq!(paths.root_config, Path::new("/etc/evolver-robotics/conf.yml"));
        assert_eq!(
            paths.robotics_config,
            Path::new("/etc/evolver-robotics/robotics_server_conf.yml")
        );
        assert_eq!(
            paths.calibrations,
            Path::new("/etc/evolver-robotics/calibrations.json")
        );
        assert_eq!(
            paths.device_name,
            Path::new("/etc/evolver-robotics/device_name.json")
        );
    }
}
