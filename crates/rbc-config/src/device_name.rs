use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

/// The device-name JSON blob, shaped however the client sends it
/// (`setdevicename`/`getdevicename` round-trip it opaquely — see
/// `evolver_server.py`'s `on_setdevicename`).
pub fn load(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading '{}': {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn save(path: &Path, value: &Value) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(format!("creating '{}': {e}", parent.display())))?;
        }
    }
    let text = serde_json::to_string(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    std::fs::write(path, text)
        .map_err(|e| ConfigError::Io(format!("writing '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("device_name.json");
        let value = json!({"name": "evolver-1"});
        save(&path, &value).unwrap();
        assert_eq!(load(&path).unwrap(), value);
    }
}
