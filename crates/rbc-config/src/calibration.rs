use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFit {
    pub name: String,
    pub active: bool,
    pub coefficients: Vec<f64>,
    pub fit_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub name: String,
    pub calibration_type: String,
    pub raw: serde_json::Value,
    #[serde(default)]
    pub fits: Vec<CalibrationFit>,
}

/// An ordered list of calibration records, unique by name, with fits
/// unique by `(calibration.name, fit.name)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationStore {
    records: Vec<CalibrationRecord>,
}

impl CalibrationStore {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let records: Vec<CalibrationRecord> =
                    serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
                Ok(CalibrationStore { records })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CalibrationStore::default()),
            Err(e) => Err(ConfigError::Io(format!(
                "reading '{}': {e}",
                path.display()
            ))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text =
            serde_json::to_string(&self.records).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| ConfigError::Io(format!("writing '{}': {e}", path.display())))
    }

    pub fn names(&self) -> Vec<(&str, &str)> {
        self.records
            .iter()
            .map(|r| (r.name.as_str(), r.calibration_type.as_str()))
            .collect()
    }

    pub fn fit_names(&self) -> Vec<(&str, &str)> {
        self.records
            .iter()
            .flat_map(|r| r.fits.iter().map(move |f| (f.name.as_str(), r.calibration_type.as_str())))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&CalibrationRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Replace-by-name: delete the existing record with this name (if
    /// any) from the top-level list, then append the new one. The
    /// delete and the lookup both operate on `self.records`, so a
    /// stale record can never be removed from the wrong container.
    pub fn set_raw(&mut self, record: CalibrationRecord) {
        self.records.retain(|r| r.name != record.name);
        self.records.push(record);
    }

    /// Replace-by-name within a calibration's `fits` list. Errors if
    /// the named calibration does not exist.
    pub fn set_fit(&mut self, calibration_name: &str, fit: CalibrationFit) -> Result<(), ConfigError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.name == calibration_name)
            .ok_or_else(|| ConfigError::NotFound(format!("calibration '{calibration_name}'")))?;
        // Delete any existing fit of the same name from *this*
        // calibration's own fits list, never from the top-level list.
        record.fits.retain(|f| f.name != fit.name);
        record.fits.push(fit);
        Ok(())
    }

    /// Mark fits active/inactive across all records by name, returning
    /// the records that end up with at least one active fit.
    pub fn set_active(&mut self, active_fit_names: &[String]) -> Vec<CalibrationRecord> {
        let mut active_records = Vec::new();
        for record in &mut self.records {
            let mut any_active = false;
            for fit in &mut record.fits {
                fit.active = active_fit_names.contains(&fit.name);
                any_active |= fit.active;
            }
            if any_active {
                active_records.push(record.clone());
            }
        }
        active_records
    }

    /// Read-only equivalent of the filter in [`Self::set_active`],
    /// without mutating anything.
    pub fn active(&self) -> Vec<CalibrationRecord> {
        self.records
            .iter()
            .filter(|r| r.fits.iter().any(|f| f.active))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fit(name: &str, active: bool) -> CalibrationFit {
        CalibrationFit {
            name: name.to_owned(),
            active,
            coefficients: vec![1.0, 0.0],
            fit_type: "linear".to_owned(),
        }
    }

    fn record(name: &str, fits: Vec<CalibrationFit>) -> CalibrationRecord {
        CalibrationRecord {
            name: name.to_owned(),
            calibration_type: "od".to_owned(),
            raw: json!({"values": [1, 2, 3]}),
            fits,
        }
    }

    #[test]
    fn set_raw_is_unique_by_name() {
        let mut store = CalibrationStore::default();
        store.set_raw(record("cal1", vec![]));
        store.set_raw(record("cal1", vec![fit("linear", false)]));
        assert_eq!(store.names().len(), 1);
        assert_eq!(store.get("cal1").unwrap().fits.len(), 1);
    }

    #[test]
    fn set_fit_replaces_within_same_calibration_only() {
        let mut store = CalibrationStore::default();
        store.set_raw(record("cal1", vec![fit("linear", false)]));
        store.set_raw(record("cal2", vec![fit("linear", true)]));

        store.set_fit("cal1", fit("linear", true)).unwrap();

        assert_eq!(store.get("cal1").unwrap().fits.len(), 1);
        assert!(store.get("cal1").unwrap().fits[0].active);
        // cal2's fit of the same name is untouched.
        assert!(store.get("cal2").unwrap().fits[0].active);
    }

    #[test]
    fn set_fit_missing_calibration_errors() {
        let mut store = CalibrationStore::default();
        let err = store.set_fit("nope", fit("linear", true)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn set_active_returns_only_records_with_active_fits() {
        let mut store = CalibrationStore::default();
        store.set_raw(record("cal1", vec![fit("a", false), fit("b", false)]));
        store.set_raw(record("cal2", vec![fit("c", false)]));

        let active = store.set_active(&["a".to_string()]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "cal1");
        assert!(store.get("cal1").unwrap().fits[0].active);
        assert!(!store.get("cal1").unwrap().fits[1].active);
        assert!(!store.get("cal2").unwrap().fits[0].active);
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = CalibrationStore::default();
        store.set_raw(record("cal1", vec![fit("a", true)]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibrations.json");
        store.save(&path).unwrap();
        let reloaded = CalibrationStore::load(&path).unwrap();
        assert_eq!(reloaded.get("cal1").unwrap().fits[0].name, "a");
    }

    #[test]
    fn load_missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        let store = CalibrationStore::load(&path).unwrap();
        assert!(store.names().is_empty());
    }
}
