use std::fmt;

/// Mirrors the hand-rolled `Display`/`Error` texture the teacher uses
/// for its own config loader (`services/forwarder/src/config.rs`)
/// rather than `thiserror` — this crate is a direct sibling of that
/// one, loading a different file format for a different rig.
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
    NotFound(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
            ConfigError::NotFound(s) => write!(f, "not found: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
