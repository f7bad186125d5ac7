use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcodeError {
    #[error("pump '{0}' is not present in the robotics configuration")]
    UnknownPump(String),

    #[error("writing '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
