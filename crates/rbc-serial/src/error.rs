use thiserror::Error;

/// Failures from a single `send()` request/ack exchange.
///
/// All of these are hard-fail: there is no retry at this layer, the
/// caller (the broadcast engine or a direct immediate dispatch) decides
/// whether and how to recover.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("param '{param}': {detail}")]
    ShapeMismatch { param: String, detail: String },

    #[error("param '{param}': response address prefix did not match, got '{found}'")]
    AddressMismatch { param: String, found: String },

    #[error("param '{param}': expected DATA or ECHO sentinel, got '{found}'")]
    BadSentinel { param: String, found: String },

    #[error("param '{param}': echo payload did not match the sent values")]
    EchoMismatch { param: String },

    #[error("io error on '{device}': {source}")]
    IOTimeout {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serial worker task panicked: {0}")]
    WorkerPanicked(String),
}
