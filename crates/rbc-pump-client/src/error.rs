use thiserror::Error;

/// Failures from talking to one print-server instance.
/// Every variant here is escalated by the fluidics engine to an
/// emergency stop; there is no local recovery above the bounded
/// `post_gcode` retry.
#[derive(Debug, Error)]
pub enum OctoPrintError {
    #[error("request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reading gcode file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{url}' returned a response body without the fields this client expects")]
    Decode { url: String },

    #[error("'{url}' did not accept the upload within {attempts} attempts")]
    PostGcodeTimeout { url: String, attempts: u32 },
}
