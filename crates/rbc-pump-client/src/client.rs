use std::path::Path;
use std::time::Duration;

use rbc_config::PrintServerConfig;
use serde::Deserialize;
use tracing::warn;

use crate::error::OctoPrintError;

const API_KEY_HEADER: &str = "X-Api-Key";
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobInfo {
    pub file: JobFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Progress {
    pub completion: f64,
}

/// Response shape for `GET /api/job` and the `POST /api/files/local`
/// upload acknowledgement. The body carries at minimum `state`,
/// `progress.completion`, `job.file.name`, and `done`.
#[derive(Debug, Clone, Deserialize)]
pub struct PumpStatus {
    pub state: String,
    pub progress: Progress,
    pub job: JobInfo,
    pub done: bool,
}

/// HTTP client for one print-server driving a bank of syringe pumps.
/// One instance per configured print-server; `rbc-fluidics` drives
/// several of these in parallel for one fluidic event.
pub struct PumpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pub post_gcode_timeout_attempts: u32,
}

impl PumpClient {
    pub fn new(server: &PrintServerConfig, post_gcode_timeout_attempts: u32) -> Self {
        PumpClient {
            http: reqwest::Client::new(),
            base_url: server.base_url.trim_end_matches('/').to_owned(),
            api_key: server.api_key.clone(),
            post_gcode_timeout_attempts,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn connection_command(&self, command: &str) -> Result<(), OctoPrintError> {
        let url = self.url("/api/connection");
        self.http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&serde_json::json!({ "command": command }))
            .send()
            .await
            .map_err(|source| OctoPrintError::Http {
                url: url.clone(),
                source,
            })?
            .error_for_status()
            .map_err(|source| OctoPrintError::Http { url, source })?;
        Ok(())
    }

    pub async fn connect(&self) -> Result<(), OctoPrintError> {
        self.connection_command("connect").await
    }

    pub async fn disconnect(&self) -> Result<(), OctoPrintError> {
        self.connection_command("disconnect").await
    }

    pub async fn cancel(&self) -> Result<(), OctoPrintError> {
        let url = self.url("/api/job");
        self.http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&serde_json::json!({ "command": "cancel" }))
            .send()
            .await
            .map_err(|source| OctoPrintError::Http {
                url: url.clone(),
                source,
            })?
            .error_for_status()
            .map_err(|source| OctoPrintError::Http { url, source })?;
        Ok(())
    }

    pub async fn status(&self) -> Result<PumpStatus, OctoPrintError> {
        let url = self.url("/api/job");
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|source| OctoPrintError::Http {
                url: url.clone(),
                source,
            })?;
        response
            .json::<PumpStatus>()
            .await
            .map_err(|_| OctoPrintError::Decode { url })
    }

    /// Upload a gcode file and start printing it. OctoPrint's upload
    /// acknowledgement occasionally omits the `done` field under
    /// transient load; that single failure mode is retried with a 1s
    /// back-off up to `post_gcode_timeout_attempts` times before
    /// raising. Any other HTTP failure raises immediately.
    pub async fn post_gcode(&self, path: &Path) -> Result<(), OctoPrintError> {
        let url = self.url("/api/files/local");
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| OctoPrintError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program.gcode".to_owned());

        for attempt in 1..=self.post_gcode_timeout_attempts.max(1) {
            let part = reqwest::multipart::Part::bytes(bytes.clone()).file_name(filename.clone());
            let form = reqwest::multipart::Form::new()
                .part("file", part)
                .text("print", "true");

            let response = self
                .http
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .multipart(form)
                .send()
                .await
                .map_err(|source| OctoPrintError::Http {
                    url: url.clone(),
                    source,
                })?
                .error_for_status()
                .map_err(|source| OctoPrintError::Http {
                    url: url.clone(),
                    source,
                })?;

            match response.json::<serde_json::Value>().await {
                Ok(body) if body.get("done").is_some() => return Ok(()),
                _ => {
                    warn!(url = %url, attempt, "post_gcode response missing 'done', retrying");
                    if attempt < self.post_gcode_timeout_attempts {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
        Err(OctoPrintError::PostGcodeTimeout {
            url,
            attempts: self.post_gcode_timeout_attempts,
        })
    }

    /// A job is "done" for `path` when the print-server reports
    /// `Operational`, `completion >= 100`, and the last job's filename
    /// matches `path`'s basename.
    pub fn is_done(status: &PumpStatus, path: &Path) -> bool {
        let expected_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        status.state == "Operational"
            && status.progress.completion >= 100.0
            && status.job.file.name == expected_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(base_url: &str) -> PrintServerConfig {
        PrintServerConfig {
            index: 0,
            base_url: base_url.to_owned(),
            api_key: "abc123".to_owned(),
            gcode_folder: "/gcode/0".to_owned(),
        }
    }

    #[test]
    fn url_joins_base_and_path_without_double_slash() {
        let client = PumpClient::new(&server("http://localhost:5000/"), 5);
        assert_eq!(client.url("/api/job"), "http://localhost:5000/api/job");
    }

    #[test]
    fn is_done_requires_matching_filename_and_full_completion() {
        let status = PumpStatus {
            state: "Operational".to_owned(),
            progress: Progress { completion: 100.0 },
            job: JobInfo {
                file: JobFile {
                    name: "dispense.gcode".to_owned(),
                },
            },
            done: true,
        };
        assert!(PumpClient::is_done(
            &status,
            Path::new("/gcode/0/dispense.gcode")
        ));
        assert!(!PumpClient::is_done(
            &status,
            Path::new("/gcode/0/aspirate.gcode")
        ));
    }

    #[test]
    fn is_done_requires_operational_state_and_full_progress() {
        let mut status = PumpStatus {
            state: "Printing".to_owned(),
            progress: Progress { completion: 57.0 },
            job: JobInfo {
                file: JobFile {
                    name: "dispense.gcode".to_owned(),
                },
            },
            done: false,
        };
        assert!(!PumpClient::is_done(
            &status,
            Path::new("/gcode/0/dispense.gcode")
        ));
        status.state = "Operational".to_owned();
        status.progress.completion = 100.0;
        assert!(PumpClient::is_done(
            &status,
            Path::new("/gcode/0/dispense.gcode")
        ));
    }
}
