use std::sync::{Arc, Mutex};
use std::time::Duration;

use rbc_protocol::CommandKind;
use rbc_config::SerialConfig;

use crate::error::SerialError;
use crate::transport::SerialTransport;

/// Encode `<param><f0>,<f1>,…,<fN>,<end>` where `fields[0]` is the
/// one-character sentinel and the rest are CSV value fields.
fn encode_frame(param: &str, fields: &[String], end: &str) -> String {
    format!("{param}{},{end}", fields.join(","))
}

/// Decode a response frame, checking the address prefix, and return
/// the CSV fields after it (sentinel included as `fields[0]`).
fn decode_frame(param: &str, response: &str, end_incoming: &str) -> Result<Vec<String>, SerialError> {
    let body = response
        .strip_prefix(param)
        .ok_or_else(|| SerialError::AddressMismatch {
            param: param.to_owned(),
            found: response.to_owned(),
        })?;
    let suffix = format!(",{end_incoming}");
    let body = body.strip_suffix(&suffix).ok_or_else(|| SerialError::ShapeMismatch {
        param: param.to_owned(),
        detail: format!("frame did not end with terminator '{end_incoming}'"),
    })?;
    Ok(body.split(',').map(str::to_owned).collect())
}

/// Encodes/decodes the length-typed line protocol and drives the
/// hardware exchange over a single exclusive lock held for the
/// duration of one `send()` call.
///
/// The blocking transport runs on a [`tokio::task::spawn_blocking`]
/// worker so the async broadcast/scheduler tasks never stall on serial
/// I/O.
pub struct SerialFramer<T: SerialTransport + 'static> {
    port: Arc<Mutex<T>>,
    end_outgoing: String,
    end_incoming: String,
    serial_delay: Duration,
    immediate_char: char,
    recurring_char: char,
    ack_char: char,
    echo_char: char,
    data_char: char,
}

impl<T: SerialTransport + 'static> SerialFramer<T> {
    pub fn new(transport: T, config: &SerialConfig) -> Self {
        SerialFramer {
            port: Arc::new(Mutex::new(transport)),
            end_outgoing: config.end_outgoing.clone(),
            end_incoming: config.end_incoming.clone(),
            serial_delay: Duration::from_millis(config.serial_delay_ms),
            immediate_char: config.immediate_char,
            recurring_char: config.recurring_char,
            ack_char: config.ack_char,
            echo_char: config.echo_char,
            data_char: config.data_char,
        }
    }

    /// Send one command and wait for its ack. `values` is the CSV
    /// value list only (the sentinel character is prepended
    /// internally), so `values.len() + 1` must equal `fields_out`.
    ///
    /// Returns `Some(payload)` for a DATA response, `None` for ECHO.
    pub async fn send(
        &self,
        param: &str,
        values: &[String],
        kind: CommandKind,
        fields_out: usize,
        fields_in: usize,
    ) -> Result<Option<Vec<String>>, SerialError> {
        if values.len() + 1 != fields_out {
            return Err(SerialError::ShapeMismatch {
                param: param.to_owned(),
                detail: format!(
                    "expected {fields_out} outgoing fields (sentinel + values), got {}",
                    values.len() + 1
                ),
            });
        }

        let sentinel = match kind {
            CommandKind::Immediate => self.immediate_char,
            CommandKind::Recurring => self.recurring_char,
        };
        let mut out_fields = Vec::with_capacity(fields_out);
        out_fields.push(sentinel.to_string());
        out_fields.extend(values.iter().cloned());
        let request_frame = encode_frame(param, &out_fields, &self.end_outgoing);

        let port = Arc::clone(&self.port);
        let param_owned = param.to_owned();
        let values_owned = values.to_vec();
        let end_outgoing = self.end_outgoing.clone();
        let end_incoming = self.end_incoming.clone();
        let serial_delay = self.serial_delay;
        let ack_char = self.ack_char;
        let data_char = self.data_char;
        let echo_char = self.echo_char;

        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

            guard.clear_buffers().map_err(|e| SerialError::IOTimeout {
                device: param_owned.clone(),
                source: e,
            })?;
            guard
                .write_all(request_frame.as_bytes())
                .map_err(|e| SerialError::IOTimeout {
                    device: param_owned.clone(),
                    source: e,
                })?;
            std::thread::sleep(serial_delay);

            let response = guard.read_until(&end_incoming).map_err(|e| SerialError::IOTimeout {
                device: param_owned.clone(),
                source: e,
            })?;
            let recv_fields = decode_frame(&param_owned, &response, &end_incoming)?;

            if recv_fields.len() != fields_in {
                return Err(SerialError::ShapeMismatch {
                    param: param_owned.clone(),
                    detail: format!(
                        "expected {fields_in} incoming fields, got {}",
                        recv_fields.len()
                    ),
                });
            }
            let resp_sentinel = recv_fields[0].clone();
            let payload = recv_fields[1..].to_vec();
            let resp_char = (resp_sentinel.chars().count() == 1)
                .then(|| resp_sentinel.chars().next())
                .flatten();

            let is_data = resp_char == Some(data_char);
            let is_echo = resp_char == Some(echo_char);
            if !is_data && !is_echo {
                return Err(SerialError::BadSentinel {
                    param: param_owned.clone(),
                    found: resp_sentinel,
                });
            }
            if is_echo && payload != values_owned {
                return Err(SerialError::EchoMismatch {
                    param: param_owned.clone(),
                });
            }

            let mut ack_fields = vec![ack_char.to_string()];
            ack_fields.extend(std::iter::repeat(String::new()).take(fields_out.saturating_sub(1)));
            let ack_frame = encode_frame(&param_owned, &ack_fields, &end_outgoing);
            guard
                .write_all(ack_frame.as_bytes())
                .map_err(|e| SerialError::IOTimeout {
                    device: param_owned.clone(),
                    source: e,
                })?;
            std::thread::sleep(serial_delay);

            Ok(if is_data { Some(payload) } else { None })
        })
        .await
        .map_err(|e| SerialError::WorkerPanicked(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn config() -> SerialConfig {
        SerialConfig {
            device_path: "/dev/null".into(),
            baud_rate: 9600,
            io_timeout_ms: 1000,
            serial_delay_ms: 0,
            end_outgoing: "end".into(),
            end_incoming: "end".into(),
            immediate_char: 'I',
            recurring_char: 'R',
            ack_char: 'A',
            echo_char: 'E',
            data_char: 'D',
        }
    }

    #[tokio::test]
    async fn encodes_outgoing_frame_and_decodes_data_response() {
        let transport = MockTransport::new(["stirD,ok,end".to_owned()]);
        let framer = SerialFramer::new(transport, &config());

        let values: Vec<String> = vec!["8".into(); 16];
        let result = framer
            .send("stir", &values, CommandKind::Immediate, 17, 2)
            .await
            .unwrap();

        assert_eq!(result, Some(vec!["ok".to_owned()]));
    }

    #[tokio::test]
    async fn echo_response_returns_none_and_acks() {
        let values: Vec<String> = vec!["1".into(), "2".into()];
        let echo_frame = format!("stirE,{},end", values.join(","));
        let transport = MockTransport::new([echo_frame]);
        let framer = SerialFramer::new(transport, &config());

        let result = framer
            .send("stir", &values, CommandKind::Recurring, 3, 3)
            .await
            .unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn echo_payload_mismatch_is_rejected() {
        let values: Vec<String> = vec!["1".into(), "2".into()];
        let echo_frame = "stirE,9,9,end".to_owned();
        let transport = MockTransport::new([echo_frame]);
        let framer = SerialFramer::new(transport, &config());

        let err = framer
            .send("stir", &values, CommandKind::Recurring, 3, 3)
            .await
            .unwrap_err();

        assert!(matches!(err, SerialError::EchoMismatch { .. }));
    }

    #[tokio::test]
    async fn shape_mismatch_is_rejected_before_any_io() {
        let transport = MockTransport::new(Vec::<String>::new());
        let framer = SerialFramer::new(transport, &config());

        let err = framer
            .send("stir", &["1".into()], CommandKind::Immediate, 17, 2)
            .await
            .unwrap_err();

        assert!(matches!(err, SerialError::ShapeMismatch { .. }));
    }

    #[tokio::test]
    async fn address_mismatch_is_detected() {
        let transport = MockTransport::new(["tempD,ok,end".to_owned()]);
        let framer = SerialFramer::new(transport, &config());

        let err = framer
            .send("stir", &vec!["8".into(); 16], CommandKind::Immediate, 17, 2)
            .await
            .unwrap_err();

        assert!(matches!(err, SerialError::AddressMismatch { .. }));
    }

    #[tokio::test]
    async fn bad_sentinel_is_rejected() {
        let transport = MockTransport::new(["stirX,ok,end".to_owned()]);
        let framer = SerialFramer::new(transport, &config());

        let err = framer
            .send("stir", &vec!["8".into(); 16], CommandKind::Immediate, 17, 2)
            .await
            .unwrap_err();

        assert!(matches!(err, SerialError::BadSentinel { .. }));
    }

    #[tokio::test]
    async fn ack_frame_has_ack_char_and_matching_shape() {
        let transport = MockTransport::new(["stirD,ok,end".to_owned()]);
        let framer = SerialFramer::new(transport, &config());

        framer
            .send("stir", &vec!["8".into(); 16], CommandKind::Immediate, 17, 2)
            .await
            .unwrap();

        let written = framer.port.lock().unwrap();
        let ack = std::str::from_utf8(&written.written[1]).unwrap();
        assert_eq!(ack, "stirA,,,,,,,,,,,,,,,,,end");
    }
}
