use std::io::{Read, Write};
use std::time::Duration;

/// The synchronous byte-level operations the framer needs from a
/// serial port. Kept narrow so tests can swap in an in-memory
/// transport instead of opening a real device.
///
/// Implementations run on a blocking worker thread (see
/// [`crate::framer::SerialFramer::send`]); nothing in this trait is
/// async.
pub trait SerialTransport: Send {
    /// Discard whatever the OS input/output buffers currently hold.
    fn clear_buffers(&mut self) -> std::io::Result<()>;
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    /// Read bytes until `terminator` has been seen at the end of the
    /// accumulated buffer, or until the transport's configured timeout
    /// elapses.
    fn read_until(&mut self, terminator: &str) -> std::io::Result<String>;
}

/// A real device opened through the `serialport` crate.
pub struct SerialPortTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialPortTransport {
    pub fn open(device_path: &str, baud_rate: u32, timeout: Duration) -> std::io::Result<Self> {
        let port = serialport::new(device_path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(SerialPortTransport { port })
    }
}

impl SerialTransport for SerialPortTransport {
    fn clear_buffers(&mut self) -> std::io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        Write::write_all(&mut self.port, bytes)
    }

    fn read_until(&mut self, terminator: &str) -> std::io::Result<String> {
        read_until_marker(&mut self.port, terminator)
    }
}

/// Read one byte at a time from `reader` until `terminator` appears at
/// the end of the accumulated buffer. The microcontroller's frames are
/// not newline-delimited, so this cannot use `BufRead::read_line`.
fn read_until_marker(reader: &mut impl Read, terminator: &str) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial port closed before terminator was seen",
            ));
        }
        buf.push(byte[0]);
        if buf.len() >= terminator.len() && buf.ends_with(terminator.as_bytes()) {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
    }
}

/// An in-memory transport for tests: writes are recorded, reads are
/// served from a queue of canned responses.
#[cfg(any(test, feature = "test-util"))]
pub struct MockTransport {
    pub written: Vec<Vec<u8>>,
    pub responses: std::collections::VecDeque<String>,
    pub clears: usize,
}

#[cfg(any(test, feature = "test-util"))]
impl MockTransport {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        MockTransport {
            written: Vec::new(),
            responses: responses.into_iter().collect(),
            clears: 0,
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl SerialTransport for MockTransport {
    fn clear_buffers(&mut self) -> std::io::Result<()> {
        self.clears += 1;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn read_until(&mut self, _terminator: &str) -> std::io::Result<String> {
        self.responses.pop_front().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no canned response left")
        })
    }
}
