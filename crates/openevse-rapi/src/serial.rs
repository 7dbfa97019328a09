//! Serial port backed [`RapiStream`].
//!
//! Available with the `hardware-serial` feature.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RapiError, Result};
use crate::stream::RapiStream;

/// Default line speed of OpenEVSE controllers.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout on the port. Reads are only issued for bytes already
/// reported as available, so this only bounds a misbehaving driver.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// A serial port wired to a RAPI controller.
pub struct SerialStream {
    port: Box<dyn SerialPort>,
}

impl SerialStream {
    /// Open `path` at `baud_rate`, 8N1.
    ///
    /// # Errors
    ///
    /// Returns `RapiError::Transport` if the port cannot be opened.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        debug!("Opening serial port {} at {} baud", path, baud_rate);
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| RapiError::transport(format!("{}: {}", path, e)))?;
        Ok(Self { port })
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl RapiStream for SerialStream {
    fn available(&mut self) -> usize {
        match self.port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                warn!("serial port query failed: {}", e);
                0
            }
        }
    }

    fn read(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => None,
            Err(e) => {
                warn!("serial read failed: {}", e);
                None
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
