//! Byte stream abstraction over the serial link.
//!
//! The engine only needs four operations from the link, modelled on a
//! microcontroller UART: how many bytes are waiting, read one, write some,
//! flush. Anything providing them can drive a [`RapiSender`](crate::RapiSender):
//! a serial port, the simulated controller, or the in-memory
//! [`MemoryStream`] used in tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// Non-blocking byte stream to a RAPI controller.
pub trait RapiStream {
    /// Number of bytes that can be read without blocking.
    fn available(&mut self) -> usize;

    /// Read one byte, if any is available.
    fn read(&mut self) -> Option<u8>;

    /// Write all of `bytes`.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

impl<T: RapiStream + ?Sized> RapiStream for Box<T> {
    fn available(&mut self) -> usize {
        (**self).available()
    }

    fn read(&mut self) -> Option<u8> {
        (**self).read()
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    fail_writes: bool,
}

/// In-memory stream with scripted inbound bytes.
///
/// Clones share the same buffers: hand one to the sender and keep the other
/// to inject replies and inspect what was written.
///
/// # Examples
///
/// ```
/// use openevse_rapi::{MemoryStream, RapiStream};
///
/// let stream = MemoryStream::new();
/// let mut link = stream.clone();
///
/// stream.push_inbound(b"$OK\r");
/// assert_eq!(link.available(), 4);
/// assert_eq!(link.read(), Some(b'$'));
///
/// link.write(b"$GV^35\r").unwrap();
/// assert_eq!(stream.take_written(), b"$GV^35\r");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the reader.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inner.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    /// Everything written so far; clears the record.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.borrow_mut().written)
    }

    /// Make subsequent writes fail with `BrokenPipe`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }
}

impl RapiStream for MemoryStream {
    fn available(&mut self) -> usize {
        self.inner.borrow().inbound.len()
    }

    fn read(&mut self) -> Option<u8> {
        self.inner.borrow_mut().inbound.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"));
        }
        inner.written.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_stream_delegates() {
        let stream = MemoryStream::new();
        let mut boxed: Box<dyn RapiStream> = Box::new(stream.clone());
        stream.push_inbound(b"ab");
        assert_eq!(boxed.available(), 2);
        assert_eq!(boxed.read(), Some(b'a'));
        boxed.write(b"x").unwrap();
        boxed.flush().unwrap();
        assert_eq!(stream.take_written(), b"x");
    }

    #[test]
    fn test_failing_writes() {
        let stream = MemoryStream::new();
        let mut link = stream.clone();
        stream.set_fail_writes(true);
        assert!(link.write(b"$FE").is_err());
        assert!(stream.take_written().is_empty());
    }
}
