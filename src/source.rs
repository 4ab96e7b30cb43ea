//! Byte transports the reader can decode from.
//!
//! The decoder only needs a handful of operations from its transport, so it
//! talks to a [`ByteSource`] instead of a serial port directly:
//!
//! | Source | Backing | Use |
//! |---|---|---|
//! | [`SerialSource`] | `serialport` | headset or RF dongle on a (virtual) COM port |
//! | [`MemorySource`] | `Vec<u8>` | recorded captures, tests |
//! | [`crate::simulator::SimulatedSource`] | generator | demos without hardware |
//!
//! Reads block for at most the source's poll interval.  A read that found
//! no data reports `io::ErrorKind::TimedOut` (or `WouldBlock`); end of
//! stream is `Ok(0)`.  The worker relies on that bound to notice stop
//! requests and stalled links.

use std::io::{self, Read};
use std::time::Duration;

use log::{debug, info};
use serialport::{ClearBuffer, SerialPort};

use crate::error::ThinkGearError;

/// A source of bytes with a bounded blocking read and an available-byte count.
pub trait ByteSource: Send {
    /// Acquire the underlying transport.  Calling it on an open source is a no-op.
    fn open(&mut self) -> Result<(), ThinkGearError>;

    /// Read up to `buf.len()` bytes, blocking until at least one byte is
    /// available or the poll interval elapses.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes that can be read right now without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Release the transport.  Calling it on a closed source is a no-op.
    fn close(&mut self);

    /// Human-readable name used in logs and [`crate::types::ThinkGearEvent::Connected`].
    fn name(&self) -> String {
        "byte source".into()
    }

    /// Read a single byte.
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Err(io::ErrorKind::UnexpectedEof.into()),
            _ => Ok(byte[0]),
        }
    }

    /// Fill `buf` completely.  Meant for data that
    /// [`ByteSource::bytes_available`] already reported; a timeout part-way
    /// through loses the bytes read so far.
    fn read_exact(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read(buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => buf = &mut buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn open(&mut self) -> Result<(), ThinkGearError> {
        (**self).open()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        (**self).read_byte()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "byte source is not open")
}

// ── Serial port ──────────────────────────────────────────────────────────────

/// A ThinkGear device on a serial port.
///
/// MindWave Mobile headsets pair as a Bluetooth SPP device
/// (`/dev/rfcomm0`, `COM5`, `/dev/tty.MindWaveMobile-SerialPo`); the
/// original MindWave ships with an RF dongle that enumerates as a USB
/// serial port.  Both run at [`crate::protocol::DEFAULT_BAUD_RATE`].
pub struct SerialSource {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialSource {
    /// Describe a port without opening it.  `timeout` bounds every read.
    pub fn new(port_name: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout,
            port: None,
        }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(not_open)
    }
}

impl ByteSource for SerialSource {
    fn open(&mut self) -> Result<(), ThinkGearError> {
        if self.port.is_some() {
            return Ok(());
        }
        info!("Opening serial port {} at {} baud", self.port_name, self.baud_rate);
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()?;
        // Whatever queued up before we attached is stale.
        port.clear(ClearBuffer::Input)?;
        self.port = Some(port);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let n = self.port()?.bytes_to_read()?;
        Ok(n as usize)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.port_name);
        }
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// Replays a fixed byte sequence, then reports end of stream.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
    is_open: bool,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            is_open: false,
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ByteSource for MemorySource {
    fn open(&mut self) -> Result<(), ThinkGearError> {
        self.is_open = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open {
            return Err(not_open());
        }
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        if !self.is_open {
            return Err(not_open());
        }
        Ok(self.remaining())
    }

    fn close(&mut self) {
        if self.is_open {
            debug!("memory source closed with {} byte(s) unread", self.remaining());
        }
        self.is_open = false;
    }

    fn name(&self) -> String {
        format!("memory ({} bytes)", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_requires_open() {
        let mut src = MemorySource::new(vec![1, 2, 3]);
        assert_eq!(
            src.read_byte().unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        src.open().unwrap();
        assert_eq!(src.read_byte().unwrap(), 1);
        assert_eq!(src.bytes_available().unwrap(), 2);
    }

    #[test]
    fn memory_source_reports_end_of_stream() {
        let mut src = MemorySource::new(vec![9, 8]);
        src.open().unwrap();
        let mut buf = [0u8; 2];
        src.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [9, 8]);
        assert_eq!(
            src.read_byte().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn boxed_source_forwards_calls() {
        let mut src: Box<dyn ByteSource> = Box::new(MemorySource::new(vec![5]));
        src.open().unwrap();
        assert_eq!(src.bytes_available().unwrap(), 1);
        assert_eq!(src.read_byte().unwrap(), 5);
        src.close();
        assert!(src.bytes_available().is_err());
    }

    #[test]
    fn unopened_serial_source_is_not_readable() {
        let mut src = SerialSource::new("/dev/null-thinkgear", 57_600, Duration::from_millis(10));
        assert_eq!(src.name(), "/dev/null-thinkgear");
        assert_eq!(
            src.bytes_available().unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        src.close();
    }
}
