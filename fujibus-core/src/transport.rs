//! Transport adapter (spec §4.5): a byte stream with short read
//! timeouts, used to decouple the bus session from `serialport`
//! specifics and to let tests substitute an in-memory duplex pipe.
//!
//! Grounded on `hf2`'s `&hidapi::HidDevice` transfer calls, generalized
//! from a fixed-size HID report to an arbitrary serial/PTY byte stream
//! (the `serialport` crate fills the role `hidapi` played for the
//! teacher's USB transport).

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::TransportError;

/// Default per-read timeout recommended by spec §4.5 ("around 10 ms").
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Anything that can serve as the FujiBus wire: read "what is waiting"
/// (or block briefly for at least one byte) and write+flush full
/// packets. Implemented for `Box<dyn serialport::SerialPort>` and for
/// any `Read + Write` pair in tests (e.g. an in-memory duplex pipe).
pub trait Transport {
    /// Number of bytes immediately available without blocking, if the
    /// underlying stream can report it (0 if unknown/none).
    fn bytes_waiting(&mut self) -> usize;

    /// Read into `buf`, returning the number of bytes read. May return
    /// 0 on a read timeout; that is not an error (spec §4.5: "read one
    /// byte to block briefly").
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    fn flush(&mut self) -> Result<(), TransportError>;
}

/// Open a serial port (or PTY path) with the symmetric read/write
/// timeout spec §4.5 calls for.
pub fn open_serial(port: &str, baud: u32, timeout: Duration) -> Result<Box<dyn serialport::SerialPort>, TransportError> {
    serialport::new(port, baud)
        .timeout(timeout)
        .open()
        .map_err(|source| TransportError::Open {
            port: port.to_string(),
            source,
        })
}

impl Transport for Box<dyn serialport::SerialPort> {
    fn bytes_waiting(&mut self) -> usize {
        self.bytes_to_read().unwrap_or(0) as usize
    }

    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            // A read timeout is not a transport fault -- it just means
            // nothing arrived in this slice (spec §4.5).
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::Read(e)),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        Write::write_all(self, buf).map_err(TransportError::Write)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Write::flush(self).map_err(TransportError::Flush)
    }
}

/// An in-memory duplex byte pipe, used by `fujibus-core`'s tests and by
/// higher-level integration tests to exercise the session/orchestration
/// layers without a real serial port.
#[doc(hidden)]
pub mod test_util {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct InMemoryPipe {
        /// Bytes written by the host, waiting to be consumed by the
        /// simulated device.
        pub to_device: Arc<Mutex<VecDeque<u8>>>,
        /// Bytes written by the simulated device, waiting to be read by
        /// the host.
        pub to_host: Arc<Mutex<VecDeque<u8>>>,
    }

    impl InMemoryPipe {
        pub fn new() -> Self {
            Self::default()
        }

        /// The device-facing half: reads what the host wrote, writes
        /// what the host will read.
        pub fn device_side(&self) -> DeviceSide {
            DeviceSide { pipe: self.clone() }
        }
    }

    pub struct DeviceSide {
        pipe: InMemoryPipe,
    }

    impl DeviceSide {
        pub fn read_request(&self) -> Vec<u8> {
            let mut q = self.pipe.to_device.lock().unwrap();
            let v: Vec<u8> = q.drain(..).collect();
            v
        }

        pub fn send_response(&self, bytes: &[u8]) {
            let mut q = self.pipe.to_host.lock().unwrap();
            q.extend(bytes.iter().copied());
        }
    }

    impl Transport for InMemoryPipe {
        fn bytes_waiting(&mut self) -> usize {
            self.to_host.lock().unwrap().len()
        }

        fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let mut q = self.to_host.lock().unwrap();
            let n = buf.len().min(q.len());
            for slot in buf.iter_mut().take(n) {
                *slot = q.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
            self.to_device.lock().unwrap().extend(buf.iter().copied());
            Ok(())
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }
}
