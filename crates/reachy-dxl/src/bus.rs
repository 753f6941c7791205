//! Identifier scanning over one actuator bus

use reachy_core::{MotorId, Protocol};
use serialport::SerialPort;
use std::io::Write;
use tracing::{debug, trace};

use crate::transport::{open_serial, BusLink, LinkSettings};
use crate::{ping_packet, read_status, DxlError};

/// An open channel to one bus, speaking one protocol
///
/// The link is released when the bus is dropped, on every exit path.
pub struct DxlBus<L: BusLink> {
    link: L,
    protocol: Protocol,
    port: String,
}

impl DxlBus<Box<dyn SerialPort>> {
    /// Open `port` as a serial bus
    pub fn open(port: &str, protocol: Protocol, settings: &LinkSettings) -> Result<Self, DxlError> {
        let link = open_serial(port, settings)?;
        Ok(Self::with_link(link, protocol, port))
    }
}

impl<L: BusLink> DxlBus<L> {
    pub fn with_link(link: L, protocol: Protocol, port: &str) -> Self {
        Self {
            link,
            protocol,
            port: port.to_string(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Ping one identifier
    ///
    /// Returns `Ok(false)` when nothing answers before the link timeout.
    pub fn ping(&mut self, id: MotorId) -> Result<bool, DxlError> {
        let packet = ping_packet(self.protocol, id.0)?;
        self.link.discard_input()?;
        self.link.write_all(&packet)?;
        self.link.flush()?;

        match read_status(self.protocol, &mut self.link) {
            Ok(status) if status.id == id.0 => {
                if status.error != 0 {
                    debug!(
                        port = %self.port,
                        id = id.0,
                        error = status.error,
                        "Actuator reports hardware error"
                    );
                }
                Ok(true)
            }
            Ok(status) => Err(DxlError::UnexpectedId {
                expected: id.0,
                actual: status.id,
            }),
            Err(DxlError::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Ping every identifier of `ids` and return those that answered
    ///
    /// Transport faults on a single identifier count as "no answer"; there is
    /// no retry within one scan.
    pub fn scan<I>(&mut self, ids: I) -> Vec<MotorId>
    where
        I: IntoIterator<Item = MotorId>,
    {
        let mut found = Vec::new();
        for id in ids {
            match self.ping(id) {
                Ok(true) => found.push(id),
                Ok(false) => trace!(port = %self.port, id = id.0, "No answer"),
                Err(e) => debug!(port = %self.port, id = id.0, error = %e, "Ping failed"),
            }
        }
        debug!(
            port = %self.port,
            protocol = %self.protocol,
            found = found.len(),
            "Bus scan complete"
        );
        found
    }
}

impl<L: BusLink> Drop for DxlBus<L> {
    fn drop(&mut self) {
        trace!(port = %self.port, protocol = %self.protocol, "Closing bus");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{general, lightweight};
    use std::collections::VecDeque;
    use std::io::{self, Read};

    /// In-memory bus where a fixed set of servos answers pings
    struct ServoLoopback {
        protocol: Protocol,
        present: Vec<u8>,
        written: Vec<u8>,
        pending: VecDeque<u8>,
        noise: Vec<u8>,
    }

    impl ServoLoopback {
        fn new(protocol: Protocol, present: &[u8]) -> Self {
            Self {
                protocol,
                present: present.to_vec(),
                written: Vec::new(),
                pending: VecDeque::new(),
                noise: Vec::new(),
            }
        }
    }

    impl Read for ServoLoopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
            }
            let n = buf.len().min(self.pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ServoLoopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            let request = std::mem::take(&mut self.written);
            self.pending.extend(self.noise.drain(..));
            for &id in &self.present {
                if request == ping_packet(self.protocol, id).unwrap() {
                    let reply = match self.protocol {
                        Protocol::General => general::status_packet(id, 0, &[]),
                        Protocol::Lightweight => {
                            lightweight::status_packet(id, 0, &[0x5E, 0x01, 0x1F])
                        }
                    };
                    self.pending.extend(reply.unwrap());
                }
            }
            Ok(())
        }
    }

    impl BusLink for ServoLoopback {
        fn discard_input(&mut self) -> io::Result<()> {
            self.pending.clear();
            Ok(())
        }
    }

    fn ids(raw: &[u8]) -> Vec<MotorId> {
        raw.iter().copied().map(MotorId).collect()
    }

    #[test]
    fn test_general_scan_returns_present_subset() {
        let link = ServoLoopback::new(Protocol::General, &[10, 11, 12, 13, 14, 15, 16]);
        let mut bus = DxlBus::with_link(link, Protocol::General, "/dev/usb2ax_right_arm");
        let found = bus.scan((0..40).map(MotorId));
        assert_eq!(found, ids(&[10, 11, 12, 13, 14, 15, 16]));
    }

    #[test]
    fn test_lightweight_scan() {
        let link = ServoLoopback::new(Protocol::Lightweight, &[31]);
        let mut bus = DxlBus::with_link(link, Protocol::Lightweight, "/dev/usb2ax_head");
        assert_eq!(bus.scan(ids(&[30, 31])), ids(&[31]));
    }

    #[test]
    fn test_general_servo_ignores_lightweight_ping() {
        let link = ServoLoopback::new(Protocol::General, &[40]);
        let mut bus = DxlBus::with_link(link, Protocol::Lightweight, "/dev/usb2ax_head");
        assert!(!bus.ping(MotorId(40)).unwrap());
    }

    #[test]
    fn test_stale_bytes_do_not_answer_for_absent_id() {
        let mut link = ServoLoopback::new(Protocol::General, &[]);
        link.pending.extend(general::status_packet(12, 0, &[]).unwrap());
        let mut bus = DxlBus::with_link(link, Protocol::General, "/dev/usb2ax_left_arm");
        assert!(!bus.ping(MotorId(12)).unwrap());
    }

    #[test]
    fn test_line_noise_before_reply() {
        let mut link = ServoLoopback::new(Protocol::General, &[20]);
        link.noise = vec![0x00, 0x42, 0xFF];
        let mut bus = DxlBus::with_link(link, Protocol::General, "/dev/usb2ax_left_arm");
        assert!(bus.ping(MotorId(20)).unwrap());
    }

    #[test]
    fn test_reply_from_wrong_id_is_error() {
        let mut link = ServoLoopback::new(Protocol::General, &[]);
        link.noise = general::status_packet(21, 0, &[]).unwrap();
        let mut bus = DxlBus::with_link(link, Protocol::General, "/dev/usb2ax_left_arm");
        assert!(matches!(
            bus.ping(MotorId(20)),
            Err(DxlError::UnexpectedId { expected: 20, actual: 21 })
        ));
        // The scan folds the fault into "not observed"
        assert!(bus.scan(ids(&[20])).is_empty());
    }
}
