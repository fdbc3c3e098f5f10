//! Trigger wire protocol and sinks.
//!
//! One octet per crossing, identical on UART and UDP: bits 7-6 carry the
//! base identity (`10` Base A, `11` Base B), bits 5-0 a rolling sequence.
//! A *new* crossing pre-increments the sequence modulo 64; a *repeat*
//! re-sends the previous value. The race timer deduplicates on the
//! sequence, so a lost datagram is never retried.
//!
//! The inbound remote byte uses the same addressing with `0x00` = pause
//! and `0x01` = resume in the low six bits.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gate_types::BaseKind;

pub const SEQUENCE_MASK: u8 = 0x3f;
pub const BASE_A_BITS: u8 = 0x80;
pub const BASE_B_BITS: u8 = 0xc0;

const UART_BAUD: u32 = 9600;

/// Inbound run control, addressed to one base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteCommand {
    Pause,
    Resume,
}

/// Decode an inbound remote byte. Commands not addressed to `base` are
/// ignored, as are unknown command values.
pub fn parse_remote(byte: u8, base: BaseKind) -> Option<RemoteCommand> {
    let expected = match base {
        BaseKind::A => BASE_A_BITS,
        BaseKind::B => BASE_B_BITS,
        BaseKind::Unknown => return None,
    };
    if byte & 0xc0 != expected {
        return None;
    }
    match byte & SEQUENCE_MASK {
        0x00 => Some(RemoteCommand::Pause),
        0x01 => Some(RemoteCommand::Resume),
        _ => None,
    }
}

/// Rolling-sequence trigger byte generator. Each sink owns one, so the
/// sequence on every wire is self-consistent.
#[derive(Debug)]
pub struct TriggerEncoder {
    sequence: u8,
}

impl Default for TriggerEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerEncoder {
    /// Starts at 0x3f so the first new crossing emits sequence 0.
    pub fn new() -> Self {
        Self { sequence: 0x3f }
    }

    pub fn encode(&mut self, base: BaseKind, new_crossing: bool) -> Option<u8> {
        if new_crossing {
            self.sequence = (self.sequence + 1) & SEQUENCE_MASK;
        }
        match base {
            BaseKind::A => Some(BASE_A_BITS | self.sequence),
            BaseKind::B => Some(BASE_B_BITS | self.sequence),
            BaseKind::Unknown => None,
        }
    }
}

/// Capability shared by the trigger outputs. The pipeline calls both
/// sinks unconditionally per crossing; an unconfigured sink no-ops, and a
/// failed write is logged and forgotten.
pub trait TriggerSink {
    fn trigger(&mut self, new_crossing: bool);
    fn is_present(&self) -> bool;
}

/// UART trigger output (9600 8N1), typically an RF stick.
pub struct UartTrigger {
    port: Option<Box<dyn serialport::SerialPort>>,
    base: BaseKind,
    encoder: TriggerEncoder,
}

impl UartTrigger {
    /// Try the device paths in preference order. A sensor without a
    /// serial stick is not an error; the sink just stays absent.
    pub fn open(base: BaseKind, device_paths: &[&str]) -> Self {
        let mut port = None;
        for path in device_paths {
            match serialport::new(*path, UART_BAUD)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .timeout(Duration::from_millis(10))
                .open()
            {
                Ok(p) => {
                    info!("opened trigger UART {}", path);
                    port = Some(p);
                    break;
                }
                Err(e) => {
                    warn!("cannot open {}: {}", path, e);
                }
            }
        }
        Self {
            port,
            base,
            encoder: TriggerEncoder::new(),
        }
    }

    pub fn absent(base: BaseKind) -> Self {
        Self {
            port: None,
            base,
            encoder: TriggerEncoder::new(),
        }
    }

    /// One inbound byte, if any is waiting. Never blocks.
    pub fn poll_remote(&mut self) -> Option<u8> {
        let port = self.port.as_mut()?;
        match port.bytes_to_read() {
            Ok(0) => None,
            Ok(_) => {
                let mut buf = [0u8; 1];
                match port.read_exact(&mut buf) {
                    Ok(()) => Some(buf[0]),
                    Err(e) => {
                        warn!("UART read failed: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("UART status failed: {}", e);
                None
            }
        }
    }
}

impl TriggerSink for UartTrigger {
    fn trigger(&mut self, new_crossing: bool) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        let Some(byte) = self.encoder.encode(self.base, new_crossing) else {
            warn!("no trigger emitted: base identity unknown");
            return;
        };
        debug!("UART trigger {:#04x}", byte);
        if let Err(e) = port.write_all(&[byte]).and_then(|()| port.flush()) {
            // Next trigger uses a fresh sequence; the timer is idempotent.
            warn!("UART trigger write failed: {}", e);
        }
    }

    fn is_present(&self) -> bool {
        self.port.is_some()
    }
}

/// UDP trigger output, a pure sender toward the race timer.
pub struct UdpTrigger {
    socket: Option<UdpSocket>,
    remote: Option<SocketAddrV4>,
    base: BaseKind,
    encoder: TriggerEncoder,
}

impl UdpTrigger {
    pub fn open(base: BaseKind, remote_host: Option<Ipv4Addr>, remote_port: u16) -> Self {
        let mut socket = None;
        let mut remote = None;
        if let Some(host) = remote_host {
            match UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))) {
                Ok(s) => {
                    info!("opened trigger UDP socket to {}:{}", host, remote_port);
                    socket = Some(s);
                    remote = Some(SocketAddrV4::new(host, remote_port));
                }
                Err(e) => {
                    warn!("cannot open trigger UDP socket: {}", e);
                }
            }
        }
        Self {
            socket,
            remote,
            base,
            encoder: TriggerEncoder::new(),
        }
    }

    pub fn absent(base: BaseKind) -> Self {
        Self {
            socket: None,
            remote: None,
            base,
            encoder: TriggerEncoder::new(),
        }
    }
}

/// Listener for inbound remote control datagrams.
pub struct RemoteReceiver {
    socket: UdpSocket,
}

impl RemoteReceiver {
    /// Bind the control port. Pass port 0 for an OS-assigned one.
    pub fn bind(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// One inbound byte, if any datagram is waiting. Never blocks.
    pub fn poll(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.socket.recv_from(&mut buf) {
            Ok((1, _)) => Some(buf[0]),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("UDP receive failed: {}", e);
                None
            }
        }
    }
}

impl TriggerSink for UdpTrigger {
    fn trigger(&mut self, new_crossing: bool) {
        let (Some(socket), Some(remote)) = (self.socket.as_ref(), self.remote) else {
            return;
        };
        let Some(byte) = self.encoder.encode(self.base, new_crossing) else {
            warn!("no trigger emitted: base identity unknown");
            return;
        };
        debug!("UDP trigger {:#04x} to {}", byte, remote);
        if let Err(e) = socket.send_to(&[byte], remote) {
            warn!("UDP trigger write failed: {}", e);
        }
    }

    fn is_present(&self) -> bool {
        self.socket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_new_crossing_has_sequence_zero() {
        let mut enc = TriggerEncoder::new();
        assert_eq!(enc.encode(BaseKind::A, true), Some(BASE_A_BITS));
        assert_eq!(enc.encode(BaseKind::B, true), Some(BASE_B_BITS | 1));
    }

    #[test]
    fn repeats_reuse_the_last_new_sequence() {
        let mut enc = TriggerEncoder::new();
        assert_eq!(enc.encode(BaseKind::A, true), Some(BASE_A_BITS));
        assert_eq!(enc.encode(BaseKind::A, false), Some(BASE_A_BITS));
        assert_eq!(enc.encode(BaseKind::A, false), Some(BASE_A_BITS));
        assert_eq!(enc.encode(BaseKind::A, true), Some(BASE_A_BITS | 1));
        assert_eq!(enc.encode(BaseKind::A, false), Some(BASE_A_BITS | 1));
    }

    #[test]
    fn sequence_wraps_modulo_64() {
        let mut enc = TriggerEncoder::new();
        for expected in 0..64u8 {
            assert_eq!(
                enc.encode(BaseKind::A, true),
                Some(BASE_A_BITS | expected)
            );
        }
        assert_eq!(enc.encode(BaseKind::A, true), Some(BASE_A_BITS));
    }

    #[test]
    fn unknown_base_emits_nothing() {
        let mut enc = TriggerEncoder::new();
        assert_eq!(enc.encode(BaseKind::Unknown, true), None);
    }

    #[test]
    fn remote_bytes_are_address_filtered() {
        assert_eq!(parse_remote(0x80, BaseKind::A), Some(RemoteCommand::Pause));
        assert_eq!(parse_remote(0x81, BaseKind::A), Some(RemoteCommand::Resume));
        assert_eq!(parse_remote(0xc0, BaseKind::A), None, "addressed to B");
        assert_eq!(parse_remote(0xc0, BaseKind::B), Some(RemoteCommand::Pause));
        assert_eq!(parse_remote(0xc1, BaseKind::B), Some(RemoteCommand::Resume));
        assert_eq!(parse_remote(0x81, BaseKind::B), None, "addressed to A");
        assert_eq!(parse_remote(0x41, BaseKind::A), None, "not a command byte");
        assert_eq!(parse_remote(0x82, BaseKind::A), None, "unknown command");
        assert_eq!(parse_remote(0x80, BaseKind::Unknown), None);
    }

    #[test]
    fn udp_round_trip_on_loopback() {
        // Receiver plays the race timer.
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let port = receiver.local_addr().expect("local addr").port();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("set timeout");

        let mut sink = UdpTrigger::open(BaseKind::B, Some(Ipv4Addr::LOCALHOST), port);
        assert!(sink.is_present());
        sink.trigger(true);
        sink.trigger(false);

        let mut buf = [0u8; 4];
        for _ in 0..2 {
            let (n, _) = receiver.recv_from(&mut buf).expect("receive trigger");
            assert_eq!(n, 1);
            assert_eq!(buf[0], BASE_B_BITS, "new then repeat, same sequence");
        }
    }

    #[test]
    fn remote_receiver_sees_control_bytes() {
        let mut rx = RemoteReceiver::bind(0).expect("bind receiver");
        let port = rx.local_port().expect("local port");
        assert_eq!(rx.poll(), None, "nothing queued yet");

        let tx = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        tx.send_to(&[0x81], ("127.0.0.1", port)).expect("send");

        // Nonblocking receive: give the loopback a moment.
        let mut got = None;
        for _ in 0..100 {
            if let Some(b) = rx.poll() {
                got = Some(b);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(got, Some(0x81));
        assert_eq!(parse_remote(0x81, BaseKind::A), Some(RemoteCommand::Resume));
    }
}
