//! Serial-port transport for an FTDI-based DMX/RDM USB adapter.
//!
//! Grounded on `OpenRDMDriver.c` (the purge/break/reinit sequence and the
//! -110/-666 recovery rule) and on the `serialport` usage in
//! `enttecdmxusbpro.rs`/`roscdmx`'s `main.rs`.

use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::{DataBits, FlowControl, SerialPort, StopBits};

use crate::consts::{
    BREAK_MICROS, DMX_BAUD_RATE, DMX_MAX_LENGTH, OPENRDM_PID, OPENRDM_VID, USB_READ_TIMEOUT_MS,
    USB_WRITE_TIMEOUT_MS,
};
use crate::error::TransportError;

/// Sends a break+mark-after-break framed buffer to the adapter and reads a
/// response back, recovering from a dead USB device by reopening it.
pub trait Transport: Send {
    /// Breaks, writes `frame` (start-code-prefixed slots), and returns
    /// whatever bytes the adapter produced within the read timeout. An empty
    /// result means nothing came back before the timeout elapsed. The first
    /// byte of a non-empty result is the adapter's break marker, not part of
    /// the RDM/discovery frame itself; stripping it is the caller's job
    /// since a discovery response and a GET/SET response frame it differently.
    fn send_and_receive(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Human-readable description of the underlying device, used to
    /// synthesise a controller UID and for log messages.
    fn description(&self) -> &str;
}

/// Enumerates the serial ports that look like the supported FTDI adapter
/// (VID 0x0403 / PID 0x6001), returning each one's port name.
pub fn discover_adapters() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports().map_err(|source| TransportError::Open {
        description: "<enumeration>".to_string(),
        source,
    })?;

    Ok(ports
        .into_iter()
        .filter(|port| matches_vid_pid(port, OPENRDM_VID, OPENRDM_PID))
        .map(|port| port.port_name)
        .collect())
}

fn matches_vid_pid(port: &serialport::SerialPortInfo, vid: u16, pid: u16) -> bool {
    matches!(
        &port.port_type,
        serialport::SerialPortType::UsbPort(info) if info.vid == vid && info.pid == pid
    )
}

/// A `Transport` backed by a real FTDI serial port.
pub struct FtdiTransport {
    description: String,
    port: Box<dyn SerialPort>,
}

impl FtdiTransport {
    pub fn open(description: &str) -> Result<Self, TransportError> {
        let port = open_port(description)?;
        Ok(FtdiTransport {
            description: description.to_string(),
            port,
        })
    }

    fn reopen(&mut self) -> Result<(), TransportError> {
        warn!(
            "adapter {} became unavailable, reopening",
            self.description
        );
        self.port = open_port(&self.description)?;
        Ok(())
    }

    fn send_break(&mut self) -> Result<(), std::io::Error> {
        self.port.set_break()?;
        std::thread::sleep(Duration::from_micros(BREAK_MICROS));
        self.port.clear_break()
    }
}

fn open_port(description: &str) -> Result<Box<dyn SerialPort>, TransportError> {
    serialport::new(description, DMX_BAUD_RATE)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::Two)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(USB_READ_TIMEOUT_MS))
        .open()
        .map_err(|source| TransportError::Open {
            description: description.to_string(),
            source,
        })
}

impl Transport for FtdiTransport {
    fn send_and_receive(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let _ = self.port.clear(serialport::ClearBuffer::All);

        if let Err(err) = self.send_break() {
            warn!("break signalling failed: {err}");
        }

        self.port
            .set_timeout(Duration::from_millis(USB_WRITE_TIMEOUT_MS))
            .ok();

        match self.port.write_all(frame) {
            Ok(()) => {},
            Err(err) if is_device_unavailable(&err) => {
                self.reopen()?;
                return Err(TransportError::DeviceUnavailable);
            },
            Err(err) => return Err(TransportError::Write(err)),
        }

        self.port
            .set_timeout(Duration::from_millis(USB_READ_TIMEOUT_MS))
            .ok();

        let mut buf = vec![0u8; DMX_MAX_LENGTH + 1];
        let mut received = Vec::new();
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    received.extend_from_slice(&buf[..n]);
                    if n < buf.len() {
                        break;
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => break,
                Err(err) => return Err(TransportError::Read(err)),
            }
        }

        debug!("received {} bytes from {}", received.len(), self.description);
        Ok(received)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

fn is_device_unavailable(err: &std::io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == 110 || code == 666
    )
}
