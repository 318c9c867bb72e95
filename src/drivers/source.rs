use std::io::{self, BufRead, BufReader};
use std::time::Duration;
use log::debug;
use crate::drivers::ScopeError;
/// Placeholder the port selector shows when nothing is plugged in.
pub const NO_PORTS_PLACEHOLDER: &str = "No ports available";
/// Line-oriented byte source the ingestor reads from.
///
/// `read_frame` blocks for at most the read timeout the transport was opened
/// with. `Ok(None)` means the timeout elapsed without a complete frame; a
/// closed stream is an error.
pub trait Transport: Send {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ScopeError>;
}
/// Opens transports for the controller.
pub trait Connector {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, ScopeError>;
}
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}
/// Enumerate serial ports the OS knows about.
pub fn list_ports() -> Result<Vec<PortInfo>, ScopeError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match &p.port_type {
                serialport::SerialPortType::UsbPort(info) => match &info.product {
                    Some(product) => format!("{product} ({:04X}:{:04X})", info.vid, info.pid),
                    None => format!("USB ({:04X}:{:04X})", info.vid, info.pid),
                },
                serialport::SerialPortType::PciPort => "PCI".to_string(),
                serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "Native".to_string(),
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}
/// Real serial port via the `serialport` crate.
pub struct SerialConnector;
impl Connector for SerialConnector {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, ScopeError> {
        debug!("opening {port} at {baud_rate} baud (timeout {read_timeout:?})");
        let serial = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()?;
        Ok(Box::new(LineTransport::new(serial)))
    }
}
/// Splits any byte reader into newline-terminated frames.
///
/// Bytes of a line that straddles a timeout are kept and completed on the
/// next call, so a slow device never produces half frames.
pub struct LineTransport<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}
impl<R: io::Read + Send> LineTransport<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
        }
    }
}
impl<R: io::Read + Send> Transport for LineTransport<R> {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ScopeError> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            // closed or hung-up device
            Ok(0) => {
                if !self.pending.is_empty() {
                    debug!("discarding {} bytes of an unterminated line", self.pending.len());
                }
                Err(ScopeError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial stream closed",
                )))
            }
            Ok(_) if self.pending.ends_with(b"\n") => Ok(Some(std::mem::take(&mut self.pending))),
            // partial line without terminator: wait for the rest
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(ScopeError::Transport(e)),
        }
    }
}
