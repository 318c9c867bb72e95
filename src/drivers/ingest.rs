use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use crate::drivers::source::Transport;
use crate::drivers::{FrameError, Sample, SampleBuffer};
/// Raw ADC code to volts: `raw / full_scale_code * reference_voltage - calibration_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdcConversion {
    pub full_scale_code: u32,
    pub reference_voltage: f64,
    pub calibration_offset: f64,
}
impl Default for AdcConversion {
    fn default() -> Self {
        // 12-bit STM32 ADC on a 3.3 V reference, front end biased by 0.6 V
        Self {
            full_scale_code: 4095,
            reference_voltage: 3.3,
            calibration_offset: 0.6,
        }
    }
}
impl AdcConversion {
    pub fn to_volts(&self, raw: u64) -> f64 {
        (raw as f64 / self.full_scale_code as f64) * self.reference_voltage - self.calibration_offset
    }
}
/// Extract the raw code from one frame: the last run of ASCII digits.
///
/// Devices may prefix telemetry (sequence numbers, labels) before the
/// measurement, so earlier digit runs are ignored.
pub fn parse_frame(frame: &[u8]) -> Result<u64, FrameError> {
    let text = std::str::from_utf8(frame)?;
    let last = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .last()
        .ok_or(FrameError::NoDigits)?;
    last.parse::<u64>()
        .map_err(|_| FrameError::Overflow(last.to_string()))
}
/// Sent by the worker when it stops on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    TransportFailed(String),
}
/// Frame counters shared between the worker and the controller.
#[derive(Debug, Default)]
pub struct IngestCounters {
    accepted: AtomicU64,
    dropped: AtomicU64,
}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub dropped: u64,
}
impl IngestCounters {
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
/// Blocking read loop: transport frames in, samples into the buffer out.
pub struct SerialIngestor {
    transport: Box<dyn Transport>,
    buffer: Arc<SampleBuffer>,
    conversion: AdcConversion,
    origin: Instant,
    stop: Arc<AtomicBool>,
    counters: Arc<IngestCounters>,
    events: Sender<IngestEvent>,
    last_timestamp: f64,
}
impl SerialIngestor {
    pub fn new(
        transport: Box<dyn Transport>,
        buffer: Arc<SampleBuffer>,
        conversion: AdcConversion,
        origin: Instant,
        stop: Arc<AtomicBool>,
        counters: Arc<IngestCounters>,
        events: Sender<IngestEvent>,
    ) -> Self {
        Self {
            transport,
            buffer,
            conversion,
            origin,
            stop,
            counters,
            events,
            last_timestamp: 0.0,
        }
    }
    /// Handle one frame. Malformed frames are counted and dropped.
    pub fn ingest_frame(&mut self, frame: &[u8]) -> Option<Sample> {
        match parse_frame(frame) {
            Ok(raw) => {
                let value = self.conversion.to_volts(raw);
                let timestamp = self.origin.elapsed().as_secs_f64().max(self.last_timestamp);
                self.last_timestamp = timestamp;
                let sample = Sample::new(timestamp, value);
                self.buffer.append(sample);
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                Some(sample)
            }
            Err(e) => {
                debug!("dropping frame {:?}: {e}", String::from_utf8_lossy(frame).trim_end());
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
    /// Run until the stop flag is raised or the transport fails. Hands the
    /// transport back so the owner closes it after the last read.
    pub fn run(mut self) -> Box<dyn Transport> {
        info!("ingest worker started");
        while !self.stop.load(Ordering::Acquire) {
            match self.transport.read_frame() {
                Ok(Some(frame)) => {
                    self.ingest_frame(&frame);
                }
                Ok(None) => continue,
                Err(e) => {
                    error!("serial transport failed: {e}");
                    self.events
                        .send(IngestEvent::TransportFailed(e.to_string()))
                        .ok();
                    break;
                }
            }
        }
        info!("ingest worker stopped ({:?})", self.counters.stats());
        self.transport
    }
}
