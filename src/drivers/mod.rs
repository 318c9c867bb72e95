// src/drivers/mod.rs
// acquisition and analysis building blocks, re-exported for the controller and session
pub mod buffer;
pub mod error;
pub mod fft;
pub mod filter;
pub mod ingest;
pub mod pipeline;
pub mod simulation;
pub mod source;
pub use buffer::{NewSamples, Sample, SampleBuffer};
pub use error::{FrameError, PersistenceError, ScopeError};
pub use fft::{compute_spectrum, Spectrum};
pub use filter::{FilterKind, FilterSpec, SosFilter};
pub use ingest::{AdcConversion, IngestCounters, IngestEvent, IngestStats, SerialIngestor};
pub use pipeline::SignalStats;
pub use simulation::{SimulatedConnector, SimulatedSignal};
pub use source::{
    list_ports, Connector, LineTransport, PortInfo, SerialConnector, Transport,
    NO_PORTS_PLACEHOLDER,
};
#[cfg(test)]
pub use source::scripted::{ScriptStep, ScriptedConnector, ScriptedTransport};
