//! EPTScope acquisition core: serial ingestion of STM32 ADC samples into a
//! bounded buffer, an acquisition state machine, signal analysis and
//! CSV/text persistence.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod recorder;
pub mod session;
pub mod types;
pub use config::ScopeConfig;
pub use drivers::{Sample, SampleBuffer, ScopeError};
pub use engine::AcquisitionController;
pub use recorder::{Recorder, SampleFileFormat};
pub use session::{Analysis, DisplayFrame, ScopeSession};
pub use types::{AcquisitionState, ConnectionMode, TriggerSpec};
