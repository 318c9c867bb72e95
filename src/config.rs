// src/config.rs
use std::path::Path;
use anyhow::Context;
use log::warn;
use serde::{Deserialize, Serialize};
use crate::drivers::{AdcConversion, FilterSpec, ScopeError, SimulatedSignal};
use crate::types::{ConnectionMode, TriggerSpec};

/// Baud rates offered by the port selector.
pub const SUPPORTED_BAUD_RATES: [u32; 3] = [115_200, 9_600, 250_000];

/// Runtime settings. Every field has a default, so a JSON file only needs the
/// keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub mode: ConnectionMode,
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub capacity: usize,
    pub conversion: AdcConversion,
    pub smoothing_window: usize,
    pub tick_interval_ms: u64,
    pub trigger: TriggerSpec,
    /// `lowpass:<hz>[:order]` style selection; auto low-pass when absent.
    pub filter: Option<String>,
    pub simulated_rate_hz: f64,
    pub simulated_frequency_hz: f64,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        let signal = SimulatedSignal::default();
        Self {
            mode: ConnectionMode::Hardware,
            port: None,
            baud_rate: SUPPORTED_BAUD_RATES[0],
            read_timeout_ms: 100,
            capacity: 1000,
            conversion: AdcConversion::default(),
            smoothing_window: 5,
            tick_interval_ms: 50,
            trigger: TriggerSpec::default(),
            filter: None,
            simulated_rate_hz: signal.sample_rate_hz,
            simulated_frequency_hz: signal.frequency_hz,
        }
    }
}

impl ScopeConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.baud_rate == 0 {
            return Err(ScopeError::Config("baud_rate must be positive".into()));
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            // non-standard rates are passed through to the driver
            warn!("baud rate {} is not one of {:?}", self.baud_rate, SUPPORTED_BAUD_RATES);
        }
        if self.read_timeout_ms == 0 {
            return Err(ScopeError::Config("read_timeout_ms must be positive".into()));
        }
        if self.capacity == 0 {
            return Err(ScopeError::Config("capacity must be at least 1".into()));
        }
        if self.smoothing_window == 0 {
            return Err(ScopeError::Config("smoothing_window must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ScopeError::Config("tick_interval_ms must be positive".into()));
        }
        let conv = &self.conversion;
        if conv.full_scale_code == 0 || !conv.reference_voltage.is_finite() || !conv.calibration_offset.is_finite() {
            return Err(ScopeError::Config(format!("invalid ADC conversion {conv:?}")));
        }
        if !self.trigger.threshold.is_finite() || self.trigger.pretrigger_percent() > 100 {
            return Err(ScopeError::Config(format!("invalid trigger {:?}", self.trigger)));
        }
        if !(self.simulated_rate_hz.is_finite() && self.simulated_rate_hz > 0.0) {
            return Err(ScopeError::Config("simulated_rate_hz must be positive".into()));
        }
        self.filter_spec()?;
        Ok(())
    }

    pub fn filter_spec(&self) -> Result<Option<FilterSpec>, ScopeError> {
        self.filter.as_deref().map(str::parse).transpose()
    }

    pub fn simulated_signal(&self) -> SimulatedSignal {
        SimulatedSignal {
            sample_rate_hz: self.simulated_rate_hz,
            frequency_hz: self.simulated_frequency_hz,
            full_scale_code: self.conversion.full_scale_code,
            ..SimulatedSignal::default()
        }
    }
}
