// src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

// where samples come from
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub enum ConnectionMode {
    Simulation,
    #[default]
    Hardware,
}

/// Lifecycle of an acquisition, owned by the controller.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Running,
    Paused,
    Error(String),
}

impl AcquisitionState {
    pub fn is_running(&self) -> bool {
        matches!(self, AcquisitionState::Running)
    }

    // button enablement for the front end
    pub fn can_start(&self) -> bool {
        matches!(self, AcquisitionState::Idle | AcquisitionState::Paused)
    }

    pub fn can_pause(&self) -> bool {
        self.is_running()
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionState::Idle => write!(f, "idle"),
            AcquisitionState::Running => write!(f, "running"),
            AcquisitionState::Paused => write!(f, "paused"),
            AcquisitionState::Error(reason) => write!(f, "in error ({reason})"),
        }
    }
}

// controller requests, used when reporting a rejected transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Stop,
    Load,
    Record,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Stop => "stop",
            Action::Load => "load samples",
            Action::Record => "arm the recorder",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    #[default]
    Auto,
    Normal,
    Single,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerEdge {
    #[default]
    Rising,
    Falling,
}

/// Trigger settings shown to the user.
///
/// Only `threshold` has an effect: it is drawn as a horizontal reference line.
/// Acquisition is never gated on it.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub mode: TriggerMode,
    pub edge: TriggerEdge,
    pub threshold: f64,
    pretrigger_percent: u8,
}

impl TriggerSpec {
    pub fn new(mode: TriggerMode, edge: TriggerEdge, threshold: f64, pretrigger_percent: u8) -> Self {
        Self {
            mode,
            edge,
            threshold,
            pretrigger_percent: pretrigger_percent.min(100),
        }
    }

    pub fn pretrigger_percent(&self) -> u8 {
        self.pretrigger_percent
    }

    pub fn set_pretrigger_percent(&mut self, percent: u8) {
        self.pretrigger_percent = percent.min(100);
    }

    /// Parse a threshold typed by the user; keeps the old value on bad input.
    pub fn set_threshold_text(&mut self, text: &str) -> bool {
        match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => {
                self.threshold = v;
                true
            }
            _ => false,
        }
    }

    /// Level of the horizontal reference line.
    pub fn reference_level(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretrigger_is_clamped() {
        let mut trigger = TriggerSpec::new(TriggerMode::Single, TriggerEdge::Falling, 0.5, 150);
        assert_eq!(trigger.pretrigger_percent(), 100);
        trigger.set_pretrigger_percent(25);
        assert_eq!(trigger.pretrigger_percent(), 25);
    }

    #[test]
    fn bad_threshold_text_keeps_previous_level() {
        let mut trigger = TriggerSpec::default();
        assert!(trigger.set_threshold_text(" 1.25 "));
        assert_eq!(trigger.reference_level(), 1.25);
        assert!(!trigger.set_threshold_text("abc"));
        assert!(!trigger.set_threshold_text("inf"));
        assert_eq!(trigger.reference_level(), 1.25);
    }

    #[test]
    fn state_display_and_enablement() {
        assert_eq!(AcquisitionState::Error("port gone".into()).to_string(), "in error (port gone)");
        assert!(AcquisitionState::Paused.can_start());
        assert!(!AcquisitionState::Running.can_start());
        assert!(AcquisitionState::Running.can_pause());
        assert!(!AcquisitionState::Error(String::new()).can_start());
    }
}
