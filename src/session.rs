// src/session.rs
use std::path::Path;
use std::sync::Arc;
use log::{debug, info, warn};
use crate::config::ScopeConfig;
use crate::drivers::pipeline::{self, SignalStats};
use crate::drivers::{
    Connector, FilterSpec, IngestStats, Sample, SampleBuffer, ScopeError, Spectrum,
};
use crate::engine::AcquisitionController;
use crate::recorder::{self, Recorder};
use crate::types::{AcquisitionState, TriggerSpec};

/// What the display draws on one tick.
#[derive(Clone, Debug)]
pub struct DisplayFrame {
    pub state: AcquisitionState,
    pub samples: Vec<Sample>,
    pub smoothed: Vec<Sample>,
    pub stats: Option<SignalStats>,
    pub trigger_level: f64,
    pub recording: bool,
    pub recorded_this_tick: usize,
    pub ingest: IngestStats,
}

/// Offline analysis of the current buffer.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub sample_rate_hz: f64,
    pub stats: SignalStats,
    pub filter: FilterSpec,
    pub filtered: Vec<Sample>,
    pub spectrum: Spectrum,
}

/// Application context: one per run, owns everything the consumer loop touches.
pub struct ScopeSession<C: Connector> {
    config: ScopeConfig,
    controller: AcquisitionController<C>,
    recorder: Recorder,
    trigger: TriggerSpec,
    smoothing_window: usize,
}

impl<C: Connector> ScopeSession<C> {
    pub fn new(connector: C, config: ScopeConfig) -> Result<Self, ScopeError> {
        config.validate()?;
        let buffer = Arc::new(SampleBuffer::with_capacity(config.capacity));
        let controller = AcquisitionController::new(connector, &config, buffer);
        Ok(Self {
            trigger: config.trigger,
            smoothing_window: config.smoothing_window,
            controller,
            recorder: Recorder::new(),
            config,
        })
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn state(&self) -> &AcquisitionState {
        self.controller.state()
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        self.controller.buffer()
    }

    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    pub fn trigger_mut(&mut self) -> &mut TriggerSpec {
        &mut self.trigger
    }

    pub fn set_smoothing_window(&mut self, window: usize) {
        self.smoothing_window = window.max(1);
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_armed()
    }

    pub fn start(&mut self, port: &str) -> Result<(), ScopeError> {
        self.controller.start(port, self.config.baud_rate)
    }

    pub fn pause(&mut self) -> Result<(), ScopeError> {
        self.controller.pause()
    }

    /// Stop acquisition and close any recording. The recording is closed
    /// even when the controller is already idle.
    pub fn stop(&mut self) -> Result<(), ScopeError> {
        let stopped = self.controller.stop();
        self.flush_recording();
        stopped
    }

    /// Empty the display buffer. Samples not yet written to an armed
    /// recording are written first.
    pub fn clear(&mut self) -> Result<(), ScopeError> {
        self.recorder.record_new(self.controller.buffer())?;
        self.controller.clear();
        Ok(())
    }

    pub fn start_recording(&mut self, path: impl AsRef<Path>) -> Result<(), ScopeError> {
        self.recorder
            .arm_file(path, self.controller.state(), self.controller.buffer())
    }

    pub fn stop_recording(&mut self) -> Result<u64, ScopeError> {
        self.recorder.record_new(self.controller.buffer())?;
        self.recorder.disarm()
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ScopeError> {
        let samples = recorder::import_file(path.as_ref())?;
        self.controller.load_samples(&samples)?;
        Ok(samples.len())
    }

    pub fn export_file(&self, path: impl AsRef<Path>) -> Result<usize, ScopeError> {
        let samples = self.controller.buffer().snapshot();
        recorder::export_file(path.as_ref(), &samples)?;
        Ok(samples.len())
    }

    fn flush_recording(&mut self) {
        if !self.recorder.is_armed() {
            return;
        }
        let flushed = self
            .recorder
            .record_new(self.controller.buffer())
            .and_then(|_| self.recorder.disarm());
        if let Err(e) = flushed {
            warn!("closing recording failed: {e}");
        }
    }

    /// One consumer-loop step: apply worker notifications, record new
    /// samples, and build the display frame.
    pub fn tick(&mut self) -> Result<DisplayFrame, ScopeError> {
        let state = self.controller.poll().clone();
        let recorded_this_tick = self.recorder.record_new(self.controller.buffer())?;
        if matches!(state, AcquisitionState::Error(_)) && self.recorder.is_armed() {
            info!("acquisition failed; closing recording");
            self.recorder.disarm()?;
        }
        let samples = self.controller.buffer().snapshot();
        let smoothed = pipeline::smooth(&samples, self.smoothing_window);
        let stats = pipeline::statistics(&samples).ok();
        Ok(DisplayFrame {
            state,
            samples,
            smoothed,
            stats,
            trigger_level: self.trigger.reference_level(),
            recording: self.recorder.is_armed(),
            recorded_this_tick,
            ingest: self.controller.ingest_stats(),
        })
    }

    /// Statistics, filtered trace and spectrum of the current buffer.
    /// Without an explicit filter the auto low-pass is used.
    pub fn analyze(&self, filter: Option<FilterSpec>) -> Result<Analysis, ScopeError> {
        let samples = self.controller.buffer().snapshot();
        let stats = pipeline::statistics(&samples)?;
        let sample_rate_hz = pipeline::estimate_sample_rate(&samples)?;
        let filter = filter.unwrap_or_else(|| FilterSpec::auto_lowpass(sample_rate_hz));
        debug!("analysing {} samples at {sample_rate_hz:.2} Hz with {filter:?}", samples.len());
        let filtered = pipeline::filter(&samples, &filter)?;
        let spectrum = pipeline::spectrum(&samples)?;
        Ok(Analysis {
            sample_rate_hz,
            stats,
            filter,
            filtered,
            spectrum,
        })
    }
}

impl<C: Connector> Drop for ScopeSession<C> {
    fn drop(&mut self) {
        self.flush_recording();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{ScriptStep, ScriptedConnector};
    use std::io;
    use std::thread;
    use std::time::{Duration, Instant};

    fn session(script: Vec<ScriptStep>) -> ScopeSession<ScriptedConnector> {
        let config = ScopeConfig {
            read_timeout_ms: 5,
            smoothing_window: 2,
            ..ScopeConfig::default()
        };
        ScopeSession::new(ScriptedConnector::new(script), config).unwrap()
    }

    fn tick_until(
        session: &mut ScopeSession<ScriptedConnector>,
        mut done: impl FnMut(&DisplayFrame) -> bool,
    ) -> DisplayFrame {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let frame = session.tick().unwrap();
            if done(&frame) {
                return frame;
            }
            assert!(Instant::now() < deadline, "timed out waiting");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn tick_builds_display_frame() {
        let mut s = session(vec![
            ScriptStep::Frame(b"ADC: 0\n".to_vec()),
            ScriptStep::Frame(b"noise\n".to_vec()),
            ScriptStep::Frame(b"ADC: 4095\n".to_vec()),
        ]);
        s.trigger_mut().threshold = 1.2;
        s.start("COM3").unwrap();
        let frame = tick_until(&mut s, |f| f.samples.len() == 2);
        assert_eq!(frame.state, AcquisitionState::Running);
        assert_eq!(frame.smoothed.len(), 1);
        assert!((frame.smoothed[0].value - 1.05).abs() < 1e-9);
        let stats = frame.stats.unwrap();
        assert!((stats.peak_to_peak() - 3.3).abs() < 1e-9);
        assert_eq!(frame.trigger_level, 1.2);
        assert_eq!(frame.ingest, IngestStats { accepted: 2, dropped: 1 });
        assert!(!frame.recording);
    }

    #[test]
    fn recording_follows_ticks_and_closes_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut script: Vec<ScriptStep> = (0..5)
            .map(|i| ScriptStep::Frame(format!("ADC: {}\n", i * 100).into_bytes()))
            .collect();
        script.push(ScriptStep::Fail(io::ErrorKind::BrokenPipe));
        let mut s = session(script);
        s.start_recording(&path).unwrap();
        s.start("COM3").unwrap();
        let frame = tick_until(&mut s, |f| matches!(f.state, AcquisitionState::Error(_)));
        assert!(!frame.recording);
        let recorded = recorder::import_file(&path).unwrap();
        assert_eq!(recorded, s.buffer().snapshot());
        assert_eq!(recorded.len(), 5);
        assert!(s.start_recording(dir.path().join("again.csv")).is_err());
        s.stop().unwrap();
    }

    #[test]
    fn clear_keeps_recording_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleared.csv");
        let mut s = session(Vec::new());
        s.start_recording(&path).unwrap();
        s.start("COM3").unwrap();
        let all: Vec<Sample> = (0..6).map(|i| Sample::new(i as f64 * 0.01, i as f64)).collect();
        s.buffer().append(all[0]);
        assert_eq!(s.tick().unwrap().recorded_this_tick, 1);
        // two samples arrive between ticks and are cleared before the next one
        s.buffer().append(all[1]);
        s.buffer().append(all[2]);
        s.clear().unwrap();
        let frame = s.tick().unwrap();
        assert!(frame.samples.is_empty());
        assert_eq!(frame.state, AcquisitionState::Running);
        for sample in &all[3..] {
            s.buffer().append(*sample);
        }
        s.tick().unwrap();
        assert_eq!(s.stop_recording().unwrap(), 6);
        assert_eq!(recorder::import_file(&path).unwrap(), all);
        s.stop().unwrap();
    }

    #[test]
    fn stop_when_idle_still_closes_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idle.csv");
        let mut s = session(Vec::new());
        s.start_recording(&path).unwrap();
        assert!(s.is_recording());
        assert!(matches!(s.stop(), Err(ScopeError::InvalidTransition { .. })));
        assert!(!s.is_recording());
        assert!(recorder::import_file(&path).unwrap().is_empty());
        s.start_recording(dir.path().join("next.csv")).unwrap();
    }

    #[test]
    fn load_then_analyze_offline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.txt");
        let samples: Vec<Sample> = (0..400)
            .map(|i| {
                let t = i as f64 / 200.0;
                Sample::new(t, (2.0 * std::f64::consts::PI * 5.0 * t).sin())
            })
            .collect();
        recorder::export_file(&path, &samples).unwrap();
        let mut s = session(Vec::new());
        assert_eq!(s.load_file(&path).unwrap(), 400);
        let analysis = s.analyze(None).unwrap();
        assert!((analysis.sample_rate_hz - 200.0).abs() < 1e-6);
        assert_eq!(analysis.filter, FilterSpec::auto_lowpass(analysis.sample_rate_hz));
        assert_eq!(analysis.filtered.len(), 400);
        let (peak, _) = analysis.spectrum.peak().unwrap();
        assert!((peak - 5.0).abs() <= analysis.spectrum.resolution_hz());

        let out = dir.path().join("copy.csv");
        assert_eq!(s.export_file(&out).unwrap(), 400);
        assert_eq!(recorder::import_file(&out).unwrap(), samples);
    }

    #[test]
    fn analyze_empty_buffer_reports_insufficient_data() {
        let s = session(Vec::new());
        assert!(matches!(s.analyze(None), Err(ScopeError::InsufficientData { .. })));
    }
}
