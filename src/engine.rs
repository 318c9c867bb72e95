// src/engine.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use log::{info, warn};
use crate::config::ScopeConfig;
use crate::drivers::source::Transport;
use crate::drivers::{
    AdcConversion, Connector, IngestCounters, IngestEvent, IngestStats, Sample, SampleBuffer,
    ScopeError, SerialIngestor, NO_PORTS_PLACEHOLDER,
};
use crate::types::{AcquisitionState, Action};

// the running ingest thread and what is needed to stop it
struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Box<dyn Transport>>,
    events: Receiver<IngestEvent>,
}

impl Worker {
    fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        match self.handle.join() {
            // transport closes here, after the worker's last read
            Ok(transport) => drop(transport),
            Err(_) => warn!("ingest worker panicked"),
        }
    }
}

/// Owns the acquisition lifecycle: opens the transport, runs the ingest
/// worker and tracks `Idle / Running / Paused / Error`.
pub struct AcquisitionController<C: Connector> {
    connector: C,
    buffer: Arc<SampleBuffer>,
    conversion: AdcConversion,
    read_timeout: Duration,
    state: AcquisitionState,
    origin: Instant,
    counters: Arc<IngestCounters>,
    worker: Option<Worker>,
}

impl<C: Connector> AcquisitionController<C> {
    pub fn new(connector: C, config: &ScopeConfig, buffer: Arc<SampleBuffer>) -> Self {
        Self {
            connector,
            buffer,
            conversion: config.conversion,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            state: AcquisitionState::Idle,
            origin: Instant::now(),
            counters: Arc::new(IngestCounters::default()),
            worker: None,
        }
    }

    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.counters.stats()
    }

    fn reject(&self, action: Action) -> ScopeError {
        ScopeError::InvalidTransition {
            action,
            state: self.state.clone(),
        }
    }

    pub fn start(&mut self, port: &str, baud_rate: u32) -> Result<(), ScopeError> {
        if !self.state.can_start() {
            return Err(self.reject(Action::Start));
        }
        let port = port.trim();
        if port.is_empty() || port == NO_PORTS_PLACEHOLDER {
            return Err(ScopeError::NoPortAvailable);
        }
        let transport = self.connector.open(port, baud_rate, self.read_timeout)?;
        if self.state == AcquisitionState::Idle {
            self.buffer.clear();
            self.origin = Instant::now();
            self.counters = Arc::new(IngestCounters::default());
        }
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let ingestor = SerialIngestor::new(
            transport,
            Arc::clone(&self.buffer),
            self.conversion,
            self.origin,
            Arc::clone(&stop),
            Arc::clone(&self.counters),
            tx,
        );
        let handle = thread::Builder::new()
            .name("eptscope-ingest".into())
            .spawn(move || ingestor.run())?;
        self.worker = Some(Worker {
            stop,
            handle,
            events: rx,
        });
        let verb = if self.state == AcquisitionState::Paused { "resumed" } else { "started" };
        info!("acquisition {verb} on {port} @ {baud_rate} baud");
        self.state = AcquisitionState::Running;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ScopeError> {
        if !self.state.can_pause() {
            return Err(self.reject(Action::Pause));
        }
        self.halt_worker();
        self.state = AcquisitionState::Paused;
        info!("acquisition paused with {} samples buffered", self.buffer.len());
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ScopeError> {
        if self.state == AcquisitionState::Idle {
            return Err(self.reject(Action::Stop));
        }
        self.halt_worker();
        self.state = AcquisitionState::Idle;
        info!("acquisition stopped");
        Ok(())
    }

    /// Apply worker notifications. Call once per consumer tick.
    pub fn poll(&mut self) -> &AcquisitionState {
        let event = match &self.worker {
            Some(worker) => match worker.events.try_recv() {
                Ok(event) => Some(event),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    Some(IngestEvent::TransportFailed("ingest worker exited".into()))
                }
            },
            None => None,
        };
        if let Some(IngestEvent::TransportFailed(reason)) = event {
            self.halt_worker();
            warn!("acquisition failed: {reason}");
            self.state = AcquisitionState::Error(reason);
        }
        &self.state
    }

    /// Discard buffered samples. Valid in every state; a running worker keeps
    /// appending and sequence numbers carry on, so recorder cursors stay valid.
    pub fn clear(&self) {
        let discarded = self.buffer.len();
        self.buffer.clear();
        info!("cleared {discarded} buffered samples ({})", self.state);
    }

    /// Replace the buffer with previously captured samples.
    pub fn load_samples(&mut self, samples: &[Sample]) -> Result<(), ScopeError> {
        if self.state.is_running() {
            return Err(self.reject(Action::Load));
        }
        self.buffer.replace(samples);
        info!("loaded {} samples ({} kept)", samples.len(), self.buffer.len());
        Ok(())
    }

    fn halt_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

impl<C: Connector> Drop for AcquisitionController<C> {
    fn drop(&mut self) {
        self.halt_worker();
    }
}
