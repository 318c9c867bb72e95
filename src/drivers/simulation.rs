use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::drivers::source::{Connector, Transport};
use crate::drivers::ScopeError;
/// Shape of the signal produced by the simulated instrument.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedSignal {
    pub sample_rate_hz: f64,
    pub frequency_hz: f64,
    /// Peak amplitude in ADC codes around mid-scale.
    pub amplitude_codes: f64,
    /// Uniform noise half-width in ADC codes.
    pub noise_codes: f64,
    pub full_scale_code: u32,
    pub seed: u64,
}
impl Default for SimulatedSignal {
    fn default() -> Self {
        Self {
            sample_rate_hz: 200.0,
            frequency_hz: 5.0,
            amplitude_codes: 1200.0,
            noise_codes: 60.0,
            full_scale_code: 4095,
            seed: 7,
        }
    }
}
/// Stand-in for the STM32 board: emits `seq=<n> adc=<code>` lines at a fixed rate.
pub struct SimulatedConnector {
    pub signal: SimulatedSignal,
}
impl Connector for SimulatedConnector {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Transport>, ScopeError> {
        log::info!("simulated instrument on {port} @ {baud_rate} baud");
        Ok(Box::new(SimulatedTransport::new(self.signal, read_timeout)))
    }
}
pub struct SimulatedTransport {
    signal: SimulatedSignal,
    read_timeout: Duration,
    rng: StdRng,
    started: Instant,
    emitted: u64,
}
impl SimulatedTransport {
    pub fn new(signal: SimulatedSignal, read_timeout: Duration) -> Self {
        Self {
            rng: StdRng::seed_from_u64(signal.seed),
            signal,
            read_timeout,
            started: Instant::now(),
            emitted: 0,
        }
    }
    fn next_code(&mut self) -> u32 {
        let t = self.emitted as f64 / self.signal.sample_rate_hz;
        let mid = self.signal.full_scale_code as f64 / 2.0;
        let noise = if self.signal.noise_codes > 0.0 {
            self.rng
                .gen_range(-self.signal.noise_codes..self.signal.noise_codes)
        } else {
            0.0
        };
        let code = mid + self.signal.amplitude_codes * (2.0 * PI * self.signal.frequency_hz * t).sin() + noise;
        code.round().clamp(0.0, self.signal.full_scale_code as f64) as u32
    }
}
impl Transport for SimulatedTransport {
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ScopeError> {
        let due = self.started + Duration::from_secs_f64(self.emitted as f64 / self.signal.sample_rate_hz);
        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > self.read_timeout {
                thread::sleep(self.read_timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }
        let code = self.next_code();
        let line = format!("seq={} adc={}\n", self.emitted, code);
        self.emitted += 1;
        Ok(Some(line.into_bytes()))
    }
}
