use rustfft::{num_complex::Complex64, FftPlanner};
use crate::drivers::ScopeError;
/// One-sided magnitude spectrum of a real signal.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    pub frequencies_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
    pub sample_interval: f64,
}
impl Spectrum {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }
    pub fn resolution_hz(&self) -> f64 {
        self.frequencies_hz.get(1).copied().unwrap_or(0.0)
    }
    /// Strongest bin above DC as `(frequency, magnitude)`.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .zip(&self.magnitudes)
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(f, m)| (*f, *m))
    }
}
/// FFT over the whole input, `n/2 + 1` bins spaced `1 / (n * dt)`.
///
/// Non-DC bins are scaled by `2/n` so a sine of amplitude `A` reads as `A`;
/// the DC bin is scaled by `1/n` and reads as the mean.
pub fn compute_spectrum(values: &[f64], sample_interval: f64) -> Result<Spectrum, ScopeError> {
    let n = values.len();
    if n < 2 {
        return Err(ScopeError::InsufficientData {
            required: 2,
            available: n,
        });
    }
    if !(sample_interval.is_finite() && sample_interval > 0.0) {
        return Err(ScopeError::InvalidSampleInterval(sample_interval));
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fft.process(&mut buffer);
    let bins = n / 2 + 1;
    let spacing = 1.0 / (n as f64 * sample_interval);
    let frequencies_hz = (0..bins).map(|k| k as f64 * spacing).collect();
    let magnitudes = buffer
        .iter()
        .take(bins)
        .enumerate()
        .map(|(k, c)| {
            let scale = if k == 0 { 1.0 } else { 2.0 };
            c.norm() * scale / n as f64
        })
        .collect();
    Ok(Spectrum {
        frequencies_hz,
        magnitudes,
        sample_interval,
    })
}
