//! Analysis over buffer snapshots. Everything here works on copies; the
//! shared buffer is never touched.
use log::debug;
use crate::drivers::fft::{compute_spectrum, Spectrum};
use crate::drivers::filter::{FilterSpec, SosFilter};
use crate::drivers::{Sample, ScopeError};
/// Summary of a captured window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
    pub count: usize,
}
impl SignalStats {
    pub fn peak_to_peak(&self) -> f64 {
        self.max - self.min
    }
}
/// Mean of every full window of `window` consecutive values (`n - w + 1` outputs).
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }
    let scale = 1.0 / window as f64;
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() * scale)
        .collect()
}
/// Moving average over samples; each mean keeps the timestamp of the first
/// sample of its window.
pub fn smooth(samples: &[Sample], window: usize) -> Vec<Sample> {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    moving_average(&values, window)
        .into_iter()
        .zip(samples)
        .map(|(value, s)| Sample::new(s.timestamp, value))
        .collect()
}
/// Mean spacing between consecutive timestamps.
pub fn mean_interval(samples: &[Sample]) -> Result<f64, ScopeError> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Err(ScopeError::InsufficientData {
            required: 2,
            available: 0,
        });
    };
    if samples.len() < 2 {
        return Err(ScopeError::InsufficientData {
            required: 2,
            available: samples.len(),
        });
    }
    // deltas telescope, so their mean is the span over the gap count
    let dt = (last.timestamp - first.timestamp) / (samples.len() - 1) as f64;
    if !(dt.is_finite() && dt > 0.0) {
        return Err(ScopeError::InvalidSampleInterval(dt));
    }
    Ok(dt)
}
pub fn estimate_sample_rate(samples: &[Sample]) -> Result<f64, ScopeError> {
    mean_interval(samples).map(|dt| 1.0 / dt)
}
/// Zero-phase Butterworth filtering at the estimated sample rate.
pub fn filter(samples: &[Sample], spec: &FilterSpec) -> Result<Vec<Sample>, ScopeError> {
    let required = spec.min_samples().max(2);
    if samples.len() < required {
        return Err(ScopeError::InsufficientData {
            required,
            available: samples.len(),
        });
    }
    let rate = estimate_sample_rate(samples)?;
    let sos = SosFilter::butterworth(spec, rate)?;
    debug!(
        "filtering {} samples at {rate:.2} Hz with {} sections",
        samples.len(),
        sos.sections().len()
    );
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let filtered = sos.filtfilt(&values, spec.edge_padding());
    Ok(samples
        .iter()
        .zip(filtered)
        .map(|(s, value)| Sample::new(s.timestamp, value))
        .collect())
}
pub fn spectrum(samples: &[Sample]) -> Result<Spectrum, ScopeError> {
    let dt = mean_interval(samples)?;
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    compute_spectrum(&values, dt)
}
pub fn statistics(samples: &[Sample]) -> Result<SignalStats, ScopeError> {
    if samples.is_empty() {
        return Err(ScopeError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for s in samples {
        min = min.min(s.value);
        max = max.max(s.value);
        sum += s.value;
        sum_sq += s.value * s.value;
    }
    let count = samples.len();
    Ok(SignalStats {
        min,
        max,
        mean: sum / count as f64,
        rms: (sum_sq / count as f64).sqrt(),
        count,
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    fn sampled(rate: f64, n: usize, f: impl Fn(f64) -> f64) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let t = i as f64 / rate;
                Sample::new(t, f(t))
            })
            .collect()
    }
    #[test]
    fn smooth_three_samples_window_two() {
        let samples = vec![
            Sample::new(0.0, 1.0),
            Sample::new(1.0, 2.0),
            Sample::new(2.0, 3.0),
        ];
        assert_eq!(moving_average(&[1.0, 2.0, 3.0], 2), vec![1.5, 2.5]);
        assert_eq!(
            smooth(&samples, 2),
            vec![Sample::new(0.0, 1.5), Sample::new(1.0, 2.5)]
        );
    }
    #[test]
    fn moving_average_length() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        for w in 1..=10 {
            assert_eq!(moving_average(&values, w).len(), 10 - w + 1);
        }
        assert!(moving_average(&values, 11).is_empty());
        assert!(moving_average(&values, 0).is_empty());
        assert!(moving_average(&[], 1).is_empty());
    }
    #[test]
    fn sample_rate_from_timestamps() {
        let samples = sampled(250.0, 100, |_| 0.0);
        assert!((estimate_sample_rate(&samples).unwrap() - 250.0).abs() < 1e-6);
        assert!(matches!(
            estimate_sample_rate(&samples[..1]),
            Err(ScopeError::InsufficientData { available: 1, .. })
        ));
        let frozen = vec![Sample::new(1.0, 0.0), Sample::new(1.0, 1.0)];
        assert!(matches!(
            estimate_sample_rate(&frozen),
            Err(ScopeError::InvalidSampleInterval(_))
        ));
    }
    #[test]
    fn filter_keeps_length_and_timestamps() {
        let samples = sampled(200.0, 300, |t| (2.0 * PI * 3.0 * t).sin() + 0.3 * (2.0 * PI * 80.0 * t).sin());
        let out = filter(&samples, &FilterSpec::auto_lowpass(200.0)).unwrap();
        assert_eq!(out.len(), samples.len());
        assert!(out.iter().zip(&samples).all(|(a, b)| a.timestamp == b.timestamp));
        // 80 Hz is far past the 10 Hz cutoff
        let residual = out[50..250]
            .iter()
            .map(|s| (s.value - (2.0 * PI * 3.0 * s.timestamp).sin()).abs())
            .fold(0.0, f64::max);
        assert!(residual < 0.05, "residual {residual}");
    }
    #[test]
    fn filter_needs_more_than_padding() {
        let spec = FilterSpec::lowpass(5.0, 4);
        let short = sampled(100.0, 12, |_| 1.0);
        assert!(matches!(
            filter(&short, &spec),
            Err(ScopeError::InsufficientData { required: 13, available: 12 })
        ));
        let enough = sampled(100.0, 13, |_| 1.0);
        assert_eq!(filter(&enough, &spec).unwrap().len(), 13);
    }
    #[test]
    fn filter_rejects_cutoff_past_nyquist() {
        let samples = sampled(100.0, 200, |_| 0.0);
        assert!(matches!(
            filter(&samples, &FilterSpec::lowpass(60.0, 2)),
            Err(ScopeError::InvalidFilter(_))
        ));
    }
    #[test]
    fn spectrum_of_samples_uses_mean_interval() {
        let samples = sampled(500.0, 500, |t| (2.0 * PI * 40.0 * t).sin());
        let spectrum = spectrum(&samples).unwrap();
        assert_eq!(spectrum.len(), 251);
        let (freq, mag) = spectrum.peak().unwrap();
        assert!((freq - 40.0).abs() <= spectrum.resolution_hz());
        assert!(mag > 0.9);
    }
    #[test]
    fn statistics_summary() {
        let samples: Vec<Sample> = [3.0, -1.0, 4.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(i as f64, *v))
            .collect();
        let stats = statistics(&samples).unwrap();
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 1.75);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.peak_to_peak(), 5.0);
        assert!((stats.rms - (27.0f64 / 4.0).sqrt()).abs() < 1e-12);
        assert!(matches!(
            statistics(&[]),
            Err(ScopeError::InsufficientData { required: 1, available: 0 })
        ));
    }
}
