use std::f64::consts::PI;
use std::str::FromStr;
use rustfft::num_complex::Complex64;
use crate::drivers::ScopeError;
/// Orders above this lose too much precision in the section cascade.
pub const MAX_FILTER_ORDER: u32 = 12;
const DEFAULT_ORDER: u32 = 4;
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterKind {
    Lowpass { cutoff_hz: f64 },
    Highpass { cutoff_hz: f64 },
    Bandpass { low_hz: f64, high_hz: f64 },
}
/// Butterworth filter request, built per invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub order: u32,
}
impl FilterSpec {
    pub fn lowpass(cutoff_hz: f64, order: u32) -> Self {
        Self {
            kind: FilterKind::Lowpass { cutoff_hz },
            order,
        }
    }
    pub fn highpass(cutoff_hz: f64, order: u32) -> Self {
        Self {
            kind: FilterKind::Highpass { cutoff_hz },
            order,
        }
    }
    pub fn bandpass(low_hz: f64, high_hz: f64, order: u32) -> Self {
        Self {
            kind: FilterKind::Bandpass { low_hz, high_hz },
            order,
        }
    }
    /// Order 4 low-pass at a tenth of Nyquist.
    pub fn auto_lowpass(sample_rate_hz: f64) -> Self {
        Self::lowpass(0.1 * 0.5 * sample_rate_hz, DEFAULT_ORDER)
    }
    /// Samples added on each side by the odd extension.
    pub fn edge_padding(&self) -> usize {
        3 * self.order as usize
    }
    pub fn min_samples(&self) -> usize {
        self.edge_padding() + 1
    }
}
/// Parses `lowpass:<hz>[:order]`, `highpass:<hz>[:order]` or
/// `bandpass:<low>:<high>[:order]`; order defaults to 4.
impl FromStr for FilterSpec {
    type Err = ScopeError;
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bad = || ScopeError::InvalidFilter(format!("cannot parse filter {text:?}"));
        let mut parts = text.trim().split(':');
        let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
        let numbers = parts
            .map(|p| p.trim().parse::<f64>().map_err(|_| bad()))
            .collect::<Result<Vec<_>, _>>()?;
        let order = |idx: usize| -> Result<u32, ScopeError> {
            match numbers.get(idx) {
                None => Ok(DEFAULT_ORDER),
                Some(o) if o.fract() == 0.0 && *o >= 0.0 && *o <= u32::MAX as f64 => Ok(*o as u32),
                Some(_) => Err(bad()),
            }
        };
        match (kind.as_str(), numbers.len()) {
            ("lowpass" | "lp", 1 | 2) => Ok(Self::lowpass(numbers[0], order(1)?)),
            ("highpass" | "hp", 1 | 2) => Ok(Self::highpass(numbers[0], order(1)?)),
            ("bandpass" | "bp", 2 | 3) => Ok(Self::bandpass(numbers[0], numbers[1], order(2)?)),
            _ => Err(bad()),
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}
impl BiquadCoeffs {
    fn response_at(&self, omega: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        (self.b0 + z1 * self.b1 + z2 * self.b2) / (1.0 + z1 * self.a1 + z2 * self.a2)
    }
    fn scaled(self, gain: f64) -> Self {
        Self {
            b0: self.b0 * gain,
            b1: self.b1 * gain,
            b2: self.b2 * gain,
            ..self
        }
    }
    // delay-line contents after an infinitely long unit step
    fn step_state(&self) -> BiquadState {
        let dc = self.dc_gain();
        BiquadState {
            z1: dc - self.b0,
            z2: self.b2 - self.a2 * dc,
        }
    }
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}
#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}
#[derive(Clone, Copy, Debug)]
struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}
impl BiquadFilter {
    fn process(&mut self, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * y + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * y;
        y
    }
}
/// Cascade of second-order sections.
#[derive(Clone, Debug, PartialEq)]
pub struct SosFilter {
    sections: Vec<BiquadCoeffs>,
}
impl SosFilter {
    /// Digital Butterworth design by bilinear transform with pre-warped edges.
    pub fn butterworth(spec: &FilterSpec, sample_rate_hz: f64) -> Result<Self, ScopeError> {
        validate(spec, sample_rate_hz)?;
        let fs2 = 2.0 * sample_rate_hz;
        let warp = |hz: f64| fs2 * (PI * hz / sample_rate_hz).tan();
        let order = spec.order as usize;
        let sections = match spec.kind {
            FilterKind::Lowpass { cutoff_hz } => {
                let wc = warp(cutoff_hz);
                let sections = prototype_sections(order, |p| wc * p, fs2, Zeros::Nyquist);
                normalize(sections, 0.0)
            }
            FilterKind::Highpass { cutoff_hz } => {
                let wc = warp(cutoff_hz);
                let sections = prototype_sections(order, |p| wc / p, fs2, Zeros::Dc);
                normalize(sections, PI)
            }
            FilterKind::Bandpass { low_hz, high_hz } => {
                let (wl, wh) = (warp(low_hz), warp(high_hz));
                let center = 2.0 * ((wl * wh).sqrt() / fs2).atan();
                normalize(bandpass_sections(order, wl, wh, fs2), center)
            }
        };
        Ok(Self { sections })
    }
    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }
    /// Magnitude of the frequency response at `hz`.
    pub fn gain_at(&self, hz: f64, sample_rate_hz: f64) -> f64 {
        let omega = 2.0 * PI * hz / sample_rate_hz;
        self.sections
            .iter()
            .map(|s| s.response_at(omega))
            .fold(Complex64::new(1.0, 0.0), |acc, h| acc * h)
            .norm()
    }
    fn run(&self, data: &mut [f64]) {
        let Some(&first) = data.first() else {
            return;
        };
        // start every section in the state a constant `first` would leave it in
        let mut level = first;
        let mut filters: Vec<BiquadFilter> = self
            .sections
            .iter()
            .map(|c| {
                let unit = c.step_state();
                let filter = BiquadFilter {
                    coeffs: *c,
                    state: BiquadState {
                        z1: unit.z1 * level,
                        z2: unit.z2 * level,
                    },
                };
                level *= c.dc_gain();
                filter
            })
            .collect();
        for x in data.iter_mut() {
            let mut value = *x;
            for filter in &mut filters {
                value = filter.process(value);
            }
            *x = value;
        }
    }
    /// Forward-backward filtering; output is time-aligned with the input.
    pub fn filtfilt(&self, input: &[f64], padding: usize) -> Vec<f64> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = padding.min(n - 1);
        let (head, tail) = (input[0], input[n - 1]);
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * head - input[i]));
        ext.extend_from_slice(input);
        ext.extend((1..=pad).map(|i| 2.0 * tail - input[n - 1 - i]));
        self.run(&mut ext);
        ext.reverse();
        self.run(&mut ext);
        ext.reverse();
        ext[pad..pad + n].to_vec()
    }
}
fn validate(spec: &FilterSpec, sample_rate_hz: f64) -> Result<(), ScopeError> {
    if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
        return Err(ScopeError::InvalidSampleInterval(1.0 / sample_rate_hz));
    }
    if spec.order == 0 || spec.order > MAX_FILTER_ORDER {
        return Err(ScopeError::InvalidFilter(format!(
            "order must be between 1 and {MAX_FILTER_ORDER}, got {}",
            spec.order
        )));
    }
    let nyquist = 0.5 * sample_rate_hz;
    let in_band = |hz: f64| hz.is_finite() && hz > 0.0 && hz < nyquist;
    match spec.kind {
        FilterKind::Lowpass { cutoff_hz } | FilterKind::Highpass { cutoff_hz } => {
            if !in_band(cutoff_hz) {
                return Err(ScopeError::InvalidFilter(format!(
                    "cutoff {cutoff_hz} Hz must lie strictly between 0 and Nyquist ({nyquist} Hz)"
                )));
            }
        }
        FilterKind::Bandpass { low_hz, high_hz } => {
            if !(in_band(low_hz) && in_band(high_hz) && low_hz < high_hz) {
                return Err(ScopeError::InvalidFilter(format!(
                    "band {low_hz}..{high_hz} Hz must be increasing and below Nyquist ({nyquist} Hz)"
                )));
            }
        }
    }
    Ok(())
}
#[derive(Clone, Copy)]
enum Zeros {
    Dc,
    Nyquist,
}
// analog Butterworth poles in the upper half plane, plus -1 for odd orders
fn prototype_poles(order: usize) -> (Vec<Complex64>, Option<Complex64>) {
    let upper = (0..order / 2)
        .map(|k| {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            Complex64::from_polar(1.0, theta)
        })
        .collect();
    let real = (order % 2 == 1).then(|| Complex64::new(-1.0, 0.0));
    (upper, real)
}
fn bilinear(s: Complex64, fs2: f64) -> Complex64 {
    (fs2 + s) / (fs2 - s)
}
fn section_from_poles(p1: Complex64, p2: Complex64, b: [f64; 3]) -> BiquadCoeffs {
    BiquadCoeffs {
        b0: b[0],
        b1: b[1],
        b2: b[2],
        a1: -(p1 + p2).re,
        a2: (p1 * p2).re,
    }
}
fn prototype_sections(
    order: usize,
    map: impl Fn(Complex64) -> Complex64,
    fs2: f64,
    zeros: Zeros,
) -> Vec<BiquadCoeffs> {
    let (pair_b, single_b) = match zeros {
        Zeros::Nyquist => ([1.0, 2.0, 1.0], [1.0, 1.0, 0.0]),
        Zeros::Dc => ([1.0, -2.0, 1.0], [1.0, -1.0, 0.0]),
    };
    let (upper, real) = prototype_poles(order);
    let mut sections: Vec<BiquadCoeffs> = upper
        .into_iter()
        .map(|p| {
            let z = bilinear(map(p), fs2);
            section_from_poles(z, z.conj(), pair_b)
        })
        .collect();
    if let Some(p) = real {
        let z = bilinear(map(p), fs2);
        sections.push(BiquadCoeffs {
            b0: single_b[0],
            b1: single_b[1],
            b2: single_b[2],
            a1: -z.re,
            a2: 0.0,
        });
    }
    sections
}
// low-pass to band-pass: s -> (s^2 + w0^2) / (s * bw); each prototype pole becomes two
fn bandpass_sections(order: usize, wl: f64, wh: f64, fs2: f64) -> Vec<BiquadCoeffs> {
    let bw = wh - wl;
    let w0_sq = wl * wh;
    let split = |p: Complex64| {
        let pb = p * bw;
        let root = (pb * pb - 4.0 * w0_sq).sqrt();
        ((pb + root) / 2.0, (pb - root) / 2.0)
    };
    // one zero at DC and one at Nyquist per section
    let b = [1.0, 0.0, -1.0];
    let (upper, real) = prototype_poles(order);
    let mut sections = Vec::with_capacity(order);
    for p in upper {
        let (s1, s2) = split(p);
        for s in [s1, s2] {
            let z = bilinear(s, fs2);
            sections.push(section_from_poles(z, z.conj(), b));
        }
    }
    if let Some(p) = real {
        let (s1, s2) = split(p);
        sections.push(section_from_poles(bilinear(s1, fs2), bilinear(s2, fs2), b));
    }
    sections
}
// unit gain for every section at the passband reference frequency
fn normalize(sections: Vec<BiquadCoeffs>, omega: f64) -> Vec<BiquadCoeffs> {
    sections
        .into_iter()
        .map(|s| {
            let gain = s.response_at(omega).norm();
            s.scaled(1.0 / gain)
        })
        .collect()
}
