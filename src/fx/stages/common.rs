use std::f64::consts::PI;

/// Lowest cutoff a biquad is designed at. Anything lower is pulled up to keep
/// the poles away from the unit circle.
pub const MIN_CUTOFF_HZ: f32 = 10.0;
/// Highest cutoff as a fraction of the sample rate, just under Nyquist.
pub const MAX_CUTOFF_RATIO: f32 = 0.49;
pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;
const MIN_Q: f32 = 0.05;

/// Calculate a one-pole smoothing coefficient from a time constant in milliseconds.
///
/// Returns `exp(-1 / (sample_rate * time_ms * 0.001))`.
#[inline]
pub fn calculate_coefficient(time_ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (sample_rate * 0.001 * time_ms)).exp()
}

/// Clamp a cutoff into the range a biquad can be designed for at `sample_rate`.
pub fn clamp_cutoff(cutoff_hz: f32, sample_rate: f32) -> f32 {
    let max = sample_rate * MAX_CUTOFF_RATIO;
    if cutoff_hz.is_nan() {
        return MIN_CUTOFF_HZ.min(max);
    }
    cutoff_hz.clamp(MIN_CUTOFF_HZ.min(max), max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    HighPass,
    LowPass,
    /// Constant 0 dB peak gain band-pass.
    BandPass,
}

/// Normalised biquad coefficients (`a0` divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// RBJ cookbook design. Computed in `f64` and rounded once, so the same
    /// inputs always give bit-identical coefficients.
    pub fn design(kind: BiquadKind, cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let cutoff = f64::from(clamp_cutoff(cutoff_hz, sample_rate));
        let q = f64::from(q.max(MIN_Q));
        let omega = 2.0 * PI * cutoff / f64::from(sample_rate);
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let (b0, b1, b2) = match kind {
            BiquadKind::HighPass => (
                (1.0 + cos_omega) / 2.0,
                -(1.0 + cos_omega),
                (1.0 + cos_omega) / 2.0,
            ),
            BiquadKind::LowPass => (
                (1.0 - cos_omega) / 2.0,
                1.0 - cos_omega,
                (1.0 - cos_omega) / 2.0,
            ),
            BiquadKind::BandPass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct History {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

/// Second-order IIR section in Direct Form I with one history per channel.
///
/// Coefficients follow the last `(cutoff, q, sample_rate)` triple. Until a
/// sample rate is known the design is deferred and the section passes audio
/// through unchanged.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: BiquadKind,
    cutoff: f32,
    q: f32,
    sample_rate: Option<f32>,
    coeffs: BiquadCoeffs,
    history: Vec<History>,
}

impl Biquad {
    pub const fn new(kind: BiquadKind, cutoff: f32, q: f32) -> Self {
        Self {
            kind,
            cutoff,
            q,
            sample_rate: None,
            coeffs: BiquadCoeffs::IDENTITY,
            history: Vec::new(),
        }
    }

    pub fn prepare(&mut self, sample_rate: f32, channels: usize) {
        self.sample_rate = Some(sample_rate);
        self.history = vec![History::default(); channels];
        self.update_coefficients();
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = cutoff;
        self.update_coefficients();
    }

    pub const fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub const fn sample_rate(&self) -> Option<f32> {
        self.sample_rate
    }

    pub const fn coefficients(&self) -> BiquadCoeffs {
        self.coeffs
    }

    fn update_coefficients(&mut self) {
        if let Some(sample_rate) = self.sample_rate {
            self.coeffs = BiquadCoeffs::design(self.kind, self.cutoff, self.q, sample_rate);
        }
    }

    /// Filter one channel in place. Channels the section was not prepared for
    /// are left untouched.
    pub fn process_channel(&mut self, channel: usize, samples: &mut [f32]) {
        let Some(h) = self.history.get_mut(channel) else {
            return;
        };
        let c = self.coeffs;

        for sample in samples.iter_mut() {
            let x = *sample;
            let y = c.b0 * x + c.b1 * h.x1 + c.b2 * h.x2 - c.a1 * h.y1 - c.a2 * h.y2;
            h.x2 = h.x1;
            h.x1 = x;
            h.y2 = h.y1;
            h.y1 = y;
            *sample = y;
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(History::default());
    }

    pub fn release(&mut self) {
        self.history = Vec::new();
        self.sample_rate = None;
        self.coeffs = BiquadCoeffs::IDENTITY;
    }
}
