//! 2x oversampling around a memoryless nonlinearity.
//!
//! The input is zero-stuffed, interpolated with a half-band FIR, shaped at
//! the doubled rate, then filtered by the same FIR and decimated. Both
//! filters are linear phase, so the round trip is a pure delay of
//! [`LATENCY_SAMPLES`] base-rate samples.

use std::f64::consts::PI;

pub const OVERSAMPLE_FACTOR: usize = 2;

/// Taps of the half-band kernel. Odd so the kernel has a centre tap.
pub const HALF_BAND_TAPS: usize = 31;

/// Round-trip delay at the oversampled rate, one group delay per filter.
const OVERSAMPLED_DELAY: usize = HALF_BAND_TAPS - 1;
const _: () = assert!(OVERSAMPLED_DELAY % OVERSAMPLE_FACTOR == 0);

/// Round-trip delay in base-rate samples.
pub const LATENCY_SAMPLES: usize = OVERSAMPLED_DELAY / OVERSAMPLE_FACTOR;

/// Blackman-windowed sinc with its cutoff at a quarter of the oversampled
/// rate, normalised to unity DC gain.
fn half_band_kernel() -> [f32; HALF_BAND_TAPS] {
    let centre = (HALF_BAND_TAPS - 1) as f64 / 2.0;
    let span = (HALF_BAND_TAPS - 1) as f64;
    let mut kernel = [0.0f64; HALF_BAND_TAPS];

    for (n, tap) in kernel.iter_mut().enumerate() {
        let m = n as f64 - centre;
        let sinc = if m == 0.0 {
            0.5
        } else {
            (PI * 0.5 * m).sin() / (PI * m)
        };
        let phase = 2.0 * PI * n as f64 / span;
        let window = 0.08f64.mul_add((2.0 * phase).cos(), 0.5f64.mul_add(-phase.cos(), 0.42));
        *tap = sinc * window;
    }

    let sum: f64 = kernel.iter().sum();
    let mut out = [0.0f32; HALF_BAND_TAPS];
    for (dst, src) in out.iter_mut().zip(kernel) {
        *dst = (src / sum) as f32;
    }
    out
}

#[derive(Clone)]
struct HalfBandFir {
    kernel: [f32; HALF_BAND_TAPS],
    history: [f32; HALF_BAND_TAPS],
    pos: usize,
}

impl HalfBandFir {
    fn new(kernel: [f32; HALF_BAND_TAPS]) -> Self {
        Self {
            kernel,
            history: [0.0; HALF_BAND_TAPS],
            pos: 0,
        }
    }

    #[inline]
    fn push(&mut self, input: f32) {
        self.pos = (self.pos + HALF_BAND_TAPS - 1) % HALF_BAND_TAPS;
        self.history[self.pos] = input;
    }

    /// Convolution over the history, newest sample first.
    #[inline]
    fn output(&self) -> f32 {
        let (wrapped, recent) = self.history.split_at(self.pos);
        let (k_recent, k_wrapped) = self.kernel.split_at(recent.len());
        let mut acc = 0.0f32;
        for (h, x) in k_recent.iter().zip(recent) {
            acc = h.mul_add(*x, acc);
        }
        for (h, x) in k_wrapped.iter().zip(wrapped) {
            acc = h.mul_add(*x, acc);
        }
        acc
    }

    fn clear(&mut self) {
        self.history = [0.0; HALF_BAND_TAPS];
        self.pos = 0;
    }
}

/// Delays the unshaped signal by [`LATENCY_SAMPLES`] so it lines up with the
/// output of an [`Oversampler`].
#[derive(Clone, Debug)]
pub struct LatencyLine {
    buffer: [f32; LATENCY_SAMPLES],
    pos: usize,
}

impl Default for LatencyLine {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyLine {
    pub const fn new() -> Self {
        Self {
            buffer: [0.0; LATENCY_SAMPLES],
            pos: 0,
        }
    }

    /// Store `input` and return the sample pushed `LATENCY_SAMPLES` calls ago.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = std::mem::replace(&mut self.buffer[self.pos], input);
        self.pos = (self.pos + 1) % LATENCY_SAMPLES;
        output
    }

    pub fn clear(&mut self) {
        self.buffer = [0.0; LATENCY_SAMPLES];
        self.pos = 0;
    }
}

#[derive(Clone)]
pub struct Oversampler {
    up: HalfBandFir,
    down: HalfBandFir,
}

impl Default for Oversampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Oversampler {
    pub fn new() -> Self {
        let kernel = half_band_kernel();
        Self {
            up: HalfBandFir::new(kernel),
            down: HalfBandFir::new(kernel),
        }
    }

    /// Run `shaper` at twice the base rate and return one base-rate sample.
    #[inline]
    pub fn process(&mut self, input: f32, mut shaper: impl FnMut(f32) -> f32) -> f32 {
        // Zero stuffing halves the passband level; the interpolator makes it up.
        self.up.push(input * OVERSAMPLE_FACTOR as f32);
        self.down.push(shaper(self.up.output()));
        let output = self.down.output();

        self.up.push(0.0);
        self.down.push(shaper(self.up.output()));

        output
    }

    pub const fn latency(&self) -> usize {
        LATENCY_SAMPLES
    }

    pub fn reset(&mut self) {
        self.up.clear();
        self.down.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn kernel_is_symmetric_half_band() {
        let kernel = half_band_kernel();
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..HALF_BAND_TAPS {
            assert!((kernel[i] - kernel[HALF_BAND_TAPS - 1 - i]).abs() < 1e-7);
        }
        // Every second tap away from the centre is a zero of the sinc.
        let centre = HALF_BAND_TAPS / 2;
        assert!(kernel[centre + 2].abs() < 1e-7);
        assert!(kernel[centre + 4].abs() < 1e-7);
    }

    #[test]
    fn identity_shaper_is_a_pure_delay() {
        let mut os = Oversampler::new();
        let input: Vec<f32> = (0..2000)
            .map(|i| 0.5 * (2.0 * PI * 1000.0 * i as f32 / 48_000.0).sin())
            .collect();
        let output: Vec<f32> = input.iter().map(|&x| os.process(x, |s| s)).collect();

        let delay = os.latency();
        for n in 200..input.len() {
            let err = (output[n] - input[n - delay]).abs();
            assert!(err < 5e-3, "sample {n}: error {err}");
        }
    }

    #[test]
    fn latency_line_matches_oversampler_delay() {
        let mut line = LatencyLine::new();
        let out: Vec<f32> = (1..=40).map(|i| line.process(i as f32)).collect();
        assert!(out[..LATENCY_SAMPLES].iter().all(|&s| s == 0.0));
        assert_eq!(out[LATENCY_SAMPLES], 1.0);
        assert_eq!(out[39], (40 - LATENCY_SAMPLES) as f32);

        line.clear();
        assert_eq!(line.process(7.0), 0.0);
    }

    #[test]
    fn dc_settles_at_unity() {
        let mut os = Oversampler::new();
        let mut last = 0.0;
        for _ in 0..200 {
            last = os.process(0.25, |s| s);
        }
        assert!((last - 0.25).abs() < 1e-3);
    }

    #[test]
    fn reset_matches_fresh_instance() {
        let mut used = Oversampler::new();
        for i in 0..100 {
            used.process(i as f32 * 0.01, f32::tanh);
        }
        used.reset();
        let mut fresh = Oversampler::new();
        for i in 0..64 {
            let x = (i as f32 * 0.3).sin();
            assert_eq!(used.process(x, f32::tanh), fresh.process(x, f32::tanh));
        }
    }
}
