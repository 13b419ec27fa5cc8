use arc_swap::ArcSwap;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::radio::stages::common::lin_to_db;

/// FFT length used for every snapshot.
pub const ANALYZER_FFT_SIZE: usize = 1024;

/// Latest magnitude spectrum of the equalizer output.
#[derive(Debug, Clone, Default)]
pub struct SpectrumSnapshot {
    /// Magnitude per bin in dBFS, `ANALYZER_FFT_SIZE / 2 + 1` entries.
    pub magnitudes_db: Vec<f32>,
    /// Width of each bin in Hz.
    pub bin_hz: f32,
    /// Sample peak of the analysed frame in dBFS.
    pub peak_db: f32,
    /// Number of frames analysed since the analyzer was created.
    pub frames: u64,
}

impl SpectrumSnapshot {
    /// Magnitude of the bin nearest to `frequency`, if any frame has been analysed.
    pub fn magnitude_at(&self, frequency: f32) -> Option<f32> {
        if self.magnitudes_db.is_empty() || self.bin_hz <= 0.0 {
            return None;
        }
        let bin = (frequency / self.bin_hz).round() as usize;
        self.magnitudes_db.get(bin).copied()
    }
}

/// Collects samples and publishes a windowed magnitude spectrum every
/// [`ANALYZER_FFT_SIZE`] samples.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    frame: Vec<f32>,
    fft_input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    filled: usize,
    frames: u64,
    bin_hz: f32,
    info: Arc<ArcSwap<SpectrumSnapshot>>,
}

/// Read side of the analyzer, cheap to clone and safe to poll from any thread.
#[derive(Clone)]
pub struct AnalyzerHandle {
    info: Arc<ArcSwap<SpectrumSnapshot>>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: f64) -> (Self, AnalyzerHandle) {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(ANALYZER_FFT_SIZE);
        let fft_input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();

        let window = (0..ANALYZER_FFT_SIZE)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / ANALYZER_FFT_SIZE as f32).cos())
            .collect();

        let info = Arc::new(ArcSwap::from_pointee(SpectrumSnapshot::default()));

        (
            Self {
                fft,
                window,
                frame: vec![0.0; ANALYZER_FFT_SIZE],
                fft_input,
                spectrum,
                scratch,
                filled: 0,
                frames: 0,
                bin_hz: (sample_rate / ANALYZER_FFT_SIZE as f64) as f32,
                info: Arc::clone(&info),
            },
            AnalyzerHandle { info },
        )
    }

    pub fn handle(&self) -> AnalyzerHandle {
        AnalyzerHandle {
            info: Arc::clone(&self.info),
        }
    }

    pub fn process(&mut self, samples: &[f32]) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (ANALYZER_FFT_SIZE - self.filled).min(rest.len());
            self.frame[self.filled..self.filled + take].copy_from_slice(&rest[..take]);
            self.filled += take;
            rest = &rest[take..];

            if self.filled == ANALYZER_FFT_SIZE {
                self.publish();
                self.filled = 0;
            }
        }
    }

    /// Drop any partially collected frame.
    pub const fn reset(&mut self) {
        self.filled = 0;
    }

    fn publish(&mut self) {
        for ((dst, &src), &w) in self
            .fft_input
            .iter_mut()
            .zip(self.frame.iter())
            .zip(self.window.iter())
        {
            *dst = src * w;
        }

        if self
            .fft
            .process_with_scratch(&mut self.fft_input, &mut self.spectrum, &mut self.scratch)
            .is_err()
        {
            return;
        }

        // Hann coherent gain is 0.5, so a full-scale sine reads ~0 dB.
        let norm = 4.0 / ANALYZER_FFT_SIZE as f32;
        let magnitudes_db = self
            .spectrum
            .iter()
            .map(|c| lin_to_db(c.norm() * norm))
            .collect();
        let peak = self.frame.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        self.frames += 1;

        self.info.store(Arc::new(SpectrumSnapshot {
            magnitudes_db,
            bin_hz: self.bin_hz,
            peak_db: lin_to_db(peak),
            frames: self.frames,
        }));
    }
}

impl AnalyzerHandle {
    pub fn snapshot(&self) -> SpectrumSnapshot {
        self.info.load().as_ref().clone()
    }
}
