use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Where the priority tone sits relative to the voice.
#[derive(ValueEnum, Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TonePlacement {
    /// Played once, over static, before the voice starts.
    #[default]
    Preamble,
    /// Looped underneath the voice.
    Under,
}

impl std::fmt::Display for TonePlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preamble => write!(f, "preamble"),
            Self::Under => write!(f, "under"),
        }
    }
}

/// Endless reader over a bed, seeking back to the start when exhausted.
/// An empty bed reads as silence.
#[derive(Debug, Clone)]
pub struct BedLoop<'a> {
    samples: &'a [f32],
    pos: usize,
}

impl<'a> BedLoop<'a> {
    pub const fn new(samples: &'a [f32]) -> Self {
        Self { samples, pos: 0 }
    }

    /// Fill `out` with the next `out.len()` bed samples, wrapping as needed.
    pub fn fill(&mut self, out: &mut [f32]) {
        if self.samples.is_empty() {
            out.fill(0.0);
            return;
        }
        let mut written = 0;
        while written < out.len() {
            let take = (self.samples.len() - self.pos).min(out.len() - written);
            out[written..written + take].copy_from_slice(&self.samples[self.pos..self.pos + take]);
            written += take;
            self.pos += take;
            if self.pos == self.samples.len() {
                self.pos = 0;
            }
        }
    }
}

/// One looped source with its fixed linear gain.
pub struct BedLayer<'a> {
    pub source: BedLoop<'a>,
    pub gain: f32,
}

impl<'a> BedLayer<'a> {
    pub const fn new(samples: &'a [f32], gain: f32) -> Self {
        Self {
            source: BedLoop::new(samples),
            gain,
        }
    }
}

/// Sum `layers` into `out` (already holding the gained lead signal) and
/// hard clip the result to [-1, 1]. `scratch` must be at least `out.len()`.
pub fn mix_block(out: &mut [f32], layers: &mut [BedLayer<'_>], scratch: &mut [f32]) {
    let scratch = &mut scratch[..out.len()];
    for layer in layers.iter_mut() {
        layer.source.fill(scratch);
        for (dst, &bed) in out.iter_mut().zip(scratch.iter()) {
            *dst = layer.gain.mul_add(bed, *dst);
        }
    }
    hard_clip(out);
}

#[inline]
pub fn hard_clip(block: &mut [f32]) {
    for sample in block {
        *sample = sample.clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bed_loop_wraps_across_fills() {
        let bed = [1.0, 2.0, 3.0];
        let mut source = BedLoop::new(&bed);
        let mut out = [0.0; 4];
        source.fill(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 1.0]);
        source.fill(&mut out);
        assert_eq!(out, [2.0, 3.0, 1.0, 2.0]);
        let mut tail = [0.0; 2];
        source.fill(&mut tail);
        assert_eq!(tail, [3.0, 1.0]);
    }

    #[test]
    fn empty_bed_is_silence() {
        let mut source = BedLoop::new(&[]);
        let mut out = [9.0; 3];
        source.fill(&mut out);
        assert_eq!(out, [0.0; 3]);
    }

    #[test]
    fn mix_sums_with_gains_and_clips() {
        let a = [0.5, -0.5];
        let b = [0.25];
        let mut out = [0.2, -0.9];
        let mut layers = [BedLayer::new(&a, 2.0), BedLayer::new(&b, 0.4)];
        let mut scratch = [0.0; 8];
        mix_block(&mut out, &mut layers, &mut scratch);
        assert_eq!(out, [1.0, -1.0]);

        let mut out = [0.1, 0.1];
        let mut layers = [BedLayer::new(&a, 0.5)];
        mix_block(&mut out, &mut layers, &mut scratch);
        assert!((out[0] - 0.35).abs() < 1e-6);
        assert!((out[1] + 0.15).abs() < 1e-6);
    }
}
