use log::debug;
use serde::{Deserialize, Serialize};

use crate::radio::analyzer::{AnalyzerHandle, SpectrumAnalyzer};
use crate::radio::error::{ChainError, ChainResult, ensure_finite};
use crate::radio::stages::Stage;
use crate::radio::stages::common::db_to_lin;
use crate::radio::stages::filter::{FilterCascade, FilterSpec, FilterType, Precision};

/// One parametric band as configured by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    pub frequency: f32,
    #[serde(default)]
    pub gain_db: f32,
    pub q: f32,
    pub filter_type: FilterType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_slope")]
    pub slope: i32,
}

const fn default_enabled() -> bool {
    true
}

const fn default_slope() -> i32 {
    12
}

impl EqBand {
    pub const fn new(filter_type: FilterType, frequency: f32, gain_db: f32, q: f32) -> Self {
        Self {
            frequency,
            gain_db,
            q,
            filter_type,
            enabled: true,
            slope: default_slope(),
        }
    }

    pub const fn with_slope(mut self, slope: i32) -> Self {
        self.slope = slope;
        self
    }

    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub const fn filter_spec(&self) -> FilterSpec {
        FilterSpec::new(self.filter_type, self.frequency, self.q, self.gain_db).with_slope(self.slope)
    }
}

struct Band {
    band: EqBand,
    filter: FilterCascade,
}

/// Ordered bank of bands followed by an output trim.
///
/// A disabled band is skipped outright, so its filter state is frozen until
/// it is enabled again.
pub struct EqualizerStage {
    bands: Vec<Band>,
    output_gain_db: f32,
    output_gain: f32,
    precision: Precision,
    quality: i32,
    analyzer_enabled: bool,
    analyzer: SpectrumAnalyzer,
    sample_rate: f64,
}

impl EqualizerStage {
    pub fn new(sample_rate: f64) -> Self {
        let (analyzer, _) = SpectrumAnalyzer::new(sample_rate);
        Self {
            bands: Vec::new(),
            output_gain_db: 0.0,
            output_gain: 1.0,
            precision: Precision::Double,
            quality: 1,
            analyzer_enabled: false,
            analyzer,
            sample_rate,
        }
    }

    /// Append a band, returning its index. Invalid bands leave the list untouched.
    pub fn add_band(&mut self, band: EqBand) -> ChainResult<usize> {
        let filter = FilterCascade::design(&band.filter_spec(), self.sample_rate)?;
        debug!(
            "EQ band {} added: {} at {} Hz, {} dB, Q {}, {} section(s)",
            self.bands.len(),
            band.filter_type,
            band.frequency,
            band.gain_db,
            band.q,
            filter.section_count()
        );
        self.bands.push(Band { band, filter });
        Ok(self.bands.len() - 1)
    }

    pub fn clear_bands(&mut self) {
        self.bands.clear();
    }

    pub fn set_band_enabled(&mut self, index: usize, enabled: bool) -> ChainResult<()> {
        let count = self.bands.len();
        let band = self.bands.get_mut(index).ok_or_else(|| {
            ChainError::invalid_parameter(format!("band {index} out of range ({count} bands)"))
        })?;
        band.band.enabled = enabled;
        Ok(())
    }

    pub fn configure(
        &mut self,
        output_gain_db: f32,
        analyzer_enabled: bool,
        quality: i32,
    ) -> ChainResult<()> {
        if !output_gain_db.is_finite() {
            return Err(ChainError::invalid_parameter("EQ output gain must be finite"));
        }
        let precision = Precision::from_quality(quality)?;

        if analyzer_enabled && !self.analyzer_enabled {
            self.analyzer.reset();
        }
        self.output_gain_db = output_gain_db;
        self.output_gain = db_to_lin(output_gain_db);
        self.analyzer_enabled = analyzer_enabled;
        self.precision = precision;
        self.quality = quality;
        Ok(())
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> impl Iterator<Item = &EqBand> {
        self.bands.iter().map(|b| &b.band)
    }

    pub const fn output_gain_db(&self) -> f32 {
        self.output_gain_db
    }

    pub const fn quality(&self) -> i32 {
        self.quality
    }

    pub const fn precision(&self) -> Precision {
        self.precision
    }

    pub const fn analyzer_enabled(&self) -> bool {
        self.analyzer_enabled
    }

    pub fn analyzer(&self) -> AnalyzerHandle {
        self.analyzer.handle()
    }
}

impl Stage for EqualizerStage {
    fn name(&self) -> &'static str {
        "equalizer"
    }

    fn process_block(&mut self, block: &mut [f32]) -> ChainResult<()> {
        let precision = self.precision;
        for sample in block.iter_mut() {
            let mut signal = *sample;
            for band in self.bands.iter_mut().filter(|b| b.band.enabled) {
                signal = band.filter.process(signal, precision);
            }
            *sample = signal * self.output_gain;
        }
        ensure_finite(block, self.name())?;

        if self.analyzer_enabled {
            self.analyzer.process(block);
        }
        Ok(())
    }

    fn reset(&mut self) {
        for band in &mut self.bands {
            band.filter.clear();
        }
        self.analyzer.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: f64 = 48_000.0;

    fn sine(freq: f32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn peak(block: &[f32]) -> f32 {
        block.iter().map(|s| s.abs()).fold(0.0, f32::max)
    }

    #[test]
    fn empty_bank_applies_only_output_gain() {
        let mut eq = EqualizerStage::new(SR);
        eq.configure(-6.0206, false, 1).unwrap();
        let mut block = vec![0.5; 32];
        eq.process_block(&mut block).unwrap();
        assert!(block.iter().all(|s| (s - 0.25).abs() < 1e-4));
    }

    #[test]
    fn invalid_band_leaves_list_unchanged() {
        let mut eq = EqualizerStage::new(SR);
        eq.add_band(EqBand::new(FilterType::Bell, 1000.0, 3.0, 1.0))
            .unwrap();

        assert!(
            eq.add_band(EqBand::new(FilterType::Bell, 30_000.0, 3.0, 1.0))
                .is_err()
        );
        assert!(
            eq.add_band(EqBand::new(FilterType::LowCut, 100.0, 0.0, 0.7).with_slope(0))
                .is_err()
        );
        assert_eq!(eq.band_count(), 1);
    }

    #[test]
    fn clear_bands_matches_fresh_stage() {
        let input = sine(440.0, 4096, 0.8);

        let mut used = EqualizerStage::new(SR);
        used.add_band(EqBand::new(FilterType::Bell, 440.0, 9.0, 2.0))
            .unwrap();
        used.add_band(EqBand::new(FilterType::HighCut, 2000.0, 0.0, 0.7).with_slope(24))
            .unwrap();
        let mut scratch = input.clone();
        used.process_block(&mut scratch).unwrap();
        used.clear_bands();

        let mut fresh = EqualizerStage::new(SR);

        let mut a = input.clone();
        let mut b = input;
        used.process_block(&mut a).unwrap();
        fresh.process_block(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn disabled_band_freezes_and_resumes_its_state() {
        let head = sine(700.0, 1000, 0.5);
        let gap = sine(1300.0, 500, 0.5);
        let tail = sine(900.0, 1000, 0.5);
        let band = EqBand::new(FilterType::Bell, 800.0, 8.0, 1.5);

        let mut toggled = EqualizerStage::new(SR);
        toggled.add_band(band).unwrap();
        let mut reference = EqualizerStage::new(SR);
        reference.add_band(band).unwrap();

        let mut a = head.clone();
        toggled.process_block(&mut a).unwrap();
        let mut b = head;
        reference.process_block(&mut b).unwrap();

        toggled.set_band_enabled(0, false).unwrap();
        let mut skipped = gap.clone();
        toggled.process_block(&mut skipped).unwrap();
        assert_eq!(skipped, gap, "disabled band must pass audio untouched");
        toggled.set_band_enabled(0, true).unwrap();

        let mut a = tail.clone();
        toggled.process_block(&mut a).unwrap();
        let mut b = tail;
        reference.process_block(&mut b).unwrap();
        assert_eq!(a, b, "state must resume exactly where it was frozen");
    }

    #[test]
    fn bell_boost_raises_peak() {
        let mut eq = EqualizerStage::new(SR);
        eq.add_band(EqBand::new(FilterType::Bell, 1000.0, 6.0, 1.0))
            .unwrap();
        let mut block = sine(1000.0, 9600, 0.25);
        eq.process_block(&mut block).unwrap();
        let ratio_db = 20.0 * (peak(&block[4800..]) / 0.25).log10();
        assert!((ratio_db - 6.0).abs() < 0.5, "gain {ratio_db} dB");
    }

    #[test]
    fn single_precision_tracks_double() {
        let input = sine(3000.0, 4096, 0.5);
        let band = EqBand::new(FilterType::Bell, 3544.9, 2.25, 1.0);

        let mut single = EqualizerStage::new(SR);
        single.configure(0.0, false, 0).unwrap();
        single.add_band(band).unwrap();
        let mut double = EqualizerStage::new(SR);
        double.add_band(band).unwrap();

        let mut a = input.clone();
        let mut b = input;
        single.process_block(&mut a).unwrap();
        double.process_block(&mut b).unwrap();
        let max_diff = a
            .iter()
            .zip(&b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f32::max);
        assert!(max_diff < 1e-4, "precision tiers diverged by {max_diff}");
    }

    #[test]
    fn configure_rejects_bad_quality_and_keeps_settings() {
        let mut eq = EqualizerStage::new(SR);
        eq.configure(-3.0, true, 2).unwrap();
        assert!(eq.configure(0.0, false, 9).is_err());
        assert_eq!(eq.output_gain_db(), -3.0);
        assert!(eq.analyzer_enabled());
        assert_eq!(eq.quality(), 2);
    }

    #[test]
    fn analyzer_only_runs_when_enabled() {
        let mut eq = EqualizerStage::new(SR);
        let handle = eq.analyzer();
        let mut block = sine(1000.0, 2048, 0.5);
        eq.process_block(&mut block).unwrap();
        assert_eq!(handle.snapshot().frames, 0);

        eq.configure(0.0, true, 1).unwrap();
        eq.process_block(&mut block).unwrap();
        assert_eq!(handle.snapshot().frames, 2);
    }

    #[test]
    fn out_of_range_toggle_is_rejected() {
        let mut eq = EqualizerStage::new(SR);
        assert!(eq.set_band_enabled(0, false).is_err());
    }
}
