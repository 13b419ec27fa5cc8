use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::radio::analyzer::AnalyzerHandle;
use crate::radio::error::{ChainError, ChainResult, ErrorCode};
use crate::radio::stages::Stage;
use crate::radio::stages::compressor::{CompressorParams, CompressorStage};
use crate::radio::stages::equalizer::{EqBand, EqualizerStage};
use crate::radio::stages::saturator::{SaturatorParams, SaturatorStage};

#[derive(ValueEnum, Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Equalizer = 0,
    Compressor = 1,
    Saturator = 2,
}

impl StageKind {
    pub const ALL: [Self; 3] = [Self::Equalizer, Self::Compressor, Self::Saturator];

    pub fn from_index(index: i32) -> ChainResult<Self> {
        match index {
            0 => Ok(Self::Equalizer),
            1 => Ok(Self::Compressor),
            2 => Ok(Self::Saturator),
            _ => Err(ChainError::invalid_parameter(format!(
                "stage index {index} is not one of 0, 1, 2"
            ))),
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

pub const DEFAULT_ORDER: [StageKind; 3] = StageKind::ALL;

/// Accept `order` only if it names every stage exactly once.
pub fn parse_order(order: [i32; 3]) -> ChainResult<[StageKind; 3]> {
    let mut kinds = DEFAULT_ORDER;
    let mut seen = [false; 3];
    for (slot, &raw) in kinds.iter_mut().zip(order.iter()) {
        let kind = StageKind::from_index(raw)?;
        if std::mem::replace(&mut seen[kind.index()], true) {
            return Err(ChainError::invalid_parameter(format!(
                "order {order:?} is not a permutation of [0, 1, 2]"
            )));
        }
        *slot = kind;
    }
    Ok(kinds)
}

/// One equalizer, one compressor and one saturator run in a configurable
/// order over fixed-capacity mono blocks.
///
/// Every operation clears the recorded error on entry and records its own
/// failure, so [`ProcessingChain::last_error`] always describes the most
/// recent call.
pub struct ProcessingChain {
    equalizer: EqualizerStage,
    compressor: CompressorStage,
    saturator: SaturatorStage,
    enabled: [bool; 3],
    order: [StageKind; 3],
    sample_rate: f64,
    max_block_size: usize,
    last_error: Option<ChainError>,
}

impl ProcessingChain {
    /// Build a transparent chain: every stage disabled, default order.
    pub fn new(sample_rate: f64, max_block_size: usize) -> ChainResult<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ChainError::construction(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if max_block_size == 0 {
            return Err(ChainError::construction("max block size must be positive"));
        }
        debug!("Processing chain created: {sample_rate} Hz, blocks up to {max_block_size}");

        Ok(Self {
            equalizer: EqualizerStage::new(sample_rate),
            compressor: CompressorStage::new(sample_rate),
            saturator: SaturatorStage::new(sample_rate),
            enabled: [false; 3],
            order: DEFAULT_ORDER,
            sample_rate,
            max_block_size,
            last_error: None,
        })
    }

    fn record<T>(&mut self, result: ChainResult<T>) -> ChainResult<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }

    fn stage_mut(&mut self, kind: StageKind) -> &mut dyn Stage {
        match kind {
            StageKind::Equalizer => &mut self.equalizer,
            StageKind::Compressor => &mut self.compressor,
            StageKind::Saturator => &mut self.saturator,
        }
    }

    /// Run the enabled stages over `block` in the configured order.
    ///
    /// An oversized block is rejected before any sample is touched. A stage
    /// failure stops the remaining stages and leaves the block as the failing
    /// stage wrote it. The failing stage's history is cleared so the next
    /// finite block processes normally.
    pub fn process_block(&mut self, block: &mut [f32]) -> ChainResult<()> {
        self.last_error = None;
        if block.len() > self.max_block_size {
            let err = ChainError::new(
                ErrorCode::BlockTooLarge,
                format!(
                    "block of {} samples exceeds the maximum of {}",
                    block.len(),
                    self.max_block_size
                ),
            );
            return self.record(Err(err));
        }

        let order = self.order;
        let enabled = self.enabled;
        for kind in order {
            if !enabled[kind.index()] {
                continue;
            }
            let stage = self.stage_mut(kind);
            let result = stage.process_block(block);
            if result.is_err() {
                stage.reset();
            }
            self.record(result)?;
        }
        Ok(())
    }

    pub fn add_eq_band(&mut self, band: EqBand) -> ChainResult<usize> {
        self.last_error = None;
        let result = self.equalizer.add_band(band);
        self.record(result)
    }

    pub fn clear_eq_bands(&mut self) {
        self.last_error = None;
        self.equalizer.clear_bands();
    }

    pub fn set_eq_band_enabled(&mut self, index: usize, enabled: bool) -> ChainResult<()> {
        self.last_error = None;
        let result = self.equalizer.set_band_enabled(index, enabled);
        self.record(result)
    }

    pub fn eq_band_count(&self) -> usize {
        self.equalizer.band_count()
    }

    pub fn configure_eq(
        &mut self,
        output_gain_db: f32,
        analyzer_enabled: bool,
        quality: i32,
    ) -> ChainResult<()> {
        self.last_error = None;
        let result = self
            .equalizer
            .configure(output_gain_db, analyzer_enabled, quality);
        self.record(result)
    }

    pub fn set_compressor(&mut self, params: CompressorParams) -> ChainResult<()> {
        self.last_error = None;
        let result = self.compressor.set_params(params);
        self.record(result)
    }

    /// Peak gain reduction of the last processed block, 0 or negative dB.
    pub fn compressor_gain_reduction(&self) -> f32 {
        self.compressor.gain_reduction_db()
    }

    pub fn set_saturator(&mut self, params: SaturatorParams) -> ChainResult<()> {
        self.last_error = None;
        let result = self.saturator.set_params(params);
        self.record(result)
    }

    /// Set the enable flags and the application order, given as stage indices.
    pub fn configure_chain(
        &mut self,
        eq_enabled: bool,
        comp_enabled: bool,
        sat_enabled: bool,
        order: [i32; 3],
    ) -> ChainResult<()> {
        self.last_error = None;
        let order = match parse_order(order) {
            Ok(order) => order,
            Err(e) => return self.record(Err(e)),
        };
        self.set_layout([eq_enabled, comp_enabled, sat_enabled], order);
        Ok(())
    }

    /// Typed form of [`ProcessingChain::configure_chain`].
    pub fn set_layout(&mut self, enabled: [bool; 3], order: [StageKind; 3]) {
        self.last_error = None;
        debug!("Chain layout: order {order:?}, enabled {enabled:?}");
        self.enabled = enabled;
        self.order = order;
    }

    pub const fn last_error(&self) -> Option<&ChainError> {
        self.last_error.as_ref()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.last_error
            .as_ref()
            .map_or(ErrorCode::None, ChainError::code)
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Record a failure detected outside the chain on behalf of a call.
    pub fn record_error(&mut self, err: ChainError) {
        self.last_error = Some(err);
    }

    /// Drop all filter and envelope history, keeping the configuration.
    pub fn reset(&mut self) {
        self.last_error = None;
        for kind in StageKind::ALL {
            self.stage_mut(kind).reset();
        }
    }

    pub const fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub const fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub const fn order(&self) -> [StageKind; 3] {
        self.order
    }

    pub const fn is_enabled(&self, kind: StageKind) -> bool {
        self.enabled[kind.index()]
    }

    pub const fn equalizer(&self) -> &EqualizerStage {
        &self.equalizer
    }

    pub const fn compressor(&self) -> &CompressorStage {
        &self.compressor
    }

    pub const fn saturator(&self) -> &SaturatorStage {
        &self.saturator
    }

    pub fn analyzer(&self) -> AnalyzerHandle {
        self.equalizer.analyzer()
    }

    /// Static bed level requested through the saturator parameters.
    pub const fn static_volume(&self) -> f32 {
        self.saturator.static_volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::stages::compressor::CompressorStyle;
    use crate::radio::stages::filter::FilterType;

    fn chain() -> ProcessingChain {
        ProcessingChain::new(48_000.0, 256).unwrap()
    }

    #[test]
    fn rejects_bad_construction() {
        for (sr, block) in [(0.0, 256), (-1.0, 256), (f64::NAN, 256), (48_000.0, 0)] {
            let err = ProcessingChain::new(sr, block).err().unwrap();
            assert_eq!(err.code(), ErrorCode::InvalidConstruction);
        }
    }

    #[test]
    fn fresh_chain_is_transparent() {
        let mut chain = chain();
        assert_eq!(chain.order(), DEFAULT_ORDER);
        let input: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut block = input.clone();
        chain.process_block(&mut block).unwrap();
        assert_eq!(block, input);
        assert_eq!(chain.error_code(), ErrorCode::None);
    }

    #[test]
    fn oversized_block_is_rejected_untouched() {
        let mut chain = chain();
        chain.configure_chain(true, true, true, [0, 1, 2]).unwrap();
        let mut block = vec![0.3; 257];
        let err = chain.process_block(&mut block).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BlockTooLarge);
        assert_eq!(chain.error_code(), ErrorCode::BlockTooLarge);
        assert!(block.iter().all(|&s| s == 0.3));

        let mut block = vec![0.3; 256];
        chain.process_block(&mut block).unwrap();
        assert_eq!(chain.error_code(), ErrorCode::None);
    }

    #[test]
    fn order_must_be_a_permutation() {
        let mut chain = chain();
        chain.configure_chain(true, false, true, [2, 0, 1]).unwrap();

        for bad in [[0, 0, 1], [0, 1, 3], [-1, 1, 2], [2, 2, 2]] {
            assert!(chain.configure_chain(false, true, false, bad).is_err());
            assert_eq!(chain.error_code(), ErrorCode::InvalidParameter);
        }
        assert_eq!(
            chain.order(),
            [StageKind::Saturator, StageKind::Equalizer, StageKind::Compressor]
        );
        assert!(chain.is_enabled(StageKind::Equalizer));
        assert!(!chain.is_enabled(StageKind::Compressor));
    }

    #[test]
    fn next_call_clears_error_state() {
        let mut chain = chain();
        assert!(
            chain
                .add_eq_band(EqBand::new(FilterType::Bell, 0.0, 1.0, 1.0))
                .is_err()
        );
        assert_eq!(chain.error_code(), ErrorCode::InvalidParameter);
        assert!(chain.last_error().unwrap().message().contains("frequency"));

        chain.configure_eq(0.0, false, 1).unwrap();
        assert!(chain.last_error().is_none());

        assert!(chain.configure_eq(0.0, false, 7).is_err());
        chain.clear_error();
        assert_eq!(chain.error_code(), ErrorCode::None);
    }

    #[test]
    fn non_finite_stops_remaining_stages() {
        let mut chain = chain();
        chain.configure_chain(true, true, true, [1, 0, 2]).unwrap();
        let mut block = vec![0.1; 64];
        block[10] = f32::NAN;
        let err = chain.process_block(&mut block).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NonFinite);
        assert!(err.message().starts_with("compressor"), "{}", err.message());

        // The chain recovers once history is cleared.
        chain.reset();
        let mut block = vec![0.1; 64];
        chain.process_block(&mut block).unwrap();
        assert!(block.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn nan_block_does_not_poison_later_blocks() {
        let mut chain = chain();
        chain
            .add_eq_band(EqBand::new(FilterType::Bell, 1000.0, 6.0, 1.0))
            .unwrap();
        chain.configure_chain(true, false, false, [0, 1, 2]).unwrap();

        let mut block = vec![0.1; 256];
        block[3] = f32::NAN;
        let err = chain.process_block(&mut block).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NonFinite);

        let clean: Vec<f32> = (0..256).map(|i| 0.2 * (i as f32 * 0.13).sin()).collect();
        for _ in 0..4 {
            let mut block = clean.clone();
            chain.process_block(&mut block).unwrap();
            assert!(block.iter().all(|s| s.is_finite()));
            assert!(block.iter().any(|&s| s != 0.0));
        }
        assert_eq!(chain.error_code(), ErrorCode::None);
    }

    #[test]
    fn rms_compressor_recovers_after_nan() {
        let loud: Vec<f32> = (0..256).map(|i| 0.5 * (i as f32 * 0.13).sin()).collect();
        let settle = |chain: &mut ProcessingChain| {
            for _ in 0..40 {
                let mut block = loud.clone();
                chain.process_block(&mut block).unwrap();
            }
            chain.compressor_gain_reduction()
        };

        let mut chain = chain();
        chain
            .set_compressor(CompressorParams {
                threshold_db: -30.0,
                ratio: 4.0,
                knee_db: 0.0,
                style: CompressorStyle::Classic,
                auto_gain: false,
                ..CompressorParams::default()
            })
            .unwrap();
        chain.configure_chain(false, true, false, [1, 0, 2]).unwrap();

        let before = settle(&mut chain);
        assert!(before < -3.0, "{before} dB");

        let mut block = loud.clone();
        block[100] = f32::NAN;
        assert!(chain.process_block(&mut block).is_err());

        let after = settle(&mut chain);
        assert!((after - before).abs() < 1e-3, "{before} dB then {after} dB");
    }

    #[test]
    fn band_toggle_reports_out_of_range() {
        let mut chain = chain();
        chain
            .add_eq_band(EqBand::new(FilterType::HighShelf, 4000.0, 3.0, 0.7))
            .unwrap();
        chain.set_eq_band_enabled(0, false).unwrap();
        assert!(chain.set_eq_band_enabled(1, false).is_err());
        assert_eq!(chain.eq_band_count(), 1);
        chain.clear_eq_bands();
        assert_eq!(chain.eq_band_count(), 0);
    }

    #[test]
    fn static_volume_is_carried_from_saturator() {
        let mut chain = chain();
        chain
            .set_saturator(SaturatorParams {
                static_volume: 0.75,
                ..SaturatorParams::default()
            })
            .unwrap();
        assert_eq!(chain.static_volume(), 0.75);
    }
}
