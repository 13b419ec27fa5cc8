use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::radio::error::{ChainError, ChainResult, ensure_finite};
use crate::radio::stages::Stage;
use crate::radio::stages::common::{
    EnvelopeFollower, LEVEL_FLOOR, calculate_coefficient, db_to_lin, lin_to_db,
};

/// Time constant of the running reduction average used by auto gain.
const AUTO_GAIN_WINDOW_MS: f32 = 300.0;

#[derive(ValueEnum, Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressorStyle {
    #[default]
    Clean,
    Classic,
    Opto,
    Punch,
}

impl CompressorStyle {
    pub fn from_code(code: i32) -> ChainResult<Self> {
        match code {
            0 => Ok(Self::Clean),
            1 => Ok(Self::Classic),
            2 => Ok(Self::Opto),
            3 => Ok(Self::Punch),
            _ => Err(ChainError::invalid_parameter(format!(
                "unknown compressor style code {code}"
            ))),
        }
    }

    pub fn tuning(self) -> &'static StyleTuning {
        &STYLE_TABLE[self as usize]
    }
}

impl std::fmt::Display for CompressorStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "Clean"),
            Self::Classic => write!(f, "Classic"),
            Self::Opto => write!(f, "Opto"),
            Self::Punch => write!(f, "Punch"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Detector {
    /// Rectified sample magnitude.
    Peak,
    /// Square-law detector smoothed over the given window.
    Rms { window_ms: u16 },
}

/// Per-style shaping of the detector and the gain trajectory.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StyleTuning {
    pub detector: Detector,
    pub attack_scale: f32,
    pub release_scale: f32,
    /// Knee never narrower than this many dB.
    pub min_knee_db: f32,
    /// Release slows by up to this factor as reduction approaches
    /// `program_depth_db`. 1.0 disables program dependence.
    pub program_release: f32,
    pub program_depth_db: f32,
}

/// Indexed by `CompressorStyle as usize`.
static STYLE_TABLE: [StyleTuning; 4] = [
    // Clean
    StyleTuning {
        detector: Detector::Peak,
        attack_scale: 1.0,
        release_scale: 1.0,
        min_knee_db: 0.0,
        program_release: 1.0,
        program_depth_db: 12.0,
    },
    // Classic
    StyleTuning {
        detector: Detector::Rms { window_ms: 10 },
        attack_scale: 1.0,
        release_scale: 1.0,
        min_knee_db: 3.0,
        program_release: 1.0,
        program_depth_db: 12.0,
    },
    // Opto
    StyleTuning {
        detector: Detector::Rms { window_ms: 20 },
        attack_scale: 2.0,
        release_scale: 1.0,
        min_knee_db: 0.0,
        program_release: 4.0,
        program_depth_db: 12.0,
    },
    // Punch
    StyleTuning {
        detector: Detector::Peak,
        attack_scale: 1.5,
        release_scale: 0.5,
        min_knee_db: 0.0,
        program_release: 1.0,
        program_depth_db: 12.0,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub knee_db: f32,
    pub makeup_db: f32,
    pub style: CompressorStyle,
    pub auto_gain: bool,
    /// Percentage of the unprocessed signal blended back in, 0..=100.
    pub dry_mix: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 2.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            knee_db: 6.0,
            makeup_db: 0.0,
            style: CompressorStyle::Clean,
            auto_gain: true,
            dry_mix: 0.0,
        }
    }
}

impl CompressorParams {
    pub fn validate(&self) -> ChainResult<()> {
        if !self.threshold_db.is_finite() {
            return Err(ChainError::invalid_parameter("threshold must be finite"));
        }
        if !self.ratio.is_finite() || self.ratio < 1.0 {
            return Err(ChainError::invalid_parameter(format!(
                "ratio must be at least 1.0, got {}",
                self.ratio
            )));
        }
        if !self.attack_ms.is_finite() || self.attack_ms < 0.0 {
            return Err(ChainError::invalid_parameter("attack must be a non-negative time"));
        }
        if !self.release_ms.is_finite() || self.release_ms < 0.0 {
            return Err(ChainError::invalid_parameter("release must be a non-negative time"));
        }
        if !self.knee_db.is_finite() || self.knee_db < 0.0 {
            return Err(ChainError::invalid_parameter("knee width must be non-negative"));
        }
        if !self.makeup_db.is_finite() {
            return Err(ChainError::invalid_parameter("makeup gain must be finite"));
        }
        if !(0.0..=100.0).contains(&self.dry_mix) {
            return Err(ChainError::invalid_parameter(format!(
                "dry mix must be between 0 and 100, got {}",
                self.dry_mix
            )));
        }
        Ok(())
    }
}

/// Static curve: reduction in dB (non-negative) for a detector level in dB.
///
/// Quadratic blend across the knee, straight ratio line above it.
#[inline]
pub fn gain_reduction_db(level_db: f32, threshold_db: f32, ratio: f32, knee_db: f32) -> f32 {
    let slope = 1.0 - 1.0 / ratio;
    let overshoot = level_db - threshold_db;
    let half_knee = knee_db / 2.0;

    if knee_db > 0.0 && overshoot.abs() <= half_knee {
        let into_knee = overshoot + half_knee;
        slope * into_knee * into_knee / (2.0 * knee_db)
    } else if overshoot > 0.0 {
        slope * overshoot
    } else {
        0.0
    }
}

/// Feed-forward compressor smoothing its gain reduction in the dB domain.
pub struct CompressorStage {
    params: CompressorParams,
    effective_knee_db: f32,
    /// Smoothed gain reduction in dB, carried across blocks.
    reduction: EnvelopeFollower,
    release_coeff: f32,
    slow_release_coeff: f32,
    rms_coeff: f32,
    mean_square: f32,
    auto_makeup: EnvelopeFollower,
    makeup: f32,
    dry: f32,
    block_peak_reduction_db: f32,
    sample_rate: f32,
}

impl CompressorStage {
    pub fn new(sample_rate: f64) -> Self {
        let mut stage = Self {
            params: CompressorParams::default(),
            effective_knee_db: 0.0,
            reduction: EnvelopeFollower::new(0.0, 0.0),
            release_coeff: 0.0,
            slow_release_coeff: 0.0,
            rms_coeff: 0.0,
            mean_square: 0.0,
            auto_makeup: EnvelopeFollower::new(0.0, 0.0),
            makeup: 1.0,
            dry: 0.0,
            block_peak_reduction_db: 0.0,
            sample_rate: sample_rate as f32,
        };
        stage.apply(CompressorParams::default());
        stage
    }

    /// Validate and apply new parameters. Envelope state carries over.
    pub fn set_params(&mut self, params: CompressorParams) -> ChainResult<()> {
        params.validate()?;
        self.apply(params);
        Ok(())
    }

    fn apply(&mut self, params: CompressorParams) {
        let tuning = params.style.tuning();
        let sr = self.sample_rate;

        self.reduction.set_attack_coeff(calculate_coefficient(
            params.attack_ms * tuning.attack_scale,
            sr,
        ));
        self.release_coeff = calculate_coefficient(params.release_ms * tuning.release_scale, sr);
        self.slow_release_coeff = calculate_coefficient(
            params.release_ms * tuning.release_scale * tuning.program_release,
            sr,
        );
        self.reduction.set_release_coeff(self.release_coeff);

        self.rms_coeff = match tuning.detector {
            Detector::Peak => 0.0,
            Detector::Rms { window_ms } => calculate_coefficient(f32::from(window_ms), sr),
        };

        let auto_coeff = calculate_coefficient(AUTO_GAIN_WINDOW_MS, sr);
        self.auto_makeup.set_attack_coeff(auto_coeff);
        self.auto_makeup.set_release_coeff(auto_coeff);

        self.effective_knee_db = params.knee_db.max(tuning.min_knee_db);
        self.makeup = db_to_lin(params.makeup_db);
        self.dry = params.dry_mix / 100.0;
        self.params = params;
    }

    pub const fn params(&self) -> &CompressorParams {
        &self.params
    }

    /// Peak reduction of the most recent block in dB, 0 or negative.
    pub fn gain_reduction_db(&self) -> f32 {
        -self.block_peak_reduction_db
    }

    /// Current smoothed reduction in dB, 0 or negative.
    pub fn instantaneous_reduction_db(&self) -> f32 {
        -self.reduction.value()
    }

    #[inline]
    fn detect(&mut self, input: f32) -> f32 {
        match self.params.style.tuning().detector {
            Detector::Peak => input.abs(),
            Detector::Rms { .. } => {
                self.mean_square = self
                    .rms_coeff
                    .mul_add(self.mean_square, (1.0 - self.rms_coeff) * input * input);
                if !self.mean_square.is_finite() {
                    self.mean_square = 0.0;
                }
                self.mean_square.sqrt()
            }
        }
    }

    #[inline]
    fn release_coeff_for(&self, current_db: f32) -> f32 {
        let tuning = self.params.style.tuning();
        if tuning.program_release <= 1.0 {
            return self.release_coeff;
        }
        let depth = (current_db / tuning.program_depth_db).clamp(0.0, 1.0);
        self.release_coeff + (self.slow_release_coeff - self.release_coeff) * depth
    }
}

impl Stage for CompressorStage {
    fn name(&self) -> &'static str {
        "compressor"
    }

    fn process_block(&mut self, block: &mut [f32]) -> ChainResult<()> {
        let threshold = self.params.threshold_db;
        let ratio = self.params.ratio;
        let knee = self.effective_knee_db;
        let mut block_peak = 0.0f32;

        for sample in block.iter_mut() {
            let input = *sample;
            let level = self.detect(input).max(LEVEL_FLOOR);
            let target = gain_reduction_db(lin_to_db(level), threshold, ratio, knee);

            let reduction_db = if target > self.reduction.value() {
                self.reduction.process(target)
            } else {
                let coeff = self.release_coeff_for(self.reduction.value());
                self.reduction.process_with(target, coeff)
            };
            block_peak = block_peak.max(reduction_db);

            let makeup = if self.params.auto_gain {
                db_to_lin(self.auto_makeup.process(reduction_db))
            } else {
                self.makeup
            };

            let wet = input * db_to_lin(-reduction_db) * makeup;
            *sample = self.dry.mul_add(input, (1.0 - self.dry) * wet);
        }

        self.block_peak_reduction_db = block_peak;
        ensure_finite(block, self.name())
    }

    fn reset(&mut self) {
        self.reduction.reset();
        self.auto_makeup.reset();
        self.mean_square = 0.0;
        self.block_peak_reduction_db = 0.0;
    }
}
