use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_1_SQRT_2;

use crate::radio::error::{ChainError, ChainResult, ensure_finite};
use crate::radio::stages::Stage;
use crate::radio::stages::common::{DcBlocker, db_to_lin};
use crate::radio::stages::filter::{Biquad, BiquadCoeffs, FilterType, Precision};
use crate::radio::stages::oversampler::{LatencyLine, Oversampler};

pub const MAX_DRIVE: f32 = 10.0;
/// Pre-gain in dB per unit of drive.
pub const DRIVE_DB_PER_UNIT: f32 = 2.0;
pub const PUNISH_MULTIPLIER: f32 = 3.0;
pub const TONE_SHELF_HZ: f32 = 2000.0;
pub const TONE_RANGE_DB: f32 = 12.0;
const DC_BLOCK_HZ: f32 = 15.0;
/// DC offset fed into the E curve before shaping.
const CONSOLE_BIAS: f32 = 0.25;
/// Negative swing ceiling of the T curve.
const TUBE_NEGATIVE_CEILING: f32 = 0.6;

#[derive(ValueEnum, Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SaturatorStyle {
    /// Tape, symmetric tanh.
    #[default]
    A,
    /// Console, biased and asymmetric.
    E,
    /// Transformer, cubic soft knee.
    N,
    /// Tube, softer on the positive swing.
    T,
    /// Soft clip with a wave fold above unity.
    P,
}

/// Indexed by `SaturatorStyle as usize`.
static SHAPERS: [fn(f32) -> f32; 5] = [tape, console, transformer, tube, plate];

impl SaturatorStyle {
    pub fn from_code(code: i32) -> ChainResult<Self> {
        match code {
            0 => Ok(Self::A),
            1 => Ok(Self::E),
            2 => Ok(Self::N),
            3 => Ok(Self::T),
            4 => Ok(Self::P),
            _ => Err(ChainError::invalid_parameter(format!(
                "unknown saturator style code {code}"
            ))),
        }
    }

    pub fn shaper(self) -> fn(f32) -> f32 {
        SHAPERS[self as usize]
    }

    #[inline]
    pub fn shape(self, input: f32) -> f32 {
        self.shaper()(input)
    }
}

impl std::fmt::Display for SaturatorStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A (tape)"),
            Self::E => write!(f, "E (console)"),
            Self::N => write!(f, "N (transformer)"),
            Self::T => write!(f, "T (tube)"),
            Self::P => write!(f, "P (plate)"),
        }
    }
}

#[inline]
fn tape(x: f32) -> f32 {
    x.tanh()
}

#[inline]
fn console(x: f32) -> f32 {
    (x + CONSOLE_BIAS).tanh() - CONSOLE_BIAS.tanh()
}

#[inline]
fn transformer(x: f32) -> f32 {
    let c = x.clamp(-1.0, 1.0);
    (0.5 * c * c).mul_add(-c, 1.5 * c)
}

#[inline]
fn tube(x: f32) -> f32 {
    if x >= 0.0 {
        x.tanh()
    } else {
        TUBE_NEGATIVE_CEILING * (x / TUBE_NEGATIVE_CEILING).tanh()
    }
}

#[inline]
fn plate(x: f32) -> f32 {
    let soft_clip = x.tanh();
    let fold_amount: f32 = 0.3;
    let folded = if x.abs() > 1.0 {
        soft_clip * (2.0 - x.abs().min(2.0))
    } else {
        soft_clip
    };
    (1.0 - fold_amount).mul_add(soft_clip, fold_amount * folded)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturatorParams {
    pub drive: f32,
    pub low_cut_hz: f32,
    pub high_cut_hz: f32,
    /// Post-shaping tilt, -1 (dark) to 1 (bright).
    pub tone: f32,
    /// Percentage of shaped signal, 0..=100.
    pub mix: f32,
    pub punish: bool,
    pub style: SaturatorStyle,
    pub output_db: f32,
    pub oversampling: bool,
    /// Carried for the render driver, never touches the sample math here.
    pub static_volume: f32,
}

impl Default for SaturatorParams {
    fn default() -> Self {
        Self {
            drive: 3.0,
            low_cut_hz: 20.0,
            high_cut_hz: 20_000.0,
            tone: 0.0,
            mix: 100.0,
            punish: false,
            style: SaturatorStyle::A,
            output_db: 0.0,
            oversampling: true,
            static_volume: 0.0,
        }
    }
}

impl SaturatorParams {
    pub fn validate(&self, sample_rate: f64) -> ChainResult<()> {
        if !(0.0..=MAX_DRIVE).contains(&self.drive) {
            return Err(ChainError::invalid_parameter(format!(
                "drive must be between 0 and {MAX_DRIVE}, got {}",
                self.drive
            )));
        }
        let nyquist = (sample_rate / 2.0) as f32;
        if !self.low_cut_hz.is_finite() || self.low_cut_hz <= 0.0 {
            return Err(ChainError::invalid_parameter(format!(
                "low cut {} Hz must be above 0",
                self.low_cut_hz
            )));
        }
        if !self.high_cut_hz.is_finite()
            || self.high_cut_hz <= self.low_cut_hz
            || self.high_cut_hz >= nyquist
        {
            return Err(ChainError::invalid_parameter(format!(
                "high cut {} Hz must lie between the low cut ({} Hz) and {nyquist} Hz",
                self.high_cut_hz, self.low_cut_hz
            )));
        }
        if !(-1.0..=1.0).contains(&self.tone) {
            return Err(ChainError::invalid_parameter(format!(
                "tone must be between -1 and 1, got {}",
                self.tone
            )));
        }
        if !(0.0..=100.0).contains(&self.mix) {
            return Err(ChainError::invalid_parameter(format!(
                "mix must be between 0 and 100, got {}",
                self.mix
            )));
        }
        if !self.output_db.is_finite() {
            return Err(ChainError::invalid_parameter("output trim must be finite"));
        }
        if !self.static_volume.is_finite() || self.static_volume < 0.0 {
            return Err(ChainError::invalid_parameter("static volume must be non-negative"));
        }
        Ok(())
    }

    pub fn effective_drive(&self) -> f32 {
        if self.punish {
            self.drive * PUNISH_MULTIPLIER
        } else {
            self.drive
        }
    }
}

/// Band-limited waveshaper: pre-filters, drive, shaper, tone, mix, trim.
///
/// With oversampling on, the dry side of the mix is delayed to line up with
/// the shaped path. `mix = 0` skips that delay and is exact passthrough
/// (scaled only by the trim).
pub struct SaturatorStage {
    params: SaturatorParams,
    low_cut: Biquad,
    high_cut: Biquad,
    tone: Biquad,
    dc_blocker: DcBlocker,
    oversampler: Oversampler,
    dry_delay: LatencyLine,
    pre_gain: f32,
    wet: f32,
    output_gain: f32,
    sample_rate: f64,
}

impl SaturatorStage {
    pub fn new(sample_rate: f64) -> Self {
        let mut params = SaturatorParams::default();
        // Keep the default band inside Nyquist at low sample rates.
        let ceiling = (sample_rate * 0.45) as f32;
        if params.high_cut_hz > ceiling {
            params.high_cut_hz = ceiling;
            params.low_cut_hz = params.low_cut_hz.min(ceiling / 4.0);
        }

        let mut stage = Self {
            params,
            low_cut: Biquad::default(),
            high_cut: Biquad::default(),
            tone: Biquad::default(),
            dc_blocker: DcBlocker::new(DC_BLOCK_HZ, sample_rate as f32),
            oversampler: Oversampler::new(),
            dry_delay: LatencyLine::new(),
            pre_gain: 1.0,
            wet: 1.0,
            output_gain: 1.0,
            sample_rate,
        };
        stage.apply(params);
        stage
    }

    /// Validate and apply new parameters. Filter history carries over, the
    /// oversampler restarts when it is switched on or off.
    pub fn set_params(&mut self, params: SaturatorParams) -> ChainResult<()> {
        params.validate(self.sample_rate)?;
        if params.oversampling != self.params.oversampling {
            self.oversampler.reset();
            self.dry_delay.clear();
        }
        self.apply(params);
        debug!(
            "Saturator set: style {}, drive {} (effective {}), mix {}%",
            params.style,
            params.drive,
            params.effective_drive(),
            params.mix
        );
        Ok(())
    }

    fn apply(&mut self, params: SaturatorParams) {
        let sr = self.sample_rate;
        let q = f64::from(FRAC_1_SQRT_2);
        self.low_cut.set_coefficients(BiquadCoeffs::design(
            FilterType::LowCut,
            f64::from(params.low_cut_hz),
            q,
            0.0,
            sr,
        ));
        self.high_cut.set_coefficients(BiquadCoeffs::design(
            FilterType::HighCut,
            f64::from(params.high_cut_hz),
            q,
            0.0,
            sr,
        ));
        self.tone.set_coefficients(BiquadCoeffs::design(
            FilterType::HighShelf,
            f64::from(TONE_SHELF_HZ.min((sr * 0.4) as f32)),
            q,
            f64::from(params.tone * TONE_RANGE_DB),
            sr,
        ));

        self.pre_gain = db_to_lin(params.effective_drive() * DRIVE_DB_PER_UNIT);
        self.wet = params.mix / 100.0;
        self.output_gain = db_to_lin(params.output_db);
        self.params = params;
    }

    pub const fn params(&self) -> &SaturatorParams {
        &self.params
    }

    pub const fn static_volume(&self) -> f32 {
        self.params.static_volume
    }

    /// Delay of the shaped path relative to the dry path, in samples.
    pub const fn wet_latency(&self) -> usize {
        if self.params.oversampling {
            self.oversampler.latency()
        } else {
            0
        }
    }

    #[inline]
    fn process_sample(&mut self, input: f32) -> f32 {
        let band = self
            .high_cut
            .process(self.low_cut.process(input, Precision::Double), Precision::Double);
        let driven = band * self.pre_gain;

        let shaper = self.params.style.shaper();
        let shaped = if self.params.oversampling {
            self.oversampler.process(driven, shaper)
        } else {
            shaper(driven)
        };

        let wet = self
            .tone
            .process(self.dc_blocker.process(shaped), Precision::Double);

        let delayed = self.dry_delay.process(input);
        let dry = if self.wet_latency() > 0 && self.wet > 0.0 {
            delayed
        } else {
            input
        };
        self.wet.mul_add(wet, (1.0 - self.wet) * dry) * self.output_gain
    }
}

impl Stage for SaturatorStage {
    fn name(&self) -> &'static str {
        "saturator"
    }

    fn process_block(&mut self, block: &mut [f32]) -> ChainResult<()> {
        for sample in block.iter_mut() {
            *sample = self.process_sample(*sample);
        }
        ensure_finite(block, self.name())
    }

    fn reset(&mut self) {
        self.low_cut.clear();
        self.high_cut.clear();
        self.tone.clear();
        self.dc_blocker.reset();
        self.oversampler.reset();
        self.dry_delay.clear();
    }
}
