//! Biquad filter primitives used by every stage of the radio chain.
//!
//! Coefficients follow the RBJ Audio EQ Cookbook (bilinear transform of the
//! analog prototypes). Cut filters steeper than 12 dB/octave are realised as
//! a cascade of 12 dB/octave sections.

use crate::radio::error::{ChainError, ChainResult};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Slope of a single second-order section, in dB/octave.
pub const SECTION_SLOPE_DB: i32 = 12;
/// Steepest accepted cut slope (eight cascaded sections).
pub const MAX_SLOPE_DB: i32 = 96;
/// Q used by the follower sections of a cut cascade. A biquad at Q = 1 has
/// unity magnitude at its cutoff, so followers only steepen the skirt.
pub const FOLLOWER_Q: f64 = 1.0;

#[derive(ValueEnum, Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Bell,
    LowShelf,
    HighShelf,
    LowCut,
    HighCut,
    Notch,
    BandPass,
}

impl FilterType {
    pub fn from_code(code: i32) -> ChainResult<Self> {
        match code {
            0 => Ok(Self::Bell),
            1 => Ok(Self::LowShelf),
            2 => Ok(Self::HighShelf),
            3 => Ok(Self::LowCut),
            4 => Ok(Self::HighCut),
            5 => Ok(Self::Notch),
            6 => Ok(Self::BandPass),
            _ => Err(ChainError::invalid_parameter(format!(
                "unknown filter type code {code}"
            ))),
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            Self::Bell => 0,
            Self::LowShelf => 1,
            Self::HighShelf => 2,
            Self::LowCut => 3,
            Self::HighCut => 4,
            Self::Notch => 5,
            Self::BandPass => 6,
        }
    }

    pub const fn is_cut(self) -> bool {
        matches!(self, Self::LowCut | Self::HighCut)
    }
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bell => write!(f, "Bell"),
            Self::LowShelf => write!(f, "Low Shelf"),
            Self::HighShelf => write!(f, "High Shelf"),
            Self::LowCut => write!(f, "Low Cut"),
            Self::HighCut => write!(f, "High Cut"),
            Self::Notch => write!(f, "Notch"),
            Self::BandPass => write!(f, "Band Pass"),
        }
    }
}

/// Arithmetic used inside the biquad recursion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Single,
    #[default]
    Double,
}

impl Precision {
    /// Map an EQ quality level onto a precision tier.
    ///
    /// 0 accumulates in `f32`; 1 and 2 accumulate in `f64`.
    pub fn from_quality(quality: i32) -> ChainResult<Self> {
        match quality {
            0 => Ok(Self::Single),
            1 | 2 => Ok(Self::Double),
            _ => Err(ChainError::invalid_parameter(format!(
                "quality must be 0, 1 or 2, got {quality}"
            ))),
        }
    }
}

/// Everything needed to design one filter.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub filter_type: FilterType,
    pub frequency: f32,
    pub q: f32,
    pub gain_db: f32,
    /// dB/octave, only read for cut filters.
    pub slope: i32,
}

impl FilterSpec {
    pub const fn new(filter_type: FilterType, frequency: f32, q: f32, gain_db: f32) -> Self {
        Self {
            filter_type,
            frequency,
            q,
            gain_db,
            slope: SECTION_SLOPE_DB,
        }
    }

    pub const fn with_slope(mut self, slope: i32) -> Self {
        self.slope = slope;
        self
    }

    pub fn validate(&self, sample_rate: f64) -> ChainResult<()> {
        let nyquist = sample_rate / 2.0;
        let frequency = f64::from(self.frequency);
        if !frequency.is_finite() || frequency <= 0.0 || frequency >= nyquist {
            return Err(ChainError::invalid_parameter(format!(
                "frequency {} Hz must be within (0, {nyquist}) Hz",
                self.frequency
            )));
        }
        if !self.q.is_finite() || self.q <= 0.0 {
            return Err(ChainError::invalid_parameter(format!(
                "Q must be greater than 0, got {}",
                self.q
            )));
        }
        if !self.gain_db.is_finite() {
            return Err(ChainError::invalid_parameter("gain must be finite"));
        }
        if self.filter_type.is_cut() {
            cut_sections(self.slope)?;
        }
        Ok(())
    }
}

/// Number of 12 dB/octave sections realising `slope`, rounded up.
pub fn cut_sections(slope: i32) -> ChainResult<usize> {
    if !(1..=MAX_SLOPE_DB).contains(&slope) {
        return Err(ChainError::invalid_parameter(format!(
            "slope must be between 1 and {MAX_SLOPE_DB} dB/octave, got {slope}"
        )));
    }
    Ok((slope as u32).div_ceil(SECTION_SLOPE_DB as u32) as usize)
}

/// Normalised biquad coefficients (a0 = 1).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BiquadCoeffs {
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Cookbook design for a single section. Inputs are assumed validated.
    pub fn design(
        filter_type: FilterType,
        frequency: f64,
        q: f64,
        gain_db: f64,
        sample_rate: f64,
    ) -> Self {
        let omega = 2.0 * PI * frequency / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let a = 10f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Bell => (
                alpha.mul_add(a, 1.0),
                -2.0 * cos_omega,
                (-alpha).mul_add(a, 1.0),
                1.0 + alpha / a,
                -2.0 * cos_omega,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_omega + sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
                    a * ((a + 1.0) - (a - 1.0) * cos_omega - sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_omega + sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
                    (a + 1.0) + (a - 1.0) * cos_omega - sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_omega + sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega),
                    a * ((a + 1.0) + (a - 1.0) * cos_omega - sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_omega + sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_omega),
                    (a + 1.0) - (a - 1.0) * cos_omega - sqrt_a_alpha,
                )
            }
            FilterType::LowCut => (
                (1.0 + cos_omega) / 2.0,
                -(1.0 + cos_omega),
                (1.0 + cos_omega) / 2.0,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
            FilterType::HighCut => (
                (1.0 - cos_omega) / 2.0,
                1.0 - cos_omega,
                (1.0 - cos_omega) / 2.0,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
            FilterType::Notch => (
                1.0,
                -2.0 * cos_omega,
                1.0,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
            // Constant 0 dB peak gain.
            FilterType::BandPass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude of the frequency response at `frequency`.
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * frequency / sample_rate;
        let (s1, c1) = omega.sin_cos();
        let (s2, c2) = (2.0 * omega).sin_cos();

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }
}

/// One Direct Form I section with its own delay line.
///
/// The delay line is kept in `f64`; in [`Precision::Single`] the recursion
/// itself runs on `f32` copies of the coefficients and state.
#[derive(Clone, Debug, Default)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    single: [f32; 5],
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        let mut biquad = Self::default();
        biquad.set_coefficients(coeffs);
        biquad
    }

    /// Swap coefficients, keeping the delay line.
    pub fn set_coefficients(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
        self.single = [
            coeffs.b0 as f32,
            coeffs.b1 as f32,
            coeffs.b2 as f32,
            coeffs.a1 as f32,
            coeffs.a2 as f32,
        ];
    }

    pub const fn coefficients(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    #[inline]
    pub fn process(&mut self, input: f32, precision: Precision) -> f32 {
        match precision {
            Precision::Double => self.process_double(f64::from(input)) as f32,
            Precision::Single => self.process_single(input),
        }
    }

    #[inline]
    fn process_double(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2
            - c.a1 * self.y1
            - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    #[inline]
    fn process_single(&mut self, input: f32) -> f32 {
        let [b0, b1, b2, a1, a2] = self.single;
        let output = b0 * input + b1 * self.x1 as f32 + b2 * self.x2 as f32
            - a1 * self.y1 as f32
            - a2 * self.y2 as f32;
        self.x2 = self.x1;
        self.x1 = f64::from(input);
        self.y2 = self.y1;
        self.y1 = f64::from(output);
        output
    }

    pub const fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// A filter realised as one or more cascaded biquads.
#[derive(Clone, Debug)]
pub struct FilterCascade {
    sections: Vec<Biquad>,
}

impl FilterCascade {
    /// Validate `spec` and build its sections.
    pub fn design(spec: &FilterSpec, sample_rate: f64) -> ChainResult<Self> {
        let sections = Self::design_sections(spec, sample_rate)?
            .into_iter()
            .map(Biquad::new)
            .collect();
        Ok(Self { sections })
    }

    fn design_sections(spec: &FilterSpec, sample_rate: f64) -> ChainResult<Vec<BiquadCoeffs>> {
        spec.validate(sample_rate)?;
        let frequency = f64::from(spec.frequency);
        let q = f64::from(spec.q);
        let gain_db = f64::from(spec.gain_db);

        if !spec.filter_type.is_cut() {
            return Ok(vec![BiquadCoeffs::design(
                spec.filter_type,
                frequency,
                q,
                gain_db,
                sample_rate,
            )]);
        }

        let count = cut_sections(spec.slope)?;
        let mut sections = Vec::with_capacity(count);
        sections.push(BiquadCoeffs::design(
            spec.filter_type,
            frequency,
            q,
            0.0,
            sample_rate,
        ));
        let follower =
            BiquadCoeffs::design(spec.filter_type, frequency, FOLLOWER_Q, 0.0, sample_rate);
        sections.resize(count, follower);
        Ok(sections)
    }

    /// Redesign in place. On error the current coefficients are untouched.
    /// The delay lines survive when the section count is unchanged.
    pub fn redesign(&mut self, spec: &FilterSpec, sample_rate: f64) -> ChainResult<()> {
        let coeffs = Self::design_sections(spec, sample_rate)?;
        if coeffs.len() == self.sections.len() {
            for (section, c) in self.sections.iter_mut().zip(coeffs) {
                section.set_coefficients(c);
            }
        } else {
            self.sections = coeffs.into_iter().map(Biquad::new).collect();
        }
        Ok(())
    }

    #[inline]
    pub fn process(&mut self, input: f32, precision: Precision) -> f32 {
        self.sections
            .iter_mut()
            .fold(input, |signal, section| section.process(signal, precision))
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        self.sections
            .iter()
            .map(|s| s.coefficients().magnitude_at(frequency, sample_rate))
            .product()
    }

    pub fn clear(&mut self) {
        for section in &mut self.sections {
            section.clear();
        }
    }
}
