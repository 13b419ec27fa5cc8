use anyhow::{Context, Result, anyhow};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio::mixer::{BedLayer, TonePlacement, mix_block};
use crate::audio::source::load_wav_mono;
use crate::settings::{BedSettings, RadioSettings};

/// Serialises renders across the whole process.
pub struct RenderLock {
    inner: Mutex<()>,
}

/// Proof that the render lock is held.
pub struct RenderGuard<'a> {
    _held: MutexGuard<'a, ()>,
}

impl Default for RenderLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// Block until the lock is free. The lock guards no data, so a poisoned
    /// lock is simply taken over.
    pub fn acquire(&self) -> RenderGuard<'_> {
        RenderGuard {
            _held: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// The process-wide render lock.
pub static RENDER_LOCK: RenderLock = RenderLock::new();

/// Ambience beds at the working sample rate.
#[derive(Debug, Clone, Default)]
pub struct Beds {
    pub static_bed: Option<Vec<f32>>,
    pub priority_tone: Option<Vec<f32>>,
}

impl Beds {
    /// Load the configured beds. The tone is only read for priority renders.
    /// A configured bed that cannot be read is an error.
    pub fn load(settings: &BedSettings, sample_rate: u32, priority: bool) -> Result<Self> {
        let static_bed = settings
            .static_bed
            .as_deref()
            .map(|path| load_bed(path, sample_rate, "static bed"))
            .transpose()?;

        let priority_tone = if priority {
            let tone = settings
                .priority_tone
                .as_deref()
                .map(|path| load_bed(path, sample_rate, "priority tone"))
                .transpose()?;
            if tone.is_none() {
                warn!("Priority transmission requested but no priority tone is configured");
            }
            tone
        } else {
            None
        };

        Ok(Self {
            static_bed,
            priority_tone,
        })
    }
}

fn load_bed(path: &Path, sample_rate: u32, what: &str) -> Result<Vec<f32>> {
    let samples = load_wav_mono(path, sample_rate)
        .with_context(|| format!("Failed to load {what} from {}", path.display()))?;
    debug!("Loaded {what}: {} samples", samples.len());
    Ok(samples)
}

/// Voice after the processing chain, with what the mix needs from it.
#[derive(Debug, Clone)]
pub struct ProcessedVoice {
    pub samples: Vec<f32>,
    /// Extra static level requested through the saturator.
    pub static_volume: f32,
    /// Deepest per-block compressor reduction, 0 or negative dB.
    pub peak_gain_reduction_db: f32,
}

/// Turns a voice clip into a radio transmission.
pub struct Renderer {
    settings: RadioSettings,
}

impl Renderer {
    pub const fn new(settings: RadioSettings) -> Self {
        Self { settings }
    }

    pub const fn settings(&self) -> &RadioSettings {
        &self.settings
    }

    /// Run `voice` through a freshly configured chain, one block at a time.
    pub fn process_voice(&self, voice: &[f32]) -> Result<ProcessedVoice> {
        let mut chain = self
            .settings
            .build_chain()
            .context("Failed to configure the processing chain")?;
        let block_size = chain.max_block_size();

        let mut samples = voice.to_vec();
        let mut peak_reduction = 0.0f32;
        for (index, block) in samples.chunks_mut(block_size).enumerate() {
            chain
                .process_block(block)
                .with_context(|| format!("Processing failed in block {index}"))?;
            peak_reduction = peak_reduction.min(chain.compressor_gain_reduction());
        }

        Ok(ProcessedVoice {
            samples,
            static_volume: chain.static_volume(),
            peak_gain_reduction_db: peak_reduction,
        })
    }

    /// Render a transmission: optional priority preamble, then the processed
    /// voice over looped static. Every sum is hard clipped.
    pub fn render(
        &self,
        _guard: &RenderGuard<'_>,
        voice: &[f32],
        beds: &Beds,
        priority: bool,
    ) -> Result<Vec<f32>> {
        let processed = self.process_voice(voice)?;
        let mix = self.settings.mix;
        let block_size = self.settings.block_size;
        let placement = self.settings.beds.tone_placement;
        let static_bed = beds.static_bed.as_deref().unwrap_or(&[]);
        let tone = if priority {
            beds.priority_tone.as_deref()
        } else {
            None
        };

        let preamble_len = match (tone, placement) {
            (Some(tone), TonePlacement::Preamble) => tone.len(),
            _ => 0,
        };
        let mut output = Vec::with_capacity(preamble_len + processed.samples.len());
        let mut scratch = vec![0.0f32; block_size];

        if let Some(tone) = tone
            && placement == TonePlacement::Preamble
        {
            let mut layers = [BedLayer::new(static_bed, mix.tone_static_gain)];
            append_mixed(&mut output, tone, mix.tone_gain, &mut layers, &mut scratch);
        }

        // The voice section restarts the static from its beginning.
        let static_gain = mix.static_gain + processed.static_volume;
        let mut layers = vec![BedLayer::new(static_bed, static_gain)];
        if let Some(tone) = tone
            && placement == TonePlacement::Under
        {
            layers.push(BedLayer::new(tone, mix.tone_gain));
        }
        append_mixed(
            &mut output,
            &processed.samples,
            mix.voice_gain,
            &mut layers,
            &mut scratch,
        );

        info!(
            "Rendered {} samples ({} preamble), peak gain reduction {:.1} dB",
            output.len(),
            preamble_len,
            processed.peak_gain_reduction_db
        );
        Ok(output)
    }
}

/// Append `lead * gain` mixed with `layers`, block by block.
fn append_mixed(
    output: &mut Vec<f32>,
    lead: &[f32],
    gain: f32,
    layers: &mut [BedLayer<'_>],
    scratch: &mut [f32],
) {
    for chunk in lead.chunks(scratch.len().max(1)) {
        let start = output.len();
        output.extend(chunk.iter().map(|s| s * gain));
        mix_block(&mut output[start..], layers, scratch);
    }
}

/// Render under the global lock, falling back to the unmodified voice on
/// any failure.
pub fn render_or_passthrough(renderer: &Renderer, voice: &[f32], priority: bool) -> Vec<f32> {
    let guard = RENDER_LOCK.acquire();
    let settings = renderer.settings();
    let result = Beds::load(&settings.beds, settings.working_sample_rate, priority)
        .and_then(|beds| renderer.render(&guard, voice, &beds, priority));

    match result {
        Ok(output) => output,
        Err(e) => {
            error!("Radio effect failed, passing voice through: {e:#}");
            voice.to_vec()
        }
    }
}

/// Load a voice file and render it, returning the samples to write.
pub fn render_file(
    renderer: &Renderer,
    input: &Path,
    priority: bool,
) -> Result<Vec<f32>> {
    let rate = renderer.settings().working_sample_rate;
    let voice = load_wav_mono(input, rate)?;
    if voice.is_empty() {
        return Err(anyhow!("{} contains no audio", input.display()));
    }
    Ok(render_or_passthrough(renderer, &voice, priority))
}
