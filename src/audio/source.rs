use anyhow::{Context, Result, anyhow};
use hound::WavReader;
use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Read;
use std::path::Path;

/// Load a WAV file as mono `f32` at `target_rate`.
pub fn load_wav_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    decode_mono(reader, target_rate)
        .with_context(|| format!("Failed to decode {}", path.display()))
}

/// Decode in-memory WAV data as mono `f32` at `target_rate`.
pub fn decode_wav_mono<R: Read>(source: R, target_rate: u32) -> Result<Vec<f32>> {
    let reader = WavReader::new(source).context("Failed to parse WAV header")?;
    decode_mono(reader, target_rate)
}

fn decode_mono<R: Read>(reader: WavReader<R>, target_rate: u32) -> Result<Vec<f32>> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(anyhow!("WAV file declares zero channels"));
    }

    let samples: Vec<f32> = if spec.sample_format == hound::SampleFormat::Float {
        reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read float samples")?
    } else {
        let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
        reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / max_val))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read integer samples")?
    };

    let mono = downmix(samples, spec.channels as usize);

    if spec.sample_rate == target_rate {
        return Ok(mono);
    }
    debug!(
        "Resampling {} samples from {} Hz to {target_rate} Hz",
        mono.len(),
        spec.sample_rate
    );
    resample(&mono, spec.sample_rate, target_rate)
}

/// Average interleaved frames down to one channel.
pub fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample a whole mono buffer, compensating the resampler's delay so the
/// output starts aligned with the input and has the expected length.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(anyhow!("cannot resample from {from_rate} Hz to {to_rate} Hz"));
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .context("Failed to create resampler")?;
    let delay = resampler.output_delay();

    let input = vec![samples.to_vec()];
    let mut output = resampler
        .process(&input, None)
        .context("Resampling failed")?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Resampling produced no channel"))?;

    // Flush the filter tail until the delayed signal has been emitted.
    while output.len() < expected + delay {
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .context("Resampler flush failed")?;
        match tail.into_iter().next() {
            Some(chunk) if !chunk.is_empty() => output.extend(chunk),
            _ => break,
        }
    }

    let mut aligned: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);
    Ok(aligned)
}
