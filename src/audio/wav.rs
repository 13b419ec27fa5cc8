use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;
use std::fs;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

/// Rendered transmissions are always 16-bit mono.
pub const fn output_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

fn write_samples<W: Write + Seek>(writer: W, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer =
        WavWriter::new(writer, output_spec(sample_rate)).context("Failed to start WAV stream")?;
    for &sample in samples {
        writer
            .write_sample(to_i16(sample))
            .context("Failed to write WAV sample")?;
    }
    writer.finalize().context("Failed to finalize WAV stream")?;
    Ok(())
}

pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create WAV file {}", path.display()))?;
    write_samples(std::io::BufWriter::new(file), samples, sample_rate)?;
    info!("Transmission saved: {}", path.display());
    Ok(())
}

/// Encode as a complete WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    write_samples(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

/// `<dir>/radio_<YYYYmmdd_HHMMSS>.wav` for the current local time.
pub fn timestamped_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "radio_{}.wav",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use tempfile::TempDir;

    #[test]
    fn encodes_clipped_16_bit_mono() -> Result<()> {
        let bytes = encode_wav(&[0.0, 0.5, 1.5, -2.0], 48_000)?;
        let reader = WavReader::new(Cursor::new(bytes))?;
        assert_eq!(reader.spec(), output_spec(48_000));
        let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
        assert_eq!(samples, vec![0, 16383, i16::MAX, -i16::MAX]);
        Ok(())
    }

    #[test]
    fn writes_into_missing_directory() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = timestamped_path(&tmp.path().join("transmissions"));
        write_wav(&path, &[0.25; 480], 48_000)?;

        let reader = WavReader::open(&path)?;
        assert_eq!(reader.duration(), 480);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("radio_") && name.ends_with(".wav"));
        Ok(())
    }
}
