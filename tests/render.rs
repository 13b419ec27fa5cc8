use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use radiofx::audio::render::{Beds, RENDER_LOCK, Renderer, render_file, render_or_passthrough};
use radiofx::audio::source::decode_wav_mono;
use radiofx::audio::wav::{encode_wav, write_wav};
use radiofx::settings::RadioSettings;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

const SAMPLE_RATE: u32 = 48_000;

fn write_float_wav(path: &Path, samples: &[f32], channels: u16) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

fn bypass_settings() -> RadioSettings {
    let mut settings = RadioSettings::default();
    settings.chain.equalizer = false;
    settings.chain.compressor = false;
    settings.chain.saturator = false;
    settings.beds.static_bed = None;
    settings.beds.priority_tone = None;
    settings
}

#[test]
fn static_bed_loops_under_silence() -> Result<()> {
    let tmp = TempDir::new()?;
    let bed_path = tmp.path().join("static.wav");
    let bed = [0.2, -0.2, 0.4];
    write_float_wav(&bed_path, &bed, 1)?;

    let voice_path = tmp.path().join("voice.wav");
    write_float_wav(&voice_path, &[0.0; 3000], 1)?;

    let mut settings = bypass_settings();
    settings.beds.static_bed = Some(bed_path);
    let renderer = Renderer::new(settings);
    let out = render_file(&renderer, &voice_path, false)?;

    assert_eq!(out.len(), 3000);
    for (n, &s) in out.iter().enumerate() {
        let expected = bed[n % bed.len()] * 0.5;
        assert!((s - expected).abs() < 1e-6, "sample {n}: {s} vs {expected}");
    }
    Ok(())
}

#[test]
fn stereo_tone_is_downmixed_into_preamble() -> Result<()> {
    let tmp = TempDir::new()?;
    let tone_path = tmp.path().join("tone.wav");
    // Two frames: (0.1, 0.3) and (0.0, 0.0).
    write_float_wav(&tone_path, &[0.1, 0.3, 0.0, 0.0], 2)?;

    let mut settings = bypass_settings();
    settings.beds.priority_tone = Some(tone_path);
    let beds = Beds::load(&settings.beds, SAMPLE_RATE, true)?;
    assert_eq!(beds.priority_tone.as_ref().map(Vec::len), Some(2));
    assert!(beds.static_bed.is_none());

    let renderer = Renderer::new(settings);
    let out = renderer.render(&RENDER_LOCK.acquire(), &[0.1; 10], &beds, true)?;
    assert_eq!(out.len(), 12);
    // 0.2 * 3.5, clipped
    assert!((out[0] - 0.7).abs() < 1e-5);
    assert_eq!(out[1], 0.0);
    assert!((out[2] - 0.14).abs() < 1e-5);
    Ok(())
}

#[test]
fn beds_of_different_lengths_loop_independently() -> Result<()> {
    let mut settings = bypass_settings();
    settings.beds.tone_placement = radiofx::audio::mixer::TonePlacement::Under;
    settings.block_size = 16;
    settings.mix.static_gain = 1.0;
    settings.mix.tone_gain = 1.0;
    let renderer = Renderer::new(settings);

    let static_bed: Vec<f32> = (0..7).map(|n| n as f32 * 0.01).collect();
    let tone: Vec<f32> = (0..5).map(|n| n as f32 * 0.1).collect();
    let beds = Beds {
        static_bed: Some(static_bed.clone()),
        priority_tone: Some(tone.clone()),
    };
    let out = renderer.render(&RENDER_LOCK.acquire(), &[0.0; 100], &beds, true)?;

    assert_eq!(out.len(), 100);
    for (n, &s) in out.iter().enumerate() {
        let expected = static_bed[n % 7] + tone[n % 5];
        assert!((s - expected).abs() < 1e-6, "sample {n}: {s} vs {expected}");
    }
    Ok(())
}

#[test]
fn loud_mix_is_hard_clipped() -> Result<()> {
    let mut settings = bypass_settings();
    settings.mix.voice_gain = 4.0;
    let renderer = Renderer::new(settings);
    let beds = Beds {
        static_bed: Some(vec![0.5]),
        priority_tone: None,
    };
    let out = renderer.render(&RENDER_LOCK.acquire(), &[0.9, -0.9, 0.0], &beds, false)?;
    assert_eq!(out, vec![1.0, -1.0, 0.25]);
    Ok(())
}

#[test]
fn unreadable_bed_passes_voice_through() {
    let mut settings = RadioSettings::default();
    settings.beds.static_bed = Some("/definitely/not/here.wav".into());
    let renderer = Renderer::new(settings);

    let voice: Vec<f32> = (0..500).map(|n| (n as f32 * 0.01).sin() * 0.5).collect();
    assert_eq!(render_or_passthrough(&renderer, &voice, true), voice);
}

#[test]
fn invalid_settings_pass_voice_through() {
    let mut settings = bypass_settings();
    settings.compressor.ratio = 0.5;
    let renderer = Renderer::new(settings);
    let voice = vec![0.1; 64];
    assert_eq!(render_or_passthrough(&renderer, &voice, false), voice);
}

#[test]
fn rendered_bytes_decode_back() -> Result<()> {
    let renderer = Renderer::new(RadioSettings {
        beds: bypass_settings().beds,
        ..RadioSettings::default()
    });
    let voice: Vec<f32> = (0..4800)
        .map(|n| (n as f32 * 0.13).sin() * 0.6)
        .collect();
    let out = renderer.render(&RENDER_LOCK.acquire(), &voice, &Beds::default(), false)?;
    assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));

    let bytes = encode_wav(&out, SAMPLE_RATE)?;
    let decoded = decode_wav_mono(Cursor::new(bytes), SAMPLE_RATE)?;
    assert_eq!(decoded.len(), out.len());
    for (a, b) in decoded.iter().zip(&out) {
        assert!((a - b).abs() < 1e-3);
    }

    let tmp = TempDir::new()?;
    let path = tmp.path().join("out").join("radio.wav");
    write_wav(&path, &out, SAMPLE_RATE)?;
    assert!(path.exists());
    Ok(())
}
