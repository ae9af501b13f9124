//! Synthesized alarm tones. Rendered to 16-bit mono PCM WAV so the voice
//! driver can decode and Opus-encode them like any other input.

use std::{f32::consts::PI, io::Cursor, time::Duration};

pub const SAMPLE_RATE: u32 = 48_000;

const AMPLITUDE: f32 = 0.4;
// Short linear ramps at each edge to avoid clicks.
const FADE_MS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// 0 Hz renders silence.
    pub freq_hz: f32,
    pub duration: Duration,
    pub gap_after: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToneSequence {
    pub tones: Vec<Tone>,
}

impl ToneSequence {
    /// Three rounds of a high/low double beep.
    pub fn alarm() -> Self {
        let beep = |freq_hz, gap_ms| Tone {
            freq_hz,
            duration: Duration::from_millis(180),
            gap_after: Duration::from_millis(gap_ms),
        };
        let tones = (0..3)
            .flat_map(|_| [beep(880.0, 70), beep(1320.0, 400)])
            .collect();
        Self { tones }
    }

    pub fn total_duration(&self) -> Duration {
        self.tones.iter().map(|t| t.duration + t.gap_after).sum()
    }
}

impl Default for ToneSequence {
    fn default() -> Self {
        Self::alarm()
    }
}

fn samples_for(d: Duration) -> u32 {
    (d.as_secs_f64() * SAMPLE_RATE as f64).round() as u32
}

fn envelope(i: u32, len: u32, fade: u32) -> f32 {
    if fade == 0 {
        return 1.0;
    }
    let from_edge = i.min(len - 1 - i);
    if from_edge < fade {
        from_edge as f32 / fade as f32
    } else {
        1.0
    }
}

pub fn render_wav(seq: &ToneSequence) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for tone in &seq.tones {
        let len = samples_for(tone.duration);
        let fade = (SAMPLE_RATE * FADE_MS / 1000).min(len / 2);
        for i in 0..len {
            let sample = if tone.freq_hz > 0.0 {
                let t = i as f32 / SAMPLE_RATE as f32;
                (2.0 * PI * tone.freq_hz * t).sin() * AMPLITUDE * envelope(i, len, fade)
            } else {
                0.0
            };
            writer.write_sample((sample * i16::MAX as f32) as i16)?;
        }
        for _ in 0..samples_for(tone.gap_after) {
            writer.write_sample(0i16)?;
        }
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}
