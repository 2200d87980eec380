use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;

/// Short two-pulse alert tone with a linear fade-out per pulse.
pub struct AlertChime {
    frequency: f32,
    pulse_samples: usize,
    gap_samples: usize,
    pulses: usize,
    num_sample: usize,
}

impl AlertChime {
    pub fn new() -> Self {
        Self::with_shape(880.0, Duration::from_millis(140), Duration::from_millis(70), 2)
    }

    pub fn with_shape(frequency: f32, pulse: Duration, gap: Duration, pulses: usize) -> Self {
        let to_samples = |d: Duration| (d.as_micros() * SAMPLE_RATE as u128 / 1_000_000) as usize;
        Self {
            frequency,
            pulse_samples: to_samples(pulse).max(1),
            gap_samples: to_samples(gap),
            pulses: pulses.max(1),
            num_sample: 0,
        }
    }

    fn total_samples(&self) -> usize {
        self.pulses * self.pulse_samples + (self.pulses - 1) * self.gap_samples
    }
}

impl Default for AlertChime {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for AlertChime {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples() {
            return None;
        }

        let period = self.pulse_samples + self.gap_samples;
        let offset = self.num_sample % period;
        self.num_sample += 1;

        // Silence between pulses
        if offset >= self.pulse_samples {
            return Some(0.0);
        }

        let t = offset as f32 / SAMPLE_RATE as f32;
        let envelope = 1.0 - offset as f32 / self.pulse_samples as f32;
        Some((2.0 * PI * self.frequency * t).sin() * envelope * 0.4)
    }
}

impl Source for AlertChime {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples().saturating_sub(self.num_sample))
    }

    fn channels(&self) -> u16 {
        1 // Mono
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.total_samples() as f64 / SAMPLE_RATE as f64,
        ))
    }
}
