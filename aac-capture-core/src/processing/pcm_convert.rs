/// Converts float device buffers into the interleaved 16-bit PCM the
/// encoder is configured for.
///
/// Backends that cannot open a device directly in the requested format
/// (WASAPI shared mode always delivers its float mix format) run every
/// captured buffer through this: downmix → linear resample → i16 LE.
///
/// The resampler is stateful. The fractional read position and the last
/// input sample carry over from one buffer to the next, so a stream split
/// into arbitrary packet sizes produces the same samples as one long buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmConverter {
    pub target_sample_rate: u32,
    source_rate: u32,
    /// Read position relative to the next buffer's first sample; `-1.0`
    /// addresses `carry`.
    position: f64,
    carry: Option<f32>,
}

impl PcmConverter {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate,
            source_rate: 0,
            position: 0.0,
            carry: None,
        }
    }

    /// Convert one interleaved float buffer to mono 16-bit little-endian PCM.
    pub fn to_mono_pcm16(&mut self, samples: &[f32], source_sample_rate: u32, source_channels: u16) -> Vec<u8> {
        let mono = downmix_to_mono(samples, source_channels as usize);
        let resampled = self.resample(&mono, source_sample_rate);
        convert_to_int16_pcm(&resampled)
    }

    /// Resample the next mono buffer of a continuous stream.
    ///
    /// Output lags the input by at most one source sample: the tail of each
    /// buffer is interpolated once the next buffer arrives.
    pub fn resample(&mut self, samples: &[f32], source_rate: u32) -> Vec<f32> {
        if source_rate == 0 || source_rate == self.target_sample_rate {
            return samples.to_vec();
        }
        if source_rate != self.source_rate {
            self.source_rate = source_rate;
            self.position = 0.0;
            self.carry = None;
        }
        let Some(&last) = samples.last() else {
            return Vec::new();
        };

        let step = source_rate as f64 / self.target_sample_rate as f64;
        let at = |index: isize| -> f32 {
            if index < 0 {
                self.carry.unwrap_or(samples[0])
            } else {
                samples[index as usize]
            }
        };

        let len = samples.len() as f64;
        let mut output = Vec::with_capacity((len / step) as usize + 1);
        let mut position = self.position;
        while position.floor() + 1.0 < len {
            let index = position.floor();
            let fraction = (position - index) as f32;
            let index = index as isize;
            output.push(at(index) * (1.0 - fraction) + at(index + 1) * fraction);
            position += step;
        }

        self.position = position - len;
        self.carry = Some(last);
        output
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// One-shot linear resampling of a complete mono buffer.
///
/// Returns input unchanged if rates match.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    PcmConverter::new(target_rate).resample(samples, source_rate)
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
///
/// Clamps out-of-range values. Output length = `samples.len() * 2` bytes.
pub fn convert_to_int16_pcm(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}
