use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

/// Decibel window mapped onto the 0..=255 byte range of the spectrum.
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

/// Per-frame snapshot of the analyser output.
///
/// Both arrays are `fft_size / 2` long. Recomputed every frame, never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumFrame {
    /// Byte-quantised magnitude per frequency bin.
    pub frequency_bins: Vec<u8>,
    /// Byte-quantised time-domain samples, 128 is silence.
    pub waveform_bins: Vec<u8>,
}

/// Analyser tap fed with mono samples by the connected source.
///
/// Keeps the newest `fft_size` samples, runs a Blackman-windowed FFT over
/// them on demand and quantises the smoothed magnitudes to bytes.
pub struct AnalyserTap {
    fft_size: usize,
    smoothing: f32,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    window: Vec<f32>,
    samples: VecDeque<f32>,
    previous_magnitudes: Vec<f32>,
    frame: SpectrumFrame,
}

impl AnalyserTap {
    /// `fft_size` is rounded up to a power of two within
    /// [`MIN_FFT_SIZE`]..=[`MAX_FFT_SIZE`].
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size
            .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
            .next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        let bins = fft_size / 2;
        Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            window,
            samples: VecDeque::with_capacity(fft_size),
            previous_magnitudes: vec![0.0; bins],
            frame: SpectrumFrame {
                frequency_bins: vec![0; bins],
                waveform_bins: vec![128; bins],
            },
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 1.0);
    }

    /// Append newly played samples, keeping only the newest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            if self.samples.len() == self.fft_size {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Forget all buffered audio and smoothing history.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.previous_magnitudes.iter_mut().for_each(|m| *m = 0.0);
        self.frame.frequency_bins.iter_mut().for_each(|b| *b = 0);
        self.frame.waveform_bins.iter_mut().for_each(|b| *b = 128);
    }

    /// Recompute the spectrum and waveform from the buffered samples.
    pub fn analyse(&mut self) -> &SpectrumFrame {
        // Samples not yet received count as silence at the start of the window.
        let missing = self.fft_size - self.samples.len();
        for i in 0..missing {
            self.buffer[i] = Complex::new(0.0, 0.0);
        }
        for (i, sample) in self.samples.iter().enumerate() {
            let idx = missing + i;
            self.buffer[idx] = Complex::new(sample * self.window[idx], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for bin in 0..self.frequency_bin_count() {
            let magnitude = self.buffer[bin].norm() * scale;
            let smoothed = self.smoothing * self.previous_magnitudes[bin]
                + (1.0 - self.smoothing) * magnitude;
            self.previous_magnitudes[bin] = smoothed;

            self.frame.frequency_bins[bin] = if smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }

        let bins = self.frequency_bin_count();
        let offset = self.samples.len().saturating_sub(bins);
        for i in 0..bins {
            let sample = self.samples.get(offset + i).copied().unwrap_or(0.0);
            self.frame.waveform_bins[i] = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }

        &self.frame
    }

    /// Last computed frame without re-running the FFT.
    pub fn frame(&self) -> &SpectrumFrame {
        &self.frame
    }
}
