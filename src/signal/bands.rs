/// Band-averaged spectrum, one value in `[0, 1]` per band.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelsVector {
    values: Vec<f32>,
}

impl LevelsVector {
    pub fn zeros(band_count: usize) -> Self {
        Self {
            values: vec![0.0; band_count],
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    /// Arithmetic mean of all bands, 0 for an empty vector.
    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    /// One RGB texel per band, level in the red channel.
    pub fn texture_bytes(&self) -> Vec<u8> {
        self.values
            .iter()
            .flat_map(|&v| [(v * 255.0).floor().clamp(0.0, 255.0) as u8, 0, 0])
            .collect()
    }

    fn fill(&mut self, spectrum: &[u8], gain: f32) {
        let band_count = self.values.len();
        if band_count == 0 {
            return;
        }
        let per_band = spectrum.len() / band_count;

        for (i, level) in self.values.iter_mut().enumerate() {
            if per_band == 0 {
                *level = 0.0;
                continue;
            }
            let group = &spectrum[i * per_band..(i + 1) * per_band];
            let sum: u32 = group.iter().map(|&b| b as u32).sum();
            let average = sum as f32 / per_band as f32;

            let tilt = 1.0 + i as f32 / (4.0 * band_count as f32);
            *level = (average / 255.0 * gain * tilt).clamp(0.0, 1.0);
        }
    }

    fn zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Reduce `spectrum` to `band_count` equal-width bands.
///
/// Bins that don't divide evenly into the bands are dropped from the top.
/// Each band is normalised to `[0, 1]`, scaled by `gain`, tilted slightly
/// toward the high bands and clamped.
pub fn split(spectrum: &[u8], band_count: usize, gain: f32) -> LevelsVector {
    let mut levels = LevelsVector::zeros(band_count);
    levels.fill(spectrum, gain);
    levels
}

/// Reusable splitter that updates one levels vector in place every frame.
#[derive(Debug, Clone)]
pub struct SignalBandSplitter {
    gain: f32,
    levels: LevelsVector,
}

impl SignalBandSplitter {
    pub fn new(band_count: usize, gain: f32) -> Self {
        Self {
            gain,
            levels: LevelsVector::zeros(band_count),
        }
    }

    pub fn band_count(&self) -> usize {
        self.levels.len()
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn set_band_count(&mut self, band_count: usize) {
        if band_count != self.levels.len() {
            self.levels = LevelsVector::zeros(band_count);
        }
    }

    /// Split the frame's spectrum, or zero every band when no source is
    /// connected.
    pub fn split(&mut self, spectrum: Option<&[u8]>) -> &LevelsVector {
        match spectrum {
            Some(bins) => self.levels.fill(bins, self.gain),
            None => self.levels.zero(),
        }
        &self.levels
    }

    pub fn levels(&self) -> &LevelsVector {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_amplitude_spectrum_gets_high_band_tilt() {
        let levels = split(&[128; 1024], 16, 1.0);
        assert_eq!(levels.len(), 16);
        for (i, &v) in levels.values().iter().enumerate() {
            let expected = 128.0 / 255.0 * (1.0 + i as f32 / 64.0);
            assert!((v - expected).abs() < 1e-5, "band {i}: {v} vs {expected}");
        }
    }

    #[test]
    fn remainder_bins_are_dropped() {
        // 10 bins into 3 bands: 3 bins each, the last bin is ignored
        let mut spectrum = vec![0u8; 10];
        spectrum[9] = 255;
        let levels = split(&spectrum, 3, 1.0);
        assert!(levels.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn gain_is_clamped_to_unit() {
        let levels = split(&[255; 64], 4, 3.0);
        assert!(levels.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn short_spectrum_reads_zero() {
        let levels = split(&[255; 3], 16, 1.0);
        assert_eq!(levels.len(), 16);
        assert_eq!(levels.mean(), 0.0);
    }

    #[test]
    fn splitter_zeroes_without_source() {
        let mut splitter = SignalBandSplitter::new(8, 1.0);
        splitter.split(Some(&[200; 64]));
        assert!(splitter.levels().mean() > 0.0);
        let levels = splitter.split(None);
        assert!(levels.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn texture_packs_red_channel() {
        let levels = split(&[255; 4], 2, 1.0);
        assert_eq!(levels.texture_bytes(), vec![255, 0, 0, 255, 0, 0]);
    }
}
