//! Estimador de nível sonoro (dB SPL).
//!
//! Cada ciclo consome exatamente [`SOUND_WINDOW`] amostras do ADC. A
//! amplitude RMS sai do algoritmo de Welford numa única passada, sem
//! buffer de duas passadas e sem cancelamento numérico.
//!
//! ```text
//! contagens ──► RMS ──► volts ──► Pa ──► gain · log10(Pa / Pref)
//! ```

use crate::config::SoundConfig;

/// Amostras por ciclo de estimativa.
pub const SOUND_WINDOW: usize = 512;

/// Média e variância online (Welford).
#[derive(Debug, Clone, Copy, Default)]
pub struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Variância populacional (M2 / n).
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// RMS em torno da média: o bias DC do microfone sai naturalmente.
    pub fn rms(&self) -> f64 {
        self.variance().max(0.0).sqrt()
    }
}

/// Converte janelas de contagens do ADC em dB SPL calibrado.
#[derive(Debug, Clone)]
pub struct SoundEstimator {
    config: SoundConfig,
}

impl SoundEstimator {
    pub fn new(config: SoundConfig) -> Self {
        Self { config }
    }

    /// Estima o nível de uma janela completa.
    pub fn estimate(&self, window: &[u16; SOUND_WINDOW]) -> f32 {
        self.estimate_from(window.iter().copied())
    }

    /// Estima o nível a partir de qualquer sequência de contagens.
    pub fn estimate_from<I>(&self, samples: I) -> f32
    where
        I: IntoIterator<Item = u16>,
    {
        let mut acc = Welford::new();
        for s in samples {
            acc.push(f64::from(s));
        }
        self.spl_from_rms(acc.rms())
    }

    /// RMS em contagens → dB SPL.
    pub fn spl_from_rms(&self, rms_counts: f64) -> f32 {
        let volts = rms_counts * f64::from(self.config.vref_volts) / f64::from(self.config.adc_max);
        let pascal = volts / f64::from(self.config.sensitivity_v_per_pa);
        self.pascal_to_db(pascal)
    }

    /// Pressão ≤ 0 (ou não finita) é silêncio: 0.0 dB, nunca NaN.
    pub fn pascal_to_db(&self, pascal: f64) -> f32 {
        if !pascal.is_finite() || pascal <= 0.0 {
            return 0.0;
        }
        let db = f64::from(self.config.spl_gain)
            * (pascal / f64::from(self.config.reference_pa)).log10();
        db.max(0.0) as f32
    }
}
