//! Estimador de frequência cardíaca por fotopletismografia.
//!
//! Enche uma janela fixa de 6 s (150 amostras a 25 Hz) dos três canais e,
//! quando cheia, conta picos em cada canal. O BPM final é a média dos três
//! canais; canal sem picos entra na média como 0.

use crate::config::HeartConfig;
use crate::error::SensorError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Amostras por janela (6 s a 25 Hz).
pub const PPG_WINDOW: usize = 150;

/// Canal óptico do sensor PPG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PpgChannel {
    Green,
    Red,
    Infrared,
}

impl PpgChannel {
    pub const ALL: [PpgChannel; 3] = [PpgChannel::Green, PpgChannel::Red, PpgChannel::Infrared];

    fn index(self) -> usize {
        match self {
            PpgChannel::Green => 0,
            PpgChannel::Red => 1,
            PpgChannel::Infrared => 2,
        }
    }
}

// ──────────────────────────────────────────────
// Janela
// ──────────────────────────────────────────────

/// Três buffers paralelos preenchidos índice a índice.
///
/// Depois de consumida, a janela é sobrescrita a partir do índice 0.
#[derive(Debug, Clone)]
pub struct PpgWindow {
    channels: [[f32; PPG_WINDOW]; 3],
    cursor: usize,
}

impl Default for PpgWindow {
    fn default() -> Self {
        Self {
            channels: [[0.0; PPG_WINDOW]; 3],
            cursor: 0,
        }
    }
}

impl PpgWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grava um trio alinhado. Retorna `true` quando a janela encheu.
    pub fn push(&mut self, green: f32, red: f32, infrared: f32) -> bool {
        if self.is_full() {
            return true;
        }
        self.channels[0][self.cursor] = green;
        self.channels[1][self.cursor] = red;
        self.channels[2][self.cursor] = infrared;
        self.cursor += 1;
        self.is_full()
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn is_full(&self) -> bool {
        self.cursor == PPG_WINDOW
    }

    pub fn channel(&self, channel: PpgChannel) -> &[f32; PPG_WINDOW] {
        &self.channels[channel.index()]
    }

    /// Limpeza lógica: o próximo ciclo sobrescreve a partir do índice 0.
    pub fn clear(&mut self) {
        self.cursor = 0;
    }
}

// ──────────────────────────────────────────────
// Detecção de picos
// ──────────────────────────────────────────────

/// Amostras suprimidas após cada pico: `⌈refratário × taxa⌉`.
///
/// O produto é feito em f64 e produtos a menos de 1e-4 de um inteiro são
/// tratados como exatos (0.3 × 50 não vira 16).
pub fn refractory_samples(refractory_secs: f32, sample_rate_hz: f32) -> usize {
    let x = f64::from(refractory_secs) * f64::from(sample_rate_hz);
    let nearest = x.round();
    let samples = if (x - nearest).abs() < 1e-4 { nearest } else { x.ceil() };
    samples.max(0.0) as usize
}

/// Conta máximos locais internos acima de `ratio × máximo`.
///
/// Cada pico aceito suprime as `refractory` amostras seguintes, evitando
/// contar duas vezes as bordas de um mesmo batimento.
pub fn count_peaks(samples: &[f32], threshold_ratio: f32, refractory: usize) -> usize {
    if samples.len() < 3 {
        return 0;
    }
    let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let threshold = threshold_ratio * max;

    let mut peaks = 0;
    let mut i = 1;
    while i < samples.len() - 1 {
        let x = samples[i];
        if x > threshold && x > samples[i - 1] && x >= samples[i + 1] {
            peaks += 1;
            i += refractory + 1;
        } else {
            i += 1;
        }
    }
    peaks
}

/// BPM de um canal: picos / duração da janela × 60.
pub fn channel_bpm(peaks: usize, window_len: usize, sample_rate_hz: f32) -> f32 {
    let duration_secs = window_len as f32 / sample_rate_hz;
    if duration_secs <= 0.0 {
        return 0.0;
    }
    peaks as f32 / duration_secs * 60.0
}

/// Média aritmética dos três canais, zeros incluídos.
pub fn combine_bpm(per_channel: &[f32; 3]) -> f32 {
    per_channel.iter().sum::<f32>() / per_channel.len() as f32
}

/// Truncamento para o atributo de 8 bits (satura em 0–255).
pub fn bpm_to_u8(bpm: f32) -> u8 {
    if !bpm.is_finite() || bpm <= 0.0 {
        return 0;
    }
    bpm.min(255.0) as u8
}

// ──────────────────────────────────────────────
// Estimador
// ──────────────────────────────────────────────

/// Resultado de uma janela completa.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateReading {
    /// Picos por canal (verde, vermelho, IR)
    pub peaks: [usize; 3],
    /// BPM por canal (verde, vermelho, IR)
    pub per_channel: [f32; 3],
    /// Média dos canais
    pub bpm: f32,
}

/// Estimador de FC, dono exclusivo da [`PpgWindow`].
#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    window: PpgWindow,
    sample_rate_hz: f32,
    threshold_ratio: f32,
    refractory: usize,
    misaligned_ticks: u64,
}

impl HeartRateEstimator {
    pub fn new(config: &HeartConfig) -> Self {
        Self {
            window: PpgWindow::new(),
            sample_rate_hz: config.sample_rate_hz,
            threshold_ratio: config.peak_threshold_ratio,
            refractory: refractory_samples(config.refractory_secs, config.sample_rate_hz),
            misaligned_ticks: 0,
        }
    }

    /// Um tick de amostragem.
    ///
    /// O índice só avança quando os três canais foram lidos com sucesso;
    /// leitura parcial é repetida no próximo tick. Retorna `Some` apenas no
    /// tick que completa a janela.
    pub fn tick(
        &mut self,
        green: Result<u32, SensorError>,
        red: Result<u32, SensorError>,
        infrared: Result<u32, SensorError>,
    ) -> Option<HeartRateReading> {
        let (g, r, ir) = match (green, red, infrared) {
            (Ok(g), Ok(r), Ok(ir)) => (g, r, ir),
            (g, r, ir) => {
                self.misaligned_ticks += 1;
                debug!(
                    "Leitura PPG parcial (verde {}, vermelho {}, IR {}), repetindo tick",
                    g.is_ok(),
                    r.is_ok(),
                    ir.is_ok()
                );
                return None;
            }
        };

        if !self.window.push(g as f32, r as f32, ir as f32) {
            return None;
        }

        let reading = self.estimate_window();
        self.window.clear();
        Some(reading)
    }

    /// Conta picos nos três canais da janela atual.
    pub fn estimate_window(&self) -> HeartRateReading {
        let len = self.window.len();
        let mut peaks = [0usize; 3];
        let mut per_channel = [0.0f32; 3];
        for ch in PpgChannel::ALL {
            let samples = &self.window.channel(ch)[..len];
            let n = count_peaks(samples, self.threshold_ratio, self.refractory);
            peaks[ch.index()] = n;
            per_channel[ch.index()] = channel_bpm(n, len, self.sample_rate_hz);
        }
        let bpm = combine_bpm(&per_channel);
        debug!(
            "Janela PPG: picos {:?} → {:.1}/{:.1}/{:.1} BPM → média {:.1}",
            peaks, per_channel[0], per_channel[1], per_channel[2], bpm
        );
        HeartRateReading {
            peaks,
            per_channel,
            bpm,
        }
    }

    pub fn window(&self) -> &PpgWindow {
        &self.window
    }

    /// Ticks descartados por leitura desalinhada.
    pub fn misaligned_ticks(&self) -> u64 {
        self.misaligned_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorKind;

    const RATE: f32 = 25.0;

    fn pulse_train(centres: &[usize], height: f32) -> [f32; PPG_WINDOW] {
        let mut buf = [0.0f32; PPG_WINDOW];
        for &c in centres {
            buf[c] = height;
            buf[c - 1] = height / 2.0;
            buf[c + 1] = height / 2.0;
        }
        buf
    }

    fn evenly_spaced(count: usize) -> Vec<usize> {
        let spacing = PPG_WINDOW / count;
        (0..count).map(|k| spacing / 2 + k * spacing).collect()
    }

    fn miss() -> Result<u32, SensorError> {
        Err(SensorError::ReadFailed(SensorKind::Ppg, "FIFO vazio".into()))
    }

    #[test]
    fn refractory_is_rounded_up() {
        assert_eq!(refractory_samples(0.3, 25.0), 8);
        assert_eq!(refractory_samples(0.2, 25.0), 5);
        assert_eq!(refractory_samples(0.3, 50.0), 15);
        assert_eq!(refractory_samples(0.3, 100.0), 30);
        assert_eq!(refractory_samples(0.3, 30.0), 9);
        assert_eq!(refractory_samples(0.25, 30.0), 8);
    }

    #[test]
    fn six_peaks_in_six_seconds_is_sixty_bpm() {
        let buf = pulse_train(&evenly_spaced(6), 0.8);
        let n = count_peaks(&buf, 0.6, refractory_samples(0.3, RATE));
        assert_eq!(n, 6);
        assert_eq!(channel_bpm(n, PPG_WINDOW, RATE), 60.0);
    }

    #[test]
    fn peaks_inside_refractory_count_once() {
        // 4 amostras = 0.16 s de distância
        let buf = pulse_train(&[20, 24, 80], 1.0);
        assert_eq!(count_peaks(&buf, 0.6, refractory_samples(0.3, RATE)), 2);
    }

    #[test]
    fn small_bumps_below_threshold_are_ignored() {
        let mut buf = pulse_train(&[30, 90], 1.0);
        buf[60] = 0.5;
        assert_eq!(count_peaks(&buf, 0.6, 8), 2);
    }

    #[test]
    fn edge_samples_are_not_peaks() {
        let mut buf = [0.0f32; PPG_WINDOW];
        buf[0] = 1.0;
        buf[PPG_WINDOW - 1] = 1.0;
        assert_eq!(count_peaks(&buf, 0.6, 8), 0);
    }

    #[test]
    fn flat_channel_has_no_peaks() {
        let buf = [1234.0f32; PPG_WINDOW];
        assert_eq!(count_peaks(&buf, 0.6, 8), 0);
    }

    #[test]
    fn combined_bpm_is_channel_mean() {
        let bpm = combine_bpm(&[72.0, 68.0, 70.0]);
        assert_eq!(bpm, 70.0);
        assert_eq!(bpm_to_u8(bpm), 70);
    }

    #[test]
    fn dead_channel_pulls_average_down() {
        assert_eq!(combine_bpm(&[60.0, 60.0, 0.0]), 40.0);
    }

    #[test]
    fn bpm_truncates_and_saturates() {
        assert_eq!(bpm_to_u8(71.9), 71);
        assert_eq!(bpm_to_u8(300.0), 255);
        assert_eq!(bpm_to_u8(-3.0), 0);
        assert_eq!(bpm_to_u8(f32::NAN), 0);
    }

    #[test]
    fn window_fills_then_restarts_at_zero() {
        let mut w = PpgWindow::new();
        for i in 0..PPG_WINDOW - 1 {
            assert!(!w.push(i as f32, 0.0, 0.0));
        }
        assert!(w.push(1.0, 1.0, 1.0));
        assert!(w.is_full());
        w.clear();
        assert!(w.is_empty());
        w.push(7.0, 8.0, 9.0);
        assert_eq!(w.channel(PpgChannel::Red)[0], 8.0);
    }

    #[test]
    fn estimator_reports_once_per_full_window() {
        let cfg = HeartConfig::default();
        let mut est = HeartRateEstimator::new(&cfg);
        // 8, 6 e 7 picos → 80, 60 e 70 BPM
        let green = pulse_train(&evenly_spaced(8), 4000.0);
        let red = pulse_train(&evenly_spaced(6), 3000.0);
        let ir = pulse_train(&evenly_spaced(7), 5000.0);

        let mut result = None;
        for i in 0..PPG_WINDOW {
            let out = est.tick(Ok(green[i] as u32), Ok(red[i] as u32), Ok(ir[i] as u32));
            if i < PPG_WINDOW - 1 {
                assert!(out.is_none(), "resultado antecipado no tick {i}");
            } else {
                result = out;
            }
        }
        let reading = result.expect("janela completa deve produzir BPM");
        assert_eq!(reading.peaks, [8, 6, 7]);
        assert_eq!(reading.per_channel, [80.0, 60.0, 70.0]);
        assert_eq!(bpm_to_u8(reading.bpm), 70);
        assert!(est.window().is_empty());
    }

    #[test]
    fn partial_read_does_not_advance() {
        let mut est = HeartRateEstimator::new(&HeartConfig::default());
        est.tick(Ok(1), Ok(1), Ok(1));
        assert_eq!(est.window().len(), 1);

        assert!(est.tick(Ok(2), miss(), Ok(2)).is_none());
        assert!(est.tick(miss(), miss(), miss()).is_none());
        assert_eq!(est.window().len(), 1);
        assert_eq!(est.misaligned_ticks(), 2);

        est.tick(Ok(3), Ok(4), Ok(5));
        assert_eq!(est.window().len(), 2);
        assert_eq!(est.window().channel(PpgChannel::Infrared)[1], 5.0);
    }
}
