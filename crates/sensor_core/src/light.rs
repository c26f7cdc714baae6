//! Estimador de iluminância (lux).
//!
//! Três estágios por aquisição, sempre nesta ordem:
//! 1. redução espectral ponderada pela curva fotópica;
//! 2. média móvel curta ([`LuxRingBuffer`], 8 posições);
//! 3. calibração linear + filtro de Kalman escalar.
//!
//! Leitura com falha pula o ciclo inteiro: nada entra no buffer e o
//! filtro não é atualizado.

use crate::config::LightConfig;
use crate::error::SensorError;
use crate::types::{SpectralReading, VISIBLE_CHANNELS};
use tracing::debug;

/// Posições da média móvel.
pub const LUX_RING_SLOTS: usize = 8;

/// Soma ponderada dos canais visíveis.
pub fn spectral_reduce(channels: &[u16; VISIBLE_CHANNELS], weights: &[f32; VISIBLE_CHANNELS]) -> f32 {
    channels
        .iter()
        .zip(weights)
        .map(|(&c, &w)| f32::from(c) * w)
        .sum()
}

// ──────────────────────────────────────────────
// Média móvel
// ──────────────────────────────────────────────

/// Buffer circular de lux bruto.
///
/// Guarda sempre os `min(8, aquisições)` valores mais recentes.
#[derive(Debug, Clone, Default)]
pub struct LuxRingBuffer {
    slots: [f32; LUX_RING_SLOTS],
    head: usize,
    len: usize,
}

impl LuxRingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f32) {
        self.slots[self.head] = value;
        self.head = (self.head + 1) % LUX_RING_SLOTS;
        if self.len < LUX_RING_SLOTS {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == LUX_RING_SLOTS
    }

    /// Média apenas das posições válidas (0.0 se vazio).
    ///
    /// Antes de encher, as posições válidas são `0..len`.
    pub fn average(&self) -> f32 {
        if self.len == 0 {
            return 0.0;
        }
        self.slots[..self.len].iter().sum::<f32>() / self.len as f32
    }
}

// ──────────────────────────────────────────────
// Kalman escalar
// ──────────────────────────────────────────────

/// Filtro de Kalman de uma dimensão.
///
/// Sem caminho de reset; com `R > 0`, `Q ≥ 0` e `P₀ > 0` a covariância
/// permanece positiva.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    estimate: f32,
    error_covariance: f32,
    gain: f32,
    q: f32,
    r: f32,
}

impl KalmanFilter {
    pub fn new(q: f32, r: f32, initial_p: f32, initial_estimate: f32) -> Self {
        Self {
            estimate: initial_estimate,
            error_covariance: initial_p,
            gain: 0.0,
            q,
            r,
        }
    }

    /// Um passo: prediz P, calcula K, atualiza X, atualiza P.
    pub fn update(&mut self, measurement: f32) -> f32 {
        self.error_covariance += self.q;
        self.gain = self.error_covariance / (self.error_covariance + self.r);
        self.estimate += self.gain * (measurement - self.estimate);
        self.error_covariance *= 1.0 - self.gain;
        self.estimate
    }

    pub fn estimate(&self) -> f32 {
        self.estimate
    }

    pub fn error_covariance(&self) -> f32 {
        self.error_covariance
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

// ──────────────────────────────────────────────
// Estimador
// ──────────────────────────────────────────────

/// Pipeline completo de luz, dono exclusivo do buffer e do filtro.
#[derive(Debug, Clone)]
pub struct LightEstimator {
    weights: [f32; VISIBLE_CHANNELS],
    cal_m: f32,
    cal_b: f32,
    ring: LuxRingBuffer,
    kalman: KalmanFilter,
}

impl LightEstimator {
    pub fn new(config: &LightConfig) -> Self {
        Self {
            weights: config.weights,
            cal_m: config.cal_m,
            cal_b: config.cal_b,
            ring: LuxRingBuffer::new(),
            kalman: KalmanFilter::new(
                config.kalman_q,
                config.kalman_r,
                config.kalman_initial_p,
                config.kalman_initial_estimate,
            ),
        }
    }

    /// Processa uma aquisição. `None` quando a leitura falhou.
    pub fn process(&mut self, reading: Result<SpectralReading, SensorError>) -> Option<f32> {
        let reading = match reading {
            Ok(r) => r,
            Err(e) => {
                debug!(sensor = %e.kind(), "Ciclo de luz ignorado: {e}");
                return None;
            }
        };

        let raw = spectral_reduce(&reading.visible, &self.weights);
        self.ring.push(raw);
        let avg = self.ring.average();
        let calibrated = self.cal_m * avg + self.cal_b;
        let lux = self.kalman.update(calibrated);

        debug!(
            "Luz: bruto {:.1} | média {:.1} ({} amostras) | calibrado {:.1} | filtrado {:.1} lux (K={:.3})",
            raw,
            avg,
            self.ring.len(),
            calibrated,
            lux,
            self.kalman.gain()
        );
        Some(lux)
    }

    pub fn ring(&self) -> &LuxRingBuffer {
        &self.ring
    }

    pub fn kalman(&self) -> &KalmanFilter {
        &self.kalman
    }
}
