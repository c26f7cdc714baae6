//! Tipos compartilhados entre estimadores, scheduler e transporte.
//!
//! Os atributos de telemetria são publicados de forma independente: não há
//! mensagem combinada, cada [`Attribute`] vira uma notificação própria.

use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Sensores
// ──────────────────────────────────────────────

/// Identifica o transdutor de origem (usado em erros e logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// Microfone analógico (ADC)
    Microphone,
    /// Sensor espectral de 8+ canais
    Spectral,
    /// Sensor de fotopletismografia (verde/vermelho/infravermelho)
    Ppg,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Microphone => "microfone",
            SensorKind::Spectral => "sensor espectral",
            SensorKind::Ppg => "sensor PPG",
        };
        f.write_str(name)
    }
}

/// Número de canais visíveis usados na redução espectral.
pub const VISIBLE_CHANNELS: usize = 8;

/// Uma aquisição completa do sensor espectral.
///
/// O sensor entrega mais canais do que a redução usa (Clear e NIR);
/// eles são mantidos apenas para diagnóstico.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectralReading {
    /// Canais F1–F8 (415 nm … 680 nm)
    pub visible: [u16; VISIBLE_CHANNELS],
    /// Canal sem filtro
    pub clear: u16,
    /// Infravermelho próximo
    pub nir: u16,
}

// ──────────────────────────────────────────────
// Snapshot e atributos
// ──────────────────────────────────────────────

/// Cópia imutável do [`SharedEstimate`](crate::shared::SharedEstimate)
/// tirada no momento da publicação.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Nível sonoro (dB SPL, ≥ 0)
    pub sound_db: f32,
    /// Iluminância calibrada e filtrada (lux)
    pub lux: f32,
    /// Frequência cardíaca truncada (BPM, 0–255)
    pub bpm: u8,
}

impl TelemetrySnapshot {
    /// Os três atributos na ordem de publicação.
    pub fn attributes(&self) -> [Attribute; 3] {
        [
            Attribute::SoundLevel(self.sound_db),
            Attribute::LightLevel(self.lux),
            Attribute::HeartRate(self.bpm),
        ]
    }
}

/// Identificador estável de cada atributo exposto pelo transporte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeId {
    SoundLevel,
    LightLevel,
    HeartRate,
}

impl AttributeId {
    pub const ALL: [AttributeId; 3] = [
        AttributeId::SoundLevel,
        AttributeId::LightLevel,
        AttributeId::HeartRate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AttributeId::SoundLevel => "Som",
            AttributeId::LightLevel => "Luz",
            AttributeId::HeartRate => "FC",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            AttributeId::SoundLevel => "dB SPL",
            AttributeId::LightLevel => "lux",
            AttributeId::HeartRate => "BPM",
        }
    }
}

/// Valor de um atributo, com o tipo de fio definido pelo contrato de payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    /// f32, dB SPL
    SoundLevel(f32),
    /// f32, lux
    LightLevel(f32),
    /// u8, BPM
    HeartRate(u8),
}

impl Attribute {
    pub fn id(&self) -> AttributeId {
        match self {
            Attribute::SoundLevel(_) => AttributeId::SoundLevel,
            Attribute::LightLevel(_) => AttributeId::LightLevel,
            Attribute::HeartRate(_) => AttributeId::HeartRate,
        }
    }

    /// Valor em ponto flutuante, para logs e status.
    pub fn as_f32(&self) -> f32 {
        match *self {
            Attribute::SoundLevel(v) | Attribute::LightLevel(v) => v,
            Attribute::HeartRate(v) => v as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_zeroed() {
        let s = TelemetrySnapshot::default();
        assert_eq!(s.sound_db, 0.0);
        assert_eq!(s.lux, 0.0);
        assert_eq!(s.bpm, 0);
    }

    #[test]
    fn snapshot_attributes_follow_id_order() {
        let s = TelemetrySnapshot {
            sound_db: 55.5,
            lux: 320.0,
            bpm: 71,
        };
        let ids: Vec<_> = s.attributes().iter().map(Attribute::id).collect();
        assert_eq!(ids, AttributeId::ALL.to_vec());
        assert_eq!(s.attributes()[2], Attribute::HeartRate(71));
    }
}
