//! Abstração dos transdutores e sensores simulados.
//!
//! O host não tem ADC nem barramento I²C, então cada sensor fica atrás de
//! um trait. As implementações `Sim*` geram sinais sintéticos com ruído
//! reprodutível (semente fixa) e falhas de leitura configuráveis.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sensor_core::config::{AppConfig, SimulationConfig};
use sensor_core::heart::PpgChannel;
use sensor_core::sound::SOUND_WINDOW;
use sensor_core::types::VISIBLE_CHANNELS;
use sensor_core::{SensorError, SensorKind, SpectralReading};
use std::f32::consts::TAU;

/// Microfone analógico lido via ADC.
pub trait Microphone: Send {
    fn read_sample(&mut self) -> u16;
}

/// Sensor espectral multicanal.
pub trait SpectralSensor: Send {
    /// Detecta e configura o sensor (falha aqui é fatal).
    fn begin(&mut self) -> Result<(), SensorError>;
    fn read(&mut self) -> Result<SpectralReading, SensorError>;
}

/// Sensor PPG de três LEDs.
pub trait PpgSensor: Send {
    /// Detecta e configura o sensor (falha aqui é fatal).
    fn begin(&mut self) -> Result<(), SensorError>;
    fn read(&mut self, channel: PpgChannel) -> Result<u32, SensorError>;
}

/// Conjunto de sensores entregue ao scheduler.
pub struct SensorSet {
    pub microphone: Box<dyn Microphone>,
    pub spectral: Box<dyn SpectralSensor>,
    pub ppg: Box<dyn PpgSensor>,
}

impl SensorSet {
    /// Sensores simulados a partir da configuração.
    pub fn simulated(config: &AppConfig) -> Self {
        let sim = &config.simulation;
        let audio_rate =
            SOUND_WINDOW as f32 * 1000.0 / config.scheduler.sound_period_ms.max(1) as f32;
        Self {
            microphone: Box::new(SimMicrophone::new(sim, audio_rate, config.sound.adc_max)),
            spectral: Box::new(SimSpectral::new(sim)),
            ppg: Box::new(SimPpg::new(sim, config.heart.sample_rate_hz)),
        }
    }
}

/// Sorteio de falha; probabilidade NaN conta como zero.
fn chance(rng: &mut StdRng, p: f64) -> bool {
    !p.is_nan() && rng.gen_bool(p.clamp(0.0, 1.0))
}

// ──────────────────────────────────────────────
// Microfone
// ──────────────────────────────────────────────

/// Tom senoidal sobre bias DC, com ruído branco.
pub struct SimMicrophone {
    rng: StdRng,
    bias: f32,
    peak: f32,
    phase: f32,
    phase_step: f32,
    adc_max: f32,
}

impl SimMicrophone {
    pub fn new(sim: &SimulationConfig, audio_rate_hz: f32, adc_max: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(sim.seed),
            bias: sim.mic_bias_counts,
            peak: sim.tone_rms_counts * std::f32::consts::SQRT_2,
            phase: 0.0,
            phase_step: TAU * sim.tone_hz / audio_rate_hz,
            adc_max,
        }
    }
}

impl Microphone for SimMicrophone {
    fn read_sample(&mut self) -> u16 {
        let noise: f32 = self.rng.gen_range(-1.0..1.0);
        let v = self.bias + self.peak * self.phase.sin() + noise;
        self.phase = (self.phase + self.phase_step) % TAU;
        v.round().clamp(0.0, self.adc_max) as u16
    }
}

// ──────────────────────────────────────────────
// Sensor espectral
// ──────────────────────────────────────────────

/// Resposta relativa de F1–F8 para luz branca.
const WHITE_PROFILE: [f32; VISIBLE_CHANNELS] = [0.35, 0.6, 0.8, 0.95, 1.0, 0.9, 0.7, 0.4];

/// Luz ambiente com deriva lenta e falhas transientes de I²C.
pub struct SimSpectral {
    rng: StdRng,
    present: bool,
    level: f32,
    drift: f32,
    failure_rate: f64,
}

impl SimSpectral {
    pub fn new(sim: &SimulationConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(sim.seed.wrapping_add(1)),
            present: sim.light_present,
            level: sim.light_level,
            drift: 0.0,
            failure_rate: sim.light_failure_rate,
        }
    }
}

impl SpectralSensor for SimSpectral {
    fn begin(&mut self) -> Result<(), SensorError> {
        if self.present {
            Ok(())
        } else {
            Err(SensorError::NotDetected(SensorKind::Spectral))
        }
    }

    fn read(&mut self) -> Result<SpectralReading, SensorError> {
        if chance(&mut self.rng, self.failure_rate) {
            return Err(SensorError::ReadFailed(
                SensorKind::Spectral,
                "timeout no barramento I2C".into(),
            ));
        }
        self.drift = (self.drift + 0.01) % TAU;
        let level = self.level * (1.0 + 0.1 * self.drift.sin());

        let mut visible = [0u16; VISIBLE_CHANNELS];
        for (count, &rel) in visible.iter_mut().zip(&WHITE_PROFILE) {
            let noise: f32 = self.rng.gen_range(-2.0..2.0);
            *count = (level * rel + noise).round().clamp(0.0, f32::from(u16::MAX)) as u16;
        }
        let clear = visible.iter().map(|&c| u32::from(c)).sum::<u32>().min(u32::from(u16::MAX)) as u16;
        let nir = (level * 0.3).round().clamp(0.0, f32::from(u16::MAX)) as u16;

        Ok(SpectralReading {
            visible,
            clear,
            nir,
        })
    }
}

// ──────────────────────────────────────────────
// PPG
// ──────────────────────────────────────────────

/// Amplitude pulsátil por canal (verde, vermelho, IR).
const PPG_AC: [f32; 3] = [2000.0, 900.0, 1400.0];

/// Pulso gaussiano por batimento, um contador de amostras por canal.
pub struct SimPpg {
    rng: StdRng,
    present: bool,
    miss_rate: f64,
    beats_per_sec: f32,
    sample_rate_hz: f32,
    counters: [u64; 3],
}

impl SimPpg {
    pub fn new(sim: &SimulationConfig, sample_rate_hz: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(sim.seed.wrapping_add(2)),
            present: sim.ppg_present,
            miss_rate: sim.ppg_miss_rate,
            beats_per_sec: sim.heart_bpm / 60.0,
            sample_rate_hz,
            counters: [0; 3],
        }
    }
}

impl PpgSensor for SimPpg {
    fn begin(&mut self) -> Result<(), SensorError> {
        if self.present {
            Ok(())
        } else {
            Err(SensorError::NotDetected(SensorKind::Ppg))
        }
    }

    fn read(&mut self, channel: PpgChannel) -> Result<u32, SensorError> {
        if chance(&mut self.rng, self.miss_rate) {
            return Err(SensorError::ReadFailed(SensorKind::Ppg, "FIFO vazio".into()));
        }
        let idx = match channel {
            PpgChannel::Green => 0,
            PpgChannel::Red => 1,
            PpgChannel::Infrared => 2,
        };
        let n = self.counters[idx];
        self.counters[idx] += 1;

        let t = n as f32 / self.sample_rate_hz;
        let phase = (t * self.beats_per_sec).fract();
        let pulse = (-(phase - 0.25).powi(2) / (2.0 * 0.06f32.powi(2))).exp();
        let ac = PPG_AC[idx];
        let noise: f32 = self.rng.gen_range(-0.01..0.01) * ac;
        let value = 0.1 * ac + ac * pulse + noise;
        Ok(value.max(0.0) as u32)
    }
}
