//! Configuração unificada via TOML.
//!
//! Todas as constantes de calibração e cadências ficam num único
//! `config.toml` ao lado do executável. Cada seção usa `#[serde(default)]`,
//! então arquivos parciais funcionam.

use crate::error::ConfigError;
use crate::types::VISIBLE_CHANNELS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Estimador de nível sonoro.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Contagem máxima do ADC (12 bits = 4095)
    pub adc_max: f32,
    /// Tensão de referência do ADC (V)
    pub vref_volts: f32,
    /// Sensibilidade do microfone com pré-amplificador (V/Pa)
    pub sensitivity_v_per_pa: f32,
    /// Ganho da conversão Pa → dB SPL
    pub spl_gain: f32,
    /// Pressão de referência (Pa)
    pub reference_pa: f32,
    /// Atraso entre amostras consecutivas (µs, 0 = sem atraso)
    pub sample_delay_us: u64,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            adc_max: 4095.0,
            vref_volts: 3.3,
            sensitivity_v_per_pa: 0.631,
            spl_gain: 20.8,
            reference_pa: 20e-6,
            sample_delay_us: 0,
        }
    }
}

/// Estimador de iluminância.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Pesos fotópicos V(λ) dos canais F1–F8
    pub weights: [f32; VISIBLE_CHANNELS],
    /// Inclinação da calibração contra o luxímetro de referência
    pub cal_m: f32,
    /// Offset da calibração (lux)
    pub cal_b: f32,
    /// Ruído de processo Q do Kalman
    pub kalman_q: f32,
    /// Ruído de medição R do Kalman
    pub kalman_r: f32,
    /// Covariância inicial P₀
    pub kalman_initial_p: f32,
    /// Estimativa inicial X₀ (lux)
    pub kalman_initial_estimate: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            weights: [0.0022, 0.0305, 0.139, 0.6082, 1.0, 0.757, 0.265, 0.017],
            cal_m: 0.3867,
            cal_b: 1.2,
            kalman_q: 0.05,
            kalman_r: 4.0,
            kalman_initial_p: 1.0,
            kalman_initial_estimate: 0.0,
        }
    }
}

/// Estimador de frequência cardíaca.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartConfig {
    /// Taxa de amostragem do PPG (Hz)
    pub sample_rate_hz: f32,
    /// Fração do máximo que um pico precisa exceder
    pub peak_threshold_ratio: f32,
    /// Janela refratária após cada pico (s)
    pub refractory_secs: f32,
}

impl Default for HeartConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 25.0,
            peak_threshold_ratio: 0.6,
            refractory_secs: 0.3,
        }
    }
}

impl HeartConfig {
    /// Período de um tick de amostragem (ms).
    pub fn tick_ms(&self) -> u64 {
        (1000.0 / self.sample_rate_hz).round() as u64
    }
}

/// Cadências do scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Período de um ciclo completo de 512 amostras de som (ms)
    pub sound_period_ms: u64,
    /// Intervalo de publicação da telemetria (ms)
    pub publish_interval_ms: u64,
    /// Intervalo da linha de status (ms)
    pub status_interval_ms: u64,
    /// Pausa cooperativa de cada passada do loop principal (ms)
    pub main_loop_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sound_period_ms: 40,
            publish_interval_ms: 300,
            status_interval_ms: 800,
            main_loop_delay_ms: 10,
        }
    }
}

/// Transporte de telemetria (emulado via UDP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Nome anunciado do dispositivo
    pub device_name: String,
    /// Modo de envio: "broadcast" ou "unicast"
    pub mode: String,
    /// IP de destino (255.255.255.255 para broadcast)
    pub dest_ip: String,
    /// Porta UDP
    pub port: u16,
    /// IP local para bind (vazio = auto)
    pub bind_ip: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device_name: "SensorNode".into(),
            mode: "broadcast".into(),
            dest_ip: "255.255.255.255".into(),
            port: 5006,
            bind_ip: String::new(),
        }
    }
}

/// Sensores simulados usados quando não há hardware.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Semente do gerador
    pub seed: u64,
    /// Duração da execução (s, 0 = infinito)
    pub run_secs: f64,
    /// Bias DC do microfone (contagens)
    pub mic_bias_counts: f32,
    /// RMS do tom simulado (contagens)
    pub tone_rms_counts: f32,
    /// Frequência do tom (Hz)
    pub tone_hz: f32,
    /// Iluminância base simulada (lux aproximado)
    pub light_level: f32,
    /// Probabilidade de falha de leitura espectral
    pub light_failure_rate: f64,
    /// Frequência cardíaca simulada (BPM)
    pub heart_bpm: f32,
    /// Probabilidade de falha por canal PPG
    pub ppg_miss_rate: f64,
    /// Sensor espectral presente no boot
    pub light_present: bool,
    /// Sensor PPG presente no boot
    pub ppg_present: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            run_secs: 0.0,
            mic_bias_counts: 2048.0,
            tone_rms_counts: 20.0,
            tone_hz: 440.0,
            light_level: 300.0,
            light_failure_rate: 0.02,
            heart_bpm: 72.0,
            ppg_miss_rate: 0.01,
            light_present: true,
            ppg_present: true,
        }
    }
}

/// Configuração raiz do nó.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sound: SoundConfig,
    pub light: LightConfig,
    pub heart: HeartConfig,
    pub scheduler: SchedulerConfig,
    pub transport: TransportConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    ///
    /// Valores não finitos (NaN, ±inf) são sempre rejeitados.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !positive(self.sound.adc_max) || !positive(self.sound.vref_volts) {
            errors.push("ADC: adc_max e vref_volts devem ser > 0".into());
        }
        if !positive(self.sound.sensitivity_v_per_pa) || !positive(self.sound.reference_pa) {
            errors.push("Microfone: sensibilidade e pressão de referência devem ser > 0".into());
        }
        if !self.sound.spl_gain.is_finite() {
            errors.push("Ganho SPL deve ser finito".into());
        }
        if !self.light.weights.iter().all(|w| w.is_finite())
            || !self.light.cal_m.is_finite()
            || !self.light.cal_b.is_finite()
        {
            errors.push("Luz: pesos e calibração devem ser finitos".into());
        }
        if !positive(self.light.kalman_r) {
            errors.push(format!("Kalman: R deve ser > 0 (atual {})", self.light.kalman_r));
        }
        if !self.light.kalman_q.is_finite() || self.light.kalman_q < 0.0 {
            errors.push(format!("Kalman: Q não pode ser negativo (atual {})", self.light.kalman_q));
        }
        if !positive(self.light.kalman_initial_p) {
            errors.push("Kalman: P₀ deve ser > 0".into());
        }
        if !self.light.kalman_initial_estimate.is_finite() {
            errors.push("Kalman: estimativa inicial deve ser finita".into());
        }
        if !positive(self.heart.sample_rate_hz) || self.heart.sample_rate_hz > 1000.0 {
            errors.push(format!(
                "Taxa de amostragem PPG inválida: {} (0–1000 Hz)",
                self.heart.sample_rate_hz
            ));
        }
        if !(0.0..1.0).contains(&self.heart.peak_threshold_ratio) {
            errors.push(format!(
                "Limiar de pico inválido: {} (0.0–1.0)",
                self.heart.peak_threshold_ratio
            ));
        }
        if !self.heart.refractory_secs.is_finite() || self.heart.refractory_secs < 0.0 {
            errors.push("Janela refratária não pode ser negativa".into());
        }
        if self.scheduler.sound_period_ms == 0
            || self.scheduler.publish_interval_ms == 0
            || self.scheduler.status_interval_ms == 0
        {
            errors.push("Períodos do scheduler devem ser > 0".into());
        }
        if self.transport.port == 0 {
            errors.push("Porta do transporte não pode ser 0".into());
        }
        let sim = &self.simulation;
        if !(0.0..=1.0).contains(&sim.light_failure_rate) || !(0.0..=1.0).contains(&sim.ppg_miss_rate) {
            errors.push(format!(
                "Simulação: taxas de falha devem estar em 0.0–1.0 (luz {}, PPG {})",
                sim.light_failure_rate, sim.ppg_miss_rate
            ));
        }
        if !sim.run_secs.is_finite() || sim.run_secs < 0.0 {
            errors.push(format!("Simulação: run_secs inválido ({})", sim.run_secs));
        }

        errors
    }
}

fn positive(x: f32) -> bool {
    x.is_finite() && x > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.light.weights, parsed.light.weights);
        assert_eq!(config.scheduler.publish_interval_ms, parsed.scheduler.publish_interval_ms);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[light]
kalman_r = 8.0
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.light.kalman_r, 8.0);
        // Outros campos devem ter valor padrão
        assert_eq!(config.light.kalman_q, 0.05);
        assert_eq!(config.scheduler.publish_interval_ms, 300);
        assert_eq!(config.heart.sample_rate_hz, 25.0);
    }

    #[test]
    fn rejects_non_positive_measurement_noise() {
        let mut config = AppConfig::default();
        config.light.kalman_r = 0.0;
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Kalman"));
    }

    #[test]
    fn rejects_non_finite_values() {
        let parsed = r#"
[light]
kalman_r = nan
kalman_initial_p = nan

[heart]
sample_rate_hz = nan

[simulation]
light_failure_rate = nan
ppg_miss_rate = 1.5
run_secs = inf
"#;
        let config: AppConfig = toml::from_str(parsed).unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 5, "Erros: {:?}", errors);
        assert!(errors.iter().any(|e| e.contains("R deve ser > 0")));
        assert!(errors.iter().any(|e| e.contains("P₀")));
        assert!(errors.iter().any(|e| e.contains("Taxa de amostragem")));
        assert!(errors.iter().any(|e| e.contains("taxas de falha")));
        assert!(errors.iter().any(|e| e.contains("run_secs")));
    }

    #[test]
    fn tick_period_matches_sample_rate() {
        assert_eq!(HeartConfig::default().tick_ms(), 40);
    }
}
