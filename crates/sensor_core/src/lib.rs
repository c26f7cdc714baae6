//! # Sensor Core
//!
//! Crate compartilhada com o pipeline de sinais do nó sensor: os três
//! estimadores, o registrador compartilhado, o protocolo de notificação
//! dos atributos e a configuração TOML.
//!
//! ## Módulos
//! - [`sound`] – Nível sonoro (Welford → dB SPL)
//! - [`light`] – Iluminância (redução espectral → média móvel → Kalman)
//! - [`heart`] – Frequência cardíaca (picos em janela PPG de 3 canais)
//! - [`shared`] – Últimos valores por sinal, um lock por campo
//! - [`protocol`] – Encode/decode de notificações com magic byte
//! - [`config`] – Configuração unificada via TOML
//! - [`types`] / [`error`] – Tipos e erros comuns

pub mod types;
pub mod error;
pub mod config;
pub mod protocol;
pub mod sound;
pub mod light;
pub mod heart;
pub mod shared;

// Re-exports convenientes
pub use types::{Attribute, AttributeId, SensorKind, SpectralReading, TelemetrySnapshot};
pub use error::{ConfigError, SensorError};
pub use protocol::{decode_notification, encode_notification, PROTOCOL_VERSION};
pub use config::AppConfig;
pub use shared::SharedEstimate;
