//! Erros dos sensores e da configuração.

use crate::types::SensorKind;

/// Falhas reportadas por um transdutor.
///
/// `NotDetected` só acontece no boot e é fatal; `ReadFailed` é transiente
/// e o estimador dono simplesmente pula o ciclo.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("{0} não detectado")]
    NotDetected(SensorKind),

    #[error("Falha de leitura do {0}: {1}")]
    ReadFailed(SensorKind, String),
}

impl SensorError {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorError::NotDetected(k) | SensorError::ReadFailed(k, _) => *k,
        }
    }
}

/// Erros ao persistir a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de serialização TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao escrever {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
