//! Erros do runtime do nó.

use sensor_core::SensorError;
use sensor_core::protocol::ProtocolError;

/// Falhas do runtime. Init de sensor e de transporte são fatais.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Falha na inicialização: {0}")]
    SensorInit(#[from] SensorError),

    #[error("Falha ao iniciar transporte: {0}")]
    TransportInit(String),

    #[error("Erro de protocolo: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Erro ao enviar notificação: {0}")]
    Send(#[source] std::io::Error),

    #[error("Falha ao criar thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
