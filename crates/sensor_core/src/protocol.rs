//! Notificações de atributo no enlace de telemetria.
//!
//! Cada atributo trafega num frame próprio; não há mensagem combinada.
//!
//! ```text
//! ┌──────────┬─────────┬───────────────────────┐
//! │ Magic(1) │ Ver.(1) │ bincode(Attribute)(N) │
//! └──────────┴─────────┴───────────────────────┘
//! ```
//!
//! - Magic byte `0x53` ('S') identifica notificações do nó
//! - Versão do protocolo (1 byte)
//! - Corpo: tag do atributo + valor (f32 para som/luz, u8 para FC)

use crate::types::Attribute;

/// Magic byte das notificações do nó.
pub const MAGIC_BYTE: u8 = 0x53; // 'S'

/// Versão atual do protocolo.
pub const PROTOCOL_VERSION: u8 = 1;

/// Tamanho do header (magic + version).
const HEADER_SIZE: usize = 2;

/// Maior frame possível (header + tag u32 + f32).
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + 4 + 4;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame muito curto ({0} bytes, mínimo {HEADER_SIZE})")]
    TooShort(usize),

    #[error("Magic byte inválido: 0x{0:02X} (esperado 0x{MAGIC_BYTE:02X})")]
    InvalidMagic(u8),

    #[error("Versão incompatível: {0} (suportada: {PROTOCOL_VERSION})")]
    VersionMismatch(u8),

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// Codifica uma notificação de atributo.
///
/// Retorna bytes no formato: `[MAGIC][VERSION][bincode_attribute...]`
pub fn encode_notification(attribute: &Attribute) -> Result<Vec<u8>, ProtocolError> {
    let body =
        bincode::serialize(attribute).map_err(|e| ProtocolError::Serialize(e.to_string()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.push(MAGIC_BYTE);
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&body);

    Ok(frame)
}

/// Decodifica uma notificação recebida.
///
/// Valida magic byte e versão antes de deserializar.
pub fn decode_notification(data: &[u8]) -> Result<Attribute, ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::TooShort(data.len()));
    }

    let magic = data[0];
    if magic != MAGIC_BYTE {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let version = data[1];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch(version));
    }

    bincode::deserialize(&data[HEADER_SIZE..])
        .map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
