//! Transporte de telemetria: servidor de atributos emulado via UDP.
//!
//! O único contrato com o núcleo é aceitar três valores escalares numa
//! cadência limitada. Cada atributo vira um datagrama próprio; quem
//! assina lê o último valor notificado.

use crate::error::NodeError;
use sensor_core::config::TransportConfig;
use sensor_core::protocol::encode_notification;
use sensor_core::{Attribute, AttributeId};
use std::net::UdpSocket;
use tracing::{debug, info, warn};

/// Falhas de envio consecutivas antes de recriar o socket.
const REBIND_AFTER_FAILURES: u64 = 5;

/// Conduto de notificações para o consumidor externo.
pub trait Transport {
    /// Inicializa a pilha (falha aqui é fatal).
    fn start(&mut self) -> Result<(), NodeError>;

    /// Grava e notifica um atributo.
    fn notify(&mut self, attribute: Attribute) -> Result<(), NodeError>;

    /// Último valor notificado de um atributo.
    fn read(&self, id: AttributeId) -> Option<Attribute>;

    /// Manutenção periódica chamada a cada passada do loop principal.
    fn housekeeping(&mut self) {}
}

/// Último valor escrito em cada atributo.
#[derive(Debug, Default, Clone)]
pub struct AttributeTable {
    values: [Option<Attribute>; 3],
}

impl AttributeTable {
    fn slot(id: AttributeId) -> usize {
        match id {
            AttributeId::SoundLevel => 0,
            AttributeId::LightLevel => 1,
            AttributeId::HeartRate => 2,
        }
    }

    /// Grava o valor. Retorna `true` se mudou.
    pub fn write(&mut self, attribute: Attribute) -> bool {
        let slot = &mut self.values[Self::slot(attribute.id())];
        let changed = *slot != Some(attribute);
        *slot = Some(attribute);
        changed
    }

    pub fn read(&self, id: AttributeId) -> Option<Attribute> {
        self.values[Self::slot(id)]
    }
}

/// Emulação do servidor de atributos sobre UDP broadcast/unicast.
pub struct UdpTransport {
    config: TransportConfig,
    socket: Option<UdpSocket>,
    dest_addr: String,
    table: AttributeTable,
    consecutive_failures: u64,
}

impl UdpTransport {
    pub fn new(config: TransportConfig) -> Self {
        let dest_addr = format!("{}:{}", config.dest_ip, config.port);
        Self {
            config,
            socket: None,
            dest_addr,
            table: AttributeTable::default(),
            consecutive_failures: 0,
        }
    }

    fn bind(&self) -> Result<UdpSocket, NodeError> {
        let bind_addr = if self.config.bind_ip.is_empty() {
            "0.0.0.0:0".to_string()
        } else {
            format!("{}:0", self.config.bind_ip)
        };
        let sock = UdpSocket::bind(&bind_addr)
            .map_err(|e| NodeError::TransportInit(format!("bind {bind_addr}: {e}")))?;

        if self.config.mode == "broadcast" || self.config.dest_ip == "255.255.255.255" {
            sock.set_broadcast(true)
                .map_err(|e| NodeError::TransportInit(format!("broadcast: {e}")))?;
        }
        Ok(sock)
    }
}

impl Transport for UdpTransport {
    fn start(&mut self) -> Result<(), NodeError> {
        let sock = self.bind()?;
        if self.config.mode == "broadcast" {
            info!("Modo BROADCAST ativado → {}", self.dest_addr);
        } else {
            info!("Modo UNICAST → {}", self.dest_addr);
        }
        info!(
            "Transporte '{}' pronto: {} atributos",
            self.config.device_name,
            AttributeId::ALL.len()
        );
        self.socket = Some(sock);
        Ok(())
    }

    fn notify(&mut self, attribute: Attribute) -> Result<(), NodeError> {
        let sock = self
            .socket
            .as_ref()
            .ok_or_else(|| NodeError::TransportInit("transporte não iniciado".into()))?;
        self.table.write(attribute);

        let frame = encode_notification(&attribute)?;
        match sock.send_to(&frame, &self.dest_addr) {
            Ok(_) => {
                self.consecutive_failures = 0;
                Ok(())
            }
            Err(e) => {
                self.consecutive_failures += 1;
                Err(NodeError::Send(e))
            }
        }
    }

    fn read(&self, id: AttributeId) -> Option<Attribute> {
        self.table.read(id)
    }

    fn housekeeping(&mut self) {
        if self.consecutive_failures < REBIND_AFTER_FAILURES {
            return;
        }
        warn!(
            "{} falhas de envio seguidas, recriando socket",
            self.consecutive_failures
        );
        match self.bind() {
            Ok(sock) => {
                self.socket = Some(sock);
                self.consecutive_failures = 0;
            }
            Err(e) => debug!("Rebind falhou: {e}"),
        }
    }
}
