//! # Sensor Node
//!
//! Amostra som, luz e frequência cardíaca em paralelo e publica a
//! telemetria a cada 300 ms. Sem hardware presente, roda com sensores
//! simulados e emula o servidor de atributos via UDP.
//!
//! ## Uso
//! ```bash
//! sensor_node                 # Roda até ser interrompido
//! RUST_LOG=debug sensor_node  # Log por ciclo de cada estimador
//! ```

mod error;
mod hardware;
mod scheduler;
mod status;
mod transport;

use error::NodeError;
use hardware::SensorSet;
use scheduler::Node;
use sensor_core::config::AppConfig;
use std::time::Duration;
use tracing::{error, info, warn};
use transport::UdpTransport;

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        warn!("Usando configuração padrão");
        config = AppConfig::default();
    }

    // ── Banner ──
    let sched = &config.scheduler;
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ SENSOR NODE – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Dispositivo: {}", config.transport.device_name);
    println!("  Destino:     {}:{}", config.transport.dest_ip, config.transport.port);
    println!("  Publicação:  {} ms", sched.publish_interval_ms);
    println!("  Status:      {} ms", sched.status_interval_ms);
    println!("  Protocolo:   notificação v{}", sensor_core::PROTOCOL_VERSION);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Boot ──
    let sensors = SensorSet::simulated(&config);
    let transport = UdpTransport::new(config.transport.clone());
    let node = match Node::boot(config.clone(), sensors, Box::new(transport)) {
        Ok(node) => node,
        Err(e) => halt(&e),
    };
    let shared = node.shared();

    let duration = (config.simulation.run_secs > 0.0)
        .then(|| Duration::from_secs_f64(config.simulation.run_secs));

    // ── Loop principal ──
    match node.run(duration) {
        Ok(report) => {
            let m = &report.main;
            info!(
                "Loop principal: {} passadas | luz {} ok / {} ignoradas | {} publicações ({} falhas) | {} status",
                m.passes,
                m.light_updates,
                m.light_skipped,
                m.publications,
                m.send_errors,
                m.status_emissions
            );
            for (name, t) in [("som", &report.sound), ("fc", &report.heart)] {
                info!(
                    "Task {name}: {} ciclos | {} atualizações | {} ignorados | {} deadlines estourados",
                    t.cycles, t.updates, t.skipped, t.overruns
                );
            }
            let last = report.last_published;
            info!(
                "Última publicação: {:.1} dB SPL | {:.1} lux | {} BPM (registrador: {:?})",
                last.sound_db,
                last.lux,
                last.bpm,
                shared.snapshot()
            );
        }
        Err(e) => halt(&e),
    }
}

/// Falha fatal: o nó fica parado num loop ocioso e nunca amostra.
fn halt(err: &NodeError) -> ! {
    error!("Falha fatal: {err}. Nó parado.");
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}
