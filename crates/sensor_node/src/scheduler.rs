//! Scheduler de amostragem e publicação.
//!
//! ```text
//! core1-sound ─┐ 512 amostras / 40 ms
//! core1-heart ─┤ 1 tick / 40 ms, 1 BPM / 6 s      ┌──► notificações (300 ms)
//!              ├──► SharedEstimate ──► snapshot ──┤
//! core0 (main) ┘ luz a cada passada               └──► status (800 ms)
//! ```
//!
//! Cada task cede o processador num ponto explícito ([`Periodic::wait`])
//! com período e deadline. Estouro de deadline é registrado em log, mas
//! não há watchdog: uma leitura travada trava a task dona.

use crate::error::NodeError;
use crate::hardware::{Microphone, PpgSensor, SensorSet, SpectralSensor};
use crate::status::status_lines;
use crate::transport::Transport;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use sensor_core::config::{AppConfig, HeartConfig, SchedulerConfig, SoundConfig};
use sensor_core::heart::{HeartRateEstimator, PpgChannel};
use sensor_core::light::LightEstimator;
use sensor_core::sound::{SOUND_WINDOW, SoundEstimator};
use sensor_core::{AttributeId, SharedEstimate, TelemetrySnapshot};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// ──────────────────────────────────────────────
// Temporização
// ──────────────────────────────────────────────

/// Deadline periódico com relógio injetado.
///
/// Os deadlines ficam ancorados no início (`start + k·período`), então
/// atraso de quem consulta não acumula deriva.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    next: Instant,
}

impl Cadence {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start + period,
        }
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    /// `true` se o deadline venceu; já avança para o próximo.
    pub fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.advance(now);
        true
    }

    /// Próximo deadline estritamente depois de `now`. Períodos perdidos
    /// inteiros são descartados, não disparados em rajada.
    fn advance(&mut self, now: Instant) {
        self.next += self.period;
        while self.next <= now {
            self.next += self.period;
        }
    }
}

/// Task periódica: ponto de suspensão explícito com deadline.
#[derive(Debug)]
pub struct Periodic {
    name: &'static str,
    cadence: Cadence,
    overruns: u64,
}

impl Periodic {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            cadence: Cadence::new(period, Instant::now()),
            overruns: 0,
        }
    }

    /// Dorme até o próximo deadline. Retorna `false` quando o nó pediu
    /// parada (sinal recebido ou canal desconectado).
    pub fn wait(&mut self, shutdown: &Receiver<()>) -> bool {
        let deadline = self.cadence.next_deadline();
        let now = Instant::now();

        if now >= deadline {
            self.overruns += 1;
            warn!(
                "Task {}: ciclo estourou o deadline em {:.1} ms",
                self.name,
                (now - deadline).as_secs_f64() * 1000.0
            );
            self.cadence.advance(now);
            return matches!(shutdown.try_recv(), Err(TryRecvError::Empty));
        }

        match shutdown.recv_timeout(deadline - now) {
            Err(RecvTimeoutError::Timeout) => {
                self.cadence.advance(Instant::now().max(deadline));
                true
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

// ──────────────────────────────────────────────
// Tasks dos estimadores
// ──────────────────────────────────────────────

/// Contadores de uma task de estimativa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Ciclos executados
    pub cycles: u64,
    /// Escritas no registrador compartilhado
    pub updates: u64,
    /// Ciclos sem escrita (leitura falha ou parcial)
    pub skipped: u64,
    /// Deadlines estourados
    pub overruns: u64,
}

fn spawn_task<F>(name: &str, body: F) -> Result<JoinHandle<TaskStats>, NodeError>
where
    F: FnOnce() -> TaskStats + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(body)
        .map_err(|source| NodeError::Spawn {
            name: name.into(),
            source,
        })
}

/// Task de som: enche a janela de 512 amostras e grava o dB SPL.
pub fn spawn_sound_task(
    mut microphone: Box<dyn Microphone>,
    config: SoundConfig,
    period: Duration,
    shared: Arc<SharedEstimate>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<TaskStats>, NodeError> {
    spawn_task("core1-sound", move || {
        let estimator = SoundEstimator::new(config.clone());
        let sample_delay = Duration::from_micros(config.sample_delay_us);
        let mut window = [0u16; SOUND_WINDOW];
        let mut timer = Periodic::new("som", period);
        let mut stats = TaskStats::default();

        loop {
            for sample in window.iter_mut() {
                *sample = microphone.read_sample();
                if !sample_delay.is_zero() {
                    thread::sleep(sample_delay);
                }
            }
            let db = estimator.estimate(&window);
            shared.set_sound_db(db);
            stats.cycles += 1;
            stats.updates += 1;
            debug!("Som: {db:.1} dB SPL");

            if !timer.wait(&shutdown) {
                break;
            }
        }

        stats.overruns = timer.overruns();
        info!("Task de som encerrada após {} ciclos", stats.cycles);
        stats
    })
}

/// Task de FC: um tick por amostra PPG, BPM gravado a cada janela cheia.
pub fn spawn_heart_task(
    mut ppg: Box<dyn PpgSensor>,
    config: HeartConfig,
    shared: Arc<SharedEstimate>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<TaskStats>, NodeError> {
    spawn_task("core1-heart", move || {
        let mut estimator = HeartRateEstimator::new(&config);
        let mut timer = Periodic::new("fc", Duration::from_millis(config.tick_ms().max(1)));
        let mut stats = TaskStats::default();

        loop {
            let green = ppg.read(PpgChannel::Green);
            let red = ppg.read(PpgChannel::Red);
            let infrared = ppg.read(PpgChannel::Infrared);
            stats.cycles += 1;

            if let Some(reading) = estimator.tick(green, red, infrared) {
                shared.set_bpm(reading.bpm);
                stats.updates += 1;
                info!(
                    "FC: {:.1} BPM (verde {:.0} | vermelho {:.0} | IR {:.0})",
                    reading.bpm, reading.per_channel[0], reading.per_channel[1], reading.per_channel[2]
                );
            }

            if !timer.wait(&shutdown) {
                break;
            }
        }

        stats.skipped = estimator.misaligned_ticks();
        stats.overruns = timer.overruns();
        info!(
            "Task de FC encerrada após {} ticks ({} desalinhados)",
            stats.cycles, stats.skipped
        );
        stats
    })
}

// ──────────────────────────────────────────────
// Loop principal (luz + publicação + status)
// ──────────────────────────────────────────────

/// Contadores do loop principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub passes: u64,
    pub light_updates: u64,
    pub light_skipped: u64,
    /// Publicações periódicas (sem contar a inicial do boot)
    pub publications: u64,
    pub status_emissions: u64,
    pub send_errors: u64,
}

/// Notifica os três atributos de um snapshot. Retorna quantos falharam.
pub fn publish_snapshot(transport: &mut dyn Transport, snapshot: &TelemetrySnapshot) -> u64 {
    let mut failures = 0;
    for attribute in snapshot.attributes() {
        if let Err(e) = transport.notify(attribute) {
            failures += 1;
            debug!("Notificação de {} falhou: {e}", attribute.id().label());
        }
    }
    failures
}

/// Passadas do loop principal até `stop_at` (ou para sempre).
///
/// A publicação nunca espera um valor novo: sai sempre o último valor de
/// cada registrador.
pub fn run_main_loop(
    spectral: &mut dyn SpectralSensor,
    light: &mut LightEstimator,
    transport: &mut dyn Transport,
    shared: &SharedEstimate,
    config: &SchedulerConfig,
    stop_at: Option<Instant>,
) -> LoopStats {
    let start = Instant::now();
    let mut publish = Cadence::new(Duration::from_millis(config.publish_interval_ms), start);
    let mut status = Cadence::new(Duration::from_millis(config.status_interval_ms), start);
    let pass_delay = Duration::from_millis(config.main_loop_delay_ms);
    let mut stats = LoopStats::default();

    loop {
        if stop_at.is_some_and(|stop| Instant::now() >= stop) {
            break;
        }
        stats.passes += 1;

        match light.process(spectral.read()) {
            Some(lux) => {
                shared.set_lux(lux);
                stats.light_updates += 1;
            }
            None => stats.light_skipped += 1,
        }

        let now = Instant::now();
        if publish.due(now) {
            stats.send_errors += publish_snapshot(transport, &shared.snapshot());
            stats.publications += 1;
        }
        if status.due(now) {
            for line in status_lines(&shared.snapshot()) {
                info!("{line}");
            }
            stats.status_emissions += 1;
        }
        transport.housekeeping();

        let mut delay = pass_delay;
        if let Some(stop) = stop_at {
            delay = delay.min(stop.saturating_duration_since(Instant::now()));
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    stats
}

// ──────────────────────────────────────────────
// Nó completo
// ──────────────────────────────────────────────

/// Resultado de uma execução limitada.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    pub main: LoopStats,
    pub sound: TaskStats,
    pub heart: TaskStats,
    pub last_published: TelemetrySnapshot,
}

/// Nó inicializado, pronto para amostrar.
pub struct Node {
    config: AppConfig,
    sensors: SensorSet,
    transport: Box<dyn Transport>,
    shared: Arc<SharedEstimate>,
}

impl Node {
    /// Sequência de boot: sensores, transporte e publicação inicial de
    /// zeros. Qualquer erro aqui é fatal.
    pub fn boot(
        config: AppConfig,
        mut sensors: SensorSet,
        mut transport: Box<dyn Transport>,
    ) -> Result<Self, NodeError> {
        sensors.spectral.begin()?;
        info!("✓ Sensor espectral detectado");
        sensors.ppg.begin()?;
        info!("✓ Sensor PPG detectado");
        transport.start()?;

        let shared = Arc::new(SharedEstimate::new());
        let failures = publish_snapshot(transport.as_mut(), &shared.snapshot());
        if failures > 0 {
            warn!("Publicação inicial: {failures} notificações falharam");
        }
        info!("Telemetria inicial publicada (zeros)");

        Ok(Self {
            config,
            sensors,
            transport,
            shared,
        })
    }

    pub fn shared(&self) -> Arc<SharedEstimate> {
        Arc::clone(&self.shared)
    }

    /// Dispara as tasks e roda o loop principal nesta thread.
    ///
    /// `None` roda para sempre; com duração, as tasks recebem o sinal de
    /// parada no fim e são aguardadas.
    pub fn run(self, duration: Option<Duration>) -> Result<RunReport, NodeError> {
        let Node {
            config,
            sensors,
            mut transport,
            shared,
        } = self;
        let SensorSet {
            microphone,
            mut spectral,
            ppg,
        } = sensors;

        // Dropar o sender desconecta o canal: sinal de parada para todas as tasks
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let sound = spawn_sound_task(
            microphone,
            config.sound.clone(),
            Duration::from_millis(config.scheduler.sound_period_ms),
            Arc::clone(&shared),
            stop_rx.clone(),
        )?;
        let heart = spawn_heart_task(ppg, config.heart.clone(), Arc::clone(&shared), stop_rx)?;

        let mut light = LightEstimator::new(&config.light);
        let stop_at = duration.map(|d| Instant::now() + d);
        let main = run_main_loop(
            spectral.as_mut(),
            &mut light,
            transport.as_mut(),
            &shared,
            &config.scheduler,
            stop_at,
        );

        drop(stop_tx);
        let sound = join_task(sound, "core1-sound");
        let heart = join_task(heart, "core1-heart");

        let last_published = TelemetrySnapshot {
            sound_db: transport
                .read(AttributeId::SoundLevel)
                .map_or(0.0, |a| a.as_f32()),
            lux: transport
                .read(AttributeId::LightLevel)
                .map_or(0.0, |a| a.as_f32()),
            bpm: transport
                .read(AttributeId::HeartRate)
                .map_or(0, |a| a.as_f32() as u8),
        };

        Ok(RunReport {
            main,
            sound,
            heart,
            last_published,
        })
    }
}

fn join_task(handle: JoinHandle<TaskStats>, name: &str) -> TaskStats {
    handle.join().unwrap_or_else(|_| {
        error!("Thread {name} terminou em pânico");
        TaskStats::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use sensor_core::{Attribute, SensorError, SensorKind, SpectralReading};
    use std::sync::Mutex;

    // ── Fakes ──

    #[derive(Clone, Default)]
    struct RecordingTransport {
        log: Arc<Mutex<Vec<Attribute>>>,
        fail_start: bool,
    }

    impl Transport for RecordingTransport {
        fn start(&mut self) -> Result<(), NodeError> {
            if self.fail_start {
                Err(NodeError::TransportInit("rádio não respondeu".into()))
            } else {
                Ok(())
            }
        }

        fn notify(&mut self, attribute: Attribute) -> Result<(), NodeError> {
            self.log.lock().unwrap().push(attribute);
            Ok(())
        }

        fn read(&self, id: AttributeId) -> Option<Attribute> {
            self.log.lock().unwrap().iter().rev().find(|a| a.id() == id).copied()
        }
    }

    struct FlakySpectral {
        calls: u32,
    }

    impl SpectralSensor for FlakySpectral {
        fn begin(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn read(&mut self) -> Result<SpectralReading, SensorError> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                Err(SensorError::ReadFailed(SensorKind::Spectral, "NACK".into()))
            } else {
                Ok(SpectralReading {
                    visible: [400; 8],
                    ..Default::default()
                })
            }
        }
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.scheduler = SchedulerConfig {
            sound_period_ms: 4,
            publish_interval_ms: 30,
            status_interval_ms: 80,
            main_loop_delay_ms: 2,
        };
        config.heart.sample_rate_hz = 500.0;
        config.simulation.light_failure_rate = 0.0;
        config.simulation.ppg_miss_rate = 0.0;
        config
    }

    // ── Cadência ──

    #[test]
    fn publication_count_over_ten_virtual_seconds() {
        let start = Instant::now();
        let mut publish = Cadence::new(Duration::from_millis(300), start);
        let mut rng = StdRng::seed_from_u64(7);

        // Passadas com jitter de 1 a 25 ms (leituras de luz lentas)
        let mut t = Duration::ZERO;
        let end = Duration::from_millis(10_000);
        let mut publications = 0;
        while t < end {
            if publish.due(start + t) {
                publications += 1;
            }
            t += Duration::from_millis(rng.gen_range(1..=25));
        }

        let expected = 10_000 / 300;
        assert!(
            (publications as i64 - expected as i64).abs() <= 1,
            "{publications} publicações, esperado {expected} ± 1"
        );
    }

    #[test]
    fn cadence_skips_missed_periods_without_burst() {
        let start = Instant::now();
        let mut c = Cadence::new(Duration::from_millis(300), start);
        assert!(!c.due(start + Duration::from_millis(299)));
        // Travou por ~1 s: dispara uma vez e realinha na grade
        assert!(c.due(start + Duration::from_millis(1000)));
        assert!(!c.due(start + Duration::from_millis(1001)));
        assert_eq!(c.next_deadline(), start + Duration::from_millis(1200));
    }

    #[test]
    fn periodic_wait_stops_on_disconnect() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let mut p = Periodic::new("teste", Duration::from_secs(5));
        drop(tx);
        let t0 = Instant::now();
        assert!(!p.wait(&rx));
        assert!(t0.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn periodic_counts_overruns() {
        let (_tx, rx) = crossbeam_channel::bounded::<()>(0);
        let mut p = Periodic::new("teste", Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        assert!(p.wait(&rx));
        assert_eq!(p.overruns(), 1);
        // Próximo ciclo cabe no período
        assert!(p.wait(&rx));
        assert_eq!(p.overruns(), 1);
    }

    // ── Loop principal ──

    #[test]
    fn main_loop_skips_failed_light_reads_and_keeps_value() {
        let mut spectral = FlakySpectral { calls: 0 };
        let mut light = LightEstimator::new(&AppConfig::default().light);
        let mut transport = RecordingTransport::default();
        let shared = SharedEstimate::new();
        let config = SchedulerConfig {
            publish_interval_ms: 20,
            status_interval_ms: 50,
            main_loop_delay_ms: 1,
            ..Default::default()
        };

        let stats = run_main_loop(
            &mut spectral,
            &mut light,
            &mut transport,
            &shared,
            &config,
            Some(Instant::now() + Duration::from_millis(200)),
        );

        assert!(stats.passes > 10);
        assert_eq!(stats.light_updates + stats.light_skipped, stats.passes);
        assert!(stats.light_skipped >= stats.passes / 2 - 1);
        assert!(shared.lux() > 0.0);
        assert!(stats.publications >= 5 && stats.publications <= 10);
        assert_eq!(
            transport.log.lock().unwrap().len() as u64,
            stats.publications * 3
        );
    }

    // ── Boot ──

    #[test]
    fn boot_publishes_zeros_before_sampling() {
        let transport = RecordingTransport::default();
        let log = Arc::clone(&transport.log);
        let config = AppConfig::default();
        let node = Node::boot(config.clone(), SensorSet::simulated(&config), Box::new(transport))
            .unwrap();

        let published = log.lock().unwrap().clone();
        assert_eq!(published, TelemetrySnapshot::default().attributes().to_vec());
        assert_eq!(node.shared().snapshot(), TelemetrySnapshot::default());
    }

    #[test]
    fn missing_light_sensor_is_fatal() {
        let mut config = AppConfig::default();
        config.simulation.light_present = false;
        let transport = RecordingTransport::default();
        let log = Arc::clone(&transport.log);

        let err = Node::boot(config.clone(), SensorSet::simulated(&config), Box::new(transport))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            NodeError::SensorInit(SensorError::NotDetected(SensorKind::Spectral))
        ));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_ppg_sensor_is_fatal() {
        let mut config = AppConfig::default();
        config.simulation.ppg_present = false;
        let err = Node::boot(
            config.clone(),
            SensorSet::simulated(&config),
            Box::new(RecordingTransport::default()),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            NodeError::SensorInit(SensorError::NotDetected(SensorKind::Ppg))
        ));
    }

    #[test]
    fn transport_start_failure_is_fatal() {
        let config = AppConfig::default();
        let transport = RecordingTransport {
            fail_start: true,
            ..Default::default()
        };
        let err = Node::boot(config.clone(), SensorSet::simulated(&config), Box::new(transport))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::TransportInit(_)));
    }

    // ── Execução completa ──

    #[test]
    fn bounded_run_publishes_at_fixed_cadence() {
        let config = fast_config();
        let transport = RecordingTransport::default();
        let log = Arc::clone(&transport.log);
        let node =
            Node::boot(config.clone(), SensorSet::simulated(&config), Box::new(transport)).unwrap();
        let shared = node.shared();

        let report = node.run(Some(Duration::from_millis(1500))).unwrap();

        // 1500 / 30 = 50 publicações; folga para agendamento do host
        assert!(
            (40..=51).contains(&report.main.publications),
            "{} publicações",
            report.main.publications
        );
        assert_eq!(
            log.lock().unwrap().len() as u64,
            3 + report.main.publications * 3
        );
        assert!(report.sound.cycles > 0);
        assert!(report.heart.updates >= 1, "nenhuma janela PPG completa");
        assert!(shared.sound_db() > 0.0);
        assert!(shared.lux() > 0.0);
        assert!(report.main.status_emissions >= 10);
        assert!(report.last_published.lux > 0.0);
    }
}
