//! Registradores compartilhados com a última estimativa de cada sinal.
//!
//! Cada campo tem sua própria seção crítica, curta, em volta de uma única
//! leitura ou escrita. Não existe transação entre campos: um snapshot lido
//! campo a campo pode combinar valores de ciclos diferentes.

use crate::heart::bpm_to_u8;
use crate::types::TelemetrySnapshot;
use std::sync::{Mutex, PoisonError};

/// Registrador de um único escritor e vários leitores.
#[derive(Debug, Default)]
pub struct EstimateCell {
    value: Mutex<f32>,
}

impl EstimateCell {
    pub fn set(&self, value: f32) {
        // Lock envenenado não derruba o publicador: o f32 é sempre válido
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn get(&self) -> f32 {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Últimos valores publicados (som, luz, FC), zerados no boot.
#[derive(Debug, Default)]
pub struct SharedEstimate {
    sound_db: EstimateCell,
    lux: EstimateCell,
    bpm: EstimateCell,
}

impl SharedEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sound_db(&self, db: f32) {
        self.sound_db.set(db);
    }

    pub fn set_lux(&self, lux: f32) {
        self.lux.set(lux);
    }

    pub fn set_bpm(&self, bpm: f32) {
        self.bpm.set(bpm);
    }

    pub fn sound_db(&self) -> f32 {
        self.sound_db.get()
    }

    pub fn lux(&self) -> f32 {
        self.lux.get()
    }

    pub fn bpm(&self) -> f32 {
        self.bpm.get()
    }

    /// Copia os três campos, um lock de cada vez.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            sound_db: self.sound_db(),
            lux: self.lux(),
            bpm: bpm_to_u8(self.bpm()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_zeroed() {
        let shared = SharedEstimate::new();
        assert_eq!(shared.snapshot(), TelemetrySnapshot::default());
    }

    #[test]
    fn snapshot_truncates_bpm() {
        let shared = SharedEstimate::new();
        shared.set_sound_db(61.5);
        shared.set_lux(420.25);
        shared.set_bpm(72.9);
        let s = shared.snapshot();
        assert_eq!(s.sound_db, 61.5);
        assert_eq!(s.lux, 420.25);
        assert_eq!(s.bpm, 72);
    }

    #[test]
    fn concurrent_writers_never_tear_values() {
        let shared = Arc::new(SharedEstimate::new());
        let mut handles = Vec::new();

        for field in 0..3 {
            let s = Arc::clone(&shared);
            handles.push(thread::spawn(move || {
                for i in 0..2000 {
                    let v = (i % 100) as f32;
                    match field {
                        0 => s.set_sound_db(v),
                        1 => s.set_lux(v),
                        _ => s.set_bpm(v),
                    }
                }
            }));
        }

        // Leitor concorrente: só valores escritos por algum produtor
        for _ in 0..2000 {
            let snap = shared.snapshot();
            assert!(snap.sound_db.fract() == 0.0 && snap.sound_db < 100.0);
            assert!(snap.lux.fract() == 0.0 && snap.lux < 100.0);
            assert!(snap.bpm < 100);
        }

        for h in handles {
            h.join().unwrap();
        }
        let last = shared.snapshot();
        assert_eq!(last.sound_db, 99.0);
        assert_eq!(last.lux, 99.0);
        assert_eq!(last.bpm, 99);
    }

    #[test]
    fn poisoned_cell_still_readable() {
        let shared = Arc::new(SharedEstimate::new());
        shared.set_lux(12.0);
        let s = Arc::clone(&shared);
        let _ = thread::spawn(move || {
            let _guard = s.lux.value.lock().unwrap();
            panic!("escritor falhou");
        })
        .join();
        assert_eq!(shared.lux(), 12.0);
        shared.set_lux(13.0);
        assert_eq!(shared.lux(), 13.0);
    }
}
