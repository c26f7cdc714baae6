//! Linhas de status legíveis para o console (diagnóstico, fora do contrato
//! de telemetria).

use sensor_core::{Attribute, TelemetrySnapshot};

/// Uma linha por sinal.
pub fn status_lines(snapshot: &TelemetrySnapshot) -> [String; 3] {
    snapshot.attributes().map(|attr| {
        let id = attr.id();
        match attr {
            Attribute::HeartRate(bpm) => format!("{:<4} {:>7} {}", id.label(), bpm, id.unit()),
            other => format!("{:<4} {:>7.1} {}", id.label(), other.as_f32(), id.unit()),
        }
    })
}
