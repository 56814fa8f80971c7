//! Relatório textual das séries e a visão "por data".

use chrono::NaiveDate;
use sensor_core::schema::format_host_time;
use sensor_core::{AggregateBounds, SeriesStore};
use tracing::warn;

/// Uma linha por sensor (amostras, período, mín/máx) e os limites globais.
pub fn summary(store: &SeriesStore, bounds: &AggregateBounds) -> String {
    let mut out = String::new();

    if store.is_empty() {
        out.push_str("Nenhuma leitura recebida\n");
        return out;
    }

    let width = store.names().map(str::len).max().unwrap_or(0);
    for (name, series) in store.iter() {
        let times = series.host_times();
        let values: Vec<f32> = series.values().into_iter().filter(|v| !v.is_nan()).collect();
        let (first, last) = match (times.first(), times.last()) {
            (Some(f), Some(l)) => (format_host_time(f), format_host_time(l)),
            _ => ("-".into(), "-".into()),
        };
        out.push_str(&format!("{name:<width$}  {:>6} amostras  {first} → {last}", series.len()));
        if let (Some(min), Some(max)) = (
            values.iter().copied().reduce(f32::min),
            values.iter().copied().reduce(f32::max),
        ) {
            out.push_str(&format!("  mín {min:.3}  máx {max:.3}"));
        }
        out.push('\n');
    }

    out.push_str("──────────────────────────────────────────────\n");
    if let Some((min, max)) = bounds.value_range() {
        out.push_str(&format!("Valores: {min:.3} … {max:.3}\n"));
    }
    if let Some((earliest, latest)) = bounds.time_range() {
        out.push_str(&format!(
            "Período: {} → {}\n",
            format_host_time(&earliest),
            format_host_time(&latest)
        ));
    }
    out
}

/// Reagrupa cada série por dia: `sensor` vira `sensor_YYYY-MM-DD`, e todo
/// `HostTime` é movido para `anchor` mantendo a hora do dia, para que os
/// dias possam ser sobrepostos.
pub fn by_date(store: &SeriesStore, anchor: NaiveDate) -> SeriesStore {
    let mut out = SeriesStore::new(store.schema());
    for (name, series) in store.iter() {
        for row in series.rows() {
            let Some(host_time) = row.host_time() else {
                continue;
            };
            let key = format!("{name}_{}", host_time.date().format("%Y-%m-%d"));
            let moved = row.with_host_time(anchor.and_time(host_time.time()));
            if let Err(e) = out.append(&key, moved) {
                warn!("{key}: {e}");
            }
        }
    }
    out
}
