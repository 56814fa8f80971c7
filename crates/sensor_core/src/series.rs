//! Séries por sensor e limites agregados.
//!
//! Cada [`Series`] guarda uma coluna por entrada de
//! [`Schema::column_names`], todas sempre do mesmo tamanho: uma linha entra
//! inteira ou não entra.

use crate::schema::{FieldValue, HOST_TIME, Schema};
use crate::text::Row;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Linha com número de valores diferente do número de colunas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Linha com {found} valores para {expected} colunas")]
pub struct RowWidth {
    pub expected: usize,
    pub found: usize,
}

// ──────────────────────────────────────────────
// Série
// ──────────────────────────────────────────────

/// Histórico colunar de um sensor, em ordem de chegada.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    schema: Schema,
    columns: Vec<Vec<FieldValue>>,
}

impl Series {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            columns: vec![Vec::new(); schema.column_count()],
        }
    }

    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coluna pelo nome (`"HostTime"` ou nome de campo).
    pub fn column(&self, name: &str) -> Option<&[FieldValue]> {
        self.schema
            .column_index(name)
            .and_then(|i| self.columns.get(i))
            .map(Vec::as_slice)
    }

    /// Pares `(nome, coluna)` na ordem do schema.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &[FieldValue])> + '_ {
        self.schema
            .column_names()
            .into_iter()
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    pub fn host_times(&self) -> Vec<NaiveDateTime> {
        self.column(HOST_TIME)
            .unwrap_or_default()
            .iter()
            .filter_map(FieldValue::as_time)
            .collect()
    }

    /// Escalar principal por linha; `NaN` onde a leitura veio sem valor.
    pub fn values(&self) -> Vec<f32> {
        self.column("value")
            .unwrap_or_default()
            .iter()
            .map(|v| v.primary().unwrap_or(f32::NAN))
            .collect()
    }

    /// Reconstrói a linha `i`.
    pub fn row(&self, i: usize) -> Option<Row> {
        if i >= self.len() {
            return None;
        }
        let values = self.columns.iter().map(|c| c[i].clone()).collect();
        Some(Row::from_values(self.schema, values))
    }

    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.len()).filter_map(|i| self.row(i))
    }

    fn check_width(&self, row: &Row) -> Result<(), RowWidth> {
        let found = row.values().len();
        if found != self.columns.len() {
            return Err(RowWidth {
                expected: self.columns.len(),
                found,
            });
        }
        Ok(())
    }

    /// Acrescenta uma linha em todas as colunas.
    pub fn push(&mut self, row: Row) -> Result<(), RowWidth> {
        self.check_width(&row)?;
        for (column, value) in self.columns.iter_mut().zip(row.into_values()) {
            column.push(value);
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Store
// ──────────────────────────────────────────────

/// Mapa nome do sensor → série.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    schema: Schema,
    series: BTreeMap<String, Series>,
}

impl SeriesStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            series: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    /// Acrescenta `row` à série `name`, criando-a na primeira vez.
    pub fn append(&mut self, name: &str, row: Row) -> Result<(), RowWidth> {
        if let Some(series) = self.series.get_mut(name) {
            return series.push(row);
        }
        let mut series = Series::new(self.schema);
        series.push(row)?;
        self.series.insert(name.to_owned(), series);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.series.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total de linhas em todas as séries.
    pub fn row_count(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }
}

// ──────────────────────────────────────────────
// Limites
// ──────────────────────────────────────────────

/// Mínimo/máximo do valor principal e primeiro/último `HostTime`
/// observados. Só cresce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateBounds {
    pub min_value: f32,
    pub max_value: f32,
    pub earliest: NaiveDateTime,
    pub latest: NaiveDateTime,
}

impl Default for AggregateBounds {
    fn default() -> Self {
        Self {
            min_value: f32::INFINITY,
            max_value: f32::NEG_INFINITY,
            earliest: NaiveDateTime::MAX,
            latest: NaiveDateTime::MIN,
        }
    }
}

impl AggregateBounds {
    pub fn observe(&mut self, value: Option<f32>, host_time: NaiveDateTime) {
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            self.min_value = self.min_value.min(v);
            self.max_value = self.max_value.max(v);
        }
        self.earliest = self.earliest.min(host_time);
        self.latest = self.latest.max(host_time);
    }

    pub fn value_range(&self) -> Option<(f32, f32)> {
        (self.min_value <= self.max_value).then_some((self.min_value, self.max_value))
    }

    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        (self.earliest <= self.latest).then_some((self.earliest, self.latest))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SensorReading, SensorType};
    use chrono::NaiveDate;

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, s)
            .unwrap()
    }

    fn row(name: &str, index: u64, value: f32, s: u32) -> Row {
        let reading = SensorReading {
            name: name.into(),
            sensor_type: SensorType::Thermometer,
            index,
            value: vec![value],
            ..Default::default()
        };
        Row::from_reading(Schema::sensor_data(), at(s), &reading)
    }

    fn assert_aligned(store: &SeriesStore) {
        for (name, series) in store.iter() {
            let lens: Vec<usize> = series.columns().map(|(_, c)| c.len()).collect();
            assert_eq!(lens.len(), 7);
            assert!(lens.iter().all(|l| *l == series.len()), "{name}: {lens:?}");
        }
    }

    #[test]
    fn store_creates_series_on_first_sight() {
        let mut store = SeriesStore::new(Schema::sensor_data());
        store.append("a", row("a", 1, 1.0, 0)).unwrap();
        store.append("b", row("b", 1, 5.0, 1)).unwrap();
        store.append("a", row("a", 2, 2.0, 2)).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.row_count(), 3);
        assert_eq!(store.get("a").unwrap().values(), vec![1.0, 2.0]);
        assert_eq!(store.get("a").unwrap().host_times(), vec![at(0), at(2)]);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_aligned(&store);
    }

    #[test]
    fn series_keeps_arrival_order_and_duplicates() {
        let mut series = Series::new(Schema::sensor_data());
        for (i, s) in [(3, 0), (1, 1), (3, 2)] {
            series.push(row("a", i, i as f32, s)).unwrap();
        }
        let index: Vec<_> = series.column("index").unwrap().to_vec();
        assert_eq!(
            index,
            vec![FieldValue::UInt(3), FieldValue::UInt(1), FieldValue::UInt(3)]
        );
    }

    #[test]
    fn narrow_row_is_rejected_without_partial_append() {
        let mut store = SeriesStore::new(Schema::sensor_data());
        store.append("a", row("a", 1, 1.0, 0)).unwrap();

        let narrow = Row::from_values(Schema::sensor_data(), vec![FieldValue::Time(at(1))]);
        assert_eq!(
            store.append("a", narrow.clone()),
            Err(RowWidth {
                expected: 7,
                found: 1
            })
        );
        assert!(store.append("new", narrow).is_err());
        assert!(store.get("new").is_none());
        assert_eq!(store.get("a").unwrap().len(), 1);
        assert_aligned(&store);
    }

    #[test]
    fn rows_rebuild_what_was_pushed() {
        let mut series = Series::new(Schema::sensor_data());
        let original = row("a", 4, -2.5, 9);
        series.push(original.clone()).unwrap();
        assert_eq!(series.row(0), Some(original));
        assert_eq!(series.row(1), None);
        assert_eq!(series.rows().count(), 1);
    }

    #[test]
    fn empty_value_becomes_nan_in_values() {
        let mut series = Series::new(Schema::sensor_data());
        let reading = SensorReading {
            name: "x".into(),
            ..Default::default()
        };
        series
            .push(Row::from_reading(Schema::sensor_data(), at(0), &reading))
            .unwrap();
        assert!(series.values()[0].is_nan());
    }

    #[test]
    fn bounds_track_extremes_regardless_of_order() {
        let mut bounds = AggregateBounds::default();
        assert_eq!(bounds.value_range(), None);
        assert_eq!(bounds.time_range(), None);

        for (v, s) in [(11.0, 5), (9.0, 1), (13.0, 3), (10.0, 0), (12.0, 2)] {
            bounds.observe(Some(v), at(s));
        }
        bounds.observe(None, at(7));
        bounds.observe(Some(f32::NAN), at(6));

        assert_eq!(bounds.value_range(), Some((9.0, 13.0)));
        assert_eq!(bounds.time_range(), Some((at(0), at(7))));
    }
}
