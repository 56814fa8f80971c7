//! Tipos de uma leitura de sensor.
//!
//! Uma [`SensorReading`] corresponde a uma amostra de um único dispositivo.
//! Os campos são acessados de forma genérica via [`Field`] pelo codec e
//! pelo formato textual, sempre na ordem definida pelo schema.

use crate::schema::{FieldKind, FieldValue, SchemaMismatch};
use std::fmt;
use std::str::FromStr;

// ──────────────────────────────────────────────
// Tipo do sensor
// ──────────────────────────────────────────────

/// Tipo físico do sensor.
///
/// Números desconhecidos são preservados em [`SensorType::Other`] para
/// tolerar senders mais novos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SensorType {
    #[default]
    Unknown,
    Thermometer,
    Other(i32),
}

impl SensorType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => SensorType::Unknown,
            1 => SensorType::Thermometer,
            n => SensorType::Other(n),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            SensorType::Unknown => 0,
            SensorType::Thermometer => 1,
            SensorType::Other(n) => n,
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::Unknown => f.write_str("Unknown"),
            SensorType::Thermometer => f.write_str("Thermometer"),
            SensorType::Other(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for SensorType {
    type Err = String;

    /// Aceita o nome da variante ou o número do enum.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(SensorType::Unknown),
            "Thermometer" => Ok(SensorType::Thermometer),
            other => other
                .parse::<i32>()
                .map(SensorType::from_i32)
                .map_err(|_| format!("tipo de sensor desconhecido: '{other}'")),
        }
    }
}

// ──────────────────────────────────────────────
// Campos
// ──────────────────────────────────────────────

/// Identidade de cada campo de uma leitura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Uid,
    SensorType,
    Index,
    Value,
    TimestampUs,
}

impl Field {
    /// Nome da coluna correspondente.
    pub fn name(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Uid => "uid",
            Field::SensorType => "type",
            Field::Index => "index",
            Field::Value => "value",
            Field::TimestampUs => "timestamp_us",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Name => FieldKind::String,
            Field::Uid | Field::Index => FieldKind::UInt,
            Field::SensorType => FieldKind::Enum,
            Field::Value => FieldKind::FloatRepeated,
            Field::TimestampUs => FieldKind::Int,
        }
    }
}

// ──────────────────────────────────────────────
// Leitura
// ──────────────────────────────────────────────

/// Uma amostra de um sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReading {
    /// Nome do sensor (chave de agregação)
    pub name: String,
    /// Identificador estável do dispositivo
    pub uid: u64,
    pub sensor_type: SensorType,
    /// Número de sequência, cresce a cada amostra do dispositivo
    pub index: u64,
    /// Valores amostrados; `value[0]` é o escalar principal
    pub value: Vec<f32>,
    /// Timestamp do sensor (µs desde a epoch)
    pub timestamp_us: i64,
}

impl SensorReading {
    pub fn new(name: impl Into<String>, uid: u64, sensor_type: SensorType) -> Self {
        Self {
            name: name.into(),
            uid,
            sensor_type,
            ..Default::default()
        }
    }

    /// Escalar principal, se houver.
    pub fn primary_value(&self) -> Option<f32> {
        self.value.first().copied()
    }

    /// Registra uma nova amostra: avança o índice, substitui os valores
    /// e carimba o timestamp.
    pub fn advance(&mut self, value: f32, timestamp_us: i64) {
        self.index = self.index.wrapping_add(1);
        self.value.clear();
        self.value.push(value);
        self.timestamp_us = timestamp_us;
    }

    /// Valor de um campo na forma genérica usada pelo schema.
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::Name => FieldValue::Text(self.name.clone()),
            Field::Uid => FieldValue::UInt(self.uid),
            Field::SensorType => FieldValue::Enum(self.sensor_type),
            Field::Index => FieldValue::UInt(self.index),
            Field::Value => FieldValue::Floats(self.value.clone()),
            Field::TimestampUs => FieldValue::Int(self.timestamp_us),
        }
    }

    /// Substitui o valor de um campo. Falha se o tipo não corresponde.
    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), SchemaMismatch> {
        match (field, value) {
            (Field::Name, FieldValue::Text(s)) => self.name = s,
            (Field::Uid, FieldValue::UInt(v)) => self.uid = v,
            (Field::SensorType, FieldValue::Enum(t)) => self.sensor_type = t,
            (Field::Index, FieldValue::UInt(v)) => self.index = v,
            (Field::Value, FieldValue::Floats(v)) => self.value = v,
            (Field::TimestampUs, FieldValue::Int(v)) => self.timestamp_us = v,
            (field, other) => {
                return Err(SchemaMismatch {
                    field: field.name(),
                    expected: field.kind(),
                    found: other.kind_name(),
                });
            }
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_type_text_roundtrip() {
        for t in [
            SensorType::Unknown,
            SensorType::Thermometer,
            SensorType::Other(42),
            SensorType::Other(-3),
        ] {
            assert_eq!(t.to_string().parse::<SensorType>().unwrap(), t);
        }
        assert_eq!("1".parse::<SensorType>().unwrap(), SensorType::Thermometer);
        assert!("Barometro".parse::<SensorType>().is_err());
    }

    #[test]
    fn advance_replaces_value_and_bumps_index() {
        let mut r = SensorReading::new("28-AA", 0x28AA, SensorType::Thermometer);
        r.value = vec![1.0, 2.0, 3.0];
        r.advance(21.5, 1_700_000_000_000_000);
        assert_eq!(r.index, 1);
        assert_eq!(r.value, vec![21.5]);
        assert_eq!(r.timestamp_us, 1_700_000_000_000_000);
        r.advance(22.0, 1_700_000_001_000_000);
        assert_eq!(r.index, 2);
        assert_eq!(r.primary_value(), Some(22.0));
    }

    #[test]
    fn set_rejects_wrong_kind() {
        let mut r = SensorReading::default();
        let err = r.set(Field::Uid, FieldValue::Text("x".into())).unwrap_err();
        assert_eq!(err.field, "uid");
        assert_eq!(err.expected, FieldKind::UInt);
        assert_eq!(r, SensorReading::default());
    }

    #[test]
    fn get_then_set_restores_every_field() {
        let original = SensorReading {
            name: "28-0316A2797A4F".into(),
            uid: 0x280316A2797A4F,
            sensor_type: SensorType::Thermometer,
            index: 7,
            value: vec![-12.5, 3.25],
            timestamp_us: 1_650_000_000_123_456,
        };
        let mut copy = SensorReading::default();
        for field in [
            Field::Name,
            Field::Uid,
            Field::SensorType,
            Field::Index,
            Field::Value,
            Field::TimestampUs,
        ] {
            copy.set(field, original.get(field)).unwrap();
        }
        assert_eq!(copy, original);
    }
}
