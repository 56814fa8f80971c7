//! Codec binário de uma leitura (um datagrama = uma leitura).
//!
//! O datagrama é a mensagem protobuf `SensorData`, sem header próprio, para
//! conversar com os loggers existentes que já emitem essa mensagem:
//!
//! | campo          | tag | tipo protobuf            |
//! |----------------|-----|--------------------------|
//! | `name`         | 1   | `string`                 |
//! | `uid`          | 2   | `uint64`                 |
//! | `type`         | 3   | `SensorType` (enum)      |
//! | `index`        | 4   | `uint64`                 |
//! | `value`        | 5   | `repeated float` (packed)|
//! | `timestamp_us` | 6   | `int64`                  |
//!
//! As tags são as mesmas do [`Schema`](crate::schema::Schema). Campos com
//! valor padrão não são enviados; tags desconhecidas são ignoradas.

use crate::types::{SensorReading, SensorType};
use prost::Message;

/// Tamanho máximo de um datagrama aceito pelo receiver.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Bytes que não formam uma mensagem `SensorData` válida.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MalformedRecord(#[from] prost::DecodeError);

/// Mensagem `SensorData` como trafega na rede.
#[derive(Clone, PartialEq, Message)]
pub struct SensorData {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint64, tag = "2")]
    pub uid: u64,
    #[prost(enumeration = "WireSensorType", tag = "3")]
    pub r#type: i32,
    #[prost(uint64, tag = "4")]
    pub index: u64,
    #[prost(float, repeated, tag = "5")]
    pub value: Vec<f32>,
    #[prost(int64, tag = "6")]
    pub timestamp_us: i64,
}

/// Enum `SensorData.SensorType` do protobuf. Números fora dela chegam
/// como [`SensorType::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireSensorType {
    Unknown = 0,
    Thermometer = 1,
}

impl From<&SensorReading> for SensorData {
    fn from(r: &SensorReading) -> Self {
        Self {
            name: r.name.clone(),
            uid: r.uid,
            r#type: r.sensor_type.as_i32(),
            index: r.index,
            value: r.value.clone(),
            timestamp_us: r.timestamp_us,
        }
    }
}

impl From<SensorData> for SensorReading {
    fn from(m: SensorData) -> Self {
        Self {
            name: m.name,
            uid: m.uid,
            sensor_type: SensorType::from_i32(m.r#type),
            index: m.index,
            value: m.value,
            timestamp_us: m.timestamp_us,
        }
    }
}

/// Codifica uma leitura para transmissão UDP.
pub fn encode_reading(reading: &SensorReading) -> Vec<u8> {
    SensorData::from(reading).encode_to_vec()
}

/// Decodifica um datagrama em uma leitura nova; campos ausentes ficam com
/// o valor padrão.
pub fn decode_reading(data: &[u8]) -> Result<SensorReading, MalformedRecord> {
    Ok(SensorData::decode(data)?.into())
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
