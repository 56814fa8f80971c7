//! # Sensor Core
//!
//! Crate compartilhada pelo logger (sender) e pelo cliente (receiver):
//! schema da leitura de sensor, codec binário para UDP, formato CSV e a
//! agregação de séries por sensor.
//!
//! ## Módulos
//! - [`schema`] – Tabela de campos, ordem das colunas, formatters/parsers
//! - [`types`] – [`SensorReading`] e [`SensorType`]
//! - [`protocol`] – Encode/decode binário (compatível com protobuf)
//! - [`text`] – Render/parse de linhas CSV e gravação em arquivo
//! - [`series`] – Séries colunares por sensor e limites agregados
//! - [`aggregator`] – Modos live (UDP) e replay (CSV)
//! - [`stop`] – Sinal de parada dos loops
//! - [`config`] – Configuração unificada via TOML

pub mod aggregator;
pub mod config;
pub mod protocol;
pub mod schema;
pub mod series;
pub mod stop;
pub mod text;
pub mod types;

// Re-exports convenientes
pub use aggregator::{Aggregator, AggregatorError, Ingest, IngestError, RunStats, SensorFilter};
pub use config::{AppConfig, ReceiverConfig, SenderConfig};
pub use protocol::{MAX_DATAGRAM_SIZE, MalformedRecord, decode_reading, encode_reading};
pub use schema::Schema;
pub use series::{AggregateBounds, Series, SeriesStore};
pub use stop::{StopHandle, StopSignal, stop_channel};
pub use text::{CsvSink, MalformedLine, TextFormat};
pub use types::{SensorReading, SensorType};
