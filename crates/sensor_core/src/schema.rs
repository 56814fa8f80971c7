//! Registro do schema de uma leitura de sensor.
//!
//! O schema é uma tabela estática de descritores de campo, montada em tempo
//! de compilação. A posição de cada descritor define:
//!
//! - a ordem das colunas em todo formato textual (`HostTime` sempre primeiro);
//! - o número do campo no fio (`tag = posição + 1`).
//!
//! Cada descritor carrega um formatter e um parser. Campos sem regra própria
//! usam o formatter genérico ([`fmt::Display`] de [`FieldValue`]) e o parser
//! genérico do seu [`FieldKind`].

use crate::types::{Field, SensorType};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike};
use std::fmt;

/// Nome da coluna de horário de recepção.
pub const HOST_TIME: &str = "HostTime";

/// Nome da coluna usada como chave de agregação.
pub const NAME_COLUMN: &str = "name";

/// Formato de data/hora de `HostTime`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Formato de `timestamp_us`: hora local com o offset UTC, para que o
/// instante volte exato mesmo na hora repetida do horário de verão.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

// ──────────────────────────────────────────────
// Tipos e valores
// ──────────────────────────────────────────────

/// Tipo declarado de um campo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    UInt,
    FloatRepeated,
    Enum,
}

/// Valor de uma coluna, independente do campo.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Floats(Vec<f32>),
    Enum(SensorType),
    /// Apenas na coluna `HostTime`
    Time(NaiveDateTime),
}

impl FieldValue {
    /// `true` se o valor é o padrão do tipo (campo ausente no fio).
    pub fn is_default(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Int(v) => *v == 0,
            FieldValue::UInt(v) => *v == 0,
            FieldValue::Floats(v) => v.is_empty(),
            FieldValue::Enum(t) => *t == SensorType::Unknown,
            FieldValue::Time(_) => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "texto",
            FieldValue::Int(_) => "inteiro",
            FieldValue::UInt(_) => "inteiro sem sinal",
            FieldValue::Floats(_) => "lista de floats",
            FieldValue::Enum(_) => "enum",
            FieldValue::Time(_) => "data/hora",
        }
    }

    /// Escalar principal de uma coluna `Floats`.
    pub fn primary(&self) -> Option<f32> {
        match self {
            FieldValue::Floats(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Formatter genérico.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Floats(values) => match values.as_slice() {
                // Lista vazia: valor zero do escalar
                [] => f.write_str("0"),
                [first, rest @ ..] => {
                    write!(f, "{first}")?;
                    for v in rest {
                        write!(f, " {v}")?;
                    }
                    Ok(())
                }
            },
            FieldValue::Enum(t) => write!(f, "{t}"),
            FieldValue::Time(t) => write!(f, "{}", t.format(DATETIME_FORMAT)),
        }
    }
}

/// Valor de tipo incompatível oferecido a um campo.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Campo '{field}' não aceita {found} (esperado {expected:?})")]
pub struct SchemaMismatch {
    pub field: &'static str,
    pub expected: FieldKind,
    pub found: &'static str,
}

// ──────────────────────────────────────────────
// Descritores
// ──────────────────────────────────────────────

pub type Formatter = fn(&FieldValue) -> String;
pub type Parser = fn(FieldKind, &str) -> Result<FieldValue, String>;

/// Descritor de um campo do schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub field: Field,
    pub name: &'static str,
    /// Número do campo no fio
    pub tag: u32,
    pub kind: FieldKind,
    pub format: Formatter,
    pub parse: Parser,
}

impl FieldDescriptor {
    const fn new(field: Field, tag: u32, kind: FieldKind, name: &'static str) -> Self {
        Self {
            field,
            name,
            tag,
            kind,
            format: format_generic,
            parse: parse_generic,
        }
    }

    const fn with_rules(mut self, format: Formatter, parse: Parser) -> Self {
        self.format = format;
        self.parse = parse;
        self
    }

    pub fn format_value(&self, value: &FieldValue) -> String {
        (self.format)(value)
    }

    pub fn parse_token(&self, token: &str) -> Result<FieldValue, String> {
        (self.parse)(self.kind, token)
    }
}

static SENSOR_FIELDS: [FieldDescriptor; 6] = [
    FieldDescriptor::new(Field::Name, 1, FieldKind::String, "name"),
    FieldDescriptor::new(Field::Uid, 2, FieldKind::UInt, "uid"),
    FieldDescriptor::new(Field::SensorType, 3, FieldKind::Enum, "type"),
    FieldDescriptor::new(Field::Index, 4, FieldKind::UInt, "index"),
    FieldDescriptor::new(Field::Value, 5, FieldKind::FloatRepeated, "value")
        .with_rules(format_primary_value, parse_primary_value),
    FieldDescriptor::new(Field::TimestampUs, 6, FieldKind::Int, "timestamp_us")
        .with_rules(format_timestamp_us, parse_timestamp_us),
];

// ──────────────────────────────────────────────
// Schema
// ──────────────────────────────────────────────

/// Schema de um registro de sensor. Somente leitura.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [FieldDescriptor],
}

impl Default for Schema {
    fn default() -> Self {
        Self::sensor_data()
    }
}

/// Dois schemas são iguais se têm as mesmas colunas, tags e tipos.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields)
                .all(|(a, b)| a.name == b.name && a.tag == b.tag && a.kind == b.kind)
    }
}

impl Schema {
    /// Schema da mensagem `SensorData`.
    pub const fn sensor_data() -> Self {
        Self {
            fields: &SENSOR_FIELDS,
        }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.fields
    }

    /// `["HostTime", name, uid, ...]` na ordem do schema.
    pub fn column_names(&self) -> Vec<&'static str> {
        std::iter::once(HOST_TIME)
            .chain(self.fields.iter().map(|f| f.name))
            .collect()
    }

    pub fn column_count(&self) -> usize {
        self.fields.len() + 1
    }

    /// Posição de uma coluna pelo nome.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        if name == HOST_TIME {
            return Some(0);
        }
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| i + 1)
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn by_tag(&self, tag: u32) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Linha de cabeçalho CSV.
    pub fn header_line(&self) -> String {
        self.column_names().join(", ")
    }
}

// ──────────────────────────────────────────────
// Formatters e parsers
// ──────────────────────────────────────────────

fn format_generic(value: &FieldValue) -> String {
    value.to_string()
}

fn parse_generic(kind: FieldKind, token: &str) -> Result<FieldValue, String> {
    match kind {
        FieldKind::String => Ok(FieldValue::Text(token.to_owned())),
        FieldKind::Int => token
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|e| e.to_string()),
        FieldKind::UInt => token
            .parse::<u64>()
            .map(FieldValue::UInt)
            .map_err(|e| e.to_string()),
        FieldKind::Enum => token.parse::<SensorType>().map(FieldValue::Enum),
        FieldKind::FloatRepeated => token
            .split_whitespace()
            .map(|t| t.parse::<f32>().map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::Floats),
    }
}

/// Três casas decimais, com espaço no lugar do sinal para não-negativos.
pub fn format_signed_3(v: f32) -> String {
    if v.is_sign_negative() {
        format!("{v:.3}")
    } else {
        format!(" {v:.3}")
    }
}

fn format_primary_value(value: &FieldValue) -> String {
    match value.primary() {
        Some(v) => format_signed_3(v),
        None => format_generic(value),
    }
}

fn parse_primary_value(_kind: FieldKind, token: &str) -> Result<FieldValue, String> {
    token
        .parse::<f32>()
        .map(|v| FieldValue::Floats(vec![v]))
        .map_err(|e| e.to_string())
}

fn format_timestamp_us(value: &FieldValue) -> String {
    match value {
        FieldValue::Int(us) => match DateTime::from_timestamp_micros(*us) {
            Some(utc) => format_timestamp(&utc.with_timezone(&Local)),
            None => format_generic(value),
        },
        other => format_generic(other),
    }
}

/// Aceita data/hora com offset, data/hora local sem offset (logs antigos)
/// ou o inteiro em µs.
fn parse_timestamp_us(_kind: FieldKind, token: &str) -> Result<FieldValue, String> {
    if let Ok(us) = token.parse::<i64>() {
        return Ok(FieldValue::Int(us));
    }
    let with_offset = DateTime::parse_from_str(token, "%Y-%m-%d %H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_str(token, "%Y-%m-%dT%H:%M:%S%.f%:z"));
    if let Ok(t) = with_offset {
        return Ok(FieldValue::Int(t.timestamp_micros()));
    }
    // Sem offset, a hora repetida do fim do horário de verão é ambígua
    let local = parse_host_time(token)?;
    local_to_micros(&local)
        .map(FieldValue::Int)
        .ok_or_else(|| format!("horário local inexistente: '{token}'"))
}

// ──────────────────────────────────────────────
// Datas
// ──────────────────────────────────────────────

pub fn format_host_time(t: &NaiveDateTime) -> String {
    t.format(DATETIME_FORMAT).to_string()
}

/// Lê `YYYY-MM-DD HH:MM:SS[.ffffff]`, aceitando também `T` como separador.
pub fn parse_host_time(token: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(token, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(token, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| format!("data/hora inválida '{token}': {e}"))
}

/// Horário local atual com precisão de microssegundos.
pub fn host_now() -> NaiveDateTime {
    truncate_to_micros(Local::now().naive_local())
}

pub fn truncate_to_micros(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(t.nanosecond() / 1_000 * 1_000).unwrap_or(t)
}

/// `timestamp_us` em texto, no fuso de `t`.
pub fn format_timestamp<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Horário local para microssegundos desde a epoch. Em horários ambíguos
/// (fim do horário de verão) vale a primeira ocorrência.
pub fn local_to_micros(t: &NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(t)
        .earliest()
        .map(|dt| dt.timestamp_micros())
}

pub fn now_micros() -> i64 {
    Local::now().timestamp_micros()
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
