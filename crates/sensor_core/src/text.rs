//! Formato textual de uma leitura (CSV separado por `", "`).
//!
//! ```text
//! HostTime, name, uid, type, index, value, timestamp_us
//! 2024-03-09 14:05:06.000250, 28-AA, 170, Thermometer, 3,  21.500, 2024-03-09 14:05:05.998812-03:00
//! ```
//!
//! `HostTime` é o horário de recepção/formatação, distinto de `timestamp_us`.

use crate::schema::{
    FieldValue, HOST_TIME, NAME_COLUMN, Schema, format_host_time, parse_host_time,
};
use crate::types::SensorReading;
use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::{info, warn};

/// Separador entre colunas.
pub const DELIMITER: &str = ", ";

/// Nome de sensor que sobrevive a render → parse: não vazio, sem vírgula
/// nem quebra de linha, sem espaço nas pontas (o parser apara os tokens).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.trim() == name
        && !name.contains([',', '\n', '\r'])
}

/// Linha de texto que não corresponde ao schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedLine {
    #[error("Linha com {found} colunas (esperado {expected})")]
    ColumnCount { expected: usize, found: usize },

    #[error("Coluna '{0}' ausente do schema")]
    MissingColumn(&'static str),

    #[error("Coluna '{column}' inválida ('{token}'): {reason}")]
    InvalidField {
        column: &'static str,
        token: String,
        reason: String,
    },
}

// ──────────────────────────────────────────────
// Linha estruturada
// ──────────────────────────────────────────────

/// Valores de uma leitura alinhados com [`Schema::column_names`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Schema,
    values: Vec<FieldValue>,
}

impl Row {
    pub fn from_reading(schema: Schema, host_time: NaiveDateTime, reading: &SensorReading) -> Self {
        let mut values = Vec::with_capacity(schema.column_count());
        values.push(FieldValue::Time(host_time));
        values.extend(schema.fields().iter().map(|f| reading.get(f.field)));
        Self { schema, values }
    }

    pub(crate) fn from_values(schema: Schema, values: Vec<FieldValue>) -> Self {
        Self { schema, values }
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.schema
            .column_index(column)
            .and_then(|i| self.values.get(i))
    }

    pub fn host_time(&self) -> Option<NaiveDateTime> {
        self.values.first().and_then(FieldValue::as_time)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME_COLUMN).and_then(FieldValue::as_text)
    }

    pub fn primary_value(&self) -> Option<f32> {
        self.get("value").and_then(FieldValue::primary)
    }

    /// Mesma linha com outro `HostTime`.
    pub fn with_host_time(mut self, host_time: NaiveDateTime) -> Self {
        if let Some(first) = self.values.first_mut() {
            *first = FieldValue::Time(host_time);
        }
        self
    }

    pub(crate) fn into_values(self) -> Vec<FieldValue> {
        self.values
    }
}

/// Resultado de [`TextFormat::parse`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Valor da coluna `name`, chave de agregação
    pub name: String,
    pub row: Row,
}

// ──────────────────────────────────────────────
// Formato
// ──────────────────────────────────────────────

/// Render/parse de linhas de texto guiado pelo schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormat {
    schema: Schema,
}

impl TextFormat {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn header(&self) -> String {
        self.schema.header_line()
    }

    /// Renderiza uma leitura. Nunca falha: campos ausentes saem com o
    /// formatter genérico do valor zero.
    pub fn render(&self, reading: &SensorReading, host_time: NaiveDateTime) -> String {
        self.render_row(&Row::from_reading(self.schema, host_time, reading))
    }

    pub fn render_row(&self, row: &Row) -> String {
        let mut cols = Vec::with_capacity(self.schema.column_count());
        let mut values = row.values().iter();

        match values.next() {
            Some(FieldValue::Time(t)) => cols.push(format_host_time(t)),
            Some(other) => cols.push(other.to_string()),
            None => cols.push(String::new()),
        }
        for (desc, value) in self.schema.fields().iter().zip(values) {
            cols.push(desc.format_value(value));
        }

        cols.join(DELIMITER)
    }

    /// Interpreta uma linha de dados (não o cabeçalho).
    pub fn parse(&self, line: &str) -> Result<ParsedLine, MalformedLine> {
        let tokens: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let expected = self.schema.column_count();
        if tokens.len() != expected {
            return Err(MalformedLine::ColumnCount {
                expected,
                found: tokens.len(),
            });
        }

        let name_idx = self
            .schema
            .column_index(NAME_COLUMN)
            .ok_or(MalformedLine::MissingColumn(NAME_COLUMN))?;

        let host_time = parse_host_time(tokens[0]).map_err(|reason| MalformedLine::InvalidField {
            column: HOST_TIME,
            token: tokens[0].to_owned(),
            reason,
        })?;

        let mut values = Vec::with_capacity(expected);
        values.push(FieldValue::Time(host_time));
        for (desc, token) in self.schema.fields().iter().zip(&tokens[1..]) {
            let value = desc
                .parse_token(token)
                .map_err(|reason| MalformedLine::InvalidField {
                    column: desc.name,
                    token: (*token).to_owned(),
                    reason,
                })?;
            values.push(value);
        }

        Ok(ParsedLine {
            name: tokens[name_idx].to_owned(),
            row: Row {
                schema: self.schema,
                values,
            },
        })
    }
}

// ──────────────────────────────────────────────
// Saída em arquivo
// ──────────────────────────────────────────────

/// Destino de linhas CSV: cada linha é gravada e descarregada na hora.
pub struct CsvSink<W: Write> {
    writer: W,
    format: TextFormat,
}

impl CsvSink<File> {
    /// Abre `path` para acréscimo. O cabeçalho só é escrito em arquivo
    /// novo ou vazio.
    pub fn open_append(path: &Path, format: TextFormat) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let existing = file.metadata()?.len();
        let mut sink = Self::new(file, format);
        if existing == 0 {
            let header = sink.format.header();
            sink.append_line(&header)?;
            info!("Gravando CSV em {}", path.display());
        } else {
            warn!(
                "Anexando a arquivo existente {} ({existing} bytes)",
                path.display()
            );
        }
        Ok(sink)
    }
}

impl<W: Write> CsvSink<W> {
    /// Envolve um writer sem escrever cabeçalho.
    pub fn new(writer: W, format: TextFormat) -> Self {
        Self { writer, format }
    }

    pub fn with_header(writer: W, format: TextFormat) -> io::Result<Self> {
        let mut sink = Self::new(writer, format);
        let header = sink.format.header();
        sink.append_line(&header)?;
        Ok(sink)
    }

    pub fn append_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }

    pub fn append_row(&mut self, row: &Row) -> io::Result<()> {
        let line = self.format.render_row(row);
        self.append_line(&line)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send + 'static> CsvSink<W> {
    pub fn boxed(self) -> CsvSink<Box<dyn Write + Send>> {
        CsvSink {
            writer: Box::new(self.writer),
            format: self.format,
        }
    }
}

/// Atalho para o formato padrão.
pub fn render(reading: &SensorReading, host_time: NaiveDateTime) -> String {
    TextFormat::default().render(reading, host_time)
}

/// Atalho para o formato padrão.
pub fn parse(line: &str) -> Result<ParsedLine, MalformedLine> {
    TextFormat::default().parse(line)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorType;
    use chrono::NaiveDate;

    /// Reconstrói a leitura a partir das colunas do schema.
    fn to_reading(row: &Row) -> SensorReading {
        let mut reading = SensorReading::default();
        for (desc, value) in row.schema.fields().iter().zip(row.values.iter().skip(1)) {
            reading.set(desc.field, value.clone()).unwrap();
        }
        reading
    }

    fn t(h: u32, m: u32, s: u32, us: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(h, m, s, us)
            .unwrap()
    }

    fn reading(name: &str, index: u64, value: f32) -> SensorReading {
        SensorReading {
            name: name.into(),
            uid: 0x28AA,
            sensor_type: SensorType::Thermometer,
            index,
            value: vec![value],
            timestamp_us: 1_710_000_000_500_000 + index as i64,
        }
    }

    #[test]
    fn render_matches_column_layout() {
        let line = render(&reading("28-AA", 3, 21.5), t(14, 5, 6, 250));
        let cols: Vec<&str> = line.split(", ").collect();
        assert_eq!(cols.len(), 7);
        assert_eq!(cols[0], "2024-03-09 14:05:06.000250");
        assert_eq!(cols[1], "28-AA");
        assert_eq!(cols[2], "10410");
        assert_eq!(cols[3], "Thermometer");
        assert_eq!(cols[4], "3");
        assert_eq!(cols[5], " 21.500");
        assert!(line.contains(",  21.500, "));
    }

    #[test]
    fn negative_value_has_no_padding() {
        let line = render(&reading("28-AA", 1, -4.0625), t(0, 0, 0, 0));
        assert!(line.contains(", -4.062, ") || line.contains(", -4.063, "), "{line}");
    }

    #[test]
    fn parse_inverts_render() {
        let original = reading("28-AA", 9, 17.0625);
        let host = t(23, 59, 58, 999_999);
        let parsed = parse(&render(&original, host)).unwrap();

        assert_eq!(parsed.name, "28-AA");
        assert_eq!(parsed.row.host_time(), Some(host));
        let back = to_reading(&parsed.row);
        assert_eq!(back.name, original.name);
        assert_eq!(back.uid, original.uid);
        assert_eq!(back.sensor_type, original.sensor_type);
        assert_eq!(back.index, original.index);
        assert_eq!(back.timestamp_us, original.timestamp_us);
        assert!((back.value[0] - original.value[0]).abs() <= 0.0005);
    }

    #[test]
    fn partially_populated_reading_still_renders() {
        let r = SensorReading {
            name: "only-name".into(),
            ..Default::default()
        };
        let line = render(&r, t(1, 2, 3, 0));
        assert_eq!(line.split(", ").count(), 7);
        assert!(line.contains(", Unknown, 0, 0, "), "{line}");
        // A linha renderizada continua legível
        let parsed = parse(&line).unwrap();
        assert_eq!(parsed.name, "only-name");
        assert_eq!(parsed.row.primary_value(), Some(0.0));
    }

    #[test]
    fn rejects_wrong_token_count() {
        let err = parse("2024-03-09 14:05:06, 28-AA, 1, Thermometer, 1,  1.000").unwrap_err();
        assert_eq!(
            err,
            MalformedLine::ColumnCount {
                expected: 7,
                found: 6
            }
        );
        assert!(matches!(
            parse("a, b, c, d, e, f, g, h"),
            Err(MalformedLine::ColumnCount { found: 8, .. })
        ));
    }

    #[test]
    fn rejects_bad_field_token() {
        let line = "2024-03-09 14:05:06, 28-AA, xyz, Thermometer, 1,  1.000, 0";
        match parse(line) {
            Err(MalformedLine::InvalidField { column, token, .. }) => {
                assert_eq!(column, "uid");
                assert_eq!(token, "xyz");
            }
            other => panic!("esperado InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn names_that_would_not_survive_parse_are_invalid() {
        assert!(is_valid_name("28-AA"));
        assert!(is_valid_name("sala 2"));
        for bad in ["", " lab", "lab ", "a,b", "a\nb", "a\rb"] {
            assert!(!is_valid_name(bad), "{bad:?}");
        }
        // O motivo: o parser apara o token e a vírgula abre outra coluna
        let parsed = parse(&render(&reading(" lab", 1, 1.0), t(0, 0, 0, 0))).unwrap();
        assert_eq!(parsed.name, "lab");
        assert!(parse(&render(&reading("a,b", 1, 1.0), t(0, 0, 0, 0))).is_err());
    }

    #[test]
    fn row_lookup_by_column_name() {
        let row = Row::from_reading(Schema::sensor_data(), t(5, 0, 0, 0), &reading("s", 2, 1.0));
        assert_eq!(row.name(), Some("s"));
        assert_eq!(row.get("index"), Some(&FieldValue::UInt(2)));
        assert_eq!(row.get("nope"), None);
        let moved = row.clone().with_host_time(t(6, 0, 0, 0));
        assert_eq!(moved.host_time(), Some(t(6, 0, 0, 0)));
        assert_eq!(moved.get("index"), row.get("index"));
    }

    #[test]
    fn sink_writes_header_once_and_flushes_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let format = TextFormat::default();

        {
            let mut sink = CsvSink::open_append(&path, format).unwrap();
            sink.append_line(&render(&reading("a", 1, 1.0), t(1, 0, 0, 0))).unwrap();
        }
        {
            let mut sink = CsvSink::open_append(&path, format).unwrap();
            sink.append_line(&render(&reading("a", 2, 2.0), t(1, 0, 1, 0))).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], format.header());
        assert!(parse(lines[2]).is_ok());
    }

    #[test]
    fn in_memory_sink_with_header() {
        let mut sink = CsvSink::with_header(Vec::new(), TextFormat::default()).unwrap();
        let row = Row::from_reading(Schema::sensor_data(), t(2, 0, 0, 0), &reading("b", 1, 3.0));
        sink.append_row(&row).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("HostTime, name"));
        assert_eq!(text.lines().count(), 2);
    }
}
