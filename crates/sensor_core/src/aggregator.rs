//! Agregador: recebe leituras de vários senders e monta as séries.
//!
//! Dois modos, fixados na construção:
//!
//! - **live** — um datagrama UDP por leitura, decodificado pelo codec binário;
//! - **replay** — arquivos CSV gravados antes, lidos inteiros para a memória
//!   antes de qualquer processamento (a primeira linha de cada arquivo é o
//!   cabeçalho).
//!
//! Datagramas ou linhas inválidos são descartados com um aviso; o restante
//! do fluxo segue normalmente.

use crate::protocol::{MAX_DATAGRAM_SIZE, MalformedRecord, decode_reading};
use crate::schema::{Schema, host_now};
use crate::series::{AggregateBounds, RowWidth, SeriesStore};
use crate::stop::StopSignal;
use crate::text::{CsvSink, MalformedLine, Row, TextFormat};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Intervalo padrão entre verificações do sinal de parada no modo live.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Falha ao processar um datagrama ou uma linha.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Registro inválido: {0}")]
    Record(#[from] MalformedRecord),

    #[error("Linha inválida: {0}")]
    Line(#[from] MalformedLine),

    #[error(transparent)]
    Width(#[from] RowWidth),
}

/// Falha de inicialização ou de E/S do agregador.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("Falha ao escutar em {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("Falha ao ler {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Erro de socket: {0}")]
    Socket(#[source] io::Error),
}

/// O que aconteceu com uma unidade recebida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Appended,
    Filtered,
}

/// Contadores de uma execução.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Datagramas ou linhas lidos
    pub received: u64,
    pub appended: u64,
    pub filtered: u64,
    pub malformed: u64,
}

// ──────────────────────────────────────────────
// Filtro
// ──────────────────────────────────────────────

/// Lista de sensores permitidos. Vazia = todos.
#[derive(Debug, Clone, Default)]
pub struct SensorFilter {
    allowed: Option<HashSet<String>>,
}

impl SensorFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Lista vazia equivale a [`SensorFilter::all`].
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: HashSet<String> = names.into_iter().map(Into::into).collect();
        Self {
            allowed: (!allowed.is_empty()).then_some(allowed),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        self.allowed.as_ref().is_none_or(|set| set.contains(name))
    }
}

// ──────────────────────────────────────────────
// Estado
// ──────────────────────────────────────────────

/// Origem dos dados.
enum Mode {
    Live(UdpSocket),
    Replay(Vec<PathBuf>),
}

struct Pipeline {
    format: TextFormat,
    filter: SensorFilter,
    store: SeriesStore,
    bounds: AggregateBounds,
    sink: Option<CsvSink<Box<dyn Write + Send>>>,
    echo: bool,
    stats: RunStats,
}

impl Pipeline {
    fn ingest_datagram(
        &mut self,
        data: &[u8],
        host_time: NaiveDateTime,
    ) -> Result<Ingest, IngestError> {
        self.stats.received += 1;
        let schema = self.format.schema();
        let result = match decode_reading(data) {
            Ok(reading) => {
                let row = Row::from_reading(schema, host_time, &reading);
                self.accept(&reading.name, row)
            }
            Err(e) => Err(e.into()),
        };
        self.count(result)
    }

    fn ingest_line(&mut self, line: &str) -> Result<Ingest, IngestError> {
        self.stats.received += 1;
        let result = match self.format.parse(line) {
            Ok(parsed) => self.accept(&parsed.name, parsed.row),
            Err(e) => Err(e.into()),
        };
        self.count(result)
    }

    fn count(&mut self, result: Result<Ingest, IngestError>) -> Result<Ingest, IngestError> {
        match &result {
            Ok(Ingest::Appended) => self.stats.appended += 1,
            Ok(Ingest::Filtered) => self.stats.filtered += 1,
            Err(_) => self.stats.malformed += 1,
        }
        result
    }

    fn accept(&mut self, name: &str, row: Row) -> Result<Ingest, IngestError> {
        if !self.filter.allows(name) {
            debug!("Sensor '{name}' fora do filtro");
            return Ok(Ingest::Filtered);
        }

        let value = row.primary_value();
        let host_time = row.host_time();
        let line = (self.echo || self.sink.is_some()).then(|| self.format.render_row(&row));

        self.store.append(name, row)?;
        if let Some(t) = host_time {
            self.bounds.observe(value, t);
        }

        if let Some(line) = line {
            if self.echo {
                info!("{line}");
            }
            if let Some(sink) = &mut self.sink {
                if let Err(e) = sink.append_line(&line) {
                    warn!("Falha ao gravar CSV: {e}");
                }
            }
        }

        Ok(Ingest::Appended)
    }
}

// ──────────────────────────────────────────────
// Agregador
// ──────────────────────────────────────────────

/// Agregador de leituras.
pub struct Aggregator {
    mode: Mode,
    poll_interval: Duration,
    pipeline: Pipeline,
}

impl Aggregator {
    fn with_mode(mode: Mode) -> Self {
        let schema = Schema::sensor_data();
        Self {
            mode,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pipeline: Pipeline {
                format: TextFormat::new(schema),
                filter: SensorFilter::all(),
                store: SeriesStore::new(schema),
                bounds: AggregateBounds::default(),
                sink: None,
                echo: false,
                stats: RunStats::default(),
            },
        }
    }

    /// Modo live sobre um socket já aberto.
    pub fn live(socket: UdpSocket) -> Self {
        Self::with_mode(Mode::Live(socket))
    }

    /// Abre o socket UDP e cria o agregador live.
    pub fn bind<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<Self, AggregatorError> {
        let label = addr.to_string();
        let socket = UdpSocket::bind(addr).map_err(|source| AggregatorError::Bind {
            addr: label.clone(),
            source,
        })?;
        info!("Receiver escutando em {label}");
        Ok(Self::live(socket))
    }

    /// Modo replay sobre arquivos CSV.
    pub fn replay<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::with_mode(Mode::Replay(paths.into_iter().map(Into::into).collect()))
    }

    pub fn with_filter(mut self, filter: SensorFilter) -> Self {
        self.pipeline.filter = filter;
        self
    }

    /// Regrava cada leitura aceita como linha CSV.
    pub fn with_sink<W: Write + Send + 'static>(mut self, sink: CsvSink<W>) -> Self {
        self.pipeline.sink = Some(sink.boxed());
        self
    }

    /// Registra cada leitura aceita no log (`info`).
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.pipeline.echo = echo;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.mode {
            Mode::Live(socket) => socket.local_addr().ok(),
            Mode::Replay(_) => None,
        }
    }

    pub fn store(&self) -> &SeriesStore {
        &self.pipeline.store
    }

    pub fn bounds(&self) -> &AggregateBounds {
        &self.pipeline.bounds
    }

    pub fn stats(&self) -> RunStats {
        self.pipeline.stats
    }

    /// Entrega os dados acumulados.
    pub fn into_parts(self) -> (SeriesStore, AggregateBounds) {
        (self.pipeline.store, self.pipeline.bounds)
    }

    /// Processa um datagrama recebido em `host_time`.
    pub fn ingest_datagram(
        &mut self,
        data: &[u8],
        host_time: NaiveDateTime,
    ) -> Result<Ingest, IngestError> {
        self.pipeline.ingest_datagram(data, host_time)
    }

    /// Processa uma linha CSV (sem o cabeçalho).
    pub fn ingest_line(&mut self, line: &str) -> Result<Ingest, IngestError> {
        self.pipeline.ingest_line(line)
    }

    /// Executa até o fim da entrada (replay) ou até `stop` (live).
    pub fn run(&mut self, stop: &StopSignal) -> Result<RunStats, AggregatorError> {
        match &self.mode {
            Mode::Live(socket) => run_live(socket, self.poll_interval, &mut self.pipeline, stop)?,
            Mode::Replay(paths) => run_replay(paths, &mut self.pipeline, stop)?,
        }
        let stats = self.pipeline.stats;
        info!(
            "Agregação encerrada: {} recebidos, {} aceitos, {} filtrados, {} inválidos",
            stats.received, stats.appended, stats.filtered, stats.malformed
        );
        Ok(stats)
    }
}

fn run_live(
    socket: &UdpSocket,
    poll_interval: Duration,
    pipeline: &mut Pipeline,
    stop: &StopSignal,
) -> Result<(), AggregatorError> {
    socket
        .set_read_timeout(Some(poll_interval))
        .map_err(AggregatorError::Socket)?;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    while !stop.is_stopped() {
        match socket.recv_from(&mut buf) {
            Ok((size, addr)) => {
                if let Err(e) = pipeline.ingest_datagram(&buf[..size], host_now()) {
                    warn!("Datagrama de {addr} descartado ({size} bytes): {e}");
                }
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                // Timeout normal, verifica o sinal de parada
            }
            Err(e) => {
                warn!("Erro ao receber UDP: {e}");
            }
        }
    }

    Ok(())
}

fn run_replay(
    paths: &[PathBuf],
    pipeline: &mut Pipeline,
    stop: &StopSignal,
) -> Result<(), AggregatorError> {
    // Tudo em memória antes de processar
    let mut contents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(|source| AggregatorError::Open {
            path: path.clone(),
            source,
        })?;
        info!("Lido {} ({} bytes)", path.display(), text.len());
        contents.push((path, text));
    }

    for (path, text) in &contents {
        for (lineno, line) in text.lines().enumerate().skip(1) {
            if stop.is_stopped() {
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }
            if let Err(e) = pipeline.ingest_line(line) {
                warn!("{}:{}: linha ignorada: {e}", path.display(), lineno + 1);
            }
        }
    }

    Ok(())
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_reading;
    use crate::schema::FieldValue;
    use crate::stop::stop_channel;
    use crate::text::render;
    use crate::types::{SensorReading, SensorType};
    use chrono::NaiveDate;
    use std::io::Write as _;

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, s)
            .unwrap()
    }

    fn reading(name: &str, index: u64, value: f32) -> SensorReading {
        SensorReading {
            name: name.into(),
            uid: 1,
            sensor_type: SensorType::Thermometer,
            index,
            value: vec![value],
            timestamp_us: 1_714_550_400_000_000 + index as i64 * 1_000_000,
        }
    }

    fn offline() -> Aggregator {
        Aggregator::replay(Vec::<PathBuf>::new())
    }

    fn assert_aligned(agg: &Aggregator) {
        for (_, series) in agg.store().iter() {
            assert!(series.columns().all(|(_, c)| c.len() == series.len()));
        }
    }

    #[test]
    fn datagrams_build_series_and_bounds() {
        let mut agg = offline();
        for (i, v) in [10.0, 12.0, 11.0, 9.0, 13.0].into_iter().enumerate() {
            let data = encode_reading(&reading("28-AA", i as u64 + 1, v));
            assert_eq!(agg.ingest_datagram(&data, at(i as u32)).unwrap(), Ingest::Appended);
        }
        let series = agg.store().get("28-AA").unwrap();
        assert_eq!(series.values(), vec![10.0, 12.0, 11.0, 9.0, 13.0]);
        assert_eq!(agg.bounds().value_range(), Some((9.0, 13.0)));
        assert_eq!(agg.bounds().time_range(), Some((at(0), at(4))));
        assert_aligned(&agg);
    }

    #[test]
    fn malformed_datagram_is_skipped() {
        let mut agg = offline();
        agg.ingest_datagram(&encode_reading(&reading("a", 1, 1.0)), at(0))
            .unwrap();
        let before = agg.store().get("a").unwrap().clone();

        let mut broken = encode_reading(&reading("a", 2, 2.0));
        broken.truncate(broken.len() - 1);
        assert!(matches!(
            agg.ingest_datagram(&broken, at(1)),
            Err(IngestError::Record(_))
        ));

        assert_eq!(agg.store().get("a").unwrap(), &before);
        assert_eq!(agg.stats().malformed, 1);
        assert_eq!(agg.stats().appended, 1);
    }

    #[test]
    fn malformed_line_does_not_corrupt_series() {
        let mut agg = offline();
        agg.ingest_line(&render(&reading("a", 1, 1.0), at(0))).unwrap();
        agg.ingest_line(&render(&reading("a", 2, 2.0), at(1))).unwrap();

        let err = agg.ingest_line("2024-05-01 08:00:02, a, 1, Thermometer, 3").unwrap_err();
        assert!(matches!(
            err,
            IngestError::Line(MalformedLine::ColumnCount { found: 5, .. })
        ));

        let series = agg.store().get("a").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.values(), vec![1.0, 2.0]);
        assert_eq!(agg.bounds().value_range(), Some((1.0, 2.0)));
        assert_aligned(&agg);
    }

    #[test]
    fn filter_drops_other_sensors_without_touching_bounds() {
        let mut agg = offline().with_filter(SensorFilter::only(["sensorA"]));
        agg.ingest_line(&render(&reading("sensorB", 1, -40.0), at(0))).unwrap();
        agg.ingest_line(&render(&reading("sensorA", 1, 20.0), at(1))).unwrap();
        assert_eq!(
            agg.ingest_line(&render(&reading("sensorB", 2, 99.0), at(2))).unwrap(),
            Ingest::Filtered
        );

        assert_eq!(agg.store().names().collect::<Vec<_>>(), vec!["sensorA"]);
        assert_eq!(agg.bounds().value_range(), Some((20.0, 20.0)));
        assert_eq!(agg.bounds().time_range(), Some((at(1), at(1))));
        assert_eq!(agg.stats().filtered, 2);
    }

    #[test]
    fn empty_filter_allows_everything() {
        let filter = SensorFilter::only(Vec::<String>::new());
        assert!(filter.allows("anything"));
        assert!(SensorFilter::all().allows(""));
        assert!(!SensorFilter::only(["a"]).allows("b"));
    }

    #[test]
    fn replay_skips_header_and_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "{}", TextFormat::default().header()).unwrap();
            writeln!(f, "{}", render(&reading("a", 1, 1.5), at(0))).unwrap();
            writeln!(f, "lixo").unwrap();
            writeln!(f).unwrap();
            writeln!(f, "{}", render(&reading("b", 1, -3.0), at(1))).unwrap();
            writeln!(f, "{}", render(&reading("a", 2, 2.5), at(2))).unwrap();
        }

        let mut agg = Aggregator::replay([&path]);
        let stats = agg.run(&StopSignal::never()).unwrap();

        assert_eq!(stats.appended, 3);
        assert_eq!(stats.malformed, 1);
        assert_eq!(agg.store().get("a").unwrap().values(), vec![1.5, 2.5]);
        assert_eq!(agg.store().get("b").unwrap().host_times(), vec![at(1)]);
        assert_eq!(agg.bounds().value_range(), Some((-3.0, 2.5)));
    }

    #[test]
    fn replay_missing_file_is_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut agg = Aggregator::replay([dir.path().join("missing.csv")]);
        assert!(matches!(
            agg.run(&StopSignal::never()),
            Err(AggregatorError::Open { .. })
        ));
        assert!(agg.store().is_empty());
    }

    #[test]
    fn sink_receives_every_appended_row() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let sink = CsvSink::open_append(&out, TextFormat::default()).unwrap();
        let mut agg = offline().with_sink(sink);

        agg.ingest_datagram(&encode_reading(&reading("a", 1, 4.0)), at(3))
            .unwrap();
        agg.ingest_datagram(b"\x08\x01", at(4)).unwrap_err();
        drop(agg);

        let text = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed = crate::text::parse(lines[1]).unwrap();
        assert_eq!(parsed.row.host_time(), Some(at(3)));
        assert_eq!(parsed.row.get("index"), Some(&FieldValue::UInt(1)));
    }

    #[test]
    fn live_mode_stops_on_signal() {
        let agg = Aggregator::bind("127.0.0.1:0").unwrap();
        let addr = agg.local_addr().unwrap();
        let mut agg = agg.with_poll_interval(Duration::from_millis(20));

        let (handle, signal) = stop_channel();
        let sender = std::thread::spawn(move || {
            let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
            for (i, v) in [1.0f32, 2.0, 3.0].into_iter().enumerate() {
                sock.send_to(&encode_reading(&reading("live", i as u64 + 1, v)), addr)
                    .unwrap();
            }
            sock.send_to(b"\xff\xff", addr).unwrap();
            std::thread::sleep(Duration::from_millis(300));
            handle.stop();
        });

        let stats = agg.run(&signal).unwrap();
        sender.join().unwrap();

        assert_eq!(stats.received, 4);
        assert_eq!(stats.malformed, 1);
        assert_eq!(agg.store().get("live").unwrap().values(), vec![1.0, 2.0, 3.0]);
    }
}
