//! Loop de amostragem: lê os dispositivos a cada ciclo, grava a linha CSV
//! e envia um datagrama por destino.

use crate::device::{DeviceReadError, DeviceReader, uid_from_id};
use sensor_core::schema::{host_now, now_micros};
use sensor_core::{
    CsvSink, MAX_DATAGRAM_SIZE, SensorReading, SensorType, StopSignal, TextFormat, encode_reading,
};
use std::io::Write;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum UdpSetupError {
    #[error("Falha ao criar socket UDP em {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Destino inválido '{dest}': {reason}")]
    Destination { dest: String, reason: String },

    #[error("Falha ao habilitar broadcast: {0}")]
    Broadcast(std::io::Error),
}

// ──────────────────────────────────────────────
// Dispositivo
// ──────────────────────────────────────────────

/// Um sensor físico (ou sintético) e a última leitura produzida por ele.
pub struct Device {
    reading: SensorReading,
    reader: Box<dyn DeviceReader>,
}

impl Device {
    pub fn new(id: &str, reader: Box<dyn DeviceReader>) -> Self {
        let uid = uid_from_id(id).unwrap_or_else(|| {
            debug!("ID '{id}' não é hexadecimal, uid = 0");
            0
        });
        Self {
            reading: SensorReading::new(id, uid, SensorType::Thermometer),
            reader,
        }
    }

    pub fn name(&self) -> &str {
        &self.reading.name
    }

    /// Lê o dispositivo e avança a leitura (índice, valor, timestamp).
    /// Em caso de erro a leitura anterior fica intacta.
    pub fn sample(&mut self) -> Result<&SensorReading, DeviceReadError> {
        let value = self.reader.read()?;
        self.reading.advance(value, now_micros());
        Ok(&self.reading)
    }
}

// ──────────────────────────────────────────────
// Destino UDP
// ──────────────────────────────────────────────

/// Socket de envio e a lista de destinos.
pub struct UdpTarget {
    socket: UdpSocket,
    destinations: Vec<SocketAddr>,
}

impl UdpTarget {
    /// Abre o socket em `bind_ip` (vazio = qualquer) e resolve os destinos.
    /// Broadcast é habilitado se algum destino for endereço de broadcast.
    pub fn open(bind_ip: &str, destinations: &[String]) -> Result<Self, UdpSetupError> {
        let mut resolved = Vec::with_capacity(destinations.len());
        for dest in destinations {
            let mut addrs = dest
                .to_socket_addrs()
                .map_err(|e| UdpSetupError::Destination {
                    dest: dest.clone(),
                    reason: e.to_string(),
                })?;
            let addr = addrs.next().ok_or_else(|| UdpSetupError::Destination {
                dest: dest.clone(),
                reason: "nenhum endereço".into(),
            })?;
            resolved.push(addr);
        }

        let bind_addr = if bind_ip.is_empty() {
            "0.0.0.0:0".to_string()
        } else {
            format!("{bind_ip}:0")
        };
        let socket = UdpSocket::bind(&bind_addr).map_err(|source| UdpSetupError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;

        if resolved.iter().any(is_broadcast) {
            socket.set_broadcast(true).map_err(UdpSetupError::Broadcast)?;
            info!("Modo BROADCAST ativado");
        }
        for addr in &resolved {
            info!("Destino UDP → {addr}");
        }

        Ok(Self {
            socket,
            destinations: resolved,
        })
    }
}

fn is_broadcast(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ip) => ip.is_broadcast() || ip.octets()[3] == 255,
        IpAddr::V6(_) => false,
    }
}

// ──────────────────────────────────────────────
// Sampler
// ──────────────────────────────────────────────

/// Contadores de uma execução.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleSummary {
    pub ticks: u64,
    pub samples: u64,
    pub read_errors: u64,
    pub datagrams_sent: u64,
    pub send_errors: u64,
}

pub struct Sampler {
    devices: Vec<Device>,
    interval: Duration,
    duration: Option<Duration>,
    max_ticks: Option<u64>,
    format: TextFormat,
    sink: Option<CsvSink<Box<dyn Write + Send>>>,
    udp: Option<UdpTarget>,
}

impl Sampler {
    pub fn new(devices: Vec<Device>, interval: Duration) -> Self {
        Self {
            devices,
            interval,
            duration: None,
            max_ticks: None,
            format: TextFormat::default(),
            sink: None,
            udp: None,
        }
    }

    /// Duração total; `None` ou zero = sem limite.
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration.filter(|d| !d.is_zero());
        self
    }

    /// Número máximo de ciclos; 0 = sem limite.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = (max_ticks > 0).then_some(max_ticks);
        self
    }

    /// Grava as linhas no sink em vez de imprimir no stdout.
    pub fn with_sink<W: Write + Send + 'static>(mut self, sink: CsvSink<W>) -> Self {
        self.sink = Some(sink.boxed());
        self
    }

    pub fn with_udp(mut self, udp: UdpTarget) -> Self {
        self.udp = Some(udp);
        self
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Executa até o limite de duração/ciclos ou até `stop`.
    pub fn run(&mut self, stop: &StopSignal) -> SampleSummary {
        let mut summary = SampleSummary::default();
        let started = Instant::now();

        while !stop.is_stopped() {
            let tick_start = Instant::now();
            self.tick(&mut summary);
            summary.ticks += 1;

            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            if self.duration.is_some_and(|d| started.elapsed() >= d) {
                break;
            }

            // Dormir pelo tempo restante do intervalo
            let wait = self.interval.saturating_sub(tick_start.elapsed());
            if wait.is_zero() {
                debug!("Ciclo excedeu o intervalo ({:?})", tick_start.elapsed());
            }
            if stop.wait(wait) {
                break;
            }
        }

        info!(
            "Amostragem encerrada: {} ciclos, {} amostras, {} erros de leitura, {} datagramas",
            summary.ticks, summary.samples, summary.read_errors, summary.datagrams_sent
        );
        summary
    }

    fn tick(&mut self, summary: &mut SampleSummary) {
        let Self {
            devices,
            format,
            sink,
            udp,
            ..
        } = self;

        for device in devices.iter_mut() {
            let reading = match device.sample() {
                Ok(reading) => reading,
                Err(e) => {
                    warn!("{e}");
                    summary.read_errors += 1;
                    continue;
                }
            };
            summary.samples += 1;

            let line = format.render(reading, host_now());
            match sink {
                Some(sink) => {
                    if let Err(e) = sink.append_line(&line) {
                        error!("Erro ao gravar CSV: {e}");
                    }
                }
                None => println!("{line}"),
            }

            if let Some(udp) = udp {
                send_reading(udp, reading, summary);
            }
        }
    }
}

fn send_reading(udp: &UdpTarget, reading: &SensorReading, summary: &mut SampleSummary) {
    let frame = encode_reading(reading);
    if frame.len() > MAX_DATAGRAM_SIZE {
        warn!(
            "Leitura de {} com {} bytes excede o datagrama máximo, não enviada",
            reading.name,
            frame.len()
        );
        return;
    }
    for dest in &udp.destinations {
        match udp.socket.send_to(&frame, dest) {
            Ok(sent) => {
                summary.datagrams_sent += 1;
                debug!("→ {sent} bytes para {dest} | {} #{}", reading.name, reading.index);
            }
            Err(e) => {
                summary.send_errors += 1;
                warn!("Erro ao enviar UDP para {dest}: {e}");
            }
        }
    }
}
