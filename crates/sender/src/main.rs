//! # Sensor Logger
//!
//! Lê termômetros DS18B20 (1-Wire) em intervalo fixo, grava as leituras em
//! CSV e opcionalmente as envia via UDP (broadcast ou unicast).
//!
//! ## Uso
//! ```bash
//! sensor-logger -i 5 -o temps.csv          # Só arquivo local
//! sensor-logger -u --dest 192.168.1.20:28012
//! sensor-logger --synthetic -u -t 60       # Sem hardware, 60 s
//! ```

mod device;
mod sampler;

use clap::Parser;
use device::{DeviceReader, SYNTHETIC_IDS, SyntheticReader, W1Reader};
use sampler::{Device, Sampler, UdpTarget};
use sensor_core::config::{AppConfig, SenderConfig};
use sensor_core::{CsvSink, TextFormat, stop_channel};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "sensor-logger", version, about = "Logger de termômetros 1-Wire")]
struct Args {
    /// Arquivo de configuração (padrão: config.toml ao lado do executável)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Duração total em segundos (≤ 0 = sem limite)
    #[arg(short = 't', long = "time")]
    time: Option<f64>,

    /// Intervalo entre amostras em segundos
    #[arg(short, long)]
    interval: Option<f64>,

    /// Arquivo CSV de saída (sem ele, as linhas vão para o stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Envia as leituras via UDP
    #[arg(short, long)]
    udp: bool,

    /// Destino UDP `ip:porta` (repetível)
    #[arg(long = "dest")]
    destinations: Vec<String>,

    /// IP local para o socket UDP
    #[arg(long)]
    bind_ip: Option<String>,

    /// ID ou caminho de dispositivo (repetível)
    #[arg(short, long = "device")]
    devices: Vec<String>,

    /// Diretório dos dispositivos 1-Wire
    #[arg(long)]
    device_root: Option<String>,

    /// Valores aleatórios no lugar do hardware
    #[arg(long, alias = "network-test")]
    synthetic: bool,

    /// Número máximo de ciclos (0 = sem limite)
    #[arg(long)]
    count: Option<u64>,
}

impl Args {
    /// Aplica as opções da linha de comando sobre o arquivo.
    fn apply(self, cfg: &mut SenderConfig) {
        if let Some(t) = self.time {
            cfg.duration_secs = t;
        }
        if let Some(i) = self.interval {
            cfg.interval_secs = i;
        }
        if let Some(o) = self.output {
            cfg.output = o;
        }
        if self.udp {
            cfg.udp_enabled = true;
        }
        if !self.destinations.is_empty() {
            cfg.destinations = self.destinations;
        }
        if let Some(ip) = self.bind_ip {
            cfg.bind_ip = ip;
        }
        if !self.devices.is_empty() {
            cfg.devices = self.devices;
        }
        if let Some(root) = self.device_root {
            cfg.device_root = root;
        }
        if self.synthetic {
            cfg.synthetic = true;
        }
        if let Some(n) = self.count {
            cfg.max_ticks = n;
        }
    }
}

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = Args::parse();

    // ── Carregar config ──
    let config_path = args.config.take().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    args.apply(&mut config.sender);
    let problems = config.validate();
    if !problems.is_empty() {
        for p in &problems {
            error!("Configuração inválida: {p}");
        }
        std::process::exit(2);
    }

    if let Err(e) = run(&config.sender) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cfg: &SenderConfig) -> Result<(), Box<dyn std::error::Error>> {
    let devices = open_devices(cfg)?;
    let interval = cfg
        .interval()
        .ok_or_else(|| format!("Intervalo inválido: {}", cfg.interval_secs))?;
    let duration = cfg.duration();

    let mut sampler = Sampler::new(devices, interval)
        .with_duration(duration)
        .with_max_ticks(cfg.max_ticks);

    if !cfg.output.is_empty() {
        let sink = CsvSink::open_append(Path::new(&cfg.output), TextFormat::default())
            .map_err(|e| format!("Falha ao abrir {}: {e}", cfg.output))?;
        info!("Gravando em {}", cfg.output);
        sampler = sampler.with_sink(sink);
    } else {
        // Sem arquivo, o cabeçalho abre a saída padrão
        println!("{}", TextFormat::default().header());
    }

    if cfg.udp_enabled {
        sampler = sampler.with_udp(UdpTarget::open(&cfg.bind_ip, &cfg.destinations)?);
    }

    // ── Ctrl+C ──
    let (handle, signal) = stop_channel();
    let handle = std::sync::Mutex::new(Some(handle));
    ctrlc::set_handler(move || {
        if let Ok(mut h) = handle.lock() {
            if let Some(h) = h.take() {
                info!("Interrompido, encerrando...");
                h.stop();
            }
        }
    })?;

    // ── Banner ──
    eprintln!();
    eprintln!("══════════════════════════════════════════════");
    eprintln!("   🌡  SENSOR LOGGER – ATIVO");
    eprintln!("══════════════════════════════════════════════");
    eprintln!("  Dispositivos: {}", sampler.devices().len());
    for d in sampler.devices() {
        eprintln!("    {}", d.name());
    }
    eprintln!("  Intervalo:    {:.1}s", cfg.interval_secs);
    if cfg.udp_enabled {
        eprintln!("  Destinos:     {}", cfg.destinations.join(", "));
    }
    eprintln!("══════════════════════════════════════════════");
    eprintln!();

    sampler.run(&signal);
    Ok(())
}

fn open_devices(cfg: &SenderConfig) -> Result<Vec<Device>, device::DiscoveryError> {
    if cfg.synthetic {
        let ids: Vec<String> = if cfg.devices.is_empty() {
            SYNTHETIC_IDS.iter().map(|s| s.to_string()).collect()
        } else {
            cfg.devices.clone()
        };
        info!("Modo sintético: {} dispositivos", ids.len());
        return Ok(ids
            .iter()
            .map(|id| {
                let reader: Box<dyn DeviceReader> = Box::new(SyntheticReader::new());
                Device::new(id, reader)
            })
            .collect());
    }

    let paths = device::discover(Path::new(&cfg.device_root), &cfg.device_prefix, &cfg.devices)?;
    Ok(paths
        .iter()
        .map(|p| {
            let reader: Box<dyn DeviceReader> = Box::new(W1Reader::new(p));
            Device::new(&device::device_id(p), reader)
        })
        .collect())
}
