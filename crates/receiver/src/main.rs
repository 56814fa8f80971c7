//! # Sensor Client
//!
//! Recebe leituras dos loggers via UDP (modo live) ou relê arquivos CSV
//! gravados (modo replay), agrupa por sensor e imprime um resumo ao final.
//!
//! ## Uso
//! ```bash
//! sensor-client                              # Live em 0.0.0.0:28012
//! sensor-client --csv merged.csv             # Live, gravando CSV
//! sensor-client -i a.csv -i b.csv --sensors 28-0316A2797A4F --by-date
//! ```

mod report;

use chrono::Local;
use clap::Parser;
use sensor_core::config::{AppConfig, ReceiverConfig};
use sensor_core::{Aggregator, CsvSink, SensorFilter, TextFormat, stop_channel};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "sensor-client", version, about = "Cliente agregador de leituras de sensores")]
struct Args {
    /// Arquivo de configuração (padrão: config.toml ao lado do executável)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Arquivo CSV gravado (repetível); seleciona o modo replay
    #[arg(short, long = "input")]
    inputs: Vec<String>,

    /// Grava cada leitura aceita neste CSV
    #[arg(long)]
    csv: Option<String>,

    /// IP para escutar UDP
    #[arg(long)]
    udp_ip: Option<String>,

    /// Porta UDP
    #[arg(long)]
    udp_port: Option<u16>,

    /// Aceita só estes sensores (repetível)
    #[arg(long)]
    sensors: Vec<String>,

    /// Resumo com cada dia em uma série separada
    #[arg(long)]
    by_date: bool,
}

impl Args {
    /// Aplica as opções da linha de comando sobre o arquivo.
    fn apply(&mut self, cfg: &mut ReceiverConfig) {
        if !self.inputs.is_empty() {
            cfg.inputs = std::mem::take(&mut self.inputs);
        }
        if let Some(csv) = self.csv.take() {
            cfg.csv_output = csv;
        }
        if let Some(ip) = self.udp_ip.take() {
            cfg.bind_ip = ip;
        }
        if let Some(port) = self.udp_port {
            cfg.port = port;
        }
        if !self.sensors.is_empty() {
            cfg.sensors = std::mem::take(&mut self.sensors);
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
        .init();

    let mut args = Args::parse();

    // ── Config ──
    let config_path = args.config.take().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    args.apply(&mut config.receiver);
    let problems = config.validate();
    if !problems.is_empty() {
        for p in &problems {
            error!("Configuração inválida: {p}");
        }
        std::process::exit(2);
    }

    if let Err(e) = run(&config.receiver, args.by_date) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cfg: &ReceiverConfig, by_date: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut agg = if cfg.is_replay() {
        info!("Modo replay: {} arquivo(s)", cfg.inputs.len());
        Aggregator::replay(&cfg.inputs)
    } else {
        Aggregator::bind(cfg.bind_addr())?
            .with_echo(true)
            .with_poll_interval(Duration::from_millis(cfg.poll_interval_ms))
    };

    agg = agg.with_filter(SensorFilter::only(&cfg.sensors));
    if !cfg.sensors.is_empty() {
        info!("Filtro de sensores: {}", cfg.sensors.join(", "));
    }

    if !cfg.csv_output.is_empty() {
        let sink = CsvSink::open_append(Path::new(&cfg.csv_output), TextFormat::default())
            .map_err(|e| format!("Falha ao abrir {}: {e}", cfg.csv_output))?;
        info!("Gravando em {}", cfg.csv_output);
        agg = agg.with_sink(sink);
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

    agg.run(&signal)?;
    let (store, bounds) = agg.into_parts();

    let store = if by_date {
        report::by_date(&store, Local::now().date_naive())
    } else {
        store
    };

    println!();
    print!("{}", report::summary(&store, &bounds));
    Ok(())
}
