//! Dispositivos 1-Wire (DS18B20) e fontes de leitura.
//!
//! Cada dispositivo é um diretório em `/sys/bus/w1/devices/28-xxxxxxxxxxxx`
//! com um arquivo `w1_slave` de duas linhas:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! A temperatura é `t` em milésimos de grau.

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// IDs usados no modo sintético quando nenhum dispositivo é informado.
pub const SYNTHETIC_IDS: [&str; 2] = ["28-123456789ABCDE", "28-123456789ABCDF"];

#[derive(Debug, thiserror::Error)]
pub enum DeviceReadError {
    #[error("Falha ao ler {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Formato inesperado em {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("CRC inválido em {}", path.display())]
    CrcFailed { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Falha ao listar {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Nenhum dispositivo '{prefix}*' em {}", root.display())]
    NoDevices { root: PathBuf, prefix: String },

    #[error("Dispositivo não encontrado: {}", path.display())]
    Missing { path: PathBuf },
}

/// Fonte de uma leitura escalar por ciclo.
pub trait DeviceReader: Send {
    fn read(&mut self) -> Result<f32, DeviceReadError>;
}

// ──────────────────────────────────────────────
// Hardware
// ──────────────────────────────────────────────

/// Leitor de um termômetro DS18B20 via sysfs.
pub struct W1Reader {
    slave: PathBuf,
}

impl W1Reader {
    pub fn new(device_dir: &Path) -> Self {
        Self {
            slave: device_dir.join("w1_slave"),
        }
    }
}

impl DeviceReader for W1Reader {
    fn read(&mut self) -> Result<f32, DeviceReadError> {
        let text = std::fs::read_to_string(&self.slave).map_err(|source| DeviceReadError::Io {
            path: self.slave.clone(),
            source,
        })?;
        parse_w1_slave(&text, &self.slave)
    }
}

/// Interpreta o conteúdo de `w1_slave`.
pub fn parse_w1_slave(text: &str, path: &Path) -> Result<f32, DeviceReadError> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() != 2 {
        return Err(DeviceReadError::Format {
            path: path.to_path_buf(),
            reason: format!("{} linhas (esperado 2)", lines.len()),
        });
    }
    if !lines[0].trim_end().ends_with("YES") {
        return Err(DeviceReadError::CrcFailed {
            path: path.to_path_buf(),
        });
    }

    let raw = lines[1]
        .split_once("t=")
        .map(|(_, t)| t.trim())
        .ok_or_else(|| DeviceReadError::Format {
            path: path.to_path_buf(),
            reason: "campo 't=' ausente".into(),
        })?;
    let milli: i32 = raw.parse().map_err(|e| DeviceReadError::Format {
        path: path.to_path_buf(),
        reason: format!("t='{raw}': {e}"),
    })?;

    Ok(milli as f32 / 1000.0)
}

// ──────────────────────────────────────────────
// Sintético
// ──────────────────────────────────────────────

/// Valores inteiros aleatórios em `0..=50`, sem tocar no hardware.
pub struct SyntheticReader {
    rng: StdRng,
}

impl SyntheticReader {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SyntheticReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceReader for SyntheticReader {
    fn read(&mut self) -> Result<f32, DeviceReadError> {
        Ok(self.rng.gen_range(0..=50) as f32)
    }
}

// ──────────────────────────────────────────────
// Descoberta
// ──────────────────────────────────────────────

/// Resolve os diretórios dos dispositivos.
///
/// IDs relativos são procurados em `root`; caminhos absolutos são usados
/// como estão. Sem IDs, lista todas as entradas de `root` com `prefix`.
pub fn discover(root: &Path, prefix: &str, requested: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut devices: Vec<PathBuf> = if requested.is_empty() {
        let entries = std::fs::read_dir(root).map_err(|source| DiscoveryError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        entries
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
            .map(|e| e.path())
            .collect()
    } else {
        requested.iter().map(|id| root.join(id)).collect()
    };
    devices.sort();

    if devices.is_empty() {
        return Err(DiscoveryError::NoDevices {
            root: root.to_path_buf(),
            prefix: prefix.to_owned(),
        });
    }
    if let Some(missing) = devices.iter().find(|d| !d.is_dir()) {
        return Err(DiscoveryError::Missing {
            path: missing.clone(),
        });
    }

    info!("{} dispositivos encontrados", devices.len());
    for d in &devices {
        debug!("  {}", d.display());
    }
    Ok(devices)
}

/// ID do dispositivo a partir do caminho (`28-0316a2797a4f`).
pub fn device_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// UID numérico: o ID sem `-`, lido em hexadecimal.
pub fn uid_from_id(id: &str) -> Option<u64> {
    let hex: String = id.chars().filter(|c| *c != '-').collect();
    u64::from_str_radix(&hex, 16).ok()
}
