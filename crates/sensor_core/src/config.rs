//! Configuração unificada via TOML.
//!
//! Um único `config.toml` com as seções `[sender]` e `[receiver]`.
//! Campos ausentes assumem o valor padrão.

use crate::text::is_valid_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Porta UDP padrão.
pub const DEFAULT_PORT: u16 = 28012;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuração do sender (logger de sensores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Envia datagramas UDP
    pub udp_enabled: bool,
    /// Destinos `ip:porta`; um datagrama por destino a cada amostra
    pub destinations: Vec<String>,
    /// IP local para bind (vazio = auto)
    pub bind_ip: String,
    /// Intervalo entre amostras em segundos
    pub interval_secs: f64,
    /// Duração total em segundos (≤ 0 = sem limite)
    pub duration_secs: f64,
    /// Número máximo de ciclos (0 = sem limite)
    pub max_ticks: u64,
    /// CSV local (vazio = stdout)
    pub output: String,
    /// IDs ou caminhos dos dispositivos (vazio = descoberta automática)
    pub devices: Vec<String>,
    /// Diretório dos dispositivos 1-Wire
    pub device_root: String,
    /// Prefixo usado na descoberta automática
    pub device_prefix: String,
    /// Gerador sintético no lugar do hardware
    pub synthetic: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            udp_enabled: false,
            destinations: vec![format!("255.255.255.255:{DEFAULT_PORT}")],
            bind_ip: String::new(),
            interval_secs: 1.0,
            duration_secs: 0.0,
            max_ticks: 0,
            output: String::new(),
            devices: Vec::new(),
            device_root: "/sys/bus/w1/devices".into(),
            device_prefix: "28-".into(),
            synthetic: false,
        }
    }
}

impl SenderConfig {
    /// Intervalo entre amostras; `None` se negativo, NaN ou grande demais.
    pub fn interval(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.interval_secs).ok()
    }

    /// Duração total; `None` = sem limite (≤ 0 ou infinita).
    pub fn duration(&self) -> Option<Duration> {
        if self.duration_secs > 0.0 && self.duration_secs.is_finite() {
            Duration::try_from_secs_f64(self.duration_secs).ok()
        } else {
            None
        }
    }
}

/// Configuração do receiver (cliente agregador).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// IP para bind (0.0.0.0 = qualquer)
    pub bind_ip: String,
    /// Porta UDP para escutar
    pub port: u16,
    /// CSV de saída (vazio = desligado)
    pub csv_output: String,
    /// Sensores aceitos (vazio = todos)
    pub sensors: Vec<String>,
    /// Arquivos gravados; se houver algum, o receiver roda em modo replay
    pub inputs: Vec<String>,
    /// Granularidade da verificação de parada no modo live (ms)
    pub poll_interval_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            csv_output: String::new(),
            sensors: Vec::new(),
            inputs: Vec::new(),
            poll_interval_ms: 500,
        }
    }
}

impl ReceiverConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }

    pub fn is_replay(&self) -> bool {
        !self.inputs.is_empty()
    }
}

/// Configuração raiz do aplicativo (unifica sender e receiver).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Lê e interpreta um arquivo TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Carrega configuração de um arquivo TOML, com fallback para o padrão.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::from_file(path) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("{e}"),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml (ao lado do executável).
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let s = &self.sender;
        if s.interval().is_none() {
            errors.push(format!("Intervalo do sender inválido: {}", s.interval_secs));
        }
        let oversized = s.duration_secs.is_finite() && s.duration_secs > 0.0 && s.duration().is_none();
        if s.duration_secs.is_nan() || oversized {
            errors.push(format!("Duração do sender inválida: {}", s.duration_secs));
        }
        for id in &s.devices {
            let name = Path::new(id)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !is_valid_name(&name) {
                errors.push(format!("Nome de dispositivo inválido: '{id}'"));
            }
        }
        if s.udp_enabled && s.destinations.is_empty() {
            errors.push("UDP habilitado sem destinos".into());
        }
        if s.device_prefix.is_empty() && s.devices.is_empty() && !s.synthetic {
            errors.push("Prefixo de dispositivo vazio".into());
        }

        let r = &self.receiver;
        if r.port == 0 && !r.is_replay() {
            errors.push("Porta do receiver não pode ser 0".into());
        }
        for name in &r.sensors {
            if !is_valid_name(name) {
                errors.push(format!("Nome de sensor inválido no filtro: '{name}'"));
            }
        }
        if r.poll_interval_ms == 0 {
            errors.push("poll_interval_ms deve ser > 0".into());
        }

        errors
    }
}
