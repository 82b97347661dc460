//! Bridge configuration types and TOML loading.
//!
//! [`BridgeConfig`] is the single source of truth for runtime settings.  It
//! can be read from a TOML file and is then adjusted by command-line flags in
//! `main.rs`.  Every field has a default, so a file only needs to name what it
//! changes:
//!
//! ```toml
//! log_level = "debug"
//!
//! [server]
//! port = 6638
//! allow_multi_client = false
//!
//! [serial]
//! device = "/dev/ttyUSB0"
//! baud_rate = 9600
//! parity = "even"
//! ```

use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `server.bind_address` is not an IP address.
    #[error("invalid bind address '{address}': {source}")]
    InvalidBindAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    /// No serial device was configured.
    #[error("no serial device configured (set serial.device or --device)")]
    MissingSerialDevice,

    /// A numeric setting is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// All runtime configuration for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Network listener and session policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// TCP port clients connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// When `false`, only one client may be connected at a time.
    #[serde(default = "default_true")]
    pub allow_multi_client: bool,
    /// Disconnect clients that send nothing for this many seconds; `0` disables.
    #[serde(default)]
    pub client_timeout_secs: u64,
    /// Period of the bridge loop in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Serial device and line settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    #[serde(default)]
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub flow_control: FlowControl,
    /// Upper bound for a single blocking serial write, in milliseconds.
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(format!("data_bits must be 5, 6, 7 or 8, got {other}")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(format!("stop_bits must be 1 or 2, got {other}")),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

impl fmt::Display for SerialConfig {
    /// Formats the line settings the usual way, e.g. `115200 8N1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            u8::from(self.data_bits),
            parity,
            u8::from(self.stop_bits)
        )
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    6638
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_true() -> bool {
    true
}
fn default_tick_interval_ms() -> u64 {
    10
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_serial_timeout_ms() -> u64 {
    100
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            serial: SerialConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            allow_multi_client: default_true(),
            client_timeout_secs: 0,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl BridgeConfig {
    /// Socket address the TCP listener binds to.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr =
            self.server
                .bind_address
                .parse()
                .map_err(|source| ConfigError::InvalidBindAddress {
                    address: self.server.bind_address.clone(),
                    source,
                })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.server.tick_interval_ms)
    }

    /// Client idle timeout, `None` when disabled.
    pub fn client_timeout(&self) -> Option<Duration> {
        match self.server.client_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Checks everything that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.serial.device.trim().is_empty() {
            return Err(ConfigError::MissingSerialDevice);
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "serial.baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.server.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.tick_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads a `BridgeConfig` from the TOML file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parses a `BridgeConfig` from TOML text.
pub fn parse_config(content: &str) -> Result<BridgeConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
