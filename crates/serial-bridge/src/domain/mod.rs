//! Domain layer for serial-bridge.

pub mod config;

pub use config::{
    load_config, BridgeConfig, ConfigError, DataBits, FlowControl, Parity, SerialConfig,
    ServerConfig, StopBits,
};
