//! Configuration types for meshbook nodes.
//!
//! A node reads an optional TOML file, fills anything missing from
//! [`constants`], then applies `MESHBOOK_*` environment overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AssetPair, MeshbookError, Result, constants};

/// Configuration for a single meshbook node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory of the node's sled database.
    pub database_path: PathBuf,
    /// Overlay host configuration.
    pub p2p: P2pConfig,
    /// Logging setup.
    pub log: LogConfig,
    /// Asset pairs joined on every startup, on top of persisted channels.
    pub join: Vec<AssetPair>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(constants::DEFAULT_DATABASE_PATH),
            p2p: P2pConfig::default(),
            log: LogConfig::default(),
            join: Vec::new(),
        }
    }
}

/// Overlay host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pConfig {
    /// Explicit address to listen on. When set, NAT port mapping is not used.
    pub external_ip: Option<IpAddr>,
    /// TCP listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Ask the gateway for a port mapping (UPnP) and listen on all interfaces.
    pub enable_nat_port_map: bool,
    /// Enable the circuit relay client transport.
    pub enable_relay: bool,
    /// Reserve relay slots on seed peers so that unreachable nodes can be dialed.
    pub enable_auto_relay: bool,
    /// Seed peers as multiaddrs ending in `/p2p/<peer id>`.
    pub bootstrap_peers: Vec<String>,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            external_ip: None,
            port: constants::DEFAULT_P2P_PORT,
            enable_nat_port_map: true,
            enable_relay: true,
            enable_auto_relay: true,
            bootstrap_peers: constants::DEFAULT_BOOTSTRAP_PEERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl P2pConfig {
    /// Loopback-only host on an ephemeral port with no seeds, relay or NAT.
    #[must_use]
    pub fn local() -> Self {
        Self {
            external_ip: Some(IpAddr::from([127, 0, 0, 1])),
            port: 0,
            enable_nat_port_map: false,
            enable_relay: false,
            enable_auto_relay: false,
            bootstrap_peers: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = MeshbookError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            other => Err(MeshbookError::Configuration(format!(
                "unknown log format {other:?} (expected console or json)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `meshbook_p2p=debug,info`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: constants::DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Console,
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// `Configuration` if the document is not valid for this schema.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MeshbookError::Configuration(e.to_string()))
    }

    /// Load from `path` (defaults if `None`) and apply process environment
    /// overrides.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `Configuration` if it or an
    /// override is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MESHBOOK_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    /// `Configuration` when an override value does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MESHBOOK_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MESHBOOK_P2P_PORT") {
            self.p2p.port = parse_override("MESHBOOK_P2P_PORT", &v)?;
        }
        if let Some(v) = lookup("MESHBOOK_P2P_EXTERNAL_IP") {
            self.p2p.external_ip = if v.trim().is_empty() {
                None
            } else {
                Some(parse_override("MESHBOOK_P2P_EXTERNAL_IP", &v)?)
            };
        }
        if let Some(v) = lookup("MESHBOOK_P2P_ENABLE_NAT_PORT_MAP") {
            self.p2p.enable_nat_port_map = parse_override("MESHBOOK_P2P_ENABLE_NAT_PORT_MAP", &v)?;
        }
        if let Some(v) = lookup("MESHBOOK_P2P_ENABLE_RELAY") {
            self.p2p.enable_relay = parse_override("MESHBOOK_P2P_ENABLE_RELAY", &v)?;
        }
        if let Some(v) = lookup("MESHBOOK_P2P_ENABLE_AUTO_RELAY") {
            self.p2p.enable_auto_relay = parse_override("MESHBOOK_P2P_ENABLE_AUTO_RELAY", &v)?;
        }
        if let Some(v) = lookup("MESHBOOK_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("MESHBOOK_LOG_FORMAT") {
            self.log.format = v.parse()?;
        }
        Ok(())
    }
}

fn parse_override<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MeshbookError::Configuration(format!("{key}={value:?}: {e}")))
}
