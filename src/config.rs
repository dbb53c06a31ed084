//! Stack configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty document (or no
//! file at all) gives a working setup.

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

use crate::responder::Protocol;

const CONFIG_ENV: &str = "SWITCHBOARD_CONFIG";
const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub responders: ResponderCounts,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub ftp: FtpConfig,
    pub telnet: TelnetConfig,
    pub buffers: BufferConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen URLs; the scheme picks the protocol.
    pub listen: Vec<String>,
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: vec![
                "http://127.0.0.1:8080".to_string(),
                "ftp://127.0.0.1:2121".to_string(),
                "telnet://127.0.0.1:2323".to_string(),
            ],
            poll_interval_ms: 2,
        }
    }
}

/// How many responders of each kind to allocate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponderCounts {
    pub http: usize,
    pub ftp: usize,
    pub telnet: usize,
}

impl Default for ResponderCounts {
    fn default() -> Self {
        Self {
            http: 4,
            ftp: 1,
            telnet: 1,
        }
    }
}

impl ResponderCounts {
    pub fn total(&self) -> usize {
        self.http + self.ftp + self.telnet
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./sd"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub session_timeout_ms: u64,
    pub max_head_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: 8_000,
            max_head_bytes: 2048,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    /// Empty disables the password check.
    pub password: String,
    pub idle_timeout_ms: u64,
    pub data_port_timeout_ms: u64,
    pub data_port_base: u16,
    pub data_port_span: u16,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            idle_timeout_ms: 60_000,
            data_port_timeout_ms: 10_000,
            data_port_base: 50_000,
            data_port_span: 16,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelnetConfig {
    /// Empty means no login prompt.
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Staging buffer size for file sends.
    pub file_chunk: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { file_chunk: 1024 }
    }
}

/// A parsed listen URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSpec {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl ListenSpec {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let url = url::Url::parse(s).with_context(|| format!("Invalid listen URL: {}", s))?;
        let protocol = Protocol::from_scheme(url.scheme())
            .with_context(|| format!("Unsupported listen scheme: {}", url.scheme()))?;
        let host = url
            .host_str()
            .context("Listen URL missing host")?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or(match protocol {
            Protocol::Http => 80,
            Protocol::Ftp => 21,
            Protocol::Telnet => 23,
        });
        Ok(Self {
            protocol,
            host,
            port,
        })
    }

    pub fn addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

impl Config {
    /// Reads the file named by `SWITCHBOARD_CONFIG` if set, then applies
    /// the `LISTEN` override for the HTTP listener.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            cfg.override_listen(Protocol::Http, &listen);
        }

        Ok(cfg)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("Invalid config")
    }

    /// Replaces the listener for `protocol` with `addr` (`host:port`).
    pub fn override_listen(&mut self, protocol: Protocol, addr: &str) {
        let url = format!("{}://{}", protocol.name(), addr);
        self.server
            .listen
            .retain(|l| ListenSpec::parse(l).map(|s| s.protocol != protocol).unwrap_or(true));
        self.server.listen.push(url);
    }

    pub fn listeners(&self) -> anyhow::Result<Vec<ListenSpec>> {
        self.server.listen.iter().map(|l| ListenSpec::parse(l)).collect()
    }
}
