use clap::Parser;
use serde::*;
use std::{fs::read_to_string, net::SocketAddr, path::PathBuf};

#[derive(Deserialize, Debug)]
pub struct Http {
    /// HTTP transport bind address.
    ///
    /// The core only speaks GET; this transport is meant for local-network
    /// access from the CLI client.
    #[serde(default = "Http::listen")]
    pub listen: SocketAddr,
}

impl Http {
    fn listen() -> SocketAddr {
        "127.0.0.1:9500".parse().unwrap()
    }
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct P2p {
    /// Directory holding the persistent node identity and endpoint state.
    #[serde(default = "P2p::storage_path")]
    pub storage_path: PathBuf,

    /// Wipe the storage directory and mint a new identity on next start.
    #[serde(default)]
    pub force_new_identity: bool,
}

impl P2p {
    fn storage_path() -> PathBuf {
        PathBuf::from("xplorer-data")
    }
}

impl Default for P2p {
    fn default() -> Self {
        Self {
            storage_path: Self::storage_path(),
            force_new_identity: false,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub p2p: P2p,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    /// specify the configuration file path.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    /// Load command line parameters, if the configuration file path is
    /// specified, the configuration is read from the configuration file,
    /// otherwise the default configuration is used. A specified path that
    /// can't be read or doesn't parse is a hard error, not a fallback.
    pub fn load() -> anyhow::Result<Self> {
        Ok(match Cli::parse().config {
            Some(path) => serde_json5::from_str(&read_to_string(path)?)?,
            None => Self::default(),
        })
    }
}
