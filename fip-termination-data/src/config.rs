//! Configuration for the collector.
//!
//! Node connection parameters come from an env-style file (`KEY=VALUE`
//! lines, default `mainnet.env`) and the process environment, with the
//! environment taking precedence. Per-command flags live in
//! [`CollectOptions`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    error::{FipDataError, Result},
    types::{ChainEpoch, MinerId},
};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "mainnet.env";

/// Per-call deadline for node requests.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(600);

/// Environment key for the node RPC address.
pub const LOTUS_ADDR_KEY: &str = "LOTUS_ADDR";

/// Environment key for the node API token.
pub const LOTUS_TOKEN_KEY: &str = "LOTUS_TOKEN";

/// Connection parameters for the chain node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Node RPC address as configured (URL or multiaddr)
    pub lotus_addr: String,

    /// API token sent as a bearer credential
    pub lotus_token: String,

    /// Deadline applied to every node call
    pub rpc_timeout: Duration,
}

impl NodeConfig {
    /// Load from an env-style file, overridden by the process environment.
    pub fn load(path: &Path, rpc_timeout: Duration) -> Result<Self> {
        let file_vars = read_env_file(path)?;
        Self::from_sources(&file_vars, |key| std::env::var(key).ok(), rpc_timeout)
    }

    /// Merge file values with environment lookups and validate.
    pub fn from_sources<F>(
        file_vars: &HashMap<String, String>,
        env: F,
        rpc_timeout: Duration,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file_vars.get(key).cloned())
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let config = Self {
            lotus_addr: lookup(LOTUS_ADDR_KEY),
            lotus_token: lookup(LOTUS_TOKEN_KEY),
            rpc_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.lotus_addr.is_empty() {
            return Err(FipDataError::Config(format!(
                "{LOTUS_ADDR_KEY} must be set in the environment or config file"
            )));
        }
        if self.lotus_token.is_empty() {
            return Err(FipDataError::Config(format!(
                "{LOTUS_TOKEN_KEY} must be set in the environment or config file"
            )));
        }
        if self.rpc_timeout.is_zero() {
            return Err(FipDataError::Config("rpc timeout must be non-zero".into()));
        }
        normalize_endpoint(&self.lotus_addr)?;
        Ok(())
    }

    /// HTTP(S) JSON-RPC endpoint derived from `lotus_addr`.
    pub fn endpoint(&self) -> Result<String> {
        normalize_endpoint(&self.lotus_addr)
    }
}

/// Read `KEY=VALUE` pairs from an env-style file.
///
/// Keys are upper-cased. A missing file yields no values.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        tracing::warn!("No config file found at {}", path.display());
        return Ok(HashMap::new());
    }

    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| FipDataError::Config(format!("{}: {}", path.display(), e)))?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| FipDataError::Config(format!("{}: {}", path.display(), e)))?;
        vars.insert(key.to_ascii_uppercase(), value);
    }

    tracing::debug!("Loaded {} keys from {}", vars.len(), path.display());
    Ok(vars)
}

/// Turn a node address into an HTTP(S) JSON-RPC URL.
///
/// Accepts `http(s)://` URLs as-is, maps `ws(s)://` to the matching HTTP
/// scheme, and expands Lotus multiaddrs such as
/// `/ip4/127.0.0.1/tcp/1234/http` to `http://127.0.0.1:1234/rpc/v1`.
pub fn normalize_endpoint(addr: &str) -> Result<String> {
    let addr = addr.trim();
    let url = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else if let Some(rest) = addr.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = addr.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if addr.starts_with('/') {
        multiaddr_to_url(addr)?
    } else {
        return Err(FipDataError::Config(format!(
            "unsupported node address {addr:?}"
        )));
    };

    reqwest::Url::parse(&url)
        .map_err(|e| FipDataError::Config(format!("invalid node address {addr:?}: {e}")))?;
    Ok(url)
}

fn multiaddr_to_url(addr: &str) -> Result<String> {
    let invalid = || FipDataError::Config(format!("invalid node multiaddr {addr:?}"));
    let parts: Vec<&str> = addr.split('/').filter(|p| !p.is_empty()).collect();

    let (proto, host, port, scheme) = match parts.as_slice() {
        [proto, host, "tcp", port] => (*proto, *host, *port, "http"),
        [proto, host, "tcp", port, scheme] => (*proto, *host, *port, *scheme),
        _ => return Err(invalid()),
    };
    let host = match proto {
        "ip4" | "dns" | "dns4" | "dns6" => host.to_string(),
        "ip6" => format!("[{host}]"),
        _ => return Err(invalid()),
    };
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let scheme = match scheme {
        "http" | "ws" => "http",
        "https" | "wss" | "tls" => "https",
        _ => return Err(invalid()),
    };
    Ok(format!("{scheme}://{host}:{port}/rpc/v1"))
}

/// Flags of the `collect` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOptions {
    /// Requested snapshot epoch
    pub epoch: ChainEpoch,

    /// Log a progress line per processed miner
    pub progress: bool,

    /// Log the raw economic result per miner
    pub debug: bool,

    /// Write the per-miner CSV report to stdout
    pub csv: bool,

    /// Root directory for per-miner sector CSV dumps
    pub save_sectors_dir: Option<PathBuf>,

    /// Skip failing miners instead of aborting
    pub resumable: bool,

    /// CSV file listing failed miners (resumable mode)
    pub failed_out: Option<PathBuf>,

    /// Only process miners with a larger numeric ID
    pub start_after: Option<MinerId>,

    /// Miners processed concurrently; output order is unaffected
    pub concurrency: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            epoch: 0,
            progress: true,
            debug: false,
            csv: true,
            save_sectors_dir: None,
            resumable: false,
            failed_out: None,
            start_after: None,
            concurrency: 1,
        }
    }
}

impl CollectOptions {
    /// Directory receiving sector dumps for this epoch: `<dir>/<epoch>`.
    pub fn sectors_subdir(&self) -> Option<PathBuf> {
        self.save_sectors_dir
            .as_ref()
            .map(|dir| dir.join(self.epoch.to_string()))
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.epoch < 0 {
            return Err(FipDataError::Config(format!(
                "epoch must be non-negative, got {}",
                self.epoch
            )));
        }
        if self.concurrency == 0 {
            return Err(FipDataError::Config("concurrency must be at least 1".into()));
        }
        if self.failed_out.is_some() && !self.resumable {
            tracing::warn!("--failed-out has no effect without --resumable");
        }
        Ok(())
    }
}
