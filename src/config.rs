//! Process-wide tunable parameters (spec §2.1, §6).
//!
//! [`Config`] is assembled once at startup from built-in defaults, an
//! optional TOML file, then CLI flags (later sources win) and handed to
//! every component as an immutable, cheaply-cloneable value. Nothing below
//! `main` ever mutates it.

use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;
use serde::Deserialize;

use crate::error::StartupError;

/// Command-line interface, one flag per [`Config`] field.
///
/// Mirrors the flag-per-tunable style used elsewhere in this codebase's
/// proxy binaries: `#[arg(long, default_value_t = ...)]` for scalars,
/// `humantime::parse_duration` for anything that's conceptually a duration.
#[derive(Parser, Debug)]
#[command(name = "relay-proxy", about = "HTTP/1.x forwarding proxy")]
pub struct ProxyArgs {
    /// Optional TOML config file; CLI flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long = "max-conn")]
    pub max_conn: Option<u32>,

    #[arg(long = "buffer-size")]
    pub buffer_size: Option<usize>,

    #[arg(long = "socket-timeout", value_parser = humantime::parse_duration)]
    pub socket_timeout: Option<Duration>,

    #[arg(long = "cache-enabled")]
    pub cache_enabled: Option<bool>,

    #[arg(long = "max-cache-entries")]
    pub max_cache_entries: Option<usize>,

    /// Repeatable; host substrings to block. Empty means "use the file/default list".
    #[arg(long = "blacklist")]
    pub blacklist: Vec<String>,

    #[arg(long = "rate-limit-count")]
    pub rate_limit_count: Option<usize>,

    #[arg(long = "rate-limit-period", value_parser = humantime::parse_duration)]
    pub rate_limit_period: Option<Duration>,

    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Shape of the optional `--config` TOML file. All fields optional; absent
/// fields fall back to [`Config::default`] and may still be overridden by
/// CLI flags.
#[derive(Deserialize, Default)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    max_conn: Option<u32>,
    buffer_size: Option<usize>,
    socket_timeout_secs: Option<u64>,
    cache_enabled: Option<bool>,
    max_cache_entries: Option<usize>,
    blacklist: Option<Vec<String>>,
    rate_limit_count: Option<usize>,
    rate_limit_period_secs: Option<u64>,
    log_file: Option<PathBuf>,
}

/// Immutable, process-wide configuration consumed at startup (spec §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_conn: u32,
    pub buffer_size: usize,
    pub socket_timeout: Duration,
    pub cache_enabled: bool,
    pub max_cache_entries: usize,
    pub blacklist: Vec<String>,
    pub rate_limit_count: usize,
    pub rate_limit_period: Duration,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_conn: 100,
            buffer_size: 8192,
            socket_timeout: Duration::from_secs(15),
            cache_enabled: true,
            max_cache_entries: 100,
            blacklist: vec![
                "blocked.com".to_string(),
                "bad-site.org".to_string(),
                "ads.example.com".to_string(),
            ],
            rate_limit_count: 50,
            rate_limit_period: Duration::from_secs(60),
            log_file: PathBuf::from("proxy_log.txt"),
        }
    }
}

impl Config {
    /// Builds the final config: defaults, then `--config` file, then CLI flags.
    pub fn load(args: ProxyArgs) -> Result<Self, StartupError> {
        let mut config = Config::default();

        if let Some(path) = &args.config {
            let text = fs::read_to_string(path).map_err(|source| StartupError::ConfigRead {
                path: path.display().to_string(),
                source,
            })?;
            let file: FileConfig =
                toml::from_str(&text).map_err(|source| StartupError::ConfigParse {
                    path: path.display().to_string(),
                    source,
                })?;
            config.apply_file(file);
        }

        config.apply_args(args);
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.host {
            self.host = v;
        }
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.max_conn {
            self.max_conn = v;
        }
        if let Some(v) = file.buffer_size {
            self.buffer_size = v;
        }
        if let Some(v) = file.socket_timeout_secs {
            self.socket_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.cache_enabled {
            self.cache_enabled = v;
        }
        if let Some(v) = file.max_cache_entries {
            self.max_cache_entries = v;
        }
        if let Some(v) = file.blacklist {
            self.blacklist = v;
        }
        if let Some(v) = file.rate_limit_count {
            self.rate_limit_count = v;
        }
        if let Some(v) = file.rate_limit_period_secs {
            self.rate_limit_period = Duration::from_secs(v);
        }
        if let Some(v) = file.log_file {
            self.log_file = v;
        }
    }

    fn apply_args(&mut self, args: ProxyArgs) {
        if let Some(v) = args.host {
            self.host = v;
        }
        if let Some(v) = args.port {
            self.port = v;
        }
        if let Some(v) = args.max_conn {
            self.max_conn = v;
        }
        if let Some(v) = args.buffer_size {
            self.buffer_size = v;
        }
        if let Some(v) = args.socket_timeout {
            self.socket_timeout = v;
        }
        if let Some(v) = args.cache_enabled {
            self.cache_enabled = v;
        }
        if let Some(v) = args.max_cache_entries {
            self.max_cache_entries = v;
        }
        if !args.blacklist.is_empty() {
            self.blacklist = args.blacklist;
        }
        if let Some(v) = args.rate_limit_count {
            self.rate_limit_count = v;
        }
        if let Some(v) = args.rate_limit_period {
            self.rate_limit_period = v;
        }
        if let Some(v) = args.log_file {
            self.log_file = v;
        }
    }
}
