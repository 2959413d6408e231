//! Runtime configuration.
//!
//! Sources, highest precedence first: the process environment (plus a `.env`
//! file), then an optional settings file. The file uses the environment names
//! without the `SCANBOX_` prefix, in lower case (`port`, `collector_token`, ...).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use ::config::{Config as Settings, File};
use anyhow::{Context, bail};
use tracing::debug;

const ENV_PREFIX: &str = "SCANBOX_";
const CONFIG_FILE_VAR: &str = "SCANBOX_CONFIG";
/// Looked up as `scanbox.{yml,yaml,toml,json}` in the working directory.
const DEFAULT_CONFIG_FILE: &str = "scanbox";
const MAX_KEEPALIVE_SECS: u64 = 86_400;
const MAX_SCAN_TIMEOUT_SECS: u64 = 7 * 86_400;
const RESOLV_CONF: &str = "/etc/resolv.conf";
const FALLBACK_DNS_SERVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53);

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub collector: CollectorConfig,
    pub engine: EngineConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

#[derive(Clone)]
pub struct CollectorConfig {
    /// Base URL of the collector, without a trailing slash.
    pub base_url: String,
    /// Bearer credential for every collector request.
    pub token: String,
}

impl std::fmt::Debug for CollectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub nmap_path: String,
    pub dns_server: SocketAddr,
    pub dns_timeout: Duration,
    /// Cadence of progress notifications while a scan call is pending.
    pub keepalive_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound for a whole discovery job; the job is cancelled afterwards.
    pub scan_timeout: Duration,
    pub resolve_concurrency: usize,
    /// Also scan the submitted domains themselves, not only their subdomains.
    pub resolve_apex: bool,
    /// Deliver what succeeded when one branch of a job fails.
    pub deliver_partial: bool,
}

impl Config {
    /// Loads configuration from the process environment and the settings file.
    ///
    /// `SCANBOX_CONFIG` names the settings file; it must then exist.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        let file = match std::env::var(CONFIG_FILE_VAR) {
            Ok(path) => File::with_name(&path).required(true),
            Err(_) => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Settings::builder()
            .add_source(file)
            .build()
            .context("Failed to read settings file")?;

        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| setting(&settings, key)))
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("SCANBOX_COLLECTOR_TOKEN").unwrap_or_default();
        if token.trim().is_empty() {
            bail!("SCANBOX_COLLECTOR_TOKEN must be set");
        }

        let base_url = lookup("SCANBOX_COLLECTOR_URL")
            .unwrap_or_else(|| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        let dns_server = match lookup("SCANBOX_DNS_SERVER") {
            Some(raw) => parse_dns_server(&raw)?,
            None => system_nameserver().unwrap_or(FALLBACK_DNS_SERVER),
        };

        Ok(Self {
            server: ServerConfig {
                bind: parse_or(&lookup, "SCANBOX_BIND", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
                port: parse_or(&lookup, "SCANBOX_PORT", 8080)?,
            },
            collector: CollectorConfig {
                base_url,
                token: token.trim().to_string(),
            },
            engine: EngineConfig {
                nmap_path: lookup("SCANBOX_NMAP_PATH").unwrap_or_else(|| "nmap".to_string()),
                dns_server,
                dns_timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "SCANBOX_DNS_TIMEOUT_MS",
                    2_000,
                )?),
                keepalive_interval: parse_secs(
                    &lookup,
                    "SCANBOX_KEEPALIVE_SECS",
                    5,
                    MAX_KEEPALIVE_SECS,
                )?,
            },
            pipeline: PipelineConfig {
                scan_timeout: parse_secs(
                    &lookup,
                    "SCANBOX_SCAN_TIMEOUT_SECS",
                    3_600,
                    MAX_SCAN_TIMEOUT_SECS,
                )?,
                resolve_concurrency: parse_or(&lookup, "SCANBOX_RESOLVE_CONCURRENCY", 16)?,
                resolve_apex: parse_or(&lookup, "SCANBOX_RESOLVE_APEX", false)?,
                deliver_partial: parse_or(&lookup, "SCANBOX_DELIVER_PARTIAL", false)?,
            },
        })
    }
}

/// The settings file value for the environment variable `key`.
fn setting(settings: &Settings, key: &str) -> Option<String> {
    let name = key.strip_prefix(ENV_PREFIX)?.to_ascii_lowercase();
    settings.get_string(&name).ok()
}

/// Seconds from `key`, refused above `max`.
fn parse_secs<F>(lookup: &F, key: &str, default: u64, max: u64) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, default)?;
    if secs > max {
        bail!("{key} must be at most {max} seconds, got {secs}");
    }
    Ok(Duration::from_secs(secs))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}

/// Accepts either `ip` or `ip:port`.
fn parse_dns_server(raw: &str) -> anyhow::Result<SocketAddr> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip = raw
        .parse::<IpAddr>()
        .with_context(|| format!("SCANBOX_DNS_SERVER has an invalid value: '{raw}'"))?;
    Ok(SocketAddr::new(ip, 53))
}

fn system_nameserver() -> Option<SocketAddr> {
    let contents = std::fs::read_to_string(RESOLV_CONF).ok()?;
    first_nameserver(&contents)
}

fn first_nameserver(resolv_conf: &str) -> Option<SocketAddr> {
    resolv_conf
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("nameserver"))
        .filter_map(|rest| rest.trim().parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, 53))
        .next()
}
