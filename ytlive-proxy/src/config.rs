//! Command line and configuration file handling.
//!
//! Sources, in order of precedence:
//! 1. command line values that differ from their defaults
//! 2. the TOML file (`--config`, or `ytlive-proxy.toml` in the working directory)
//! 3. built-in defaults

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ytlive_types::{FormatPolicy, DEFAULT_PLATFORM_BASE_URL};

use crate::orchestrator::OrchestratorConfig;
use crate::relay::RelayConfig;
use crate::resolver::ytdlp::{DEFAULT_YTDLP_BINARY, YTDLP_PATH_ENV};
use crate::resolver::YtDlpConfig;
use crate::scheduler::RefreshSchedulerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "ytlive-proxy.toml";
const DEFAULT_LISTEN: &str = "0.0.0.0:51179";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RETENTION_DAYS: u64 = 7;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 240;

/// Channels kept warm when nothing else is configured.
pub const DEFAULT_CHANNELS: &[&str] = &["@ABCNews", "@SkyNews", "@mirrornow", "TVBSNEWS01"];

/// ytlive-proxy - caching live stream resolver and relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Configuration file path
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Channel to keep warm (repeatable, replaces the configured list)
    #[arg(short, long = "channel")]
    pub channels: Vec<String>,

    /// Disable the background refresher
    #[arg(long)]
    pub no_refresh: bool,

    /// Background refresh interval in seconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL_SECS)]
    pub refresh_interval: u64,

    /// Path to the yt-dlp executable
    #[arg(long)]
    pub ytdlp: Option<String>,

    /// Directory where log files are stored
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
    pub log_retention_days: u64,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    refresh: RefreshSection,
    #[serde(default)]
    cache: CacheSection,
    #[serde(default)]
    resolver: ResolverSection,
    #[serde(default)]
    relay: RelaySection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    listen: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RefreshSection {
    enabled: Option<bool>,
    channels: Option<Vec<String>>,
    interval_secs: Option<u64>,
    initial_delay_secs: Option<u64>,
    pacing_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheSection {
    channel_ttl_secs: Option<u64>,
    stream_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ResolverSection {
    binary: Option<String>,
    platform_base_url: Option<String>,
    max_height: Option<u32>,
    preferred_ext: Option<String>,
    timeout_secs: Option<u64>,
    extra_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RelaySection {
    connect_timeout_secs: Option<u64>,
    response_timeout_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerSettings {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSettings {
    pub enabled: bool,
    pub channels: Vec<String>,
    pub interval_secs: u64,
    pub initial_delay_secs: u64,
    pub pacing_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSettings {
    pub channel_ttl_secs: u64,
    pub stream_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolverSettings {
    pub binary: String,
    pub platform_base_url: String,
    pub max_height: u32,
    pub preferred_ext: String,
    pub timeout_secs: u64,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelaySettings {
    pub connect_timeout_secs: u64,
    pub response_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingSettings {
    pub log_dir: PathBuf,
    pub retention_days: u64,
    pub level: String,
}

/// Effective configuration after merging all sources.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub refresh: RefreshSettings,
    pub cache: CacheSettings,
    pub resolver: ResolverSettings,
    pub relay: RelaySettings,
    pub logging: LoggingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        let relay = RelayConfig::default();
        let policy = FormatPolicy::default();
        Self {
            server: ServerSettings {
                listen: SocketAddr::from(([0, 0, 0, 0], 51179)),
            },
            refresh: RefreshSettings {
                enabled: true,
                channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
                interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
                initial_delay_secs: 10,
                pacing_ms: 2000,
            },
            cache: CacheSettings {
                channel_ttl_secs: 300,  // 5 minutes
                stream_ttl_secs: 1800,  // 30 minutes
            },
            resolver: ResolverSettings {
                binary: std::env::var(YTDLP_PATH_ENV)
                    .unwrap_or_else(|_| DEFAULT_YTDLP_BINARY.to_string()),
                platform_base_url: DEFAULT_PLATFORM_BASE_URL.to_string(),
                max_height: policy.max_height,
                preferred_ext: policy.preferred_ext,
                timeout_secs: 60,
                extra_args: Vec::new(),
            },
            relay: RelaySettings {
                connect_timeout_secs: relay.connect_timeout_secs,
                response_timeout_secs: relay.response_timeout_secs,
                idle_timeout_secs: relay.idle_timeout_secs,
            },
            logging: LoggingSettings {
                log_dir: PathBuf::from(DEFAULT_LOG_DIR),
                retention_days: DEFAULT_RETENTION_DAYS,
                level: "info".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load the file named by `args` (or the default file if present) and merge.
    ///
    /// Returns the path that was loaded, if any.
    pub fn load(args: &Args) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let config_path = args.config.clone().or_else(|| {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Some(default_path)
            } else {
                None
            }
        });
        let file = match &config_path {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Ok((Self::merge(args, file)?, config_path))
    }

    /// Merge command line and file values over the defaults.
    pub fn merge(args: &Args, file: ConfigFile) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Some(listen) = file.server.listen {
            config.server.listen = listen.parse().map_err(|e| ConfigError::Invalid {
                key: "server.listen",
                reason: format!("{}: {}", listen, e),
            })?;
        }
        if args.listen.to_string() != DEFAULT_LISTEN {
            config.server.listen = args.listen;
        }

        // Refresh
        let refresh = &mut config.refresh;
        if let Some(enabled) = file.refresh.enabled {
            refresh.enabled = enabled;
        }
        if let Some(channels) = file.refresh.channels {
            refresh.channels = channels;
        }
        if let Some(secs) = file.refresh.interval_secs {
            refresh.interval_secs = secs;
        }
        if let Some(secs) = file.refresh.initial_delay_secs {
            refresh.initial_delay_secs = secs;
        }
        if let Some(ms) = file.refresh.pacing_ms {
            refresh.pacing_ms = ms;
        }
        if args.no_refresh {
            refresh.enabled = false;
        }
        if !args.channels.is_empty() {
            refresh.channels = args.channels.clone();
        }
        if args.refresh_interval != DEFAULT_REFRESH_INTERVAL_SECS {
            refresh.interval_secs = args.refresh_interval;
        }
        refresh.channels.retain(|c| !c.trim().is_empty());

        // Cache
        if let Some(secs) = file.cache.channel_ttl_secs {
            config.cache.channel_ttl_secs = secs;
        }
        if let Some(secs) = file.cache.stream_ttl_secs {
            config.cache.stream_ttl_secs = secs;
        }

        // Resolver
        let resolver = &mut config.resolver;
        if let Some(binary) = file.resolver.binary {
            resolver.binary = binary;
        }
        if let Some(binary) = &args.ytdlp {
            resolver.binary = binary.clone();
        }
        if let Some(url) = file.resolver.platform_base_url {
            resolver.platform_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(height) = file.resolver.max_height {
            resolver.max_height = height;
        }
        if let Some(ext) = file.resolver.preferred_ext {
            resolver.preferred_ext = ext;
        }
        if let Some(secs) = file.resolver.timeout_secs {
            resolver.timeout_secs = secs;
        }
        if let Some(extra) = file.resolver.extra_args {
            resolver.extra_args = extra;
        }

        // Relay
        if let Some(secs) = file.relay.connect_timeout_secs {
            config.relay.connect_timeout_secs = secs;
        }
        if let Some(secs) = file.relay.response_timeout_secs {
            config.relay.response_timeout_secs = secs;
        }
        if let Some(secs) = file.relay.idle_timeout_secs {
            config.relay.idle_timeout_secs = secs;
        }

        // Logging (command line takes precedence)
        config.logging.log_dir = if args.log_dir.to_string_lossy() != DEFAULT_LOG_DIR {
            args.log_dir.clone()
        } else {
            PathBuf::from(file.logging.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR))
        };
        config.logging.retention_days = if args.log_retention_days != DEFAULT_RETENTION_DAYS {
            args.log_retention_days
        } else {
            file.logging.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS)
        };
        if let Some(level) = file.logging.level {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Check ranges. Returns non-fatal warnings on success.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let nonzero = [
            ("cache.channel_ttl_secs", self.cache.channel_ttl_secs),
            ("cache.stream_ttl_secs", self.cache.stream_ttl_secs),
            ("refresh.interval_secs", self.refresh.interval_secs),
            ("resolver.timeout_secs", self.resolver.timeout_secs),
            ("relay.connect_timeout_secs", self.relay.connect_timeout_secs),
            ("relay.response_timeout_secs", self.relay.response_timeout_secs),
            ("relay.idle_timeout_secs", self.relay.idle_timeout_secs),
        ];
        for (key, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.resolver.max_height == 0 {
            return Err(ConfigError::Invalid {
                key: "resolver.max_height",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.resolver.binary.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "resolver.binary",
                reason: "must not be empty".to_string(),
            });
        }
        if let Err(e) = url::Url::parse(&self.resolver.platform_base_url) {
            return Err(ConfigError::Invalid {
                key: "resolver.platform_base_url",
                reason: e.to_string(),
            });
        }

        let mut warnings = Vec::new();
        let interval = self.refresh.interval_secs;
        if self.refresh.enabled {
            for (key, ttl) in [
                ("cache.channel_ttl_secs", self.cache.channel_ttl_secs),
                ("cache.stream_ttl_secs", self.cache.stream_ttl_secs),
            ] {
                if interval >= ttl {
                    warnings.push(format!(
                        "refresh.interval_secs ({}) is not below {} ({}); entries will expire between passes",
                        interval, key, ttl
                    ));
                }
            }
            if self.refresh.channels.is_empty() {
                warnings.push("refresh is enabled but no channels are configured".to_string());
            }
        }
        Ok(warnings)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            channel_ttl: Duration::from_secs(self.cache.channel_ttl_secs),
            stream_ttl: Duration::from_secs(self.cache.stream_ttl_secs),
            resolver_timeout: Duration::from_secs(self.resolver.timeout_secs),
            platform_base_url: self.resolver.platform_base_url.clone(),
            format_policy: FormatPolicy {
                max_height: self.resolver.max_height,
                preferred_ext: self.resolver.preferred_ext.clone(),
            },
        }
    }

    pub fn ytdlp_config(&self) -> YtDlpConfig {
        YtDlpConfig {
            binary: self.resolver.binary.clone(),
            platform_base_url: self.resolver.platform_base_url.clone(),
            extra_args: self.resolver.extra_args.clone(),
        }
    }

    pub fn refresh_config(&self) -> RefreshSchedulerConfig {
        RefreshSchedulerConfig {
            enabled: self.refresh.enabled,
            channels: self.refresh.channels.clone(),
            interval_secs: self.refresh.interval_secs,
            initial_delay_secs: self.refresh.initial_delay_secs,
            pacing_ms: self.refresh.pacing_ms,
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            connect_timeout_secs: self.relay.connect_timeout_secs,
            response_timeout_secs: self.relay.response_timeout_secs,
            idle_timeout_secs: self.relay.idle_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["ytlive-proxy"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn file(contents: &str) -> ConfigFile {
        ConfigFile::parse(contents, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::merge(&args(&[]), ConfigFile::default()).unwrap();
        assert_eq!(config.server.listen.port(), 51179);
        assert_eq!(config.refresh.channels, DEFAULT_CHANNELS);
        assert_eq!(config.refresh.interval_secs, 240);
        assert_eq!(config.cache.channel_ttl_secs, 300);
        assert_eq!(config.cache.stream_ttl_secs, 1800);
        assert_eq!(config.resolver.max_height, 1080);
        assert_eq!(config.relay.idle_timeout_secs, 30);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_file_values_apply() {
        let file = file(
            r#"
            [server]
            listen = "127.0.0.1:8000"

            [refresh]
            channels = ["@NHKWORLDJAPAN"]
            interval_secs = 120

            [cache]
            stream_ttl_secs = 3600

            [resolver]
            binary = "/opt/yt-dlp"
            platform_base_url = "https://www.youtube.com/"
            max_height = 720

            [logging]
            level = "debug"
            "#,
        );
        let config = AppConfig::merge(&args(&[]), file).unwrap();
        assert_eq!(config.server.listen.to_string(), "127.0.0.1:8000");
        assert_eq!(config.refresh.channels, vec!["@NHKWORLDJAPAN"]);
        assert_eq!(config.refresh.interval_secs, 120);
        assert_eq!(config.cache.stream_ttl_secs, 3600);
        assert_eq!(config.cache.channel_ttl_secs, 300);
        assert_eq!(config.resolver.binary, "/opt/yt-dlp");
        assert_eq!(config.resolver.platform_base_url, "https://www.youtube.com");
        assert_eq!(config.orchestrator_config().format_policy.max_height, 720);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_command_line_overrides_file() {
        let file = file(
            r#"
            [server]
            listen = "127.0.0.1:8000"
            [refresh]
            channels = ["@a"]
            interval_secs = 120
            "#,
        );
        let args = args(&[
            "--listen",
            "127.0.0.1:9000",
            "-c",
            "@b",
            "-c",
            "@c",
            "--refresh-interval",
            "60",
            "--no-refresh",
        ]);
        let config = AppConfig::merge(&args, file).unwrap();
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.refresh.channels, vec!["@b", "@c"]);
        assert_eq!(config.refresh.interval_secs, 60);
        assert!(!config.refresh_config().enabled);
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let err = ConfigFile::parse("[database]\npath = \"x\"\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_bad_listen_address() {
        let err = AppConfig::merge(&args(&[]), file("[server]\nlisten = \"nowhere\"\n")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "server.listen", .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.cache.channel_ttl_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "cache.channel_ttl_secs", .. })
        ));

        let mut config = AppConfig::default();
        config.refresh.interval_secs = 300;
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("cache.channel_ttl_secs"));

        config.refresh.enabled = false;
        assert!(config.validate().unwrap().is_empty());
    }
}
