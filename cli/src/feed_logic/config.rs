use anyhow::{bail, Context, Result};
use clap::Parser;
use lib_feed::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "feed_shell.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Interactive client for a data-emulation WebSocket server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "FEED_URL", help = "WebSocket URL of the data emulator (ws:// or wss://).")]
    pub url: Option<String>,

    #[clap(long, env = "FEED_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FEED_CONNECT_TIMEOUT_SECS", help = "Seconds to wait for the dataset catalog after connecting.")]
    pub connect_timeout_secs: Option<u64>,

    #[clap(long, env = "FEED_SELECT_TIMEOUT_SECS", help = "Seconds to wait for the server to confirm a dataset selection.")]
    pub select_timeout_secs: Option<u64>,

    #[clap(long, env = "FEED_RECONNECT_DELAY_SECS", help = "Seconds between reconnect attempts.")]
    pub reconnect_delay_secs: Option<u64>,

    #[clap(long, env = "FEED_CLOSE_TIMEOUT_SECS", help = "Seconds to wait for the receive loop to stop on exit.")]
    pub close_timeout_secs: Option<u64>,

    #[clap(long, env = "FEED_FORWARD_URL", help = "HTTP endpoint that receives every live payload as a JSON POST.")]
    pub forward_url: Option<String>,

    #[clap(long, env = "FEED_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FEED_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            url: other.url.or(self.url),
            config_path: other.config_path.or(self.config_path),
            connect_timeout_secs: other.connect_timeout_secs.or(self.connect_timeout_secs),
            select_timeout_secs: other.select_timeout_secs.or(self.select_timeout_secs),
            reconnect_delay_secs: other.reconnect_delay_secs.or(self.reconnect_delay_secs),
            close_timeout_secs: other.close_timeout_secs.or(self.close_timeout_secs),
            forward_url: other.forward_url.or(self.forward_url),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    pub fn defaults() -> Config {
        Config {
            url: Some("ws://127.0.0.1:8765".to_string()),
            connect_timeout_secs: Some(10),
            select_timeout_secs: Some(10),
            reconnect_delay_secs: Some(5),
            close_timeout_secs: Some(5),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("ws://127.0.0.1:8765")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Validates the resolved values and builds the session settings.
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        let url = self.url();
        let parsed = Url::parse(url).with_context(|| format!("Invalid emulator URL '{}'", url))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            bail!("Emulator URL '{}' must use ws:// or wss://", url);
        }

        let defaults = SessionConfig::default();
        Ok(SessionConfig {
            url: url.to_string(),
            connect_timeout: seconds("connectTimeoutSecs", self.connect_timeout_secs)?
                .unwrap_or(defaults.connect_timeout),
            select_timeout: seconds("selectTimeoutSecs", self.select_timeout_secs)?
                .unwrap_or(defaults.select_timeout),
            reconnect_delay: seconds("reconnectDelaySecs", self.reconnect_delay_secs)?
                .unwrap_or(defaults.reconnect_delay),
            close_timeout: seconds("closeTimeoutSecs", self.close_timeout_secs)?
                .unwrap_or(defaults.close_timeout),
        })
    }

    /// The forwarding endpoint, if one is configured.
    pub fn forward_target(&self) -> Result<Option<Url>> {
        let Some(raw) = self.forward_url.as_deref() else {
            return Ok(None);
        };
        let parsed = Url::parse(raw).with_context(|| format!("Invalid forward URL '{}'", raw))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("Forward URL '{}' must use http:// or https://", raw);
        }
        Ok(Some(parsed))
    }
}

fn seconds(field: &str, value: Option<u64>) -> Result<Option<Duration>> {
    match value {
        Some(0) => bail!("{} must be greater than zero", field),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

/// Why a config file was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning(pub String);

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads a JSON config file. A missing file is not a problem; an unreadable
/// or malformed one yields a warning and no values.
fn read_config_file(path: &Path) -> Result<Option<Config>, ConfigWarning> {
    if !path.exists() {
        return Ok(None);
    }
    let config_str = fs::read_to_string(path).map_err(|e| {
        ConfigWarning(format!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e))
    })?;
    serde_json::from_str::<Config>(&config_str).map(Some).map_err(|e| {
        ConfigWarning(format!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e))
    })
}

/// Layers defaults, the config file and `cli` (which already carries the
/// environment) in increasing precedence.
///
/// The logger is not installed yet when this runs, so problems with the
/// config file are handed back for the caller to report.
pub fn resolve(cli: Config) -> (Config, Vec<ConfigWarning>) {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut warnings = Vec::new();
    let mut current_config = Config::defaults();
    match read_config_file(&config_file_path) {
        Ok(Some(file_config)) => current_config = current_config.merge(file_config),
        Ok(None) => {}
        Err(warning) => warnings.push(warning),
    }
    (current_config.merge(cli), warnings)
}

pub fn load_config() -> (Config, Vec<ConfigWarning>) {
    resolve(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.conf");
        (dir, path)
    }

    #[test]
    fn test_defaults_apply_without_file_or_flags() {
        let (_dir, path) = missing_file();
        let (config, warnings) = resolve(Config { config_path: Some(path.clone()), ..Default::default() });
        assert!(warnings.is_empty());

        assert_eq!(config.url(), "ws://127.0.0.1:8765");
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.log_dir(), PathBuf::from("./logs"));
        assert_eq!(config.forward_url, None);

        let session = config.to_session_config().unwrap();
        assert_eq!(session.connect_timeout, Duration::from_secs(10));
        assert_eq!(session.select_timeout, Duration::from_secs(10));
        assert_eq!(session.reconnect_delay, Duration::from_secs(5));
        assert_eq!(session.close_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_file_overrides_defaults_and_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed_shell.conf");
        fs::write(
            &path,
            r#"{"url": "ws://10.0.0.5:9000", "selectTimeoutSecs": 3, "logLevel": "debug"}"#,
        )
        .unwrap();

        let cli = Config {
            config_path: Some(path),
            log_level: Some("warn".to_string()),
            ..Default::default()
        };
        let (config, warnings) = resolve(cli);
        assert!(warnings.is_empty());

        assert_eq!(config.url(), "ws://10.0.0.5:9000");
        assert_eq!(config.select_timeout_secs, Some(3));
        assert_eq!(config.connect_timeout_secs, Some(10));
        assert_eq!(config.log_level(), "warn");
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.conf");
        fs::write(&path, "{ url: nope").unwrap();

        let (config, warnings) = resolve(Config { config_path: Some(path.clone()), ..Default::default() });

        assert_eq!(config.url(), "ws://127.0.0.1:8765");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].0.starts_with("Failed to parse config file"));
        assert!(warnings[0].0.contains(&path.display().to_string()));
    }

    #[test]
    fn test_cli_flags_parse() {
        let cli = Config::try_parse_from([
            "feed_shell",
            "--url",
            "wss://emulator.local/feed",
            "--select-timeout-secs",
            "7",
            "--forward-url",
            "http://127.0.0.1:5000/api/data",
        ])
        .unwrap();

        assert_eq!(cli.url.as_deref(), Some("wss://emulator.local/feed"));
        assert_eq!(cli.select_timeout_secs, Some(7));
        assert_eq!(
            cli.forward_target().unwrap().map(|u| u.to_string()),
            Some("http://127.0.0.1:5000/api/data".to_string())
        );
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let config = Config { url: Some("http://127.0.0.1:8765".to_string()), ..Config::defaults() };
        assert!(config.to_session_config().is_err());

        let config = Config { url: Some("not a url".to_string()), ..Config::defaults() };
        assert!(config.to_session_config().is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let config = Config { select_timeout_secs: Some(0), ..Config::defaults() };
        let err = config.to_session_config().unwrap_err();
        assert!(err.to_string().contains("selectTimeoutSecs"));
    }

    #[test]
    fn test_forward_target_requires_http() {
        let config = Config { forward_url: Some("ws://127.0.0.1:5000".to_string()), ..Config::defaults() };
        assert!(config.forward_target().is_err());
        assert_eq!(Config::defaults().forward_target().unwrap(), None);
    }
}
