use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "PULSE_CONFIG";
/// Environment variable overriding `database.path`.
pub const DB_PATH_ENV: &str = "PULSE_DB_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("Failed to write config file {0}: {1}")]
    WriteFailed(path::PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseFailed(path::PathBuf, #[source] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub probe: ProbeConfig,
    pub targets: TargetDefaults,
    pub uptime: UptimeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-evaluation ticks (never less than 60).
    pub tick_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetDefaults {
    pub default_interval_minutes: u32,
    /// Try the https counterpart of plain http addresses at registration.
    pub prefer_secure: bool,
    /// Probe a freshly registered target right away instead of waiting for a tick.
    pub probe_on_add: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UptimeConfig {
    pub window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "pulse.db".into() }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_seconds: 60 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            user_agent: concat!("pulse/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for TargetDefaults {
    fn default() -> Self {
        Self { default_interval_minutes: 5, prefer_secure: true, probe_on_add: true }
    }
}

impl Default for UptimeConfig {
    fn default() -> Self {
        Self { window_days: 365 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1".into(), port: 8080 }
    }
}

impl SchedulerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(60))
    }
}

/// Shortest probe deadline honoured
const MIN_PROBE_TIMEOUT_MS: u64 = 1_000;

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(MIN_PROBE_TIMEOUT_MS))
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("pulse/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Tick (s)", &self.scheduler.tick_period().as_secs())?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (ms)", &self.probe.timeout_ms)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_title_1(f, "Targets")?;
        write_1(f, "Default Interval (min)", &self.targets.default_interval_minutes)?;
        write_1(f, "Prefer HTTPS", &self.targets.prefer_secure)?;
        write_1(f, "Probe On Add", &self.targets.probe_on_add)?;
        write_title_1(f, "Uptime")?;
        write_1(f, "Window (days)", &self.uptime.window_days)?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;

        Ok(())
    }
}

impl Config {
    /// Resolve the config location (explicit path, `PULSE_CONFIG`, then the
    /// XDG default), load it, and apply environment overrides.
    pub fn load(explicit: Option<&path::Path>) -> Result<Self, ConfigError> {
        let from_env = env::var_os(CONFIG_ENV).map(path::PathBuf::from);
        let mut config = Self::from_config(explicit.map(path::Path::to_path_buf).or(from_env))?;
        if let Some(db_path) = env::var_os(DB_PATH_ENV) {
            config.database.path = db_path.into();
        }
        Ok(config)
    }

    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pulse/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,no_run
    /// let cfg = pulse_service::config::Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), pulse_service::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|err| ConfigError::ReadFailed(config_path.clone(), err))?;
            toml::from_str(raw_string.as_str())
                .map_err(|err| ConfigError::ParseFailed(config_path, err))
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ConfigError::WriteFailed(path.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| ConfigError::WriteFailed(path.to_path_buf(), err))
    }
}
