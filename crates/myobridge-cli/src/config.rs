//! Bridge settings persisted in `~/.myobridge/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use myobridge_device::DEFAULT_PORT;
use myobridge_types::{IntervalValue, OptionsConfig};

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host running Myo Connect.
    #[serde(default = "default_ip_address")]
    pub ip_address: String,

    /// Myo Connect WebSocket port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pause between reconnect attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Send an unlock-and-hold after every connect so poses keep flowing.
    #[serde(default = "default_unlock_on_connect")]
    pub unlock_on_connect: bool,

    /// Initial relay options.  An `ipAddress` here wins over `ip_address`.
    #[serde(default)]
    pub options: OptionsConfig,
}

fn default_ip_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_reconnect_delay_ms() -> u64 {
    2_000
}
fn default_unlock_on_connect() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip_address: default_ip_address(),
            port: default_port(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            unlock_on_connect: default_unlock_on_connect(),
            options: OptionsConfig::default(),
        }
    }
}

/// Return the path to `~/.myobridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".myobridge").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `MYOBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MYOBRIDGE_IP_ADDRESS` | `ip_address` |
/// | `MYOBRIDGE_PORT` | `port` |
/// | `MYOBRIDGE_INTERVAL` | `options.interval` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MYOBRIDGE_IP_ADDRESS") {
        cfg.ip_address = v;
    }
    if let Ok(v) = std::env::var("MYOBRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("MYOBRIDGE_INTERVAL")
        && let Ok(ms) = v.parse::<i64>()
        && ms > 0
    {
        cfg.options.interval = Some(IntervalValue::Millis(ms));
    }
}

/// Save the config to disk, creating `~/.myobridge/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use myobridge_types::StreamToggle;

    #[test]
    fn config_path_points_to_myobridge_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".myobridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_config_with_options() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.options.interval = Some(IntervalValue::Millis(250));
        cfg.options.orientation = Some(StreamToggle { enabled: true });
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.port, 10138);
        assert_eq!(loaded.ip_address, "127.0.0.1");
        assert!(loaded.unlock_on_connect);
        assert_eq!(loaded.options.orientation, Some(StreamToggle { enabled: true }));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "ip_address = \"10.0.0.7\"\n\n[options]\nid = 1\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.ip_address, "10.0.0.7");
        assert_eq!(loaded.reconnect_delay_ms, 2_000);
        assert_eq!(loaded.options.id, Some(1));
        assert_eq!(loaded.options.gyroscope, None);
    }

    #[test]
    fn invalid_toml_is_reported() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "port = \"not a port\"").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn apply_env_overrides_reads_myobridge_vars() {
        // SAFETY: the only test touching these variables.
        unsafe {
            std::env::set_var("MYOBRIDGE_IP_ADDRESS", "192.168.1.20");
            std::env::set_var("MYOBRIDGE_PORT", "9999");
            std::env::set_var("MYOBRIDGE_INTERVAL", "40");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ip_address, "192.168.1.20");
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.options.interval, Some(IntervalValue::Millis(40)));

        // Unparseable or non-positive values leave the field alone.
        unsafe {
            std::env::set_var("MYOBRIDGE_PORT", "not-a-port");
            std::env::set_var("MYOBRIDGE_INTERVAL", "-10");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 10138);
        assert_eq!(cfg.options.interval, None);

        unsafe {
            std::env::remove_var("MYOBRIDGE_IP_ADDRESS");
            std::env::remove_var("MYOBRIDGE_PORT");
            std::env::remove_var("MYOBRIDGE_INTERVAL");
        }
    }
}
