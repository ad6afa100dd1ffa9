//! Configuration loading and validation.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SketchError};

/// Name of the scratch directory created under the system temp dir.
pub const SCRATCH_DIR_NAME: &str = "pi-sketches";

/// Top-level pi-sketch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sketch: Option<SketchConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Settings for a single sketch session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SketchConfig {
    /// Loopback address to bind (default: "127.0.0.1").
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Seconds before an idle session resolves empty (default: 600).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Where finished sketches are written (default: `<temp>/pi-sketches`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,

    /// Launch the default browser on session start (default: true).
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// Maximum accepted size of a submitted payload (default: 32 MiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            timeout_secs: default_timeout_secs(),
            scratch_dir: None,
            open_browser: true,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

impl SketchConfig {
    /// Session deadline measured from server start.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the configured bind host to a loopback address.
    ///
    /// Anything that is not loopback is rejected; the sketch server is never
    /// reachable from outside the machine.
    pub fn bind_addr(&self) -> Result<IpAddr> {
        let host = self.bind.trim();
        if host.eq_ignore_ascii_case("localhost") {
            return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        let addr: IpAddr = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|e| SketchError::Config(format!("invalid bind address {host:?}: {e}")))?;
        if !addr.is_loopback() {
            return Err(SketchError::Config(format!(
                "bind address {addr} is not a loopback address"
            )));
        }
        Ok(addr)
    }

    /// Directory finished sketches are written to.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .as_ref()
            .map(|d| PathBuf::from(shellexpand::tilde(d).as_ref()))
            .unwrap_or_else(|| std::env::temp_dir().join(SCRATCH_DIR_NAME))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "pi_sketch_server=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

static ENV_VAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex")
});

fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_RE
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config = json5::from_str(&substituted)
            .map_err(|e| SketchError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default location of the config file.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Effective sketch settings.
    pub fn sketch(&self) -> SketchConfig {
        self.sketch.clone().unwrap_or_default()
    }

    /// Effective logging settings.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

pub fn data_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pi-sketch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, the variable name is unique to this test
        unsafe { std::env::set_var("TEST_PI_SKETCH_DIR", "/tmp/sketch-env") };
        let input = r#"{"dir": "${TEST_PI_SKETCH_DIR}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("/tmp/sketch-env"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_PI_SKETCH_DIR") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_PI_SKETCH_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        let sketch = config.sketch();
        assert_eq!(sketch.timeout(), Duration::from_secs(600));
        assert!(sketch.open_browser);
        assert_eq!(sketch.bind_addr().unwrap(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(sketch.scratch_dir().ends_with(SCRATCH_DIR_NAME));
        assert_eq!(config.logging().format, "plain");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert!(config.sketch.is_none());
    }

    #[test]
    fn test_load_json5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are fine
                sketch: { timeout_secs: 5, open_browser: false, scratch_dir: "/tmp/sk" },
                logging: { format: "json" },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        let sketch = config.sketch();
        assert_eq!(sketch.timeout_secs, 5);
        assert!(!sketch.open_browser);
        assert_eq!(sketch.bind, "127.0.0.1");
        assert_eq!(sketch.scratch_dir(), PathBuf::from("/tmp/sk"));
        assert_eq!(config.logging().format, "json");
    }

    #[test]
    fn test_load_invalid_json5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ sketch: ").unwrap();
        assert!(matches!(Config::load(&path), Err(SketchError::Config(_))));
    }

    #[test]
    fn test_bind_addr_loopback_only() {
        let mut sketch = SketchConfig::default();

        sketch.bind = "localhost".into();
        assert!(sketch.bind_addr().unwrap().is_loopback());

        sketch.bind = "::1".into();
        assert!(sketch.bind_addr().unwrap().is_loopback());

        sketch.bind = "[::1]".into();
        assert!(sketch.bind_addr().unwrap().is_loopback());

        sketch.bind = "0.0.0.0".into();
        assert!(sketch.bind_addr().is_err());

        sketch.bind = "192.168.1.10".into();
        assert!(sketch.bind_addr().is_err());

        sketch.bind = "not-an-ip".into();
        assert!(sketch.bind_addr().is_err());
    }
}
