//! Configuration management
//!
//! Settings are layered in this order (later wins):
//! 1. built-in defaults
//! 2. `remoto.toml` / `remoto.json` config file
//! 3. environment variables
//! 4. command line flags
//!
//! `${VAR_NAME}` inside a TOML config file expands to the environment value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Config file names probed in the working directory, in order
pub const DEFAULT_CONFIG_FILES: &[&str] = &["remoto.toml", "remoto.json"];

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// Basic-auth credentials guarding the whole HTTP surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Check a presented user/password pair
    pub fn matches(&self, user: &str, password: &str) -> bool {
        self.user == user && self.password == password
    }
}

/// Main configuration for remoto
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// TCP port the worker listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Basic-auth user
    #[serde(default)]
    pub user: Option<String>,

    /// Basic-auth password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Directory served for non-WebSocket requests
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Seconds between periodic liveness sweeps (0 disables the timer)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            user: None,
            password: None,
            static_dir: default_static_dir(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load the full configuration stack
    ///
    /// Reads `.env`, then the config file named in `overrides` (or the first
    /// of [`DEFAULT_CONFIG_FILES`] that exists), then the process
    /// environment, then `overrides` itself.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut cfg = match &overrides.config_path {
            Some(path) => Self::from_file(path)?,
            None => match DEFAULT_CONFIG_FILES.iter().map(Path::new).find(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };

        cfg.apply_env_overrides();
        cfg.apply_overrides(overrides);
        cfg.validate()?;

        Ok(cfg)
    }

    /// Read a config file; `.json` is parsed as JSON, anything else as TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Parse a JSON config (`{"user": .., "password": .., "port": ..}`)
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a TOML config, expanding `${VAR}` from the environment first
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok());
        Ok(toml::from_str(&expanded)?)
    }

    /// Apply `PORT`, `REMOTO_USER`, `REMOTO_PASSWORD`, `REMOTO_STATIC_DIR`
    /// and `REMOTO_SWEEP_INTERVAL` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|name| std::env::var(name).ok());
    }

    /// Same as [`Config::apply_env_overrides`] with an explicit lookup
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(p) => self.port = p,
                Err(_) => debug!("Ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(user) = lookup("REMOTO_USER") {
            self.user = Some(user);
        }
        if let Some(password) = lookup("REMOTO_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(dir) = lookup("REMOTO_STATIC_DIR") {
            if !dir.is_empty() {
                self.static_dir = PathBuf::from(dir);
            }
        }
        if let Some(secs) = lookup("REMOTO_SWEEP_INTERVAL") {
            match secs.trim().parse() {
                Ok(s) => self.sweep_interval_secs = s,
                Err(_) => debug!("Ignoring invalid REMOTO_SWEEP_INTERVAL value: {}", secs),
            }
        }
    }

    /// Apply command line values on top of everything else
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(user) = &overrides.user {
            self.user = Some(user.clone());
        }
        if let Some(password) = &overrides.password {
            self.password = Some(password.clone());
        }
        if let Some(dir) = &overrides.static_dir {
            self.static_dir = dir.clone();
        }
    }

    /// Reject combinations the worker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be between 1 and 65535".to_string()));
        }
        Ok(())
    }

    /// Credentials for the basic-auth gate, if both halves are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Credentials::new(user, password))
            }
            _ => None,
        }
    }
}

/// Replace `${VAR_NAME}` with `lookup(VAR_NAME)`; unknown variables expand to
/// the empty string
fn expand_env_vars<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }

            if let Some(env_value) = lookup(&var_name) {
                result.push_str(&env_value);
            }
        } else {
            result.push(c);
        }
    }

    result
}
