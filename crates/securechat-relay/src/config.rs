//! Relay configuration: optional TOML file, then environment overrides.
//!
//! ```toml
//! bind = "0.0.0.0:8000"
//! static_dir = "static"
//!
//! [auth]
//! identity_header = "x-authenticated-user"
//!
//! [limits]
//! capacity = 50
//! rate_max_events = 30
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use securechat_core::RoomLimits;

use crate::error::RelayError;

/// Auth-boundary settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header an upstream auth service sets to the verified username.
    pub identity_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_header: "x-authenticated-user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    /// Directory served as the fallback route (web client).
    pub static_dir: PathBuf,
    /// How long the socket writer waits on one send before giving up.
    pub send_timeout_secs: u64,
    /// Upper bound on flushing the shutdown notice.
    pub shutdown_grace_secs: u64,
    /// How often expired handshake tokens are swept.
    pub token_sweep_secs: u64,
    pub auth: AuthConfig,
    pub limits: RoomLimits,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            static_dir: PathBuf::from("static"),
            send_timeout_secs: 5,
            shutdown_grace_secs: 3,
            token_sweep_secs: 30,
            auth: AuthConfig::default(),
            limits: RoomLimits::default(),
        }
    }
}

impl RelayConfig {
    pub fn from_toml(text: &str) -> Result<Self, RelayError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let text = std::fs::read_to_string(path).map_err(|source| RelayError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load from `SECURECHAT_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self, RelayError> {
        let mut config = match std::env::var("SECURECHAT_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// `PORT` keeps the host from `bind`; `SECURECHAT_BIND` replaces it.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), RelayError> {
        if let Some(bind) = var("SECURECHAT_BIND") {
            self.bind = bind;
        }
        if let Some(port) = var("PORT") {
            let port: u16 = port.parse().map_err(|_| RelayError::InvalidPort(port.clone()))?;
            let host = self.bind.rsplit_once(':').map_or("0.0.0.0", |(host, _)| host);
            self.bind = format!("{host}:{port}");
        }
        if let Some(dir) = var("SECURECHAT_STATIC_DIR") {
            self.static_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn token_sweep(&self) -> Duration {
        Duration::from_secs(self.token_sweep_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RelayConfig::from_toml(
            r#"
            static_dir = "web"

            [limits]
            capacity = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.static_dir, PathBuf::from("web"));
        assert_eq!(config.limits.capacity, 10);
        assert_eq!(config.limits.rate_max_events, 30);
        assert_eq!(config.auth.identity_header, "x-authenticated-user");
        assert_eq!(config.bind, "0.0.0.0:8000");
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(matches!(
            RelayConfig::from_toml("limits = 3"),
            Err(RelayError::ParseConfig(_))
        ));
    }

    #[test]
    fn port_override_keeps_host() {
        let env: HashMap<&str, &str> = [("PORT", "9123")].into();
        let mut config = RelayConfig {
            bind: "127.0.0.1:8000".into(),
            ..RelayConfig::default()
        };
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bind, "127.0.0.1:9123");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_overrides(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidPort(p) if p == "eighty"));
    }
}
