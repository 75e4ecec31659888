//! Configuration management for the FTP server.
//!
//! Everything here is loaded once at startup, validated, and then handed to
//! every session behind an `Arc`. Nothing is mutated after initialization,
//! so sessions never contend on configuration access.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

/// Default permission string for the anonymous account: list and read only.
const ANONYMOUS_PERMISSIONS: &str = "elr";

/// A single user entry from the `[[users]]` table.
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub home_dir: String,
    /// Permission letters, e.g. `"elradfmwMT"` for full access.
    pub permissions: String,
}

/// Complete server configuration, loaded once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind the control listener on.
    pub bind_address: String,

    /// Port for the control connection.
    pub control_port: u16,

    /// Address advertised in PASV replies. Usually the public address of
    /// the server; falls back to `bind_address` when absent.
    pub pasv_address: Option<String>,

    /// Inclusive port range handed out for passive data connections.
    pub data_port_min: u16,
    pub data_port_max: u16,

    /// Seconds of command inactivity before the control connection is closed.
    pub idle_timeout_secs: u64,

    /// Seconds to wait for a passive data connection or an active dial-out.
    pub data_timeout_secs: u64,

    /// Maximum concurrent control connections. Further clients are greeted
    /// with `421` and closed immediately.
    pub max_sessions: usize,

    /// Maximum accepted command line length, in bytes.
    pub max_command_length: usize,

    /// Accept PORT arguments whose address differs from the control peer.
    /// Off by default; turning it on permits FXP-style third-party transfers.
    #[serde(default)]
    pub allow_foreign_data_address: bool,

    /// Whether the `anonymous` account may log in.
    #[serde(default)]
    pub anonymous_enabled: bool,

    /// Sandbox root for the anonymous account.
    pub anonymous_root: Option<String>,

    /// Named user accounts.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl ServerConfig {
    /// Loads `config.toml` from the working directory with `FERRIC_FTP_*`
    /// environment overrides, then validates it.
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("FERRIC_FTP").separator("__"))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates invariants the rest of the server relies on.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.control_port == 0 {
            return Err(config::ConfigError::Message(
                "control_port cannot be 0".into(),
            ));
        }

        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(config::ConfigError::Message(format!(
                "bind_address is not a valid IP address: {}",
                self.bind_address
            )));
        }

        if let Some(addr) = &self.pasv_address {
            if addr.parse::<IpAddr>().is_err() {
                return Err(config::ConfigError::Message(format!(
                    "pasv_address is not a valid IP address: {addr}"
                )));
            }
        }

        if self.data_port_min > self.data_port_max {
            return Err(config::ConfigError::Message(
                "data_port_min must not exceed data_port_max".into(),
            ));
        }

        if self.max_sessions == 0 {
            return Err(config::ConfigError::Message(
                "max_sessions must be greater than 0".into(),
            ));
        }

        if self.max_command_length < 32 {
            return Err(config::ConfigError::Message(
                "max_command_length must be at least 32".into(),
            ));
        }

        if self.anonymous_enabled && self.anonymous_root.is_none() {
            return Err(config::ConfigError::Message(
                "anonymous_root is required when anonymous_enabled is set".into(),
            ));
        }

        for user in &self.users {
            if user.username.is_empty() {
                return Err(config::ConfigError::Message("empty username".into()));
            }
            if user.username == "anonymous" {
                return Err(config::ConfigError::Message(
                    "the anonymous account is configured via anonymous_enabled, \
                     not the users table"
                        .into(),
                ));
            }
            if user.home_dir.is_empty() {
                return Err(config::ConfigError::Message(format!(
                    "user {} has an empty home_dir",
                    user.username
                )));
            }
            if let Some(bad) = user.permissions.chars().find(|c| !"elradfmwMT".contains(*c)) {
                return Err(config::ConfigError::Message(format!(
                    "user {} has unknown permission letter '{bad}'",
                    user.username
                )));
            }
        }

        let mut names: Vec<&str> = self.users.iter().map(|u| u.username.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.users.len() {
            return Err(config::ConfigError::Message(
                "duplicate username in users table".into(),
            ));
        }

        Ok(())
    }

    /// Bind address and control port as a socket address string.
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// Address advertised in PASV replies.
    pub fn advertised_address(&self) -> &str {
        self.pasv_address.as_deref().unwrap_or(&self.bind_address)
    }

    /// Inclusive passive port range.
    pub fn data_port_range(&self) -> std::ops::RangeInclusive<u16> {
        self.data_port_min..=self.data_port_max
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    pub fn anonymous_root_path(&self) -> Option<PathBuf> {
        self.anonymous_root.as_ref().map(PathBuf::from)
    }

    /// Default anonymous permission letters.
    pub fn anonymous_permissions() -> &'static str {
        ANONYMOUS_PERMISSIONS
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            control_port: 2121,
            pasv_address: None,
            data_port_min: 2558,
            data_port_max: 2560,
            idle_timeout_secs: 300,
            data_timeout_secs: 30,
            max_sessions: 10,
            max_command_length: 512,
            allow_foreign_data_address: false,
            anonymous_enabled: false,
            anonymous_root: None,
            users: Vec::new(),
        }
    }
}
