//! Venue connection settings.
//!
//! A `VenueConfig` names one venue account: where its gateway front lives, the
//! credentials to log in with, and the handshake quirks of that venue family.
//! Configs are JSON documents; a default simulated venue is embedded.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::Credentials;
use crate::error::VenueError;
use crate::records::PositionPolicy;

/// Gateway front address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Front IP address.
    pub ip: String,
    /// Front port.
    pub port: u16,
    /// Full front address (`tcp://ip:port`) for venues that connect by URL.
    #[serde(default)]
    pub front_address: Option<String>,
}

impl HostConfig {
    /// Address passed to the gateway's connect operation.
    pub fn address(&self) -> String {
        match &self.front_address {
            Some(address) => address.clone(),
            None => format!("tcp://{}:{}", self.ip, self.port),
        }
    }
}

/// Handshake differences between venue families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeProfile {
    /// Send an authenticate request between connect and login.
    #[serde(default = "default_true")]
    pub requires_authenticate: bool,
    /// Login completes on the separate ready event instead of the login response.
    #[serde(default)]
    pub awaits_ready: bool,
    /// Login response codes that are notices rather than failures.
    #[serde(default)]
    pub ignored_login_codes: Vec<i32>,
}

impl Default for HandshakeProfile {
    fn default() -> Self {
        HandshakeProfile {
            requires_authenticate: true,
            awaits_ready: false,
            ignored_login_codes: Vec::new(),
        }
    }
}

impl HandshakeProfile {
    /// Whether a login response with `code` should fail the handshake.
    pub fn is_login_failure(&self, code: i32) -> bool {
        code != 0 && !self.ignored_login_codes.contains(&code)
    }
}

fn default_true() -> bool {
    true
}

fn default_market_depth() -> usize {
    5
}

fn default_position_policy() -> PositionPolicy {
    PositionPolicy::Accumulate
}

/// Settings for one venue session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue identity used in logs and alerts.
    pub name: String,
    /// Gateway front.
    pub host: HostConfig,
    /// Login material.
    pub credentials: Credentials,
    /// Handshake quirks.
    #[serde(default)]
    pub profile: HandshakeProfile,
    /// How this venue reports positions.
    #[serde(default = "default_position_policy")]
    pub position_policy: PositionPolicy,
    /// Number of book levels tracked per quote.
    #[serde(default = "default_market_depth")]
    pub market_depth: usize,
    /// Optional deadline for blocking waits; unbounded when absent.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl VenueConfig {
    /// Deadline applied to handshake and sweep waits.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Account the session trades and persists under.
    pub fn account(&self) -> &str {
        &self.credentials.user_id
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), VenueError> {
        if self.name.trim().is_empty() {
            return Err(VenueError::Config(String::from("venue name is empty")));
        }
        if self.credentials.user_id.trim().is_empty() {
            return Err(VenueError::Config(format!("{}: user id is empty", self.name)));
        }
        if self.market_depth == 0 {
            return Err(VenueError::Config(format!("{}: market depth must be at least 1", self.name)));
        }
        Ok(())
    }
}

/// Load and validate a venue configuration from a JSON file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VenueConfig, VenueError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load and validate a venue configuration from a JSON string.
pub fn load_config_from_str(json: &str) -> Result<VenueConfig, VenueError> {
    let config: VenueConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Load the default embedded configuration (a simulated venue).
pub fn load_default_config() -> Result<VenueConfig, VenueError> {
    load_config_from_str(include_str!("default_venue.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = load_default_config().unwrap();
        assert_eq!(config.name, "simulated");
        assert_eq!(config.host.address(), "tcp://127.0.0.1:7000");
        assert!(config.wait_timeout().is_none());
    }

    #[test]
    fn optional_fields_take_defaults() {
        let config = load_config_from_str(
            r#"{
                "name": "esunny-domestic",
                "host": { "ip": "10.0.0.1", "port": 6060 },
                "credentials": { "user_id": "Q1001", "password": "pw" },
                "profile": { "requires_authenticate": false, "awaits_ready": true, "ignored_login_codes": [10003] },
                "position_policy": "accumulate",
                "wait_timeout_ms": 1500
            }"#,
        )
        .unwrap();
        assert_eq!(config.market_depth, 5);
        assert_eq!(config.wait_timeout(), Some(Duration::from_millis(1500)));
        assert!(!config.profile.is_login_failure(10003));
        assert!(config.profile.is_login_failure(1));
        assert!(!config.profile.is_login_failure(0));
    }

    #[test]
    fn validation_rejects_empty_user() {
        let err = load_config_from_str(
            r#"{ "name": "x", "host": { "ip": "1.1.1.1", "port": 1 },
                 "credentials": { "user_id": " ", "password": "" } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, VenueError::Config(_)));
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, VenueError::Io(_)));
    }
}
