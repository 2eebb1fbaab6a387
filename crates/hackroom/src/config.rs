//! Configuration for the two binaries.
//!
//! The master reads `hackroom.toml` (or the file named by
//! `HACKROOM_CONFIG`); every field has a default, so a missing file or a
//! partial one is fine. A room process is configured entirely through
//! its environment, since that is all a container runtime hands it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hackroom_engine::{EngineConfig, EngineError};
use hackroom_gateway::{Backoff, RetryPolicy};
use hackroom_protocol::{ProtocolError, Role, RoomKey};
use hackroom_registry::{PortRange, RegistryConfig, BIND_ENV, CONTAINER_PORT, ROOM_KEY_ENV};
use serde::de::value::StrDeserializer;
use serde::de::IntoDeserializer;
use serde::{Deserialize, Serialize};

/// Names the master's config file.
pub const CONFIG_ENV: &str = "HACKROOM_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "hackroom.toml";

/// Overrides the room process capacity.
pub const CAPACITY_ENV: &str = "HACKROOM_CAPACITY";

/// Comma-separated roles dealt by a room process, e.g. `hacker,firewall`.
pub const ROLES_ENV: &str = "HACKROOM_ROLES";

/// Overrides the instructions a room process shows once the game starts.
pub const INSTRUCTIONS_ENV: &str = "HACKROOM_INSTRUCTIONS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} must be set")]
    MissingEnv(&'static str),

    #[error("{name}={value:?} is invalid: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} = {value:?} is not a socket address")]
    InvalidAddr { field: &'static str, value: String },

    #[error("empty port range {start}-{end}")]
    EmptyPortRange { start: u16, end: u16 },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Which [`ProcessRuntime`](hackroom_registry::ProcessRuntime) the master uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// One `hackroom-room` child process per room.
    #[default]
    Process,
    /// Rooms run as tasks inside the master.
    InProcess,
}

/// `[handshake]`, `[query]` and `[join]` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_ms: u64,
    pub backoff: Backoff,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.attempts, Duration::from_millis(self.delay_ms))
            .with_backoff(self.backoff)
    }
}

impl From<RetryPolicy> for RetrySettings {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            attempts: policy.max_attempts,
            delay_ms: u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX),
            backoff: policy.backoff,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetryPolicy::query().into()
    }
}

/// Master configuration, loaded from `hackroom.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Where front ends reach the master.
    pub listen_addr: String,
    /// Host the master dials to reach room ports.
    pub room_host: String,
    pub ports: PortRange,
    pub runtime: RuntimeKind,
    /// Room binary for [`RuntimeKind::Process`].
    pub room_program: PathBuf,
    pub call_timeout_ms: u64,
    pub handshake: RetrySettings,
    pub query: RetrySettings,
    pub join: RetrySettings,
    /// Engine settings for every room. Process rooms get them through
    /// [`room_env`](Self::room_env).
    pub engine: EngineConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7000".to_string(),
            room_host: "127.0.0.1".to_string(),
            ports: PortRange::default(),
            runtime: RuntimeKind::default(),
            room_program: PathBuf::from("hackroom-room"),
            call_timeout_ms: 5_000,
            handshake: RetryPolicy::handshake().into(),
            query: RetryPolicy::query().into(),
            join: RetryPolicy::query().into(),
            engine: EngineConfig::default(),
        }
    }
}

impl MasterConfig {
    /// Loads from `$HACKROOM_CONFIG`, else `hackroom.toml`.
    ///
    /// Only the default path may be missing; a file named explicitly
    /// must exist.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file can't be read or parsed, or
    /// the result fails [`validate`](Self::validate).
    pub fn load() -> Result<Self, ConfigError> {
        let (path, explicit) = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => (PathBuf::from(path), true),
            _ => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let config = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let config = Self::from_toml(&content, &path)?;
                tracing::info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses TOML; `path` is only used in the error.
    ///
    /// # Errors
    /// [`ConfigError::Parse`].
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidAddr {
                field: "listen_addr",
                value: self.listen_addr.clone(),
            });
        }
        if self.ports.is_empty() {
            return Err(ConfigError::EmptyPortRange {
                start: self.ports.start,
                end: self.ports.end,
            });
        }
        if self.handshake.attempts == 0 || self.query.attempts == 0 || self.join.attempts == 0 {
            tracing::warn!("retry attempts of 0 are treated as 1");
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            ports: self.ports,
            handshake: self.handshake.policy(),
            query: self.query.policy(),
            join: self.join.policy(),
            container_port: CONTAINER_PORT,
            ..RegistryConfig::default()
        }
    }

    /// Environment for `hackroom-room` children, carrying [`engine`](Self::engine).
    pub fn room_env(&self) -> Vec<(String, String)> {
        let roles: Vec<String> = self
            .engine
            .roles
            .iter()
            .map(|role| role.to_string().to_lowercase())
            .collect();
        vec![
            (CAPACITY_ENV.to_string(), self.engine.capacity.to_string()),
            (ROLES_ENV.to_string(), roles.join(",")),
            (INSTRUCTIONS_ENV.to_string(), self.engine.instructions.clone()),
        ]
    }
}

fn parse_roles(raw: &str) -> Result<Vec<Role>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let de: StrDeserializer<'_, serde::de::value::Error> = name.into_deserializer();
            Role::deserialize(de).map_err(|e| ConfigError::InvalidEnv {
                name: ROLES_ENV,
                value: raw.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Settings a room process takes from its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomProcessConfig {
    pub room_key: RoomKey,
    pub bind_addr: String,
    pub engine: EngineConfig,
}

impl RoomProcessConfig {
    /// # Errors
    /// [`ConfigError::MissingEnv`] without `ROOM_KEY`, or
    /// [`ConfigError::InvalidEnv`] for a value that doesn't parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_key = lookup(ROOM_KEY_ENV)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnv(ROOM_KEY_ENV))?;
        let room_key = RoomKey::parse(&raw_key).map_err(|e: ProtocolError| {
            ConfigError::InvalidEnv {
                name: ROOM_KEY_ENV,
                value: raw_key.clone(),
                reason: e.to_string(),
            }
        })?;

        let bind_addr = lookup(BIND_ENV)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("0.0.0.0:{CONTAINER_PORT}"));
        if bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidAddr {
                field: BIND_ENV,
                value: bind_addr,
            });
        }

        let mut engine = EngineConfig::default();
        if let Some(raw) = lookup(CAPACITY_ENV) {
            engine.capacity = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    name: CAPACITY_ENV,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(raw) = lookup(ROLES_ENV) {
            engine.roles = parse_roles(&raw)?;
        }
        if let Some(raw) = lookup(INSTRUCTIONS_ENV).filter(|v| !v.is_empty()) {
            engine.instructions = raw;
        }
        engine.validate()?;

        Ok(Self {
            room_key,
            bind_addr,
            engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_master_config() {
        let cfg = MasterConfig::default();
        assert_eq!(cfg.ports, PortRange::new(8001, 8099));
        assert_eq!(cfg.handshake.attempts, 3);
        assert_eq!(cfg.handshake.delay_ms, 2_000);
        assert_eq!(cfg.query.attempts, 5);
        assert_eq!(cfg.call_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.runtime, RuntimeKind::Process);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial_keeps_defaults() {
        let toml = r#"
            listen_addr = "0.0.0.0:9000"
            runtime = "in_process"

            [ports]
            start = 9001
            end = 9003

            [handshake]
            attempts = 10
        "#;
        let cfg = MasterConfig::from_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9000");
        assert_eq!(cfg.runtime, RuntimeKind::InProcess);
        assert_eq!(cfg.ports, PortRange::new(9001, 9003));
        assert_eq!(cfg.handshake.attempts, 10);
        // Unset fields of a present table fall back too.
        assert_eq!(cfg.handshake.delay_ms, 2_000);
        assert_eq!(cfg.room_host, "127.0.0.1");

        let registry = cfg.registry_config();
        assert_eq!(registry.handshake.max_attempts, 10);
        assert_eq!(registry.container_port, 8000);
    }

    #[test]
    fn test_from_toml_garbage_is_parse_error() {
        let err = MasterConfig::from_toml("ports = 12", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_validate_rejects_bad_listen_addr() {
        let cfg = MasterConfig {
            listen_addr: "not an address".into(),
            ..MasterConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidAddr { field: "listen_addr", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_mismatched_roles() {
        let mut cfg = MasterConfig::default();
        cfg.engine.capacity = 4;
        assert!(matches!(cfg.validate(), Err(ConfigError::Engine(_))));
    }

    #[test]
    fn test_room_config_requires_room_key() {
        let err = RoomProcessConfig::from_lookup(env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("ROOM_KEY")));
    }

    #[test]
    fn test_room_config_defaults_bind_addr() {
        let cfg = RoomProcessConfig::from_lookup(env(&[("ROOM_KEY", "ab12cd")])).unwrap();
        assert_eq!(cfg.room_key.as_str(), "AB12CD");
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
        assert_eq!(cfg.engine, EngineConfig::default());
    }

    #[test]
    fn test_room_config_reads_bind_and_capacity() {
        let cfg = RoomProcessConfig::from_lookup(env(&[
            ("ROOM_KEY", "AB12CD"),
            ("HACKROOM_BIND", "127.0.0.1:8042"),
            ("HACKROOM_CAPACITY", "3"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8042");
        assert_eq!(cfg.engine.capacity, 3);
    }

    #[test]
    fn test_room_config_rejects_bad_values() {
        let bad_key = RoomProcessConfig::from_lookup(env(&[("ROOM_KEY", "nope")])).unwrap_err();
        assert!(matches!(bad_key, ConfigError::InvalidEnv { name: "ROOM_KEY", .. }));

        let bad_capacity = RoomProcessConfig::from_lookup(env(&[
            ("ROOM_KEY", "AB12CD"),
            ("HACKROOM_CAPACITY", "three"),
        ]))
        .unwrap_err();
        assert!(matches!(
            bad_capacity,
            ConfigError::InvalidEnv {
                name: "HACKROOM_CAPACITY",
                ..
            }
        ));

        let bad_role = RoomProcessConfig::from_lookup(env(&[
            ("ROOM_KEY", "AB12CD"),
            ("HACKROOM_ROLES", "hacker,wizard"),
        ]))
        .unwrap_err();
        assert!(matches!(
            bad_role,
            ConfigError::InvalidEnv {
                name: "HACKROOM_ROLES",
                ..
            }
        ));

        // Capacity 2 no longer matches the three default roles.
        let mismatch = RoomProcessConfig::from_lookup(env(&[
            ("ROOM_KEY", "AB12CD"),
            ("HACKROOM_CAPACITY", "2"),
        ]))
        .unwrap_err();
        assert!(matches!(mismatch, ConfigError::Engine(_)));
    }

    #[test]
    fn test_room_config_reads_capacity_and_roles() {
        let cfg = RoomProcessConfig::from_lookup(env(&[
            ("ROOM_KEY", "AB12CD"),
            ("HACKROOM_CAPACITY", "4"),
            ("HACKROOM_ROLES", "hacker, hacker,firewall,auditor"),
            ("HACKROOM_INSTRUCTIONS", "find them"),
        ]))
        .unwrap();
        assert_eq!(cfg.engine.capacity, 4);
        assert_eq!(
            cfg.engine.roles,
            vec![Role::Hacker, Role::Hacker, Role::Firewall, Role::Auditor]
        );
        assert_eq!(cfg.engine.instructions, "find them");
    }

    #[test]
    fn test_room_env_carries_master_engine_config() {
        let toml = r#"
            [engine]
            capacity = 5
            roles = ["hacker", "hacker", "firewall", "auditor", "auditor"]
            instructions = "five seats"
        "#;
        let master = MasterConfig::from_toml(toml, Path::new("test.toml")).unwrap();
        assert!(master.validate().is_ok());

        let mut vars = master.room_env();
        vars.push(("ROOM_KEY".into(), "AB12CD".into()));
        let lookup = move |name: &str| vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());

        let room = RoomProcessConfig::from_lookup(lookup).unwrap();
        assert_eq!(room.engine, master.engine);
    }

    #[test]
    fn test_registry_config_takes_join_policy() {
        let toml = r#"
            [join]
            attempts = 2
            delay_ms = 10
        "#;
        let cfg = MasterConfig::from_toml(toml, Path::new("test.toml")).unwrap();
        let registry = cfg.registry_config();
        assert_eq!(registry.join, RetryPolicy::fixed(2, Duration::from_millis(10)));
    }
}
