//! Environment-driven runtime configuration.
//!
//! Every setting has a default, so an empty environment gives a working
//! server on `127.0.0.1:4000`. `main` loads a `.env` file before reading.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use delve_engine::world::WorldConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// How frames are written to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    /// Plain-text map, HUD and messages for telnet-style clients.
    #[default]
    Text,
    /// One JSON-encoded frame per line, for bots.
    Json,
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(FrameFormat::Text),
            "json" => Ok(FrameFormat::Json),
            other => Err(format!("unknown frame format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub tick_interval: Duration,
    pub world: WorldConfig,
    /// JSON Lines file that finished runs are appended to.
    pub run_log: PathBuf,
    pub view_width: i32,
    pub view_height: i32,
    pub frame_format: FrameFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4000)),
            tick_interval: Duration::from_millis(100),
            world: WorldConfig::default(),
            run_log: PathBuf::from("runs.jsonl"),
            view_width: 60,
            view_height: 20,
            frame_format: FrameFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Read `DELVE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let tick_ms = parse(&lookup, "DELVE_TICK_MS", defaults.tick_interval.as_millis() as u64)?;
        let max_sessions = parse(&lookup, "DELVE_MAX_SESSIONS", defaults.world.max_sessions)?;
        let view_width = parse(&lookup, "DELVE_VIEW_WIDTH", defaults.view_width)?;
        let view_height = parse(&lookup, "DELVE_VIEW_HEIGHT", defaults.view_height)?;
        positive("DELVE_TICK_MS", tick_ms)?;
        positive("DELVE_MAX_SESSIONS", max_sessions as u64)?;
        positive("DELVE_VIEW_WIDTH", view_width.max(0) as u64)?;
        positive("DELVE_VIEW_HEIGHT", view_height.max(0) as u64)?;

        Ok(Self {
            bind: parse(&lookup, "DELVE_BIND", defaults.bind)?,
            tick_interval: Duration::from_millis(tick_ms),
            world: WorldConfig {
                seed: parse(&lookup, "DELVE_SEED", defaults.world.seed)?,
                max_sessions,
                ..defaults.world
            },
            run_log: lookup("DELVE_RUN_LOG").map_or(defaults.run_log, PathBuf::from),
            view_width,
            view_height,
            frame_format: parse(&lookup, "DELVE_FRAME_FORMAT", defaults.frame_format)?,
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn positive(var: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { var });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config_from(&[]).unwrap(), ServerConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let cfg = config_from(&[
            ("DELVE_BIND", "0.0.0.0:7777"),
            ("DELVE_TICK_MS", "250"),
            ("DELVE_SEED", "42"),
            ("DELVE_MAX_SESSIONS", "4"),
            ("DELVE_RUN_LOG", "/tmp/runs.jsonl"),
            ("DELVE_VIEW_WIDTH", "80"),
            ("DELVE_VIEW_HEIGHT", "24"),
            ("DELVE_FRAME_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(cfg.bind.port(), 7777);
        assert_eq!(cfg.tick_interval, Duration::from_millis(250));
        assert_eq!(cfg.world.seed, 42);
        assert_eq!(cfg.world.max_sessions, 4);
        assert_eq!(cfg.world.view_radius, WorldConfig::default().view_radius);
        assert_eq!(cfg.run_log, PathBuf::from("/tmp/runs.jsonl"));
        assert_eq!((cfg.view_width, cfg.view_height), (80, 24));
        assert_eq!(cfg.frame_format, FrameFormat::Json);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config_from(&[("DELVE_SEED", "lots")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "DELVE_SEED",
                value: "lots".into()
            }
        );
        assert!(config_from(&[("DELVE_BIND", "nowhere")]).is_err());
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        assert_eq!(
            config_from(&[("DELVE_TICK_MS", "0")]).unwrap_err(),
            ConfigError::Zero { var: "DELVE_TICK_MS" }
        );
        assert!(config_from(&[("DELVE_VIEW_WIDTH", "-3")]).is_err());
    }
}
