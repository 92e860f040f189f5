//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::Arena;
use crate::util::time::{tick_period, SIMULATION_TPS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,

    /// Id generator machine id, unique per server process
    pub machine_id: u16,

    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Roster capacity of newly created matches
    pub players_limit: usize,
    /// Foods on the board during a round
    pub foods_limit: usize,
    /// Arena size of newly created matches
    pub arena: Arena,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            machine_id: parse_or("MACHINE_ID", 0)?,

            tick_rate: parse_or("TICK_RATE", SIMULATION_TPS)?,
            players_limit: parse_or("MATCH_PLAYERS_LIMIT", 5)?,
            foods_limit: parse_or("MATCH_FOODS_LIMIT", 1)?,
            arena: Arena::new(
                parse_or("ARENA_HORIZONTAL_TILES", 64)?,
                parse_or("ARENA_VERTICAL_TILES", 36)?,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn tick_period(&self) -> Duration {
        tick_period(self.tick_rate)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }
        if self.players_limit == 0 {
            return Err(ConfigError::Invalid("MATCH_PLAYERS_LIMIT"));
        }
        if self.arena.horizontal <= 0 {
            return Err(ConfigError::Invalid("ARENA_HORIZONTAL_TILES"));
        }
        if self.arena.vertical <= 0 {
            return Err(ConfigError::Invalid("ARENA_VERTICAL_TILES"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            machine_id: 0,
            tick_rate: SIMULATION_TPS,
            players_limit: 5,
            foods_limit: 1,
            arena: Arena::new(64, 36),
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
