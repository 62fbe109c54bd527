//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Allowed client origins for CORS (comma-separated); permissive when unset
    pub client_origin: Option<String>,
    /// Spawn layout file; the built-in arena is used when unset
    pub level_path: Option<PathBuf>,

    /// Authoritative ticks per second
    pub tick_rate: u32,
    /// Delay between death and respawn
    pub respawn_delay: Duration,
    /// Maximum number of joined participants
    pub max_participants: usize,
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

        let tick_rate: u32 = parse_or("TICK_RATE", 30)?;
        if tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").ok(),
            level_path: env::var("LEVEL_PATH").ok().map(PathBuf::from),

            tick_rate,
            respawn_delay: Duration::try_from_secs_f32(parse_or("RESPAWN_DELAY_SECS", 3.0_f32)?)
                .map_err(|_| ConfigError::Invalid("RESPAWN_DELAY_SECS"))?,
            max_participants: parse_or("MAX_PARTICIPANTS", 16)?,
        })
    }

    /// Duration of one authoritative tick
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate as u64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: None,
            level_path: None,
            tick_rate: 30,
            respawn_delay: Duration::from_secs(3),
            max_participants: 16,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.respawn_delay, Duration::from_secs(3));
        assert_eq!(config.tick_duration(), Duration::from_micros(33_333));
    }
}
