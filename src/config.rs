use std::env;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

use crate::session::SessionConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Runtime configuration, read from the environment.
///
/// | Env Var                 | Default   |
/// |-------------------------|-----------|
/// | `DATABASE_URL`          | required  |
/// | `HOST`                  | `0.0.0.0` |
/// | `PORT`                  | `8080`    |
/// | `SESSION_LIFETIME_SECS` | `86400`   |
/// | `SESSION_IDLE_SECS`     | `1200`    |
/// | `COOKIE_SECURE`         | `false`   |
/// | `MIN_PASSWORD_LEN`      | `8`       |
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
    pub cookie_secure: bool,
    pub min_password_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            host: "0.0.0.0".into(),
            port: 8080,
            session: SessionConfig::default(),
            cookie_secure: false,
            min_password_len: 8,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let lifetime: i64 = parse_or("SESSION_LIFETIME_SECS", defaults.session.lifetime.num_seconds())?;
        let idle: i64 = parse_or("SESSION_IDLE_SECS", defaults.session.idle_timeout.num_seconds())?;
        if lifetime <= 0 || idle <= 0 {
            return Err(ConfigError::Invalid {
                var: "SESSION_LIFETIME_SECS/SESSION_IDLE_SECS",
                value: format!("{lifetime}/{idle}"),
            });
        }
        Ok(Self {
            database_url,
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", defaults.port)?,
            session: SessionConfig {
                lifetime: Duration::seconds(lifetime),
                idle_timeout: Duration::seconds(idle),
            },
            cookie_secure: parse_or("COOKIE_SECURE", defaults.cookie_secure)?,
            min_password_len: parse_or("MIN_PASSWORD_LEN", defaults.min_password_len)?,
        })
    }
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_when_unset() {
        let v: u16 = parse_or("LMS_TEST_SURELY_UNSET_PORT", 8080).unwrap();
        assert_eq!(v, 8080);
    }

    #[test]
    fn defaults_match_session_policy() {
        let c = Config::default();
        assert_eq!(c.session.lifetime, Duration::hours(24));
        assert_eq!(c.session.idle_timeout, Duration::minutes(20));
        assert!(!c.cookie_secure);
    }
}
