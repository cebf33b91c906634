//! Configuration for the VJudge dispatch core (spec §6.4).

use std::env;

/// Redis connection and queue-key configuration (`REDIS_CONFIG`).
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub submit_queue: String,
    pub problem_queue: String,
}

impl RedisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("REDIS_CONFIG_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("REDIS_CONFIG_PORT")
                .unwrap_or_else(|_| "6379".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("REDIS_CONFIG_PORT".to_string()))?,
            db: env::var("REDIS_CONFIG_DB")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("REDIS_CONFIG_DB".to_string()))?,
            submit_queue: env::var("REDIS_CONFIG_SUBMIT_QUEUE")
                .unwrap_or_else(|_| "submit_queue".to_string()),
            problem_queue: env::var("REDIS_CONFIG_PROBLEM_QUEUE")
                .unwrap_or_else(|_| "problem_queue".to_string()),
        })
    }

    pub fn connection_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Tunable policy knobs (spec §9 open questions: the idle-reap interval and
/// the `LoginExpired` re-enqueue retry bound are policy decisions, not
/// hard-coded constants).
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// How long a per-OJ submitter group may sit idle before being torn
    /// down (spec §4.4 `clean_free_submitters`). Default 1h.
    pub idle_reap_interval_secs: u64,

    /// How often `SubmitterHandler`'s main loop checks whether a reap is
    /// due (spec §4.4: "block-pop ... with a 600s timeout").
    pub submit_handler_poll_timeout_secs: u64,

    /// How often `CrawlerHandler`'s main loop wakes to trigger periodic
    /// refresh (spec §4.5, §5: 600s).
    pub crawl_handler_poll_timeout_secs: u64,

    /// Submitter's dequeue wake interval to observe the stop flag (spec
    /// §4.1: 60s).
    pub submitter_dequeue_timeout_secs: u64,

    /// Maximum status-poll attempts before `Judge Failed` (spec §4.2: 120,
    /// cumulative back-off `sum(0..120) ~= 2h`).
    pub max_poll_attempts: u32,

    /// Bounded retry count for `LoginExpired` during submit, so a
    /// persistently-failing login can't loop forever (spec §9 open
    /// question: "suggested 3").
    pub max_login_retries: u32,

    /// Forward-prefetch window for newly published problems (spec §4.5:
    /// "the 20 successors of its current maximum problem_id").
    pub prefetch_window: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            idle_reap_interval_secs: 3600,
            submit_handler_poll_timeout_secs: 600,
            crawl_handler_poll_timeout_secs: 600,
            submitter_dequeue_timeout_secs: 60,
            max_poll_attempts: 120,
            max_login_retries: 3,
            prefetch_window: 20,
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            idle_reap_interval_secs: env_or(
                "VJUDGE_IDLE_REAP_INTERVAL_SECS",
                defaults.idle_reap_interval_secs,
            )?,
            submit_handler_poll_timeout_secs: env_or(
                "VJUDGE_SUBMIT_HANDLER_POLL_TIMEOUT_SECS",
                defaults.submit_handler_poll_timeout_secs,
            )?,
            crawl_handler_poll_timeout_secs: env_or(
                "VJUDGE_CRAWL_HANDLER_POLL_TIMEOUT_SECS",
                defaults.crawl_handler_poll_timeout_secs,
            )?,
            submitter_dequeue_timeout_secs: env_or(
                "VJUDGE_SUBMITTER_DEQUEUE_TIMEOUT_SECS",
                defaults.submitter_dequeue_timeout_secs,
            )?,
            max_poll_attempts: env_or("VJUDGE_MAX_POLL_ATTEMPTS", defaults.max_poll_attempts)?,
            max_login_retries: env_or("VJUDGE_MAX_LOGIN_RETRIES", defaults.max_login_retries)?,
            prefetch_window: env_or("VJUDGE_PREFETCH_WINDOW", defaults.prefetch_window)?,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

/// Top-level configuration for the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub redis: RedisConfig,
    pub policy: PolicyConfig,
    /// Path to the `OJ_CONFIG` accounts document (spec §6.4).
    pub oj_config_path: String,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            redis: RedisConfig::from_env()?,
            policy: PolicyConfig::from_env()?,
            oj_config_path: env::var("OJ_CONFIG")
                .map_err(|_| ConfigError::Missing("OJ_CONFIG".to_string()))?,
            metrics_port: env_or("METRICS_PORT", 9092u16)?,
        })
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults_match_spec() {
        let p = PolicyConfig::default();
        assert_eq!(p.idle_reap_interval_secs, 3600);
        assert_eq!(p.max_poll_attempts, 120);
        assert_eq!(p.max_login_retries, 3);
        assert_eq!(p.prefetch_window, 20);
    }

    #[test]
    fn redis_connection_url_format() {
        let cfg = RedisConfig {
            host: "localhost".into(),
            port: 6379,
            db: 2,
            submit_queue: "submit_queue".into(),
            problem_queue: "problem_queue".into(),
        };
        assert_eq!(cfg.connection_url(), "redis://localhost:6379/2");
    }
}
