use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::PolicyKind;
use crate::error::{config_error, Error};

#[derive(Clone, Debug)]
pub struct Config {
    pub kafka_bootstrap_servers: String,
    pub group_id: String,
    pub rides_topic: String,
    pub assignments_topic: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub database_url: Option<String>,
    pub http_port: u16,
    pub matching: MatchingConfig,
    pub consumer: ConsumerConfig,
}

#[derive(Clone, Debug)]
pub struct MatchingConfig {
    pub search_radius_km: f64,
    pub policy: PolicyKind,
    pub query_timeout: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 3.0,
            policy: PolicyKind::Uniform,
            query_timeout: Duration::from_millis(2000),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    pub dead_letter_topic: String,
    /// Zero disables the dead-letter path and redelivers forever.
    pub max_deliveries: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            dead_letter_topic: "rides.created.dlq".into(),
            max_deliveries: 5,
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_millis(10_000),
        }
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        Ok(Self {
            kafka_bootstrap_servers: var_or("KAFKA_BOOTSTRAP_SERVERS", "kafka:29092"),
            group_id: var_or("KAFKA_GROUP_ID", "matching-service"),
            rides_topic: var_or("KAFKA_RIDES_TOPIC", "rides.created"),
            assignments_topic: var_or("KAFKA_ASSIGNMENTS_TOPIC", "rides.assigned"),
            redis_host: var_or("REDIS_HOST", "redis"),
            redis_port: parse_or("REDIS_PORT", 6379)?,
            redis_password: optional_var("REDIS_PASSWORD"),
            database_url: optional_var("DATABASE_URL"),
            http_port: parse_or("GEO_SERVICE_PORT", 8005)?,
            matching: MatchingConfig {
                search_radius_km: parse_or("MATCHING_SEARCH_RADIUS_KM", 3.0)?,
                policy: parse_or("MATCHING_POLICY", PolicyKind::Uniform)?,
                query_timeout: Duration::from_millis(parse_or("MATCHING_QUERY_TIMEOUT_MS", 2000)?),
            },
            consumer: ConsumerConfig {
                dead_letter_topic: var_or("KAFKA_DEAD_LETTER_TOPIC", "rides.created.dlq"),
                max_deliveries: parse_or("CONSUMER_MAX_DELIVERIES", 5)?,
                backoff_initial: Duration::from_millis(parse_or(
                    "CONSUMER_BACKOFF_INITIAL_MS",
                    100,
                )?),
                backoff_max: Duration::from_millis(parse_or("CONSUMER_BACKOFF_MAX_MS", 10_000)?),
            },
        })
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/0",
                password, self.redis_host, self.redis_port
            ),
            None => format!("redis://{}:{}/0", self.redis_host, self.redis_port),
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn var_or(key: &str, fallback: &str) -> String {
    optional_var(key).unwrap_or_else(|| fallback.into())
}

fn parse_or<T>(key: &str, fallback: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| config_error(format!("{}={:?}: {}", key, raw, err))),
        None => Ok(fallback),
    }
}
