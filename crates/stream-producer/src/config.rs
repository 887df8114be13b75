// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::errors::ConfigError;

// Service limits, taken from the Kinesis Producer Library configuration.
pub const MAX_RECORD_SIZE: usize = 1 << 20; // 1MiB
pub const MAX_REQUEST_SIZE: usize = 5 << 20; // 5MiB
pub const MAX_RECORDS_PER_REQUEST: usize = 500;
pub const MAX_AGGREGATION_SIZE: usize = 51_200; // 50KB
// The KPL default; in practice MAX_AGGREGATION_SIZE is reached long before.
pub const MAX_AGGREGATION_COUNT: usize = 4_294_967_295;
pub const MAX_PARTITION_KEY_LENGTH: usize = 256;

const DEFAULT_MAX_CONNECTIONS: usize = 24;
const MAX_CONNECTIONS_LIMIT: usize = 256;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Producer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    /// Name of the target stream
    pub stream_name: String,
    /// Regular interval at which buffered records are flushed
    pub flush_interval: Duration,
    /// Maximum number of entries per PutRecords request
    pub batch_count: usize,
    /// Maximum number of bytes per PutRecords request
    pub batch_size: usize,
    /// Maximum number of records packed into one aggregated entry
    pub aggregate_batch_count: usize,
    /// Maximum number of bytes packed into one aggregated entry
    pub aggregate_batch_size: usize,
    /// Capacity of the queue in front of the dispatcher; `put` blocks when full
    pub backlog_count: usize,
    /// Number of PutRecords requests allowed in flight at once
    pub max_connections: usize,
    /// Log the outcome of every record
    pub verbose: bool,
    /// Give up on partially failed records after this many retries.
    /// `None` retries until the records are accepted or a transport error occurs.
    pub max_retries: Option<u32>,
    pub retry_backoff: BackoffConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            batch_count: MAX_RECORDS_PER_REQUEST,
            batch_size: MAX_REQUEST_SIZE,
            aggregate_batch_count: MAX_AGGREGATION_COUNT,
            aggregate_batch_size: MAX_AGGREGATION_SIZE,
            backlog_count: MAX_RECORDS_PER_REQUEST,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            verbose: false,
            max_retries: None,
            retry_backoff: BackoffConfig::default(),
        }
    }
}

impl ProducerConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            stream_name: env::var("PRODUCER_STREAM_NAME").unwrap_or_default(),
            flush_interval: env_parse::<u64>("PRODUCER_FLUSH_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            batch_count: env_parse("PRODUCER_BATCH_COUNT").unwrap_or(defaults.batch_count),
            batch_size: env_parse("PRODUCER_BATCH_SIZE").unwrap_or(defaults.batch_size),
            aggregate_batch_count: env_parse("PRODUCER_AGGREGATE_BATCH_COUNT")
                .unwrap_or(defaults.aggregate_batch_count),
            aggregate_batch_size: env_parse("PRODUCER_AGGREGATE_BATCH_SIZE")
                .unwrap_or(defaults.aggregate_batch_size),
            backlog_count: env_parse("PRODUCER_BACKLOG_COUNT").unwrap_or(defaults.backlog_count),
            max_connections: env_parse("PRODUCER_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            verbose: env::var("PRODUCER_VERBOSE")
                .map(|val| val.to_lowercase() == "true")
                .unwrap_or(defaults.verbose),
            max_retries: env_parse("PRODUCER_MAX_RETRIES"),
            retry_backoff: defaults.retry_backoff,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_name.is_empty() {
            return Err(invalid("stream name length must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(invalid("flush interval must be greater than 0"));
        }
        check_range("batch count", self.batch_count, MAX_RECORDS_PER_REQUEST)?;
        check_range("batch size", self.batch_size, MAX_REQUEST_SIZE)?;
        check_range(
            "aggregate batch count",
            self.aggregate_batch_count,
            MAX_AGGREGATION_COUNT,
        )?;
        check_range(
            "aggregate batch size",
            self.aggregate_batch_size,
            MAX_AGGREGATION_SIZE,
        )?;
        if self.backlog_count == 0 {
            return Err(invalid("backlog count must be greater than 0"));
        }
        check_range("max connections", self.max_connections, MAX_CONNECTIONS_LIMIT)?;
        if self.retry_backoff.min > self.retry_backoff.max {
            return Err(invalid("retry backoff min must not exceed max"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

fn check_range(name: &str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(invalid(&format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
