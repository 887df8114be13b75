// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors returned synchronously from `Producer::put`. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PutError {
    #[error("Unable to Put record. Producer is already stopped")]
    StoppedProducer,

    #[error("Data must be less than or equal to 1MB in size, got {size} bytes (max {max})")]
    RecordSizeExceeded { size: usize, max: usize },

    #[error("Invalid partition key. Length must be at least 1 and at most 256, got {len}")]
    IllegalPartitionKey { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Producer already started")]
    AlreadyStarted,

    #[error("Producer not running")]
    NotRunning,

    #[error("Producer already stopped")]
    AlreadyStopped,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("failed to encode aggregated record: {0}")]
    Encode(#[from] prost::EncodeError),
}

/// Errors raised by a [`crate::putter::Putter`] when the call itself fails.
#[derive(Debug, thiserror::Error)]
pub enum PutterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Reason attached to every `FailureRecord` of a flush that gave up.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error(transparent)]
    Transport(#[from] PutterError),

    #[error("giving up after {attempts} attempts: {error_code}: {error_message}")]
    RetriesExhausted {
        attempts: u32,
        error_code: String,
        error_message: String,
    },
}
