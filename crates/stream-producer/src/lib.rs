// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching, aggregating and retrying producer for PutRecords-style stream
//! services.
//!
//! Records handed to [`Producer::put`] are packed into aggregated containers
//! when small enough, grouped into size- and count-bounded batches, and
//! submitted through a [`Putter`] by a bounded pool of concurrent flushes.
//! Partially failed batches are retried with jittered exponential backoff;
//! records that cannot be delivered are reported on the channel returned by
//! [`Producer::notify_failures`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod backoff;
pub mod config;
mod dispatcher;
pub mod errors;
mod flusher;
pub mod http_putter;
pub mod producer;
pub mod putter;
pub mod semaphore;

pub use aggregator::{extract_records, is_aggregated, Aggregator};
pub use config::ProducerConfig;
pub use errors::{FlushError, PutError, PutterError};
pub use producer::{FailureListener, FailureRecord, Producer};
pub use putter::{PutRecordsOutput, Putter, Record, RecordResult};
