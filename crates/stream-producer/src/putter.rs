// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Contract between the producer and the stream service.
//!
//! The producer never talks to the network directly. Every batch goes through a
//! [`Putter`], which submits an ordered list of records to a named stream and
//! reports, for each position, whether the service accepted it.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::PutterError;

/// A single entry of a PutRecords request.
///
/// Entries produced by the aggregator share this shape; their `data` is an
/// aggregation container instead of a raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: Bytes,
    pub partition_key: String,
}

impl Record {
    pub fn new(data: impl Into<Bytes>, partition_key: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            partition_key: partition_key.into(),
        }
    }

    /// Bytes counted against request size limits: payload plus partition key.
    pub fn size(&self) -> usize {
        self.data.len() + self.partition_key.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordResult {
    Accepted {
        shard_id: String,
        sequence_number: String,
    },
    Failed {
        error_code: String,
        error_message: String,
    },
}

/// Per-entry outcome of a PutRecords call, positionally aligned with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRecordsOutput {
    pub failed_record_count: usize,
    pub records: Vec<RecordResult>,
}

#[async_trait]
pub trait Putter: Send + Sync {
    /// Submits `records` to `stream_name`.
    ///
    /// An `Err` means the call itself failed and none of the records should be
    /// assumed delivered. Partial failures are reported through
    /// [`PutRecordsOutput`] instead.
    async fn put_records(
        &self,
        stream_name: &str,
        records: &[Record],
    ) -> Result<PutRecordsOutput, PutterError>;
}
