// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record aggregation.
//!
//! Small records are packed into a single container entry so that one network
//! entry carries many logical records. The container layout is the one used by
//! the Kinesis Producer Library, so any KCL-compatible consumer can
//! de-aggregate it:
//!
//! ```text
//! magic number (4 bytes) | protobuf AggregatedRecord | md5(AggregatedRecord) (16 bytes)
//! ```
//!
//! All records in a container currently share one partition key: the key of
//! the first record put after the last drain.

use bytes::Bytes;
use md5::{Digest, Md5};
use prost::Message;

use crate::errors::AggregationError;
use crate::putter::Record;

pub const MAGIC_NUMBER: [u8; 4] = [0xF3, 0x89, 0x9A, 0xC2];

const CHECKSUM_SIZE: usize = 16;

#[derive(Clone, PartialEq, Message)]
pub struct AggregatedRecord {
    #[prost(string, repeated, tag = "1")]
    pub partition_key_table: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub explicit_hash_key_table: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub records: Vec<AggregatedEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AggregatedEntry {
    #[prost(uint64, required, tag = "1")]
    pub partition_key_index: u64,
    #[prost(uint64, optional, tag = "2")]
    pub explicit_hash_key_index: Option<u64>,
    #[prost(bytes = "bytes", required, tag = "3")]
    pub data: Bytes,
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<Tag>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Tag {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

/// Accumulates records until drained into one container entry.
///
/// Not synchronized; the producer guards it with its own lock.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: Vec<AggregatedEntry>,
    partition_keys: Vec<String>,
    nbytes: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held, including the partition key (counted once).
    pub fn size(&self) -> usize {
        self.nbytes
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn put(&mut self, data: Bytes, partition_key: &str) {
        // One partition key per container; later keys are not recorded.
        if self.partition_keys.is_empty() {
            self.partition_keys.push(partition_key.to_string());
            self.nbytes += partition_key.len();
        }
        let partition_key_index = (self.partition_keys.len() - 1) as u64;
        self.nbytes += data.len();
        self.records.push(AggregatedEntry {
            partition_key_index,
            explicit_hash_key_index: None,
            data,
            tags: Vec::new(),
        });
    }

    /// Builds a container entry out of everything held and resets the aggregator.
    ///
    /// Returns `Ok(None)` when there is nothing to drain. On an encoding error
    /// the buffered records are kept so a later drain can try again.
    pub fn drain(&mut self) -> Result<Option<Record>, AggregationError> {
        if self.nbytes == 0 {
            return Ok(None);
        }
        let message = AggregatedRecord {
            partition_key_table: self.partition_keys.clone(),
            explicit_hash_key_table: Vec::new(),
            records: self.records.clone(),
        };
        let mut encoded = Vec::with_capacity(message.encoded_len());
        message.encode(&mut encoded)?;

        let checksum = Md5::digest(&encoded);
        let mut data = Vec::with_capacity(MAGIC_NUMBER.len() + encoded.len() + CHECKSUM_SIZE);
        data.extend_from_slice(&MAGIC_NUMBER);
        data.extend_from_slice(&encoded);
        data.extend_from_slice(&checksum);

        let partition_key = std::mem::take(&mut self.partition_keys)
            .into_iter()
            .next()
            .unwrap_or_default();
        self.clear();
        Ok(Some(Record::new(data, partition_key)))
    }

    fn clear(&mut self) {
        self.records = Vec::new();
        self.partition_keys = Vec::new();
        self.nbytes = 0;
    }
}

/// Whether `record` holds an aggregation container rather than a raw payload.
pub fn is_aggregated(record: &Record) -> bool {
    record.data.starts_with(&MAGIC_NUMBER)
}

/// Decodes an aggregation container back into its logical records.
///
/// Anything malformed (too short, bad checksum, undecodable message or a
/// dangling partition key index) yields an empty list.
pub fn extract_records(record: &Record) -> Vec<Record> {
    let data = &record.data;
    if data.len() < MAGIC_NUMBER.len() + CHECKSUM_SIZE || !is_aggregated(record) {
        return Vec::new();
    }
    let message_end = data.len() - CHECKSUM_SIZE;
    let message = data.slice(MAGIC_NUMBER.len()..message_end);
    if Md5::digest(&message).as_slice() != &data[message_end..] {
        return Vec::new();
    }
    let Ok(decoded) = AggregatedRecord::decode(message) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(decoded.records.len());
    for entry in decoded.records {
        let Some(partition_key) = usize::try_from(entry.partition_key_index)
            .ok()
            .and_then(|index| decoded.partition_key_table.get(index))
        else {
            return Vec::new();
        };
        out.push(Record {
            data: entry.data,
            partition_key: partition_key.clone(),
        });
    }
    out
}
