// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock stream clients for testing

use std::sync::Mutex;

use async_trait::async_trait;
use stream_producer::{PutRecordsOutput, Putter, PutterError, Record, RecordResult};

/// What a mock call does with the records it receives
pub enum CallOutcome {
    Transport(String),
    /// One flag per record, `true` meaning accepted
    PerRecord(Vec<bool>),
}

type Decide = dyn Fn(usize, &[Record]) -> CallOutcome + Send + Sync;

/// Mock putter that records every call and the records it accepted
pub struct MockPutter {
    decide: Box<Decide>,
    calls: Mutex<Vec<Vec<Record>>>,
    accepted: Mutex<Vec<Record>>,
}

#[allow(dead_code)]
impl MockPutter {
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(usize, &[Record]) -> CallOutcome + Send + Sync + 'static,
    {
        Self {
            decide: Box::new(decide),
            calls: Mutex::new(Vec::new()),
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub fn accept_all() -> Self {
        Self::new(|_, records| CallOutcome::PerRecord(vec![true; records.len()]))
    }

    pub fn transport_error() -> Self {
        Self::new(|_, _| CallOutcome::Transport("connection refused".to_string()))
    }

    /// Rejects every record of the first call, accepts everything afterwards
    pub fn fail_first_call() -> Self {
        Self::new(|call, records| CallOutcome::PerRecord(vec![call > 0; records.len()]))
    }

    /// Rejects, on every call, the records whose partition key matches
    pub fn reject_partition_key(key: &'static str) -> Self {
        Self::new(move |_, records| {
            CallOutcome::PerRecord(records.iter().map(|r| r.partition_key != key).collect())
        })
    }

    pub fn calls(&self) -> Vec<Vec<Record>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn accepted(&self) -> Vec<Record> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Putter for MockPutter {
    async fn put_records(
        &self,
        _stream_name: &str,
        records: &[Record],
    ) -> Result<PutRecordsOutput, PutterError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(records.to_vec());
            calls.len() - 1
        };
        match (self.decide)(call, records) {
            CallOutcome::Transport(msg) => Err(PutterError::Transport(msg)),
            CallOutcome::PerRecord(flags) => {
                let mut output = PutRecordsOutput::default();
                let mut accepted = self.accepted.lock().unwrap();
                for (i, (record, ok)) in records.iter().zip(flags).enumerate() {
                    if ok {
                        accepted.push(record.clone());
                        output.records.push(RecordResult::Accepted {
                            shard_id: "shardId-000000000000".to_string(),
                            sequence_number: format!("{call}-{i}"),
                        });
                    } else {
                        output.failed_record_count += 1;
                        output.records.push(RecordResult::Failed {
                            error_code: "ProvisionedThroughputExceededException".to_string(),
                            error_message: "Rate exceeded for shard".to_string(),
                        });
                    }
                }
                Ok(output)
            }
        }
    }
}

/// Mock putter whose calls never complete
pub struct HangingPutter;

#[async_trait]
impl Putter for HangingPutter {
    async fn put_records(
        &self,
        _stream_name: &str,
        _records: &[Record],
    ) -> Result<PutRecordsOutput, PutterError> {
        std::future::pending().await
    }
}
