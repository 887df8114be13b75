// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for producer integration tests

use std::time::Duration;

use bytes::Bytes;
use stream_producer::backoff::BackoffConfig;
use stream_producer::{extract_records, is_aggregated, ProducerConfig, Record};
use tokio::time::{sleep, timeout};

/// Config with short intervals and millisecond backoff so tests run quickly
pub fn test_config() -> ProducerConfig {
    ProducerConfig {
        flush_interval: Duration::from_millis(50),
        retry_backoff: BackoffConfig {
            min: Duration::from_millis(1),
            max: Duration::from_millis(10),
            ..Default::default()
        },
        ..ProducerConfig::new("test-stream")
    }
}

/// Expands aggregated containers into their logical records
pub fn logical_records(records: &[Record]) -> Vec<Record> {
    records
        .iter()
        .flat_map(|record| {
            if is_aggregated(record) {
                extract_records(record)
            } else {
                vec![record.clone()]
            }
        })
        .collect()
}

/// Sorts records so collections can be compared regardless of delivery order
pub fn sorted(mut records: Vec<(Bytes, String)>) -> Vec<(Bytes, String)> {
    records.sort();
    records
}

pub fn pairs(records: &[Record]) -> Vec<(Bytes, String)> {
    records
        .iter()
        .map(|r| (r.data.clone(), r.partition_key.clone()))
        .collect()
}

/// Polls `condition` until it holds or `limit` elapses
pub async fn wait_for<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    timeout(limit, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
