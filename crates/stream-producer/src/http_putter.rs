// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`Putter`] speaking the JSON PutRecords protocol over HTTP.
//!
//! Requests are not signed. Point it at a local stream emulator or at a
//! proxy that adds credentials.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PutterError;
use crate::putter::{PutRecordsOutput, Putter, Record, RecordResult};

const CONTENT_TYPE_AMZ_JSON: &str = "application/x-amz-json-1.1";
const PUT_RECORDS_TARGET: &str = "Kinesis_20131202.PutRecords";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsRequest<'a> {
    stream_name: &'a str,
    records: Vec<PutRecordsRequestEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsRequestEntry<'a> {
    data: String,
    partition_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsResponse {
    #[serde(default)]
    failed_record_count: usize,
    #[serde(default)]
    records: Vec<PutRecordsResultEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordsResultEntry {
    shard_id: Option<String>,
    sequence_number: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

impl From<PutRecordsResultEntry> for RecordResult {
    fn from(entry: PutRecordsResultEntry) -> Self {
        match entry.error_code {
            Some(error_code) => RecordResult::Failed {
                error_code,
                error_message: entry.error_message.unwrap_or_default(),
            },
            None => RecordResult::Accepted {
                shard_id: entry.shard_id.unwrap_or_default(),
                sequence_number: entry.sequence_number.unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpPutter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPutter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PutterError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Putter for HttpPutter {
    async fn put_records(
        &self,
        stream_name: &str,
        records: &[Record],
    ) -> Result<PutRecordsOutput, PutterError> {
        let request = PutRecordsRequest {
            stream_name,
            records: records
                .iter()
                .map(|record| PutRecordsRequestEntry {
                    data: STANDARD.encode(&record.data),
                    partition_key: &record.partition_key,
                })
                .collect(),
        };

        let body = serde_json::to_vec(&request)
            .map_err(|e| PutterError::Transport(format!("failed to encode request: {e}")))?;

        let time = std::time::Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, CONTENT_TYPE_AMZ_JSON)
            .header("X-Amz-Target", PUT_RECORDS_TARGET)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(
            status = status.as_u16(),
            elapsed_ms = time.elapsed().as_millis() as u64,
            "PutRecords response"
        );

        if !status.is_success() {
            return Err(PutterError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: PutRecordsResponse =
            serde_json::from_slice(&body).map_err(|e| PutterError::Decode(e.to_string()))?;
        Ok(PutRecordsOutput {
            failed_record_count: parsed.failed_record_count,
            records: parsed.records.into_iter().map(RecordResult::from).collect(),
        })
    }
}
