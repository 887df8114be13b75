// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::aggregator::{extract_records, is_aggregated};
use crate::backoff::Backoff;
use crate::errors::FlushError;
use crate::producer::{FailureRecord, Shared};
use crate::putter::{PutRecordsOutput, Record, RecordResult};
use crate::semaphore::Permit;

/// Submits one batch and retries its partially failed records.
pub(crate) struct Flusher {
    shared: Arc<Shared>,
}

impl Flusher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Runs until every record is accepted, a transport error occurs, or the
    /// optional retry ceiling is hit. `_permit` holds the connection slot for
    /// the whole sequence.
    pub(crate) async fn flush(self, mut records: Vec<Record>, reason: &'static str, _permit: Permit) {
        let config = &self.shared.config;
        let mut backoff = Backoff::new(config.retry_backoff);
        let mut reason = reason;

        loop {
            info!(reason, records = records.len(), "flushing records");
            let output = match self
                .shared
                .client
                .put_records(&config.stream_name, &records)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    // transport errors are not retried at this layer
                    error!(error = %e, records = records.len(), "flush");
                    self.dispatch_failures(records, Arc::new(FlushError::Transport(e)))
                        .await;
                    return;
                }
            };

            if config.verbose {
                log_results(&output);
            }

            if output.failed_record_count == 0 {
                return;
            }
            let (failed, last_error) = failures(records, &output);
            if failed.is_empty() {
                warn!(
                    failures = output.failed_record_count,
                    "service reported failures without flagging any record"
                );
                return;
            }

            if let Some(max_retries) = config.max_retries {
                if backoff.attempt() >= max_retries {
                    let attempts = backoff.attempt() + 1;
                    let (error_code, error_message) = last_error.unwrap_or_default();
                    error!(failures = failed.len(), attempts, "giving up on records");
                    self.dispatch_failures(
                        failed,
                        Arc::new(FlushError::RetriesExhausted {
                            attempts,
                            error_code,
                            error_message,
                        }),
                    )
                    .await;
                    return;
                }
            }

            let delay = backoff.duration();
            warn!(failures = failed.len(), backoff = ?delay, "put failures");
            tokio::time::sleep(delay).await;

            reason = "retry";
            records = failed;
        }
    }

    /// Reports `records` on the failure channel, one entry per logical record.
    async fn dispatch_failures(&self, records: Vec<Record>, error: Arc<FlushError>) {
        let Some(failure_tx) = self.shared.failure_sender() else {
            return;
        };
        for record in records {
            let logical = if is_aggregated(&record) {
                extract_records(&record)
            } else {
                vec![record]
            };
            for record in logical {
                let failure = FailureRecord {
                    error: Arc::clone(&error),
                    data: record.data,
                    partition_key: record.partition_key,
                };
                if failure_tx.send(failure).await.is_err() {
                    debug!("failure listener dropped");
                    return;
                }
            }
        }
    }
}

/// Splits out the records that need another attempt, along with the last
/// error reported for them. Records without a matching result are treated as
/// failed.
fn failures(
    records: Vec<Record>,
    output: &PutRecordsOutput,
) -> (Vec<Record>, Option<(String, String)>) {
    let mut failed = Vec::new();
    let mut last_error = None;
    for (i, record) in records.into_iter().enumerate() {
        match output.records.get(i) {
            Some(RecordResult::Accepted { .. }) => {}
            Some(RecordResult::Failed {
                error_code,
                error_message,
            }) => {
                last_error = Some((error_code.clone(), error_message.clone()));
                failed.push(record);
            }
            None => failed.push(record),
        }
    }
    (failed, last_error)
}

fn log_results(output: &PutRecordsOutput) {
    for (index, result) in output.records.iter().enumerate() {
        match result {
            RecordResult::Accepted {
                shard_id,
                sequence_number,
            } => info!(index, %shard_id, %sequence_number, "record result"),
            RecordResult::Failed {
                error_code,
                error_message,
            } => info!(index, %error_code, %error_message, "record result"),
        }
    }
}
