// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::flusher::Flusher;
use crate::producer::Shared;
use crate::putter::Record;

/// Assembles PutRecords batches from the backlog queue.
///
/// A batch is flushed when the next record would push it over `batch_size`,
/// when it reaches `batch_count` entries, on every `flush_interval` tick, and
/// one last time once the queue is closed and empty.
pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    records: mpsc::Receiver<Record>,
    shutdown: CancellationToken,
    batch: Vec<Record>,
    batch_bytes: usize,
    draining: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        records: mpsc::Receiver<Record>,
        shutdown: CancellationToken,
    ) -> Self {
        let batch = Vec::with_capacity(shared.config.batch_count);
        Self {
            shared,
            records,
            shutdown,
            batch,
            batch_bytes: 0,
            draining: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let period = self.shared.config.flush_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                record = self.records.recv() => match record {
                    Some(record) => self.append(record).await,
                    // every sender is gone: the producer is stopping
                    None => break,
                },
                _ = ticker.tick() => self.on_tick().await,
                _ = shutdown.cancelled(), if !self.draining => {
                    debug!("draining backlog");
                    self.draining = true;
                }
            }
        }

        if !self.batch.is_empty() {
            self.flush("drain").await;
        }
        info!("backlog drained");
    }

    async fn on_tick(&mut self) {
        if let Some(record) = self.shared.drain_if_needed() {
            self.append(record).await;
        }
        if !self.batch.is_empty() {
            self.flush("interval").await;
        }
    }

    async fn append(&mut self, record: Record) {
        // the request size limit covers both data and partition key
        let size = record.size();
        if !self.batch.is_empty() && self.batch_bytes + size > self.shared.config.batch_size {
            self.flush("batch size").await;
        }
        self.batch_bytes += size;
        self.batch.push(record);
        if self.batch.len() >= self.shared.config.batch_count {
            self.flush("batch length").await;
        }
    }

    /// Hands the current batch to a new flush task once a connection slot is
    /// free. Does not wait for the flush itself.
    async fn flush(&mut self, reason: &'static str) {
        let permit = self.shared.semaphore.acquire().await;
        let batch = mem::replace(
            &mut self.batch,
            Vec::with_capacity(self.shared.config.batch_count),
        );
        self.batch_bytes = 0;
        let flusher = Flusher::new(Arc::clone(&self.shared));
        tokio::spawn(flusher.flush(batch, reason, permit));
    }
}
