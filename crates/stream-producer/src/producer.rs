// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching producer.
//!
//! `put` either hands a record straight to the backlog queue (when it is too
//! large to aggregate) or appends it to the shared [`Aggregator`], pushing the
//! previous container to the queue when the new record would overflow it. A
//! single dispatcher task drains the queue into PutRecords batches and spawns
//! one flush task per batch, bounded by `max_connections`.
//!
//! ```text
//!  put ──► Aggregator ──drain──┐
//!   │                          v
//!   └──── (too large) ───► backlog queue ──► Dispatcher ──► flush tasks ──► Putter
//!                                                               │
//!                                          failure listener ◄───┘
//! ```

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregator::Aggregator;
use crate::config::{ProducerConfig, MAX_PARTITION_KEY_LENGTH, MAX_RECORD_SIZE};
use crate::dispatcher::Dispatcher;
use crate::errors::{ConfigError, FlushError, LifecycleError, PutError};
use crate::putter::{Putter, Record};
use crate::semaphore::Semaphore;

/// A logical record that could not be delivered.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub error: Arc<FlushError>,
    pub data: Bytes,
    pub partition_key: String,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to put record with partition key {}: {}",
            self.partition_key, self.error
        )
    }
}

impl std::error::Error for FailureRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// Receiving side of the failure channel. Clones share the same channel.
#[derive(Debug, Clone)]
pub struct FailureListener {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<FailureRecord>>>,
}

impl FailureListener {
    /// Next undeliverable record, or `None` once the producer has stopped and
    /// every failure has been received.
    pub async fn recv(&self) -> Option<FailureRecord> {
        self.rx.lock().await.recv().await
    }

    /// Drains all failures until the channel is closed.
    pub async fn collect(&self) -> Vec<FailureRecord> {
        let mut rx = self.rx.lock().await;
        let mut out = Vec::new();
        while let Some(failure) = rx.recv().await {
            out.push(failure);
        }
        out
    }
}

pub(crate) struct State {
    pub(crate) aggregator: Aggregator,
    records_tx: Option<mpsc::Sender<Record>>,
    pub(crate) failure_tx: Option<mpsc::Sender<FailureRecord>>,
    listener: Option<FailureListener>,
    stopped: bool,
}

/// State shared by the producer handles, the dispatcher and the flush tasks.
pub(crate) struct Shared {
    pub(crate) config: ProducerConfig,
    pub(crate) client: Arc<dyn Putter>,
    pub(crate) semaphore: Semaphore,
    state: RwLock<State>,
}

impl Shared {
    #[allow(clippy::expect_used)]
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().expect("lock poisoned")
    }

    #[allow(clippy::expect_used)]
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().expect("lock poisoned")
    }

    /// Drains the aggregator if it holds anything.
    pub(crate) fn drain_if_needed(&self) -> Option<Record> {
        if self.read().aggregator.size() == 0 {
            return None;
        }
        let drained = self.write().aggregator.drain();
        match drained {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "drain aggregator");
                None
            }
        }
    }

    /// Sender for the failure channel, if a listener was registered.
    pub(crate) fn failure_sender(&self) -> Option<mpsc::Sender<FailureRecord>> {
        self.read().failure_tx.clone()
    }
}

enum Lifecycle {
    Idle(mpsc::Receiver<Record>),
    Running(JoinHandle<()>),
    Stopping,
    Stopped,
}

/// Handle to a batching producer. Cheap to clone; all clones drive the same
/// producer.
#[derive(Clone)]
pub struct Producer {
    shared: Arc<Shared>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl Producer {
    /// Creates a producer. The configuration is validated up front and an
    /// invalid one is refused.
    pub fn new(config: ProducerConfig, client: Arc<dyn Putter>) -> Result<Self, ConfigError> {
        config.validate()?;
        let (records_tx, records_rx) = mpsc::channel(config.backlog_count);
        let semaphore = Semaphore::new(config.max_connections);
        let state = State {
            aggregator: Aggregator::new(),
            records_tx: Some(records_tx),
            failure_tx: None,
            listener: None,
            stopped: false,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                client,
                semaphore,
                state: RwLock::new(state),
            }),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Idle(records_rx))),
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.shared.config
    }

    /// Puts `data` with `partition_key`.
    ///
    /// Returns once the record is buffered. Delivery is asynchronous and
    /// retried on partial failures; records that cannot be delivered are
    /// reported through [`Producer::notify_failures`]. Blocks while the backlog
    /// queue is full.
    pub async fn put(
        &self,
        data: impl Into<Bytes>,
        partition_key: impl Into<String>,
    ) -> Result<(), PutError> {
        let data = data.into();
        let partition_key = partition_key.into();

        let records_tx = {
            let state = self.shared.read();
            match (&state.records_tx, state.stopped) {
                (Some(tx), false) => tx.clone(),
                _ => return Err(PutError::StoppedProducer),
            }
        };
        if data.len() > MAX_RECORD_SIZE {
            return Err(PutError::RecordSizeExceeded {
                size: data.len(),
                max: MAX_RECORD_SIZE,
            });
        }
        let key_len = partition_key.len();
        if key_len < 1 || key_len > MAX_PARTITION_KEY_LENGTH {
            return Err(PutError::IllegalPartitionKey { len: key_len });
        }

        let config = &self.shared.config;
        let nbytes = data.len() + key_len;
        // too large to aggregate, send it as a plain record
        if nbytes > config.aggregate_batch_size {
            return records_tx
                .send(Record {
                    data,
                    partition_key,
                })
                .await
                .map_err(|_| PutError::StoppedProducer);
        }

        let drained = {
            let mut state = self.shared.write();
            // stop may have drained the aggregator since the check above
            if state.stopped {
                return Err(PutError::StoppedProducer);
            }
            let aggregator = &mut state.aggregator;
            let need_to_drain = nbytes + aggregator.size() > config.aggregate_batch_size
                || aggregator.count() >= config.aggregate_batch_count;
            let drained = if need_to_drain {
                aggregator.drain().unwrap_or_else(|e| {
                    error!(error = %e, "drain aggregator");
                    None
                })
            } else {
                None
            };
            aggregator.put(data, &partition_key);
            drained
        };

        // The send may block on a full backlog, so it happens after the lock
        // is released; the dispatcher needs the same lock to drain on ticks.
        if let Some(record) = drained {
            records_tx
                .send(record)
                .await
                .map_err(|_| PutError::StoppedProducer)?;
        }
        Ok(())
    }

    /// Registers a listener for records that could not be delivered.
    ///
    /// Must be called before [`Producer::stop`] to observe failures. Every call
    /// returns a handle to the same channel, which is closed once `stop`
    /// completes.
    ///
    /// The channel holds at most `backlog_count` failures and flushes wait for
    /// room in it. The listener has to be read while the producer runs:
    /// reading only after `stop` returns deadlocks `stop` as soon as more
    /// than `backlog_count` records fail.
    pub fn notify_failures(&self) -> FailureListener {
        let mut state = self.shared.write();
        if let Some(listener) = &state.listener {
            return listener.clone();
        }
        let (tx, rx) = mpsc::channel(self.shared.config.backlog_count);
        let listener = FailureListener {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        };
        state.failure_tx = Some(tx);
        state.listener = Some(listener.clone());
        listener
    }

    /// Spawns the dispatcher. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let mut lifecycle = self.lock_lifecycle();
        match mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
            Lifecycle::Idle(records_rx) => {
                info!(stream = %self.shared.config.stream_name, "starting producer");
                let dispatcher =
                    Dispatcher::new(Arc::clone(&self.shared), records_rx, self.shutdown.clone());
                *lifecycle = Lifecycle::Running(tokio::spawn(dispatcher.run()));
                Ok(())
            }
            other => {
                *lifecycle = other;
                Err(LifecycleError::AlreadyStarted)
            }
        }
    }

    /// Stops the producer gracefully.
    ///
    /// New puts fail from this point on. Buffered records are flushed, in-flight
    /// flushes are awaited, and the failure channel is closed. Every record
    /// accepted before the call is either delivered or reported as a failure by
    /// the time this returns. A concurrent call waits for the first one to
    /// finish and then returns [`LifecycleError::AlreadyStopped`].
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let dispatcher = {
            let mut lifecycle = self.lock_lifecycle();
            match mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(handle) => Some(handle),
                Lifecycle::Idle(records_rx) => {
                    *lifecycle = Lifecycle::Idle(records_rx);
                    return Err(LifecycleError::NotRunning);
                }
                Lifecycle::Stopping => {
                    *lifecycle = Lifecycle::Stopping;
                    None
                }
                Lifecycle::Stopped => {
                    *lifecycle = Lifecycle::Stopped;
                    return Err(LifecycleError::AlreadyStopped);
                }
            }
        };
        let Some(dispatcher) = dispatcher else {
            // another call is draining; return once it has finished
            self.stopped.cancelled().await;
            return Err(LifecycleError::AlreadyStopped);
        };

        let (residual, records_tx) = {
            let mut state = self.shared.write();
            state.stopped = true;
            let residual = state.aggregator.drain().unwrap_or_else(|e| {
                error!(error = %e, "drain aggregator");
                None
            });
            (residual, state.records_tx.take())
        };

        if let Some(records_tx) = records_tx {
            let backlog = records_tx.max_capacity() - records_tx.capacity();
            info!(backlog, "stopping producer");
            if let Some(record) = residual {
                if records_tx.send(record).await.is_err() {
                    warn!("backlog closed before residual records could be queued");
                }
            }
            self.shutdown.cancel();
            // dropping the last sender closes the backlog once blocked puts finish
            drop(records_tx);
        } else {
            self.shutdown.cancel();
        }

        if let Err(e) = dispatcher.await {
            error!(error = %e, "dispatcher task failed");
        }
        self.shared.semaphore.wait().await;

        let failure_tx = self.shared.write().failure_tx.take();
        if failure_tx.is_some() {
            debug!("closing failure channel");
        }
        drop(failure_tx);

        *self.lock_lifecycle() = Lifecycle::Stopped;
        self.stopped.cancel();
        info!("stopped producer");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    #[allow(clippy::expect_used)]
    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().expect("lock poisoned")
    }
}
