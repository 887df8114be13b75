// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Counting limiter for in-flight flushes.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore as TokioSemaphore};

#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<TokioSemaphore>,
    capacity: usize,
}

/// A held slot. Dropping it releases the slot.
pub type Permit = OwnedSemaphorePermit;

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(TokioSemaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot.
    #[allow(clippy::expect_used)]
    pub async fn acquire(&self) -> Permit {
        Arc::clone(&self.inner)
            .acquire_owned()
            .await
            .expect("semaphore is never closed")
    }

    /// Returns a slot. Equivalent to dropping the permit.
    pub fn release(permit: Permit) {
        drop(permit);
    }

    /// Waits until every outstanding permit has been released by taking the
    /// full capacity at once, then gives it back.
    pub async fn wait(&self) {
        let capacity = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        #[allow(clippy::expect_used)]
        let all = self
            .inner
            .acquire_many(capacity)
            .await
            .expect("semaphore is never closed");
        drop(all);
    }

    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
