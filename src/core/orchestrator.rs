//! Batch partitioning and the bounded worker pool
//!
//! Work items are split into fixed-size batches which run concurrently
//! under a semaphore. A cancellation signal stops new batches from
//! starting; batches already in flight run to completion so no partial
//! writes are abandoned mid-record.

use crate::core::progress::JobStatus;
use crate::domain::{MeridianError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// One unit of work for the pool
#[derive(Debug, Clone)]
pub struct Batch<T> {
    /// Zero-based position within the run
    pub index: usize,
    pub items: Vec<T>,
}

/// Splits items into batches of at most `batch_size`.
///
/// Every item lands in exactly one batch; the final batch may be short.
/// An empty input produces no batches.
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Batch<T>> {
    debug_assert!(batch_size > 0);
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size.max(1)));
    let mut current = Vec::with_capacity(batch_size.min(items.len()));

    for item in items {
        current.push(item);
        if current.len() == batch_size {
            batches.push(Batch {
                index: batches.len(),
                items: std::mem::replace(&mut current, Vec::with_capacity(batch_size)),
            });
        }
    }
    if !current.is_empty() {
        batches.push(Batch {
            index: batches.len(),
            items: current,
        });
    }
    batches
}

/// Aggregate result of a pool run
#[derive(Debug)]
pub struct PoolOutcome {
    pub total_batches: usize,
    pub succeeded_batches: usize,
    pub failed_batches: usize,
    /// Batches never started because cancellation arrived first
    pub skipped_batches: usize,
    /// Sum of the per-batch record counts from successful batches
    pub records_written: u64,
    pub errors: Vec<MeridianError>,
}

impl PoolOutcome {
    /// Derives the job status from the batch tallies.
    pub fn status(&self) -> JobStatus {
        if self.skipped_batches > 0 {
            JobStatus::Cancelled
        } else if self.failed_batches == 0 {
            JobStatus::Succeeded
        } else if self.succeeded_batches > 0 {
            JobStatus::PartiallyFailed
        } else {
            JobStatus::Failed
        }
    }
}

/// Runs batches through a worker pool of at most `max_workers` tasks.
///
/// The worker receives each batch and returns how many records it
/// produced. Batch failures are collected rather than aborting the run,
/// so one bad batch never discards the others' work.
pub async fn run_batches<T, F, Fut>(
    batches: Vec<Batch<T>>,
    max_workers: usize,
    cancel: watch::Receiver<bool>,
    worker: F,
) -> PoolOutcome
where
    T: Send + 'static,
    F: Fn(Batch<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u64>> + Send,
{
    let total_batches = batches.len();
    let worker = Arc::new(worker);
    let semaphore = Arc::new(Semaphore::new(max_workers));
    let mut set: JoinSet<(usize, Option<Result<u64>>)> = JoinSet::new();

    for batch in batches {
        let worker = Arc::clone(&worker);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        set.spawn(async move {
            // Closing the semaphore is not part of shutdown, so acquire
            // only fails if the pool itself is being torn down.
            let Ok(_permit) = semaphore.acquire().await else {
                return (batch.index, None);
            };
            if *cancel.borrow() {
                return (batch.index, None);
            }
            let index = batch.index;
            (index, Some(worker(batch).await))
        });
    }

    let mut outcome = PoolOutcome {
        total_batches,
        succeeded_batches: 0,
        failed_batches: 0,
        skipped_batches: 0,
        records_written: 0,
        errors: Vec::new(),
    };

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Some(Ok(records)))) => {
                outcome.succeeded_batches += 1;
                outcome.records_written += records;
            }
            Ok((index, Some(Err(e)))) => {
                tracing::error!(batch = index, error = %e, "Batch failed");
                outcome.failed_batches += 1;
                outcome.errors.push(e);
            }
            Ok((index, None)) => {
                tracing::debug!(batch = index, "Batch skipped after cancellation");
                outcome.skipped_batches += 1;
            }
            Err(e) => {
                outcome.failed_batches += 1;
                outcome
                    .errors
                    .push(MeridianError::Other(format!("Worker task panicked: {e}")));
            }
        }
    }

    outcome
}
