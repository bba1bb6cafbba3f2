//! Drives the planned batches through on-chain submission, one at a time.
//!
//! Each tick does at most one round trip: poll the receipt of the batch in
//! flight, or submit the next batch once the previous one is terminal. The
//! tracked-batch list is republished wholesale through a `watch` channel
//! after every change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, warn};

use crate::db;
use crate::errors::{Result, TrackerError};
use crate::planner::Batch;
use crate::rpc::{AirdropChain, TxHash};

/// Lifecycle of a submitted batch: `Pending` moves once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Confirmed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedBatch {
    pub batch: Batch,
    pub tx_hash: TxHash,
    pub status: BatchStatus,
}

/// Everything readers may observe about the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub total_batches: usize,
    /// Submitted batches in plan order; `submitted[i].batch.index == i`.
    pub submitted: Vec<SubmittedBatch>,
    /// Why submission is halted: a rejected send, or a sent batch whose row
    /// could not be written.
    pub halted: Option<String>,
    pub finished: bool,
}

impl TrackerSnapshot {
    fn in_flight(&self) -> Option<usize> {
        self.submitted
            .iter()
            .position(|s| s.status == BatchStatus::Pending)
    }
}

/// What a single [`SubmissionTracker::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Another step is still running.
    Busy,
    Submitted { batch_index: usize, tx_hash: TxHash },
    /// The node or wallet refused the transaction; the batch stays unsubmitted.
    Rejected { batch_index: usize },
    StillPending { batch_index: usize },
    Finished { batch_index: usize, status: BatchStatus },
    /// The batch was sent but its database row could not be written;
    /// submission is halted until the write succeeds.
    Unrecorded { batch_index: usize, tx_hash: TxHash },
    /// A previously unrecorded batch is now stored.
    Recorded { batch_index: usize },
    /// Waiting for the operator to request a retry.
    Halted,
    /// Every batch reached a terminal state.
    Done,
}

/// Cheap, cloneable view onto a running tracker for the HTTP layer.
#[derive(Clone)]
pub struct TrackerHandle {
    snapshot: watch::Receiver<TrackerSnapshot>,
    retry_requested: Arc<AtomicBool>,
}

impl TrackerHandle {
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Ask the tracker to resend the rejected batch on its next tick.
    /// Returns `false` when nothing is halted.
    pub fn request_retry(&self) -> bool {
        if self.snapshot.borrow().halted.is_none() {
            return false;
        }
        self.retry_requested.store(true, Ordering::SeqCst);
        true
    }
}

pub struct SubmissionTracker {
    chain: Arc<dyn AirdropChain>,
    pool: SqlitePool,
    batches: Vec<Batch>,
    is_processing: Arc<AtomicBool>,
    retry_requested: Arc<AtomicBool>,
    snapshot: watch::Sender<TrackerSnapshot>,
    /// Sent batch whose row is not yet in the database.
    unrecorded: Option<usize>,
}

/// Clears the processing flag when a step completes or is dropped mid-await.
struct ProcessingGuard(Arc<AtomicBool>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SubmissionTracker {
    /// Build a tracker for `batches`, picking up any submissions already
    /// stored in the database.
    pub async fn resume(
        chain: Arc<dyn AirdropChain>,
        pool: SqlitePool,
        batches: Vec<Batch>,
    ) -> Result<Self> {
        let stored = db::load_batches(&pool).await?;
        let mut submitted = Vec::with_capacity(stored.len());

        for (position, row) in stored.into_iter().enumerate() {
            let batch = match batches.get(row.batch_index) {
                Some(b) if row.batch_index == position && b.addresses() == row.addresses => b,
                _ => {
                    return Err(TrackerError::PlanMismatch {
                        batch_index: row.batch_index,
                    })
                }
            };
            submitted.push(SubmittedBatch {
                batch: batch.clone(),
                tx_hash: row.tx_hash,
                status: row.status,
            });
        }

        if !submitted.is_empty() {
            info!(
                "Resuming airdrop: {}/{} batches already submitted",
                submitted.len(),
                batches.len()
            );
        }

        let snapshot = TrackerSnapshot {
            total_batches: batches.len(),
            finished: is_finished(&submitted, batches.len()),
            submitted,
            halted: None,
        };
        let (tx, _rx) = watch::channel(snapshot);

        Ok(Self {
            chain,
            pool,
            batches,
            is_processing: Arc::new(AtomicBool::new(false)),
            retry_requested: Arc::new(AtomicBool::new(false)),
            snapshot: tx,
            unrecorded: None,
        })
    }

    pub fn handle(&self) -> TrackerHandle {
        TrackerHandle {
            snapshot: self.snapshot.subscribe(),
            retry_requested: self.retry_requested.clone(),
        }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Perform one evaluation step.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        if self.is_processing.swap(true, Ordering::SeqCst) {
            return Ok(StepOutcome::Busy);
        }
        let _processing = ProcessingGuard(self.is_processing.clone());
        self.advance().await
    }

    async fn advance(&mut self) -> Result<StepOutcome> {
        let current = self.snapshot.borrow().clone();

        if let Some(pos) = self.unrecorded {
            let sent = &current.submitted[pos];
            let (batch_index, tx_hash) = (sent.batch.index, sent.tx_hash.clone());
            return Ok(if self.record(pos).await {
                StepOutcome::Recorded { batch_index }
            } else {
                StepOutcome::Unrecorded {
                    batch_index,
                    tx_hash,
                }
            });
        }

        if let Some(pos) = current.in_flight() {
            return self.poll(current, pos).await;
        }

        let next_index = current.submitted.len();
        let Some(batch) = self.batches.get(next_index).cloned() else {
            if !current.finished {
                self.publish(TrackerSnapshot {
                    finished: true,
                    ..current
                });
            }
            return Ok(StepOutcome::Done);
        };

        let mut next = current;
        if next.halted.is_some() {
            if !self.retry_requested.swap(false, Ordering::SeqCst) {
                return Ok(StepOutcome::Halted);
            }
            info!("Operator requested retry of batch {next_index}");
            next.halted = None;
        }

        self.submit(next, batch).await
    }

    async fn poll(&mut self, current: TrackerSnapshot, pos: usize) -> Result<StepOutcome> {
        let in_flight = &current.submitted[pos];
        let batch_index = in_flight.batch.index;

        let status = match self.chain.receipt(&in_flight.tx_hash).await? {
            None => return Ok(StepOutcome::StillPending { batch_index }),
            Some(receipt) if receipt.succeeded() => BatchStatus::Confirmed,
            Some(receipt) => {
                warn!(
                    "Batch {batch_index} reverted (tx {}, status {:?})",
                    in_flight.tx_hash, receipt.status
                );
                BatchStatus::Failed
            }
        };
        info!(
            "Batch {batch_index} {} (tx {})",
            status.as_str(),
            in_flight.tx_hash
        );

        let mut next = current;
        next.submitted[pos].status = status;
        next.finished = is_finished(&next.submitted, next.total_batches);
        self.publish(next);

        db::finish_batch(&self.pool, batch_index, status).await?;
        Ok(StepOutcome::Finished {
            batch_index,
            status,
        })
    }

    async fn submit(&mut self, mut next: TrackerSnapshot, batch: Batch) -> Result<StepOutcome> {
        let batch_index = batch.index;

        match self.chain.submit(&batch.addresses(), &batch.amounts()).await {
            Ok(tx_hash) => {
                info!(
                    "Submitted batch {}/{} ({} recipients) tx {tx_hash}",
                    batch_index + 1,
                    self.batches.len(),
                    batch.len()
                );
                let pos = next.submitted.len();
                next.submitted.push(SubmittedBatch {
                    batch,
                    tx_hash: tx_hash.clone(),
                    status: BatchStatus::Pending,
                });
                self.publish(next);
                self.unrecorded = Some(pos);

                Ok(if self.record(pos).await {
                    StepOutcome::Submitted {
                        batch_index,
                        tx_hash,
                    }
                } else {
                    StepOutcome::Unrecorded {
                        batch_index,
                        tx_hash,
                    }
                })
            }
            Err(e) => {
                error!("Batch {batch_index} was rejected, halting until retry: {e}");
                next.halted = Some(e.to_string());
                self.publish(next);
                Ok(StepOutcome::Rejected { batch_index })
            }
        }
    }

    /// Write the row for the sent batch at `pos`. Until the write succeeds
    /// submission is halted with the tx hash in the reason, and each step
    /// repeats the write. The batch is never sent again.
    async fn record(&mut self, pos: usize) -> bool {
        let mut next = self.snapshot.borrow().clone();
        let sent = &next.submitted[pos];
        let batch_index = sent.batch.index;
        let tx_hash = sent.tx_hash.clone();
        let addresses = sent.batch.addresses();

        match db::record_submission(&self.pool, batch_index, &tx_hash, &addresses).await {
            Ok(()) => {
                self.unrecorded = None;
                if next.halted.take().is_some() {
                    info!("Batch {batch_index} recorded, resuming submission");
                    self.retry_requested.store(false, Ordering::SeqCst);
                    self.publish(next);
                }
                true
            }
            Err(e) => {
                let reason = format!(
                    "batch {batch_index} was sent as {tx_hash} but could not be recorded: {e}"
                );
                error!("{reason}");
                next.halted = Some(reason);
                self.publish(next);
                false
            }
        }
    }

    fn publish(&self, snapshot: TrackerSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    /// Tick every `poll_interval` until every batch is terminal or `cancel`
    /// fires. A step in progress is always allowed to complete so a sent
    /// transaction is never left unrecorded.
    pub async fn run(mut self, poll_interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Airdrop tracker cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.step().await {
                Ok(StepOutcome::Done) => {
                    info!("All {} airdrop batches are terminal", self.batches.len());
                    return;
                }
                Ok(_) => {}
                Err(e) => error!("Tracker step error: {e}"),
            }
        }
    }
}

fn is_finished(submitted: &[SubmittedBatch], total: usize) -> bool {
    submitted.len() == total && submitted.iter().all(|s| s.status.is_terminal())
}

/// A spawned tracker whose lifetime bounds the polling task: dropping it
/// cancels the task.
pub struct TrackerTask {
    handle: JoinHandle<()>,
    guard: DropGuard,
}

impl TrackerTask {
    pub fn spawn(
        tracker: SubmissionTracker,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(tracker.run(poll_interval, cancel.clone()));
        Self {
            handle,
            guard: cancel.drop_guard(),
        }
    }

    /// Cancel polling and wait for the task to exit.
    pub async fn stop(self) {
        let TrackerTask { handle, guard } = self;
        drop(guard);
        if let Err(e) = handle.await {
            error!("Tracker task ended abnormally: {e}");
        }
    }
}
