//! Per-recipient view of the airdrop, derived from the tracked batches.

use serde::Serialize;

use crate::entry::{amount_string, Address, AirdropEntry};
use crate::tracker::{BatchStatus, SubmittedBatch};

/// Status shown for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// The batch carrying the entry has not been submitted yet.
    Unknown,
    Pending,
    Confirmed,
    Failed,
}

impl From<BatchStatus> for DisplayStatus {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Pending => Self::Pending,
            BatchStatus::Confirmed => Self::Confirmed,
            BatchStatus::Failed => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
    pub status: DisplayStatus,
    pub tx_hash: Option<String>,
}

/// One row per entry, in input order. Each row takes the status of the batch
/// that carries that entry, so a repeated address shows each of its batches.
pub fn project(entries: &[AirdropEntry], tracked: &[SubmittedBatch]) -> Vec<DisplayRow> {
    entries
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let found = tracked
                .iter()
                .find(|s| s.batch.positions().contains(&position));
            DisplayRow {
                address: entry.address,
                amount: entry.amount,
                status: found.map_or(DisplayStatus::Unknown, |s| s.status.into()),
                tx_hash: found.map(|s| s.tx_hash.clone()),
            }
        })
        .collect()
}
