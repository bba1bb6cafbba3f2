//! Splits the recipient list into fixed-capacity batches, one transaction each.

use std::num::NonZeroUsize;
use std::ops::Range;

use serde::Serialize;

use crate::entry::{Address, AirdropEntry};

/// Default number of recipients per airdrop transaction.
pub const DEFAULT_BATCH_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

/// A contiguous, capacity-bounded slice of the airdrop list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    /// Position of this batch in the plan, starting at 0.
    pub index: usize,
    /// Position of the batch's first entry in the input list.
    pub start: usize,
    pub entries: Vec<AirdropEntry>,
}

impl Batch {
    pub fn addresses(&self) -> Vec<Address> {
        self.entries.iter().map(|e| e.address).collect()
    }

    pub fn amounts(&self) -> Vec<u128> {
        self.entries.iter().map(|e| e.amount).collect()
    }

    /// Input positions carried by this batch.
    pub fn positions(&self) -> Range<usize> {
        self.start..self.start + self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Partition `entries` into batches of at most `capacity` entries, in order.
pub fn plan(entries: &[AirdropEntry], capacity: NonZeroUsize) -> Vec<Batch> {
    entries
        .chunks(capacity.get())
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            start: index * capacity.get(),
            entries: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("non-zero capacity")
}
