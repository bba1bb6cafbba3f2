//! Checks that must pass before any batch is sent.

use tracing::info;

use crate::entry::Address;
use crate::errors::{Result, TrackerError};
use crate::rpc::AirdropChain;

/// Only the contract owner may airdrop, and the contract must hold enough of
/// the predefined token to cover `required`.
pub async fn check(chain: &dyn AirdropChain, operator: Address, required: u128) -> Result<()> {
    let owner = chain.owner().await?;
    if owner != operator {
        return Err(TrackerError::NotOwner {
            operator: operator.to_string(),
            owner: owner.to_string(),
        });
    }

    let available = chain.airdrop_balance().await?;
    if !available.covers(required) {
        return Err(TrackerError::InsufficientBalance {
            available: available.to_hex(),
            required,
        });
    }

    info!(
        "Preflight passed: operator {operator} owns the contract, balance {} covers {required}",
        available.to_hex()
    );
    Ok(())
}
