//! Minimal Solidity ABI encoding for the airdrop contract calls.
//!
//! Selectors are the first 4 bytes of keccak256 of the canonical signature.

use crate::entry::Address;
use crate::errors::{Result, TrackerError};

const WORD: usize = 32;

/// `owner()`
pub const OWNER_SELECTOR: [u8; 4] = [0x8d, 0xa5, 0xcb, 0x5b];
/// `balanceOfPredefinedToken()`
pub const BALANCE_OF_PREDEFINED_TOKEN_SELECTOR: [u8; 4] = [0x56, 0xd2, 0xeb, 0x19];
/// `airdropMultipleWithPredefinedToken(address[],uint256[])`
pub const AIRDROP_MULTIPLE_SELECTOR: [u8; 4] = [0x84, 0x54, 0x5c, 0x4b];

/// Calldata for a call that takes no arguments.
pub fn encode_no_args(selector: [u8; 4]) -> Vec<u8> {
    selector.to_vec()
}

/// Calldata for `airdropMultipleWithPredefinedToken(addresses, amounts)`.
///
/// Head: two offsets. Tail: each array as length word + elements.
pub fn encode_airdrop_multiple(addresses: &[Address], amounts: &[u128]) -> Vec<u8> {
    let head_len = 2 * WORD;
    let addresses_len = WORD * (1 + addresses.len());

    let mut data = Vec::with_capacity(4 + head_len + addresses_len + WORD * (1 + amounts.len()));
    data.extend_from_slice(&AIRDROP_MULTIPLE_SELECTOR);

    data.extend_from_slice(&uint_word(head_len as u128));
    data.extend_from_slice(&uint_word((head_len + addresses_len) as u128));

    data.extend_from_slice(&uint_word(addresses.len() as u128));
    for address in addresses {
        data.extend_from_slice(&address_word(address));
    }

    data.extend_from_slice(&uint_word(amounts.len() as u128));
    for amount in amounts {
        data.extend_from_slice(&uint_word(*amount));
    }

    data
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Decode a `0x`-prefixed hex string returned by the node.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| TrackerError::RpcDecode(format!("bad hex {s:?}: {e}")))
}

/// Decode an `address` return value.
pub fn decode_address(data: &[u8]) -> Result<Address> {
    let word = first_word(data)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(TrackerError::RpcDecode(
            "address word has non-zero padding".to_string(),
        ));
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address(bytes))
}

/// A `uint256` return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uint256(pub [u8; WORD]);

impl Uint256 {
    /// `true` if the value is at least `other`.
    pub fn covers(&self, other: u128) -> bool {
        if self.0[..16].iter().any(|b| *b != 0) {
            return true;
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&self.0[16..]);
        u128::from_be_bytes(low) >= other
    }

    /// Hex rendering for logs and error messages.
    pub fn to_hex(&self) -> String {
        let digits = hex::encode(self.0);
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            "0x0".to_string()
        } else {
            format!("0x{trimmed}")
        }
    }
}

/// Decode a `uint256` return value.
pub fn decode_uint256(data: &[u8]) -> Result<Uint256> {
    Ok(Uint256(first_word(data)?))
}

fn first_word(data: &[u8]) -> Result<[u8; WORD]> {
    if data.len() < WORD {
        return Err(TrackerError::RpcDecode(format!(
            "expected a 32-byte return value, got {} bytes",
            data.len()
        )));
    }
    let mut word = [0u8; WORD];
    word.copy_from_slice(&data[..WORD]);
    Ok(word)
}
