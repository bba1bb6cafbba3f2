//! Airdrop recipients parsed from operator-supplied `address,balance` lines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::errors::{Result, TrackerError};

/// Balances longer than this are rejected; 36 decimal digits always fit a `u128`.
pub const MAX_AMOUNT_DIGITS: usize = 36;

/// A 20-byte EVM account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ();

    /// Accepts exactly `0x` followed by 40 hex digits, in any case.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").ok_or(())?;
        if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(());
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| ())?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid address: {s}")))
    }
}

/// One recipient of the airdrop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirdropEntry {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

/// A rejected input line (1-based line numbers).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineError {
    #[error("no airdrop entries were supplied")]
    Empty,
    #[error("line {line}: expected `address,balance`")]
    WrongArity { line: usize },
    #[error("line {line}: address does not match 0x + 40 hex digits")]
    InvalidAddress { line: usize },
    #[error("line {line}: balance must be 1 to 36 decimal digits")]
    InvalidAmount { line: usize },
}

/// Parse the operator's airdrop list.
///
/// Blank lines are skipped. Every bad line is reported, not just the first,
/// and any error rejects the whole list.
pub fn parse_entries(text: &str) -> Result<Vec<AirdropEntry>> {
    let mut entries = Vec::new();
    let mut errors = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() != 2 {
            errors.push(LineError::WrongArity { line });
            continue;
        }

        let address = match fields[0].trim().parse::<Address>() {
            Ok(a) => a,
            Err(()) => {
                errors.push(LineError::InvalidAddress { line });
                continue;
            }
        };

        match parse_amount(fields[1].trim()) {
            Some(amount) => entries.push(AirdropEntry { address, amount }),
            None => errors.push(LineError::InvalidAmount { line }),
        }
    }

    if entries.is_empty() && errors.is_empty() {
        errors.push(LineError::Empty);
    }
    if !errors.is_empty() {
        return Err(TrackerError::Input(errors));
    }
    Ok(entries)
}

fn parse_amount(s: &str) -> Option<u128> {
    if s.is_empty() || s.len() > MAX_AMOUNT_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Sum of every entry's amount.
pub fn total_amount(entries: &[AirdropEntry]) -> Result<u128> {
    entries.iter().try_fold(0u128, |acc, e| {
        acc.checked_add(e.amount).ok_or(TrackerError::AmountOverflow)
    })
}

/// Amounts travel as decimal strings in JSON; they exceed what JS clients can
/// hold in a number.
pub(crate) mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        String::deserialize(d)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A1: &str = "0x4DEbDF80D5aC6Cab5845B797CEBeE63167435Fba";
    const A2: &str = "0xff447f75C476757fA3669D75a3CEC9856daCE384";

    fn input_errors(text: &str) -> Vec<LineError> {
        match parse_entries(text) {
            Err(TrackerError::Input(errs)) => errs,
            other => panic!("expected input errors, got {other:?}"),
        }
    }

    #[test]
    fn parses_lines_and_normalises_addresses() {
        let text = format!("{A1},1000\n {A2} , 5 \n");
        let entries = parse_entries(&text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].address.to_string(),
            "0x4debdf80d5ac6cab5845b797cebee63167435fba"
        );
        assert_eq!(entries[0].amount, 1000);
        assert_eq!(entries[1].amount, 5);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let text = format!("\n{A1},1\n\n   \n{A2},2\n");
        assert_eq!(parse_entries(&text).unwrap().len(), 2);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(input_errors("  \n\n"), vec![LineError::Empty]);
    }

    #[test]
    fn every_bad_line_is_reported() {
        let text = format!("{A1},1\n{A1}\n0x1234,5\n{A2},-3\n{A2},1,2");
        assert_eq!(
            input_errors(&text),
            vec![
                LineError::WrongArity { line: 2 },
                LineError::InvalidAddress { line: 3 },
                LineError::InvalidAmount { line: 4 },
                LineError::WrongArity { line: 5 },
            ]
        );
    }

    #[test]
    fn amount_digit_limit() {
        let ok = "9".repeat(36);
        let too_long = "1".repeat(37);
        assert_eq!(
            parse_entries(&format!("{A1},{ok}")).unwrap()[0].amount,
            ok.parse::<u128>().unwrap()
        );
        assert_eq!(
            input_errors(&format!("{A1},{too_long}")),
            vec![LineError::InvalidAmount { line: 1 }]
        );
    }

    #[test]
    fn address_requires_prefix() {
        assert!("4DEbDF80D5aC6Cab5845B797CEBeE63167435Fba".parse::<Address>().is_err());
        assert!("0x4DEbDF80D5aC6Cab5845B797CEBeE63167435Fbz".parse::<Address>().is_err());
    }

    #[test]
    fn total_detects_overflow() {
        let big = AirdropEntry {
            address: A1.parse().unwrap(),
            amount: u128::MAX,
        };
        let one = AirdropEntry {
            address: A2.parse().unwrap(),
            amount: 1,
        };
        assert_eq!(total_amount(&[one.clone(), one.clone()]).unwrap(), 2);
        assert!(matches!(
            total_amount(&[big, one]),
            Err(TrackerError::AmountOverflow)
        ));
    }

    #[test]
    fn entry_json_uses_string_amounts() {
        let entry = AirdropEntry {
            address: A2.parse().unwrap(),
            amount: 10,
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["amount"], "10");
        assert_eq!(v["address"], "0xff447f75c476757fa3669d75a3cec9856dace384");
    }
}
