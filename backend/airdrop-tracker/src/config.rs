//! Application configuration loaded from environment variables.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::entry::Address;
use crate::errors::{Result, TrackerError};
use crate::planner::DEFAULT_BATCH_CAPACITY;

#[derive(Debug, Clone)]
pub struct Config {
    /// Ethereum JSON-RPC endpoint
    pub rpc_url: String,
    /// The airdrop contract address
    pub airdrop_contract: Address,
    /// Contract owner account; the node signs transactions for it
    pub operator: Address,
    /// File of `address,balance` lines to distribute
    pub input_path: PathBuf,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to poll receipts / submit the next batch
    pub poll_interval_secs: u64,
    /// Maximum recipients per transaction
    pub batch_capacity: NonZeroUsize,
    /// Optional JSON stake program table
    pub stake_programs_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Config {
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()),
            airdrop_contract: required_address("AIRDROP_CONTRACT")?,
            operator: required_address("OPERATOR_ADDRESS")?,
            input_path: env_var("AIRDROP_INPUT")
                .map_err(|_| {
                    TrackerError::Config("AIRDROP_INPUT environment variable is required".into())
                })?
                .into(),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./airdrop.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| TrackerError::Config("Invalid API_PORT".to_string()))?,
            poll_interval_secs: env_var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| TrackerError::Config("Invalid POLL_INTERVAL_SECS".to_string()))?,
            batch_capacity: match env_var("BATCH_CAPACITY") {
                Ok(raw) => parse_capacity(&raw)?,
                Err(_) => DEFAULT_BATCH_CAPACITY,
            },
            stake_programs_file: env_var("STAKE_PROGRAMS_FILE").ok().map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.poll_interval_secs) {
            return Err(TrackerError::Config(
                "POLL_INTERVAL_SECS must be between 1 and 60".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| TrackerError::Config(format!("Missing env var: {key}")))
}

fn parse_capacity(raw: &str) -> Result<NonZeroUsize> {
    raw.trim().parse().map_err(|_| {
        TrackerError::Config(format!("BATCH_CAPACITY must be at least 1: {raw}"))
    })
}

fn required_address(key: &str) -> Result<Address> {
    let raw = env_var(key)
        .map_err(|_| TrackerError::Config(format!("{key} environment variable is required")))?;
    raw.trim()
        .parse()
        .map_err(|_| TrackerError::Config(format!("{key} is not a valid address: {raw}")))
}
