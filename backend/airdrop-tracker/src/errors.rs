//! Application-wide error types.

use thiserror::Error;

use crate::entry::LineError;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    RpcDecode(String),

    #[error("Invalid airdrop input: {}", format_line_errors(.0))]
    Input(Vec<LineError>),

    #[error("Airdrop total overflows the supported amount range")]
    AmountOverflow,

    #[error("Operator {operator} is not the airdrop contract owner ({owner})")]
    NotOwner { operator: String, owner: String },

    #[error("Airdrop contract balance {available} is less than required {required}")]
    InsufficientBalance { available: String, required: u128 },

    #[error("Stored batch {batch_index} does not match the current airdrop list")]
    PlanMismatch { batch_index: usize },

    #[error("No pending row is stored for batch {batch_index}")]
    MissingBatchRow { batch_index: usize },

    #[error("Stake quote error: {0}")]
    Stake(String),
}

fn format_line_errors(errors: &[LineError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, TrackerError>;
