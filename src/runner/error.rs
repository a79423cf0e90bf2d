//! Error taxonomy of the exploit runner

use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use crate::infrastructure::Receipt;

/// Boxed cause carried from the ledger client
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The target reference could not be obtained from the setup contract
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("call to {getter} on setup contract {setup} failed")]
    Call {
        setup: Address,
        getter: String,
        #[source]
        source: BoxError,
    },

    #[error("{getter} on setup contract {setup} returned an unusable value: {reason}")]
    Unusable {
        setup: Address,
        getter: String,
        reason: String,
    },

    #[error("{getter} on setup contract {setup} returned the zero address")]
    ZeroAddress { setup: Address, getter: String },
}

/// A non-mutating query failed
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read balance of {address}")]
    Balance {
        address: Address,
        #[source]
        source: BoxError,
    },

    #[error("failed to read storage slot {slot} of {address}")]
    Storage {
        address: Address,
        slot: U256,
        #[source]
        source: BoxError,
    },

    #[error("call to {function} on {address} failed")]
    Call {
        address: Address,
        function: String,
        #[source]
        source: BoxError,
    },

    #[error("unexpected result from {function} on {address}: {reason}")]
    Decode {
        address: Address,
        function: String,
        reason: String,
    },
}

/// A write never reached a successful receipt
#[derive(Debug, Error)]
pub enum FinalizationError {
    /// The node refused the transaction (including failed gas estimation)
    #[error("{label} was rejected before inclusion")]
    Rejected {
        label: String,
        #[source]
        source: BoxError,
    },

    #[error("{label} reverted in transaction {tx_hash}")]
    Reverted {
        label: String,
        tx_hash: B256,
        receipt: Box<Receipt>,
    },

    #[error("{label} (transaction {tx_hash}) not finalized within {after:?}")]
    TimedOut {
        label: String,
        tx_hash: B256,
        after: Duration,
    },

    #[error("failed to fetch receipt of {label} (transaction {tx_hash})")]
    Lookup {
        label: String,
        tx_hash: B256,
        #[source]
        source: BoxError,
    },
}

/// Any failure that ends a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("ledger client has no signing identity")]
    NoIdentity,

    #[error("failed to encode arguments for {function}")]
    Encode {
        function: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Finalization(#[from] FinalizationError),
}
