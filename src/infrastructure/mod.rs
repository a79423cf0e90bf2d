//! Infrastructure layer - External service integrations
//!
//! This layer contains the Alloy-based ledger client used for every
//! RPC read and signed write, and the block explorer client `inspect`
//! uses for account history.

pub mod ethereum;
pub mod explorer;

pub use ethereum::{AlloyLedger, LedgerClient, ProviderConfig, Receipt};
pub use explorer::{EtherscanClient, Explorer, ExplorerTx, VerifiedSource, DEFAULT_EXPLORER_URL};
