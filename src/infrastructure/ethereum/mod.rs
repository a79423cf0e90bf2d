//! Ethereum infrastructure - Alloy ledger client

mod provider;
pub(crate) mod types;

pub use provider::{AlloyLedger, LedgerClient, ProviderConfig};
pub use types::Receipt;
