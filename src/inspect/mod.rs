//! Read-only account enumeration, run before choosing an attack
//!
//! The node answers balance, nonce, code, storage and token balances.
//! Transaction history, the contracts an account touched and their
//! verified source come from a block explorer when an API key is set.

mod history;
mod token;

use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::domain::{format_ether, Report, ReportEntry, ReportSink, Step};
use crate::infrastructure::LedgerClient;

pub use history::{enumerate_history, AccountHistory, ContractInfo};
pub use token::{token_balance, TokenBalance};

/// Default number of leading storage slots to dump
pub const DEFAULT_SLOTS: u64 = 4;

/// Default number of recent transactions listed from the explorer
pub const DEFAULT_HISTORY: usize = 10;

/// What the ledger says about one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub address: Address,
    pub chain_id: u64,
    pub balance: U256,
    pub nonce: u64,
    pub code_size: usize,
    pub slots: Vec<(U256, B256)>,
}

/// Something `inspect` found, rendered as labelled report lines
pub trait Findings {
    /// Observations in display order
    fn entries(&self) -> Vec<(String, String)>;

    /// Append the observations to `report`, forwarding each to `sink`
    fn write_report(&self, report: &mut Report, sink: &mut dyn ReportSink) {
        write_entries(self.entries(), report, sink);
    }
}

/// Record labelled observations under [`Step::Inspect`]
fn write_entries(entries: Vec<(String, String)>, report: &mut Report, sink: &mut dyn ReportSink) {
    for (label, value) in entries {
        let entry = ReportEntry {
            step: Step::Inspect,
            label,
            value,
            at: Utc::now(),
        };
        sink.observe(&entry);
        report.push(entry);
    }
}

impl AccountSnapshot {
    pub fn is_contract(&self) -> bool {
        self.code_size > 0
    }
}

impl Findings for AccountSnapshot {
    fn entries(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("address".to_string(), self.address.to_checksum(None)),
            ("chain id".to_string(), self.chain_id.to_string()),
            ("balance".to_string(), format!("{} ETH", format_ether(self.balance))),
            ("transaction count".to_string(), self.nonce.to_string()),
        ];

        if self.is_contract() {
            out.push(("code".to_string(), format!("{} bytes", self.code_size)));
            for (slot, word) in &self.slots {
                let value = match address_in_word(word) {
                    Some(addr) => format!("{} (address {})", word, addr.to_checksum(None)),
                    None => word.to_string(),
                };
                out.push((format!("storage slot {}", slot), value));
            }
        } else {
            out.push(("code".to_string(), "none (externally owned account)".to_string()));
        }
        out
    }
}

/// Collect balance, nonce, code size and the first `slots` storage words
pub async fn inspect(ledger: &dyn LedgerClient, address: Address, slots: u64) -> Result<AccountSnapshot> {
    let chain_id = ledger.chain_id().await.context("failed to read chain id")?;
    let balance = ledger
        .get_balance(address)
        .await
        .with_context(|| format!("failed to read balance of {}", address))?;
    let nonce = ledger
        .get_transaction_count(address)
        .await
        .with_context(|| format!("failed to read transaction count of {}", address))?;
    let code = ledger
        .get_code(address)
        .await
        .with_context(|| format!("failed to read code of {}", address))?;

    let mut words = Vec::new();
    if !code.is_empty() {
        for index in 0..slots {
            let slot = U256::from(index);
            let word = ledger
                .get_storage_at(address, slot)
                .await
                .with_context(|| format!("failed to read storage slot {} of {}", slot, address))?;
            words.push((slot, word));
        }
    }
    debug!(%address, code_size = code.len(), slots = words.len(), "account inspected");

    Ok(AccountSnapshot {
        address,
        chain_id,
        balance,
        nonce,
        code_size: code.len(),
        slots: words,
    })
}

/// A non-zero word whose upper 12 bytes are zero looks like an address
fn address_in_word(word: &B256) -> Option<Address> {
    if word.is_zero() || word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    Some(Address::from_word(*word))
}
