//! Explorer double serving a fixed history and verified sources

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};

use pry::infrastructure::{Explorer, ExplorerTx, VerifiedSource};

use super::{selector, Event, MockLedger, GAS_USED};

#[derive(Default)]
pub struct MockExplorer {
    transactions: Vec<ExplorerTx>,
    sources: HashMap<Address, VerifiedSource>,
    broken_sources: Vec<Address>,
}

impl MockExplorer {
    /// Index every write the ledger has seen, as sent by the scenario caller
    pub fn indexing(ledger: &MockLedger) -> Self {
        let sc = ledger.scenario();
        let names = [
            (selector("setOwner()"), "setOwner()"),
            (selector("withdraw(address)"), "withdraw(address _to)"),
        ];

        let transactions = ledger
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Send { to, selector, tx_hash } => Some((to, selector, tx_hash)),
                _ => None,
            })
            .enumerate()
            .map(|(i, (to, sel, tx_hash))| ExplorerTx {
                hash: tx_hash,
                block_number: 101 + i as u64,
                timestamp: 1_700_000_000 + 12 * i as u64,
                from: sc.caller,
                to: Some(to),
                value: U256::ZERO,
                gas_used: GAS_USED,
                failed: false,
                function: names
                    .iter()
                    .find(|(known, _)| *known == sel)
                    .map(|(_, name)| name.to_string()),
                contract_created: None,
            })
            .collect();

        Self {
            transactions,
            ..Self::default()
        }
    }

    pub fn with_transaction(mut self, tx: ExplorerTx) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn with_source(mut self, address: Address, source: VerifiedSource) -> Self {
        self.sources.insert(address, source);
        self
    }

    /// Source lookups for `address` fail
    pub fn with_broken_source(mut self, address: Address) -> Self {
        self.broken_sources.push(address);
        self
    }
}

#[async_trait::async_trait]
impl Explorer for MockExplorer {
    async fn transactions(&self, _address: Address) -> Result<Vec<ExplorerTx>> {
        Ok(self.transactions.clone())
    }

    async fn verified_source(&self, address: Address) -> Result<Option<VerifiedSource>> {
        if self.broken_sources.contains(&address) {
            bail!("explorer error: NOTOK (Max rate limit reached)");
        }
        Ok(self.sources.get(&address).cloned())
    }
}
