use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::Findings;
use crate::domain::format_ether;
use crate::infrastructure::{Explorer, ExplorerTx, LedgerClient, VerifiedSource};

/// A contract the account interacted with or deployed
#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub address: Address,
    pub code_size: usize,
    pub source: Option<VerifiedSource>,
}

impl ContractInfo {
    /// Save the verified source as `<dir>/<address>-<name>.sol`
    pub fn write_source(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(source) = &self.source else {
            return Ok(None);
        };
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let name = if source.contract_name.is_empty() {
            "contract"
        } else {
            source.contract_name.as_str()
        };
        let path = dir.join(format!("{}-{}.sol", self.address.to_checksum(None), name));
        fs::write(&path, &source.source_code)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(Some(path))
    }

    fn describe(&self) -> String {
        match &self.source {
            Some(src) => {
                let mut out = format!(
                    "{} bytes, verified as {} ({}, {} lines",
                    self.code_size,
                    src.contract_name,
                    src.compiler_version,
                    src.line_count()
                );
                if let Some(pragma) = src.pragma() {
                    out.push_str(&format!(", solidity {}", pragma));
                }
                out.push(')');
                out
            }
            None => format!("{} bytes, not verified", self.code_size),
        }
    }
}

/// What the explorer knows about an account
#[derive(Debug, Clone)]
pub struct AccountHistory {
    pub address: Address,
    /// Every indexed transaction, oldest first
    pub transactions: Vec<ExplorerTx>,
    /// How many of the most recent transactions to list in full
    pub detail_limit: usize,
    /// Deployed contracts among the counterparties, in first-seen order
    pub contracts: Vec<ContractInfo>,
}

impl AccountHistory {
    fn detailed(&self) -> &[ExplorerTx] {
        let skip = self.transactions.len().saturating_sub(self.detail_limit);
        &self.transactions[skip..]
    }
}

impl Findings for AccountHistory {
    fn entries(&self) -> Vec<(String, String)> {
        let detailed = self.detailed();
        let mut out = vec![(
            "transactions".to_string(),
            format!("{} indexed, {} listed", self.transactions.len(), detailed.len()),
        )];

        for tx in detailed {
            out.push((format!("tx {}", tx.hash), describe_tx(tx)));
        }

        out.push(("contracts".to_string(), self.contracts.len().to_string()));
        for contract in &self.contracts {
            let label = contract.address.to_checksum(None);
            out.push((format!("contract {}", label), contract.describe()));
            if let Some(source) = &contract.source {
                let functions = source.function_signatures();
                if !functions.is_empty() {
                    out.push((format!("abi of {}", label), functions.join(", ")));
                }
            }
        }
        out
    }
}

fn describe_tx(tx: &ExplorerTx) -> String {
    let target = match (tx.to, tx.contract_created) {
        (Some(to), _) => to.to_checksum(None),
        (None, Some(created)) => format!("create {}", created.to_checksum(None)),
        (None, None) => "create".to_string(),
    };
    let function = tx.function.as_deref().unwrap_or("-");
    let status = if tx.failed { "failed" } else { "ok" };
    format!(
        "block {}, {} -> {}, {} ETH, {}, {}",
        tx.block_number,
        tx.from.to_checksum(None),
        target,
        format_ether(tx.value),
        function,
        status
    )
}

/// Pull the account's transactions from the explorer, then find which
/// counterparties are contracts and fetch their verified source
pub async fn enumerate_history(
    ledger: &dyn LedgerClient,
    explorer: &dyn Explorer,
    address: Address,
    detail_limit: usize,
) -> Result<AccountHistory> {
    let transactions = explorer
        .transactions(address)
        .await
        .with_context(|| format!("failed to list transactions of {}", address))?;

    let mut seen = HashSet::new();
    let mut counterparties = Vec::new();
    for tx in &transactions {
        for candidate in [tx.to, tx.contract_created].into_iter().flatten() {
            if seen.insert(candidate) {
                counterparties.push(candidate);
            }
        }
    }

    let mut contracts = Vec::new();
    for candidate in counterparties {
        let code = ledger
            .get_code(candidate)
            .await
            .with_context(|| format!("failed to read code of {}", candidate))?;
        if code.is_empty() {
            continue;
        }

        let source = match explorer.verified_source(candidate).await {
            Ok(source) => source,
            Err(err) => {
                warn!(contract = %candidate, "source lookup failed: {err:#}");
                None
            }
        };
        contracts.push(ContractInfo {
            address: candidate,
            code_size: code.len(),
            source,
        });
    }
    debug!(%address, transactions = transactions.len(), contracts = contracts.len(), "history enumerated");

    Ok(AccountHistory {
        address,
        transactions,
        detail_limit,
        contracts,
    })
}
