//! Block explorer lookups: account history and verified contract source
//!
//! Everything here comes from an indexing service rather than the node, so
//! it is optional and only used by `inspect`.

mod etherscan;

use alloy::primitives::{Address, B256, U256};
use alloy_json_abi::JsonAbi;
use anyhow::Result;

pub use etherscan::{EtherscanClient, DEFAULT_EXPLORER_URL};

/// A transaction touching the inspected account, as indexed by the explorer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerTx {
    pub hash: B256,
    pub block_number: u64,
    pub timestamp: u64,
    pub from: Address,
    /// None for contract creations
    pub to: Option<Address>,
    pub value: U256,
    pub gas_used: u64,
    pub failed: bool,
    /// Decoded function signature when the explorer knows it
    pub function: Option<String>,
    /// Address deployed by this transaction
    pub contract_created: Option<Address>,
}

/// Verified source published for a contract
#[derive(Debug, Clone)]
pub struct VerifiedSource {
    pub contract_name: String,
    pub compiler_version: String,
    pub source_code: String,
    pub abi: Option<JsonAbi>,
}

impl VerifiedSource {
    /// Version named by the first `pragma solidity` directive
    pub fn pragma(&self) -> Option<&str> {
        let start = self.source_code.find("pragma solidity")? + "pragma solidity".len();
        let rest = &self.source_code[start..];
        let end = rest.find(';')?;
        let version = rest[..end].trim();
        (!version.is_empty()).then_some(version)
    }

    pub fn line_count(&self) -> usize {
        self.source_code.lines().count()
    }

    /// Signatures of every function in the published ABI
    pub fn function_signatures(&self) -> Vec<String> {
        self.abi
            .as_ref()
            .map(|abi| abi.functions().map(|f| f.signature()).collect())
            .unwrap_or_default()
    }
}

/// Indexed account data the node itself cannot answer
#[async_trait::async_trait]
pub trait Explorer: Send + Sync {
    /// Every normal transaction sent from or to `address`, oldest first
    async fn transactions(&self, address: Address) -> Result<Vec<ExplorerTx>>;

    /// Verified source and ABI (None when the contract is not verified)
    async fn verified_source(&self, address: Address) -> Result<Option<VerifiedSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(code: &str) -> VerifiedSource {
        VerifiedSource {
            contract_name: "Wallet".into(),
            compiler_version: "v0.8.19+commit.7dd6d404".into(),
            source_code: code.into(),
            abi: None,
        }
    }

    #[test]
    fn test_pragma() {
        let src = source("// SPDX\npragma solidity ^0.8.19;\ncontract Wallet {}\n");
        assert_eq!(src.pragma(), Some("^0.8.19"));
        assert_eq!(src.line_count(), 3);
        assert_eq!(source("contract A {}").pragma(), None);
    }

    #[test]
    fn test_function_signatures() {
        let mut src = source("contract Wallet {}");
        assert!(src.function_signatures().is_empty());

        src.abi = Some(JsonAbi::parse(["function setOwner()", "function withdraw(address to)"]).unwrap());
        let mut sigs = src.function_signatures();
        sigs.sort();
        assert_eq!(sigs, vec!["setOwner()", "withdraw(address)"]);
    }
}
