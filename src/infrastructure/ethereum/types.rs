//! Conversions from Alloy RPC types into the runner's types

use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionReceipt;
use serde::Serialize;

/// Finalized transaction as seen by the runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    /// false when the transaction reverted
    pub success: bool,
}

impl Receipt {
    /// Fee paid by the sender (gas used * effective gas price)
    pub fn fee(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

impl From<&TransactionReceipt> for Receipt {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            from: receipt.from,
            to: receipt.to,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            success: ReceiptResponse::status(receipt),
        }
    }
}
