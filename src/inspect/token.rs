use alloy::primitives::{Address, U256};
use alloy_dyn_abi::DynSolValue;
use anyhow::{anyhow, Context, Result};
use tracing::debug;

use super::Findings;
use crate::domain::abi::FunctionSpec;
use crate::domain::format_token;
use crate::infrastructure::LedgerClient;

const BALANCE_OF: &str = "function balanceOf(address) returns (uint256)";
const DECIMALS: &str = "function decimals() returns (uint8)";
const SYMBOL: &str = "function symbol() returns (string)";

/// An ERC-20 balance held by the inspected account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub token: Address,
    pub holder: Address,
    /// Optional in ERC-20, so missing when the token does not implement it
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub balance: U256,
}

impl Findings for TokenBalance {
    fn entries(&self) -> Vec<(String, String)> {
        let label = match &self.symbol {
            Some(symbol) => format!("token {}", symbol),
            None => format!("token {}", self.token.to_checksum(None)),
        };
        let value = match (self.decimals, &self.symbol) {
            (Some(decimals), Some(symbol)) => {
                format!("{} {}", format_token(self.balance, decimals), symbol)
            }
            (Some(decimals), None) => format_token(self.balance, decimals),
            (None, _) => format!("{} (base units)", self.balance),
        };
        vec![(label, value)]
    }
}

/// Read `holder`'s balance of `token` through `balanceOf(address)`
///
/// `decimals()` and `symbol()` are looked up too; a token missing either
/// still reports its raw balance.
pub async fn token_balance(
    ledger: &dyn LedgerClient,
    token: Address,
    holder: Address,
) -> Result<TokenBalance> {
    let balance_of = FunctionSpec::parse(BALANCE_OF)?;
    let values = call(ledger, token, &balance_of, &[DynSolValue::Address(holder)])
        .await
        .with_context(|| format!("failed to read {} balance of {}", token, holder))?;
    let balance = match values.first() {
        Some(DynSolValue::Uint(amount, _)) => *amount,
        other => return Err(anyhow!("balanceOf on {} returned {:?}", token, other)),
    };

    let decimals = match call(ledger, token, &FunctionSpec::parse(DECIMALS)?, &[]).await {
        Ok(values) => match values.first() {
            Some(DynSolValue::Uint(raw, _)) => u8::try_from(*raw).ok(),
            _ => None,
        },
        Err(err) => {
            debug!(%token, "decimals() unavailable: {err:#}");
            None
        }
    };

    let symbol = match call(ledger, token, &FunctionSpec::parse(SYMBOL)?, &[]).await {
        Ok(values) => match values.into_iter().next() {
            Some(DynSolValue::String(symbol)) if !symbol.is_empty() => Some(symbol),
            _ => None,
        },
        Err(err) => {
            debug!(%token, "symbol() unavailable: {err:#}");
            None
        }
    };

    Ok(TokenBalance {
        token,
        holder,
        symbol,
        decimals,
        balance,
    })
}

async fn call(
    ledger: &dyn LedgerClient,
    token: Address,
    function: &FunctionSpec,
    args: &[DynSolValue],
) -> Result<Vec<DynSolValue>> {
    let input = function.encode_call(args)?;
    let data = ledger.call(token, input.into()).await?;
    function.decode_output(&data)
}
