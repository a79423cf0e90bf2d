//! Base-unit (wei) to display-unit (ether) conversion and balance deltas

use alloy::primitives::utils::format_units;
use alloy::primitives::{I256, U256};

const ETHER_DECIMALS: u8 = 18;

/// Format a wei amount as ether, trimming trailing zeros ("10.0", "0.25")
pub fn format_ether(wei: U256) -> String {
    format_token(wei, ETHER_DECIMALS)
}

/// Format a base-unit amount of a token with `decimals` places
pub fn format_token(amount: U256, decimals: u8) -> String {
    // format_units only rejects more than 77 decimals
    format_units(amount, decimals)
        .map(|s| trim_fraction(&s))
        .unwrap_or_else(|_| amount.to_string())
}

/// Format a signed wei amount as ether with an explicit sign
pub fn format_ether_signed(wei: I256) -> String {
    let magnitude = format_ether(wei.unsigned_abs());
    if wei.is_negative() {
        format!("-{}", magnitude)
    } else {
        format!("+{}", magnitude)
    }
}

fn trim_fraction(s: &str) -> String {
    match s.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{}.0", whole)
            } else {
                format!("{}.{}", whole, frac)
            }
        }
        None => format!("{}.0", s),
    }
}

/// Two readings of the same account's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub before: U256,
    pub after: U256,
}

impl BalanceDelta {
    pub fn new(before: U256, after: U256) -> Self {
        Self { before, after }
    }

    /// Amount that left the account (before - after); negative if it grew
    pub fn outflow(&self) -> I256 {
        to_signed(self.before) - to_signed(self.after)
    }

    /// Amount that arrived in the account (after - before); negative if it shrank
    pub fn inflow(&self) -> I256 {
        -self.outflow()
    }
}

fn to_signed(value: U256) -> I256 {
    // Balances never approach 2^255 wei
    I256::try_from(value).unwrap_or(I256::MAX)
}
