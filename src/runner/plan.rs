//! Validated exploit plan built from configuration

use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::domain::abi::{ArgTemplate, FunctionSpec};

/// A write to issue: what to call and how to fill its arguments
#[derive(Debug, Clone)]
pub struct Invocation {
    pub function: FunctionSpec,
    pub args: Vec<ArgTemplate>,
}

impl Invocation {
    pub fn new(signature: &str, args: Vec<ArgTemplate>) -> Result<Self> {
        let function = FunctionSpec::parse(signature)?;
        if args.len() != function.inputs.len() {
            bail!(
                "{} takes {} arguments but {} are configured",
                function.signature,
                function.inputs.len(),
                args.len()
            );
        }
        Ok(Self { function, args })
    }
}

/// How long to wait for a write to finalize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finality {
    timeout: Duration,
    poll_interval: Duration,
}

impl Finality {
    /// Both durations must be non-zero and the interval no longer than the timeout
    pub fn new(timeout: Duration, poll_interval: Duration) -> Result<Self> {
        if timeout.is_zero() {
            bail!("finalization timeout must be greater than zero");
        }
        if poll_interval.is_zero() {
            bail!("receipt poll interval must be greater than zero");
        }
        if poll_interval > timeout {
            bail!(
                "receipt poll interval ({:?}) exceeds the finalization timeout ({:?})",
                poll_interval,
                timeout
            );
        }
        Ok(Self {
            timeout,
            poll_interval,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Everything the fixed script needs besides the ledger
#[derive(Debug, Clone)]
pub struct ExploitPlan {
    /// Setup contract that knows the target and judges success
    pub setup: Address,
    /// Setup getter returning the target address
    pub target_getter: FunctionSpec,
    /// Setup predicate returning a bool
    pub solved: FunctionSpec,
    /// Storage slot holding the target's owner
    pub owner_slot: U256,
    /// Privilege-claim write
    pub claim: Invocation,
    /// Value-extraction write
    pub withdraw: Invocation,
    pub finality: Finality,
}

impl ExploitPlan {
    /// Build from configuration; `setup_override` wins over `[setup].address`
    pub fn from_config(config: &Config, setup_override: Option<&str>) -> Result<Self> {
        let raw_setup = setup_override
            .or(config.setup.address.as_deref())
            .context("no setup contract address (use --setup or [setup].address)")?;
        let setup = parse_address(raw_setup)?;

        let target_getter = FunctionSpec::parse(&config.setup.target_getter)
            .context("[setup].target_getter")?;
        if !target_getter.inputs.is_empty() {
            bail!("{} must take no arguments", target_getter.signature);
        }

        let solved = FunctionSpec::parse(&config.setup.solved).context("[setup].solved")?;
        if !solved.inputs.is_empty() {
            bail!("{} must take no arguments", solved.signature);
        }

        let claim = Invocation::new(&config.target.claim, config.target.claim_args.clone())
            .context("[target].claim")?;
        let withdraw =
            Invocation::new(&config.target.withdraw, config.target.withdraw_args.clone())
                .context("[target].withdraw")?;

        let finality = Finality::new(
            config.finalization.timeout(),
            config.finalization.poll_interval(),
        )
        .context("[finalization]")?;

        Ok(Self {
            setup,
            target_getter,
            solved,
            owner_slot: U256::from(config.target.owner_slot),
            claim,
            withdraw,
            finality,
        })
    }
}

/// Parse a 0x-prefixed address; checksum casing is not enforced
pub fn parse_address(raw: &str) -> Result<Address> {
    let raw = raw.trim();
    if !raw.starts_with("0x") {
        bail!("invalid address '{}': missing 0x prefix", raw);
    }
    raw.parse::<Address>()
        .with_context(|| format!("invalid address '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    const SETUP: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn test_default_plan() {
        let config = config::parse("").unwrap();
        let plan = ExploitPlan::from_config(&config, Some(SETUP)).unwrap();
        assert_eq!(plan.setup, parse_address(SETUP).unwrap());
        assert_eq!(plan.owner_slot, U256::ZERO);
        assert_eq!(plan.claim.function.signature, "setOwner()");
        assert_eq!(plan.withdraw.args, vec![ArgTemplate::Caller]);
        assert_eq!(plan.finality.timeout(), Duration::from_secs(120));
        assert_eq!(plan.finality.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_setup_address() {
        let config = config::parse("").unwrap();
        let err = ExploitPlan::from_config(&config, None).unwrap_err();
        assert!(err.to_string().contains("no setup contract address"));
    }

    #[test]
    fn test_argument_count_checked() {
        let config = config::parse("[target]\nwithdraw_args = []\n").unwrap();
        assert!(ExploitPlan::from_config(&config, Some(SETUP)).is_err());
    }

    #[test]
    fn test_getter_with_inputs_rejected() {
        let config = config::parse("[setup]\ntarget_getter = \"wallet(uint256) returns (address)\"\n").unwrap();
        assert!(ExploitPlan::from_config(&config, Some(SETUP)).is_err());
    }

    #[test]
    fn test_finality_rejects_zero_durations() {
        let second = Duration::from_secs(1);
        assert!(Finality::new(Duration::ZERO, Duration::from_millis(5)).is_err());
        assert!(Finality::new(second, Duration::ZERO).is_err());
        assert!(Finality::new(second, Duration::from_secs(2)).is_err());
        assert!(Finality::new(second, second).is_ok());
    }

    #[test]
    fn test_zero_finalization_config_rejected() {
        let config = config::parse("[finalization]\npoll_interval_ms = 0\n").unwrap();
        let err = ExploitPlan::from_config(&config, Some(SETUP)).unwrap_err();
        assert!(format!("{err:#}").contains("poll interval must be greater than zero"));

        let config = config::parse("[finalization]\ntimeout_secs = 0\n").unwrap();
        let err = ExploitPlan::from_config(&config, Some(SETUP)).unwrap_err();
        assert!(format!("{err:#}").contains("timeout must be greater than zero"));
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("5FbDB2315678afecb367f032d93F642f64180aa3").is_err());
        assert!(parse_address("0xZZbDB2315678afecb367f032d93F642f64180aa3").is_err());
        assert_eq!(
            parse_address(" 0x0000000000000000000000000000000000000001 ").unwrap(),
            Address::with_last_byte(1)
        );
    }
}
