//! Function descriptors parsed from human-readable Solidity signatures

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_json_abi::{Function, Param};
use anyhow::{bail, Context, Result};

/// A callable contract function described by its signature
///
/// Built from strings such as `setOwner()`, `withdraw(address)` or
/// `function wallet() returns (address)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Function name
    pub name: String,
    /// Canonical signature used for the selector (e.g. "withdraw(address)")
    pub signature: String,
    /// 4-byte function selector
    pub selector: [u8; 4],
    /// Parameter types, in order
    pub inputs: Vec<DynSolType>,
    /// Return types from the `returns` clause (may be empty)
    pub outputs: Vec<DynSolType>,
}

impl FunctionSpec {
    /// Parse a human-readable signature
    pub fn parse(signature: &str) -> Result<Self> {
        let trimmed = signature.trim();
        if trimmed.is_empty() {
            bail!("empty function signature");
        }

        let function = Function::parse(trimmed)
            .with_context(|| format!("invalid function signature '{}'", trimmed))?;

        let inputs = resolve_params(&function.inputs)
            .with_context(|| format!("bad parameter list in '{}'", trimmed))?;
        let outputs = resolve_params(&function.outputs)
            .with_context(|| format!("bad returns clause in '{}'", trimmed))?;

        Ok(Self {
            name: function.name.clone(),
            signature: function.signature(),
            selector: function.selector().0,
            inputs,
            outputs,
        })
    }

    /// Encode calldata: selector followed by the ABI-encoded arguments
    pub fn encode_call(&self, args: &[DynSolValue]) -> Result<Vec<u8>> {
        if args.len() != self.inputs.len() {
            bail!(
                "argument count mismatch for {}: expected {}, got {}",
                self.signature,
                self.inputs.len(),
                args.len()
            );
        }

        for (idx, (ty, value)) in self.inputs.iter().zip(args).enumerate() {
            if !ty.matches(value) {
                bail!(
                    "argument {} of {} does not match type {}",
                    idx + 1,
                    self.signature,
                    ty
                );
            }
        }

        let mut calldata = self.selector.to_vec();
        if !args.is_empty() {
            let encoded = DynSolValue::Tuple(args.to_vec()).abi_encode_params();
            calldata.extend_from_slice(&encoded);
        }
        Ok(calldata)
    }

    /// Decode return data according to the `returns` clause
    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<DynSolValue>> {
        if self.outputs.is_empty() {
            return Ok(Vec::new());
        }
        if data.is_empty() {
            bail!("{} returned no data", self.signature);
        }

        let decoded = DynSolType::Tuple(self.outputs.clone())
            .abi_decode_params(data)
            .with_context(|| format!("failed to decode return data of {}", self.signature))?;

        match decoded {
            DynSolValue::Tuple(values) => Ok(values),
            other => Ok(vec![other]),
        }
    }
}

fn resolve_params(params: &[Param]) -> Result<Vec<DynSolType>> {
    params
        .iter()
        .map(|param| {
            let kind = param.selector_type();
            DynSolType::parse(&kind).with_context(|| format!("failed to parse type '{}'", kind))
        })
        .collect()
}
