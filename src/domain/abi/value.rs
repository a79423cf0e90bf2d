//! Argument templates and value rendering

use std::fmt;

use alloy::primitives::{Address, U256};
use alloy_dyn_abi::{DynSolType, DynSolValue};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Values known to the runner at the time a call is encoded
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    /// Address of the signing account
    pub caller: Address,
    /// Resolved contract under attack
    pub target: Address,
    /// Target balance observed before any write
    pub target_balance: U256,
}

/// A call argument as written in configuration
///
/// `$caller`, `$target` and `$target_balance` are substituted at run time;
/// anything else is a literal coerced to the parameter type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArgTemplate {
    Caller,
    Target,
    TargetBalance,
    Literal(String),
}

impl From<String> for ArgTemplate {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "$caller" | "$self" => ArgTemplate::Caller,
            "$target" => ArgTemplate::Target,
            "$target_balance" => ArgTemplate::TargetBalance,
            other => ArgTemplate::Literal(other.to_string()),
        }
    }
}

impl From<ArgTemplate> for String {
    fn from(template: ArgTemplate) -> Self {
        template.to_string()
    }
}

impl fmt::Display for ArgTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgTemplate::Caller => f.write_str("$caller"),
            ArgTemplate::Target => f.write_str("$target"),
            ArgTemplate::TargetBalance => f.write_str("$target_balance"),
            ArgTemplate::Literal(raw) => f.write_str(raw),
        }
    }
}

impl ArgTemplate {
    /// Produce a concrete value of type `ty`
    pub fn resolve(&self, ty: &DynSolType, ctx: &CallContext) -> Result<DynSolValue> {
        let value = match self {
            ArgTemplate::Caller => DynSolValue::Address(ctx.caller),
            ArgTemplate::Target => DynSolValue::Address(ctx.target),
            ArgTemplate::TargetBalance => match ty {
                DynSolType::Uint(bits) => DynSolValue::Uint(ctx.target_balance, *bits),
                other => bail!("$target_balance cannot fill a {} parameter", other),
            },
            ArgTemplate::Literal(raw) => {
                return ty
                    .coerce_str(strip_quotes(raw))
                    .with_context(|| format!("'{}' is not a valid {}", raw, ty));
            }
        };

        if !ty.matches(&value) {
            bail!("{} cannot fill a {} parameter", self, ty);
        }
        Ok(value)
    }
}

/// Resolve a full argument list against the parameter types
pub fn resolve_args(
    templates: &[ArgTemplate],
    types: &[DynSolType],
    ctx: &CallContext,
) -> Result<Vec<DynSolValue>> {
    if templates.len() != types.len() {
        bail!(
            "expected {} arguments, configuration supplies {}",
            types.len(),
            templates.len()
        );
    }

    templates
        .iter()
        .zip(types)
        .enumerate()
        .map(|(idx, (template, ty))| {
            template
                .resolve(ty, ctx)
                .with_context(|| format!("argument {}", idx + 1))
        })
        .collect()
}

fn strip_quotes(raw: &str) -> &str {
    let raw = raw.trim();
    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

/// Format a decoded value for the report
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => {
            let bytes = &word.as_slice()[..(*size).min(32)];
            format!("0x{}", hex::encode(bytes))
        }
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::Function(func) => format!("0x{}", hex::encode(func.as_slice())),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::String(s) => format!("\"{}\"", s),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        DynSolValue::Tuple(fields) => {
            let items: Vec<String> = fields.iter().map(format_value).collect();
            format!("({})", items.join(", "))
        }
    }
}

/// Format a list of return values; a single value is shown bare
pub fn format_values(values: &[DynSolValue]) -> String {
    match values {
        [] => "()".to_string(),
        [single] => format_value(single),
        many => {
            let items: Vec<String> = many.iter().map(format_value).collect();
            format!("({})", items.join(", "))
        }
    }
}
