//! Contract interface descriptors
//!
//! Function signatures arrive as configuration strings and are turned
//! into selectors plus argument/return shapes with alloy-dyn-abi.

mod function;
mod value;

pub use function::FunctionSpec;
pub use value::{format_value, format_values, resolve_args, ArgTemplate, CallContext};
