//! Sample tools shipped with the binaries.

use super::Tool;
use super::catalog::ToolCatalog;

use anyhow::{Context, Result};
use serde_json::Value;

/// Identifier legacy clients submit Fibonacci jobs under.
pub const FIBONACCI_LEGACY_ID: &str = "appserver.job.impl.Fibonacci";

/// Largest input whose result fits in a `u64`.
const FIBONACCI_MAX_INPUT: u64 = 93;

/// Returns its parameter unchanged.
#[derive(Debug, Default)]
pub struct Echo;

impl Tool for Echo {
    fn invoke(&self, parameter: Value) -> Result<Value> {
        Ok(parameter)
    }
}

/// n-th Fibonacci number by naive recursion. The cluster's CPU-bound sample workload.
#[derive(Debug, Default)]
pub struct Fibonacci;

impl Tool for Fibonacci {
    fn invoke(&self, parameter: Value) -> Result<Value> {
        let n = parameter
            .as_u64()
            .with_context(|| format!("expected a non-negative integer, got {}", parameter))?;

        if n > FIBONACCI_MAX_INPUT {
            anyhow::bail!("fibonacci({}) overflows a 64-bit result", n);
        }

        Ok(Value::from(fibonacci(n)))
    }
}

fn fibonacci(n: u64) -> u64 {
    match n {
        0 => 0,
        1 => 1,
        _ => fibonacci(n - 1) + fibonacci(n - 2),
    }
}

/// Registers every sample tool, including the legacy Fibonacci identifier.
pub fn register_builtin_tools(catalog: &ToolCatalog) {
    catalog.register_default::<Echo>("Echo");
    catalog.register_default::<Fibonacci>("Fibonacci");
    catalog.register_default::<Fibonacci>(FIBONACCI_LEGACY_ID);
}
