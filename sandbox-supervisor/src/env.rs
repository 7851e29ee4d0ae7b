//! Environment escaping for the `[supervisord]` section.
//!
//! The supervisor's ini dialect expands `%(name)s` everywhere, so `%` cannot
//! be carried at all, and a value can be quoted with one quote character
//! only:
//!
//! | Value contains     | Result               |
//! |--------------------|----------------------|
//! | `%`                | rejected             |
//! | `"` and `'`        | rejected             |
//! | `"` only           | `NAME='value'`       |
//! | neither            | `NAME="value"`       |

use sandbox_core::EnvVar;

use crate::error::RenderError;

/// Quote one value, or `None` when it cannot be represented.
pub fn quote_value(value: &str) -> Option<String> {
    if value.contains('%') {
        return None;
    }
    if value.contains('"') {
        if value.contains('\'') {
            return None;
        }
        return Some(format!("'{value}'"));
    }
    Some(format!("\"{value}\""))
}

/// Build the `environment=` value for `vars`, in input order.
///
/// Returns `Ok(None)` for an empty list. Any value that cannot be quoted
/// aborts with every offending name listed.
pub fn escape_environment(vars: &[EnvVar]) -> Result<Option<String>, RenderError> {
    let mut pairs = Vec::with_capacity(vars.len());
    let mut rejected = Vec::new();

    for var in vars {
        match quote_value(&var.value) {
            Some(quoted) => pairs.push(format!("{}={quoted}", var.name)),
            None => rejected.push(var.name.clone()),
        }
    }

    if !rejected.is_empty() {
        return Err(RenderError::UnsafeEnvironment { names: rejected });
    }
    if pairs.is_empty() {
        return Ok(None);
    }
    Ok(Some(pairs.join(",")))
}
