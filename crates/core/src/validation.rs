//! Request validation rules for script submissions.
//!
//! The patterns back the `validator` derive on the create DTO; the blank
//! script check runs separately since `length(min = 1)` accepts whitespace.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// CPU request used when the caller does not specify one.
pub const DEFAULT_CPU: &str = "500m";

/// Memory request used when the caller does not specify one.
pub const DEFAULT_MEMORY: &str = "256Mi";

/// CPU quantities: millicores (`500m`) or whole/fractional cores (`1`, `1.5`).
pub static CPU_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+m|\d+(\.\d+)?)$").expect("valid CPU regex"));

/// Memory quantities in binary units: `256Mi`, `1Gi`.
pub static MEMORY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(Mi|Gi)$").expect("valid memory regex"));

/// Validate a script body: it must contain something other than whitespace.
pub fn validate_script(script: &str) -> Result<(), CoreError> {
    if script.trim().is_empty() {
        return Err(CoreError::Validation("script must not be blank".into()));
    }
    Ok(())
}
