//! Environment variable expansion for configuration files
//!
//! Configuration text may reference variables as `${NAME}` or, with a
//! fallback, `${NAME:-fallback}`. Expansion happens on the raw YAML before
//! it is parsed, so credentials and bucket names can come from CI secrets.

use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

/// `${NAME}` or `${NAME:-fallback}`; the fallback may be empty.
static VAR_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("variable reference pattern is valid")
});

/// Expand every variable reference in `input`.
///
/// Unset variables without a fallback are collected and reported together
/// in a single validation error.
pub fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let expanded = VAR_REFERENCE.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (env::var(name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_string(),
            (Err(_), None) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded.into_owned())
}
