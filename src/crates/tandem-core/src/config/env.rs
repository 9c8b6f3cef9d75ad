//! Environment variable readers
//!
//! Every reader returns `Ok(None)` when the variable is unset and a
//! [`CompositionError::Configuration`] when it is set to something unusable.

use crate::error::{CompositionError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Read a variable as a string
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(CompositionError::Configuration(format!(
            "environment variable {} contains invalid UTF-8",
            key
        ))),
    }
}

/// Read and parse a variable
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key)?
        .map(|val| {
            val.trim().parse::<T>().map_err(|e| {
                CompositionError::Configuration(format!(
                    "failed to parse environment variable {}: {}",
                    key, e
                ))
            })
        })
        .transpose()
}

/// Read a millisecond count as a [`Duration`]
pub fn get_env_millis(key: &str) -> Result<Option<Duration>> {
    Ok(get_env_parse::<u64>(key)?.map(Duration::from_millis))
}

/// Read a boolean variable
///
/// Accepts "true", "1", "yes", "on" and "false", "0", "no", "off" in any case.
pub fn get_env_bool(key: &str) -> Result<Option<bool>> {
    let Some(val) = get_env(key)? else {
        return Ok(None);
    };
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(CompositionError::Configuration(format!(
            "invalid boolean value for {}: {}",
            key, val
        ))),
    }
}

/// Prefixed, upper-cased variable name: `env_key("TANDEM_", "result_ttl_ms")`
/// is `TANDEM_RESULT_TTL_MS`
pub fn env_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_uppercase())
}
