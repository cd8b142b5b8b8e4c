//! Pure environment resolvers.
//!
//! Each resolver is total: absent or malformed input yields the supplied
//! default. Malformed values are logged so operators can spot typos, but
//! never abort startup on their own.

use std::env;

/// Resolves a string option, falling back to `default` when absent.
pub fn env_str(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Resolves a boolean option. Accepts `true`/`false` case-insensitively
/// and `1`/`0`; anything else falls back to `default`.
pub fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                tracing::warn!(option = name, value = other, "unrecognized boolean, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Resolves an unsigned integer option.
pub fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(option = name, value = %raw, "unparsable integer, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Resolves a port-sized integer option.
pub fn env_u16(name: &str, default: u16) -> u16 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(option = name, value = %raw, "unparsable port, using default");
            default
        }),
        Err(_) => default,
    }
}
