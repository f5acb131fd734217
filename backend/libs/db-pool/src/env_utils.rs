//! Environment variable parsing utilities

use std::str::FromStr;

/// Parse an environment variable with a default fallback
///
/// Missing and unparseable values both fall back to `default`.
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an environment variable, returning Result
///
/// # Example
/// ```ignore
/// let host = parse_env_required::<String>("POSTGRES_HOST")?;
/// ```
pub fn parse_env_required<T: FromStr>(key: &str) -> Result<T, String> {
    std::env::var(key)
        .map_err(|_| format!("Environment variable {} not found", key))?
        .parse()
        .map_err(|_| format!("Failed to parse environment variable {}", key))
}
