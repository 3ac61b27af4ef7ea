use std::env;
use std::str::FromStr;
use tracing::warn;

/// Retrieves an environment variable and splits it into a vector of strings based on a delimiter.
///
/// Empty entries are dropped, so an unset variable yields an empty vector.
pub fn get_env_var_as_vec(var: &str, delimiter: char) -> Vec<String> {
    env::var(var)
        .unwrap_or_default()
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Retrieves an environment variable, falling back to `default` when unset or empty.
pub fn get_env_string(var: &str, default: &str) -> String {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Parses an environment variable, logging and using `default` when it can't be parsed.
pub fn get_env_parsed<T: FromStr>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => match value.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Ignoring unparseable value for {}: {:?}", var, value);
                default
            }
        },
        _ => default,
    }
}

/// Reads a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn get_env_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            "" => default,
            other => {
                warn!("Ignoring unrecognized boolean for {}: {:?}", var, other);
                default
            }
        },
        Err(_) => default,
    }
}
