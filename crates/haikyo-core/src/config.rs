use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but cannot be parsed.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but cannot be parsed.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Every variable has a default, so only malformed values fail.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let env = parse_environment(&or_default("HAIKYO_ENV", "development"))?;
    let bind_addr = parse_addr("HAIKYO_BIND_ADDR", "0.0.0.0:5000")?;
    let log_level = or_default("HAIKYO_LOG_LEVEL", "info");

    let mut base_url = or_default("HAIKYO_BASE_URL", "https://haikyo.info/");
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(invalid(
            "HAIKYO_BASE_URL",
            format!("'{base_url}' is not an http(s) URL"),
        ));
    }
    if !base_url.ends_with('/') {
        base_url.push('/');
    }

    let user_agent = or_default("HAIKYO_USER_AGENT", DEFAULT_USER_AGENT);
    let fetch_timeout_secs = parse_u64("HAIKYO_FETCH_TIMEOUT_SECS", "10")?;
    let inter_request_delay_ms = parse_u64("HAIKYO_INTER_REQUEST_DELAY_MS", "1000")?;
    let max_linked_posts = parse_usize("HAIKYO_MAX_LINKED_POSTS", "3")?;

    let description_max_chars = parse_usize("HAIKYO_DESCRIPTION_MAX_CHARS", "1000")?;
    if description_max_chars < 4 {
        return Err(invalid(
            "HAIKYO_DESCRIPTION_MAX_CHARS",
            "must be at least 4".to_string(),
        ));
    }

    let default_max_locations = parse_usize("HAIKYO_DEFAULT_MAX_LOCATIONS", "10")?;
    let geocoder_url = or_default("HAIKYO_GEOCODER_URL", "https://nominatim.openstreetmap.org")
        .trim_end_matches('/')
        .to_string();

    let geocode_max_attempts = parse_u32("HAIKYO_GEOCODE_MAX_ATTEMPTS", "3")?;
    if geocode_max_attempts == 0 {
        return Err(invalid(
            "HAIKYO_GEOCODE_MAX_ATTEMPTS",
            "must be at least 1".to_string(),
        ));
    }
    let geocode_backoff_ms = parse_u64("HAIKYO_GEOCODE_BACKOFF_MS", "1000")?;
    let country_qualifier = or_default("HAIKYO_COUNTRY_QUALIFIER", "Japan");
    let export_dir = PathBuf::from(or_default("HAIKYO_EXPORT_DIR", "./exports"));
    let export_include_fallback = parse_bool("HAIKYO_EXPORT_INCLUDE_FALLBACK", "false")?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        base_url,
        user_agent,
        fetch_timeout_secs,
        inter_request_delay_ms,
        max_linked_posts,
        description_max_chars,
        default_max_locations,
        geocoder_url,
        geocode_max_attempts,
        geocode_backoff_ms,
        country_qualifier,
        export_dir,
        export_include_fallback,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "HAIKYO_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
