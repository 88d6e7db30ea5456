use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

#[test]
fn parse_environment_development() {
    assert_eq!(
        parse_environment("development").unwrap(),
        Environment::Development
    );
}

#[test]
fn parse_environment_test() {
    assert_eq!(parse_environment("test").unwrap(), Environment::Test);
}

#[test]
fn parse_environment_production() {
    assert_eq!(
        parse_environment("production").unwrap(),
        Environment::Production
    );
}

#[test]
fn parse_environment_unknown_fails() {
    let err = parse_environment("staging").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "HAIKYO_ENV"));
}

#[test]
fn build_app_config_uses_defaults_when_env_is_empty() {
    let map: HashMap<&str, &str> = HashMap::new();
    let config = build_app_config(lookup_from_map(&map)).expect("defaults should be valid");

    assert_eq!(config.env, Environment::Development);
    assert_eq!(config.bind_addr.port(), 5000);
    assert_eq!(config.log_level, "info");
    assert_eq!(config.base_url, "https://haikyo.info/");
    assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    assert_eq!(config.fetch_timeout_secs, 10);
    assert_eq!(config.inter_request_delay_ms, 1000);
    assert_eq!(config.max_linked_posts, 3);
    assert_eq!(config.description_max_chars, 1000);
    assert_eq!(config.default_max_locations, 10);
    assert_eq!(config.geocoder_url, "https://nominatim.openstreetmap.org");
    assert_eq!(config.geocode_max_attempts, 3);
    assert_eq!(config.geocode_backoff_ms, 1000);
    assert_eq!(config.country_qualifier, "Japan");
    assert_eq!(config.export_dir, std::path::PathBuf::from("./exports"));
    assert!(!config.export_include_fallback);
}

#[test]
fn build_app_config_reads_overrides() {
    let mut map = HashMap::new();
    map.insert("HAIKYO_ENV", "production");
    map.insert("HAIKYO_BIND_ADDR", "127.0.0.1:8080");
    map.insert("HAIKYO_BASE_URL", "http://localhost:9999");
    map.insert("HAIKYO_INTER_REQUEST_DELAY_MS", "0");
    map.insert("HAIKYO_GEOCODER_URL", "http://localhost:7000/");
    map.insert("HAIKYO_EXPORT_INCLUDE_FALLBACK", "true");

    let config = build_app_config(lookup_from_map(&map)).expect("valid overrides");

    assert_eq!(config.env, Environment::Production);
    assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
    assert_eq!(config.base_url, "http://localhost:9999/");
    assert_eq!(config.inter_request_delay_ms, 0);
    assert_eq!(config.geocoder_url, "http://localhost:7000");
    assert!(config.export_include_fallback);
}

#[test]
fn build_app_config_rejects_non_numeric_timeout() {
    let mut map = HashMap::new();
    map.insert("HAIKYO_FETCH_TIMEOUT_SECS", "ten");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "HAIKYO_FETCH_TIMEOUT_SECS"),
        "expected InvalidEnvVar(HAIKYO_FETCH_TIMEOUT_SECS), got: {result:?}"
    );
}

#[test]
fn build_app_config_rejects_bad_bind_addr() {
    let mut map = HashMap::new();
    map.insert("HAIKYO_BIND_ADDR", "not-an-addr");
    let result = build_app_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "HAIKYO_BIND_ADDR"));
}

#[test]
fn build_app_config_rejects_zero_geocode_attempts() {
    let mut map = HashMap::new();
    map.insert("HAIKYO_GEOCODE_MAX_ATTEMPTS", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "HAIKYO_GEOCODE_MAX_ATTEMPTS"));
}

#[test]
fn build_app_config_rejects_non_http_base_url() {
    let mut map = HashMap::new();
    map.insert("HAIKYO_BASE_URL", "ftp://haikyo.info/");
    let result = build_app_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "HAIKYO_BASE_URL"));
}

#[test]
fn build_app_config_rejects_unparseable_bool() {
    let mut map = HashMap::new();
    map.insert("HAIKYO_EXPORT_INCLUDE_FALLBACK", "maybe");
    let result = build_app_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "HAIKYO_EXPORT_INCLUDE_FALLBACK"));
}
