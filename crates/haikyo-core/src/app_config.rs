use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Root of the target site; relative links resolve against it.
    pub base_url: String,
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
    /// Minimum spacing between two page fetches issued by one scraper.
    pub inter_request_delay_ms: u64,
    pub max_linked_posts: usize,
    pub description_max_chars: usize,
    pub default_max_locations: usize,
    pub geocoder_url: String,
    pub geocode_max_attempts: u32,
    pub geocode_backoff_ms: u64,
    pub country_qualifier: String,
    pub export_dir: PathBuf,
    /// Whether country-center fallback coordinates are written to exports.
    pub export_include_fallback: bool,
}
