// src/config.rs
use std::env;

/// Availability of an optional runtime dependency.
///
/// Every credential and connection string is optional: a missing one leaves
/// the capability in `Missing` form with a human-readable reason instead of
/// aborting startup. Handlers match on this to decide between the real call
/// and the degraded response.
pub enum Capability<T> {
    Ready(T),
    Missing { reason: &'static str },
}

pub struct Config {
    pub port: u16,
    pub channel_access_token: Option<String>,
    pub channel_secret: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub database_url: Option<String>,
    pub public_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            channel_access_token: non_empty("LINE_CHANNEL_ACCESS_TOKEN"),
            channel_secret: non_empty("LINE_CHANNEL_SECRET"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            database_url: non_empty("DATABASE_URL"),
            public_base_url: non_empty("PUBLIC_BASE_URL"),
        }
    }
}

// Deployment platforms sometimes inject empty-string env vars; treat those
// the same as unset.
fn non_empty(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}
