use crate::error::WatcherError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// One saved search. Configuration data, read-only at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    /// Site-relative search path, e.g.
    /// "/to-rent/property/angel/?q=Angel%2C%20London&radius=1".
    pub query_url: String,
    /// Operator-assigned label routing accepted listings to subscribers.
    pub tag: String,
    #[serde(default)]
    pub min_price: Option<u32>,
    #[serde(default)]
    pub max_price: Option<u32>,
}

/// One delivery recipient and the search tags they follow.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub chat_id: i64,
    pub tags: HashSet<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> RetryConfig {
        RetryConfig {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram_api_key: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Directory holding tesseract language data.
    pub tessdata_path: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    pub queries: Vec<SearchQuery>,
    pub subscribers: Vec<Subscriber>,
    #[serde(default = "default_min_price")]
    pub default_min_price: u32,
    #[serde(default = "default_max_price")]
    pub default_max_price: u32,
    #[serde(default = "default_min_area_sqm")]
    pub min_area_sqm: f64,
    #[serde(default = "default_max_photos")]
    pub max_photos: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, WatcherError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WatcherError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| WatcherError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }
}

fn default_database_path() -> String {
    "watcher.db".to_string()
}

fn default_work_dir() -> String {
    "work".to_string()
}

fn default_cache_dir() -> String {
    "responses-cache".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_price() -> u32 {
    1500
}

fn default_max_price() -> u32 {
    4000
}

fn default_min_area_sqm() -> f64 {
    25.0
}

fn default_max_photos() -> usize {
    9
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_config_round_trip() {
        let raw = r#"{
            "telegram_api_key": "123:abc",
            "database_path": "rent.db",
            "tessdata_path": "/opt/tessdata",
            "queries": [
                {
                    "query_url": "/to-rent/property/angel/?q=Angel&radius=1",
                    "tag": "Angel",
                    "min_price": 2000,
                    "max_price": 8000
                },
                {
                    "query_url": "/to-rent/property/farringdon/?q=EC1M",
                    "tag": "Farringdon"
                }
            ],
            "subscribers": [
                { "id": "borys", "chat_id": 24273498, "tags": ["Angel", "Farringdon"] },
                { "id": "anton", "chat_id": 140064432, "tags": ["Angel"] }
            ],
            "retry": { "max_attempts": 3 }
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.database_path, "rent.db");
        assert_eq!(config.queries.len(), 2);
        assert_eq!(config.queries[0].min_price, Some(2000));
        assert_eq!(config.queries[1].min_price, None);
        assert!(config.subscribers[0].tags.contains("Farringdon"));

        // defaults
        assert_eq!(config.default_min_price, 1500);
        assert_eq!(config.default_max_price, 4000);
        assert_eq!(config.min_area_sqm, 25.0);
        assert_eq!(config.max_photos, 9);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_secs, 60);
        assert!(config.cache_enabled);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        assert!(serde_json::from_str::<Config>(r#"{ "queries": [] }"#).is_err());
    }
}
