use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL. Without it the service runs on the in-memory store.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Cloudinary,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_storage_api_base")]
    pub api_base: String,
}

fn default_storage_api_base() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Memory,
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base: default_storage_api_base(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_document_bytes: usize,
    pub max_cover_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 50 * 1024 * 1024,
            max_cover_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub download_max: u32,
    pub download_window_secs: u64,
    pub search_max: u32,
    pub search_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            download_max: 50,
            download_window_secs: 15 * 60,
            search_max: 60,
            search_window_secs: 60,
        }
    }
}

/// Settings for the authenticated API client
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub login_path: String,
    pub refresh_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api/v1".to_string(),
            timeout_secs: 30,
            login_path: "/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: e_library.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 5000
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.gateway.port, 5000);
        assert!(config.postgres_url.is_none());
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.uploads.max_document_bytes, 50 * 1024 * 1024);
        assert_eq!(config.storage.provider, StorageProvider::Memory);
    }

    #[test]
    fn test_storage_section() {
        let yaml = format!(
            "{}storage:\n  provider: cloudinary\n  cloud_name: demo\n  api_key: k\n  api_secret: s\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.storage.provider, StorageProvider::Cloudinary);
        assert_eq!(config.storage.cloud_name, "demo");
        assert_eq!(config.storage.api_base, "https://api.cloudinary.com/v1_1");
    }
}
