//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub webhook: WebhookConfig,
    pub rate_api: RateApiConfig,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

/// Webhook投递配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// HMAC-SHA256 共享密钥
    pub secret: String,
    /// 订阅方接收地址
    pub sink_url: String,
    pub max_attempts: i32,
    pub api_version: String,
}

/// 汇率源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateApiConfig {
    pub url: String,
    pub api_key: Option<String>,
    /// 缓存TTL（秒）
    pub cache_ttl_secs: u64,
}

/// 外部服务商配置（onramp / offramp / 余额查询）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub onramp_url: String,
    pub offramp_url: String,
    pub balance_oracle_url: String,
    pub timeout_secs: u64,
}

/// 功能开关配置 (Feature Flags)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    pub enable_webhook_delivery: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://postgres@localhost:5432/ironramp".into()),
            max_connections: std::env::var("DB_MAX_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            min_connections: std::env::var("DB_MIN_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            acquire_timeout_secs: std::env::var("DB_ACQ_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".into()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: std::env::var("WEBHOOK_SECRET").unwrap_or_else(|_| {
                // 警告在 main.rs 中根据实际使用的密钥输出
                "default-webhook-secret-please-change-in-production".to_string()
            }),
            sink_url: std::env::var("WEBHOOK_SINK_URL")
                .unwrap_or_else(|_| "http://localhost:9000/webhooks".into()),
            max_attempts: std::env::var("WEBHOOK_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            api_version: std::env::var("WEBHOOK_API_VERSION")
                .unwrap_or_else(|_| "2025-03-01".into()),
        }
    }
}

impl Default for RateApiConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("RATE_API_URL")
                .unwrap_or_else(|_| "https://api.exchangerate.host/latest".into()),
            api_key: std::env::var("RATE_API_KEY").ok(),
            cache_ttl_secs: std::env::var("RATE_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            onramp_url: std::env::var("ONRAMP_API_URL")
                .unwrap_or_else(|_| "http://localhost:9100".into()),
            offramp_url: std::env::var("OFFRAMP_API_URL")
                .unwrap_or_else(|_| "http://localhost:9200".into()),
            balance_oracle_url: std::env::var("BALANCE_ORACLE_URL")
                .unwrap_or_else(|_| "http://localhost:9300".into()),
            timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            enable_webhook_delivery: std::env::var("WEBHOOK_DELIVERY_ENABLED")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            webhook: WebhookConfig::default(),
            rate_api: RateApiConfig::default(),
            providers: ProvidersConfig::default(),
            features: FeaturesConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                let file_config = Self::from_file(path)?;
                config = file_config;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
        }

        if self.webhook.secret.len() < 16 {
            anyhow::bail!("WEBHOOK_SECRET must be at least 16 characters");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.webhook.max_attempts < 1 {
            anyhow::bail!("WEBHOOK_MAX_ATTEMPTS must be >= 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_config_from_env() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.database.max_connections, 16);
        assert_eq!(config.rate_api.cache_ttl_secs, 30);
        assert_eq!(config.webhook.max_attempts, 3);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgres://test@localhost/test"
max_connections = 20
min_connections = 5
acquire_timeout_secs = 30
idle_timeout_secs = 600

[redis]
url = "redis://localhost:6379"

[server]
bind_addr = "0.0.0.0:9090"

[logging]
level = "info"
format = "text"
enable_file_logging = false

[webhook]
secret = "test_secret_at_least_16_chars"
sink_url = "http://localhost:9000/webhooks"
max_attempts = 3
api_version = "2025-03-01"

[rate_api]
url = "http://localhost:9400/rates"
cache_ttl_secs = 30

[providers]
onramp_url = "http://localhost:9100"
offramp_url = "http://localhost:9200"
balance_oracle_url = "http://localhost:9300"
timeout_secs = 30
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.server.bind_addr, "0.0.0.0:9090");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_short_secret() {
        let mut config = Config::from_env().unwrap();
        config.webhook.secret = "short".to_string();
        assert!(config.validate().is_err());
    }
}
