use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub api_port: u16,
    pub jwt_secret: String,
    pub token_ttl_days: u64,
    pub session_ttl_hours: i64,
    pub cors_origins: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub upstream_url: Option<String>,
    pub upstream_token: Option<String>,
    pub max_retries: u32,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// `None` keeps notifications forever.
    pub ttl_days: Option<i64>,
    pub sweep_interval_secs: u64,
    pub overdue_check_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();

        Config {
            storage: StorageConfig {
                data_dir: env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                api_port: env::var("API_PORT")
                    .or_else(|_| env::var("PORT"))
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8080),
                jwt_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string()),
                token_ttl_days: env_or("TOKEN_TTL_DAYS", 7),
                session_ttl_hours: env_or("SESSION_TTL_HOURS", 168),
                cors_origins: env::var("CORS_ORIGINS").ok(),
            },
            queue: QueueConfig {
                upstream_url: env::var("UPSTREAM_URL")
                    .ok()
                    .map(|u| u.trim_end_matches('/').to_string())
                    .filter(|u| !u.is_empty()),
                upstream_token: env::var("UPSTREAM_TOKEN").ok(),
                max_retries: env_or("QUEUE_MAX_RETRIES", 3),
                poll_interval_ms: env_or("QUEUE_POLL_INTERVAL_MS", 5000),
            },
            notifications: NotificationConfig {
                ttl_days: match env::var("NOTIFICATION_TTL_DAYS") {
                    Ok(v) if v == "0" || v.eq_ignore_ascii_case("none") => None,
                    Ok(v) => Some(v.parse().unwrap_or(30)),
                    Err(_) => Some(30),
                },
                sweep_interval_secs: env_or("NOTIFICATION_SWEEP_SECS", 300),
                overdue_check_secs: env_or("OVERDUE_CHECK_SECS", 300),
            },
        }
    }
}

impl Default for Config {
    /// Development defaults with an in-tree data directory; used by tests.
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                api_port: 8080,
                jwt_secret: "test-secret".to_string(),
                token_ttl_days: 7,
                session_ttl_hours: 168,
                cors_origins: None,
            },
            queue: QueueConfig {
                upstream_url: None,
                upstream_token: None,
                max_retries: 3,
                poll_interval_ms: 5000,
            },
            notifications: NotificationConfig {
                ttl_days: Some(30),
                sweep_interval_secs: 300,
                overdue_check_secs: 300,
            },
        }
    }
}
