use std::env;
use std::str::FromStr;

/// Which backing store holds users, rooms and OTP codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Redis,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::InvalidStorageBackend(other.to_string())),
        }
    }
}

/// How join credentials are handed to the video engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// Signed, expiring per-user token
    Token,
    /// Static app sign shared with the engine
    Sign,
}

impl FromStr for CredentialMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(CredentialMode::Token),
            "sign" => Ok(CredentialMode::Sign),
            other => Err(ConfigError::InvalidCredentialMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub storage_backend: StorageBackend,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub refresh_expiry_seconds: u64,
    pub bcrypt_cost: u32,
    pub zego_app_id: Option<u32>,
    pub zego_server_secret: Option<String>,
    pub zego_app_sign: Option<String>,
    pub credential_mode: CredentialMode,
    pub credential_ttl_seconds: u64,
    pub meetings_page_size: usize,
    pub instant_meeting_seconds: u64,
    pub enforce_schedule_window: bool,
    pub join_grace_seconds: u64,
    pub presence_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            storage_backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .parse()?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::MissingJwtSecret)?,
            jwt_expiry_seconds: parse_or("JWT_EXPIRY_SECONDS", 900),
            refresh_expiry_seconds: parse_or("REFRESH_EXPIRY_SECONDS", 7 * 24 * 3600),
            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            zego_app_id: match env::var("ZEGO_APP_ID") {
                Ok(raw) if !raw.trim().is_empty() => Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidAppId(raw.clone()))?,
                ),
                _ => None,
            },
            zego_server_secret: non_empty("ZEGO_SERVER_SECRET"),
            zego_app_sign: non_empty("ZEGO_APP_SIGN"),
            credential_mode: env::var("ZEGO_CREDENTIAL_MODE")
                .unwrap_or_else(|_| "token".to_string())
                .parse()?,
            credential_ttl_seconds: parse_or("CREDENTIAL_TTL_SECONDS", 3600),
            meetings_page_size: parse_or("MEETINGS_PAGE_SIZE", 10),
            instant_meeting_seconds: parse_or("INSTANT_MEETING_SECONDS", 3600),
            enforce_schedule_window: parse_or("ENFORCE_SCHEDULE_WINDOW", false),
            join_grace_seconds: parse_or("JOIN_GRACE_SECONDS", 600),
            presence_ttl_seconds: parse_or("PRESENCE_TTL_SECONDS", 3600),
            request_timeout_seconds: parse_or("REQUEST_TIMEOUT_SECONDS", 15),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Configuration used by unit and integration tests: in-memory storage, fixed secrets.
    pub fn for_tests() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            storage_backend: StorageBackend::Memory,
            redis_url: "redis://localhost".to_string(),
            jwt_secret: "test-secret-key".to_string(),
            jwt_expiry_seconds: 900,
            refresh_expiry_seconds: 3600,
            bcrypt_cost: 4,
            zego_app_id: Some(1_234_567_890),
            zego_server_secret: Some("00112233445566778899aabbccddeeff".to_string()),
            zego_app_sign: Some("a1b2c3d4".repeat(8)),
            credential_mode: CredentialMode::Token,
            credential_ttl_seconds: 3600,
            meetings_page_size: 10,
            instant_meeting_seconds: 3600,
            enforce_schedule_window: false,
            join_grace_seconds: 600,
            presence_ttl_seconds: 3600,
            request_timeout_seconds: 15,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server port")]
    InvalidPort,
    #[error("JWT_SECRET environment variable is required")]
    MissingJwtSecret,
    #[error("ZEGO_APP_ID must be a positive integer, got {0:?}")]
    InvalidAppId(String),
    #[error("Unknown STORAGE_BACKEND {0:?} (expected redis or memory)")]
    InvalidStorageBackend(String),
    #[error("Unknown ZEGO_CREDENTIAL_MODE {0:?} (expected token or sign)")]
    InvalidCredentialMode(String),
}
