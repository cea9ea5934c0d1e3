use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub governance: GovernanceConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            governance: GovernanceConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the quota engine's optimistic concurrency and reservation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceConfig {
    /// Conditional-write attempts per quota operation before `Contention` is surfaced.
    pub max_retries: u32,
    /// Initial backoff between attempts; doubles per attempt up to 50ms.
    pub backoff_ms: u64,
    /// Attempts spent on a compensating release before giving up with a storage error.
    pub compensation_attempts: u32,
    /// Age after which an unfilled reservation may be expired. `None` keeps reservations open.
    pub reservation_ttl_days: Option<u32>,
    /// Optional JSON master-data seed loaded by the API service.
    pub seed_file: Option<PathBuf>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            backoff_ms: 1,
            compensation_attempts: 5,
            reservation_ttl_days: None,
            seed_file: None,
        }
    }
}

impl GovernanceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_retries = parse_var("HEADCOUNT_MAX_RETRIES")?.unwrap_or(defaults.max_retries);
        if max_retries == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "HEADCOUNT_MAX_RETRIES",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            max_retries,
            backoff_ms: parse_var("HEADCOUNT_BACKOFF_MS")?.unwrap_or(defaults.backoff_ms),
            compensation_attempts: parse_var("HEADCOUNT_COMPENSATION_ATTEMPTS")?
                .unwrap_or(defaults.compensation_attempts)
                .max(1),
            reservation_ttl_days: parse_var("HEADCOUNT_RESERVATION_TTL_DAYS")?,
            seed_file: env::var("HEADCOUNT_SEED_FILE")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer (got '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "HEADCOUNT_MAX_RETRIES",
            "HEADCOUNT_BACKOFF_MS",
            "HEADCOUNT_COMPENSATION_ATTEMPTS",
            "HEADCOUNT_RESERVATION_TTL_DAYS",
            "HEADCOUNT_SEED_FILE",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.governance, GovernanceConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_governance_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HEADCOUNT_MAX_RETRIES", "3");
        env::set_var("HEADCOUNT_RESERVATION_TTL_DAYS", "30");
        env::set_var("HEADCOUNT_SEED_FILE", "seed.json");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.governance.max_retries, 3);
        assert_eq!(config.governance.reservation_ttl_days, Some(30));
        assert_eq!(
            config.governance.seed_file,
            Some(PathBuf::from("seed.json"))
        );
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_retry_budget() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HEADCOUNT_MAX_RETRIES", "many");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { key, .. }) => {
                assert_eq!(key, "HEADCOUNT_MAX_RETRIES")
            }
            other => panic!("expected invalid number, got {other:?}"),
        }
        reset_env();
    }
}
