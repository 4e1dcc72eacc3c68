use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

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
    pub collaborators: CollaboratorConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let timeout_secs = parse_number("COLLABORATOR_TIMEOUT_SECS", 30u64)?;
        let collaborators = CollaboratorConfig {
            classifier_url: non_empty_var("CLASSIFIER_URL"),
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            explainer_model: env::var("EXPLAINER_MODEL")
                .unwrap_or_else(|_| DEFAULT_EXPLAINER_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let render_dpi = parse_number("INTAKE_RENDER_DPI", 150u32)?;
        if render_dpi == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "INTAKE_RENDER_DPI",
            });
        }
        let intake = IntakeConfig {
            render_dpi,
            max_batch: parse_number("INTAKE_MAX_BATCH", 50usize)?,
            pdftotext_bin: env::var("PDFTOTEXT_BIN").unwrap_or_else(|_| "pdftotext".to_string()),
            pdftoppm_bin: env::var("PDFTOPPM_BIN").unwrap_or_else(|_| "pdftoppm".to_string()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            collaborators,
            intake,
        })
    }
}

const DEFAULT_EXPLAINER_MODEL: &str = "claude-sonnet-4-20250514";

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        None => Ok(default),
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Endpoints and credentials for the scoring model and explanation generator.
#[derive(Clone)]
pub struct CollaboratorConfig {
    pub classifier_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub explainer_model: String,
    pub timeout: Duration,
}

impl fmt::Debug for CollaboratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaboratorConfig")
            .field("classifier_url", &self.classifier_url)
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("explainer_model", &self.explainer_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Document intake settings: rasterization and batch limits.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub render_dpi: u32,
    pub max_batch: usize,
    pub pdftotext_bin: String,
    pub pdftoppm_bin: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            render_dpi: 150,
            max_batch: 50,
            pdftotext_bin: "pdftotext".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    MissingClassifier,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a positive number")
            }
            ConfigError::MissingClassifier => {
                write!(f, "CLASSIFIER_URL must be set to score applications")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::MissingClassifier => None,
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
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "CLASSIFIER_URL",
            "ANTHROPIC_API_KEY",
            "EXPLAINER_MODEL",
            "COLLABORATOR_TIMEOUT_SECS",
            "INTAKE_RENDER_DPI",
            "INTAKE_MAX_BATCH",
            "PDFTOTEXT_BIN",
            "PDFTOPPM_BIN",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.collaborators.classifier_url.is_none());
        assert_eq!(config.collaborators.timeout, Duration::from_secs(30));
        assert_eq!(config.intake.render_dpi, 150);
        assert_eq!(config.intake.max_batch, 50);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 8000));
        reset_env();
    }

    #[test]
    fn rejects_zero_render_dpi() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("INTAKE_RENDER_DPI", "0");
        let err = AppConfig::load().expect_err("zero dpi rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                name: "INTAKE_RENDER_DPI"
            }
        ));
        reset_env();
    }

    #[test]
    fn redacts_api_key_in_debug_output() {
        let config = CollaboratorConfig {
            classifier_url: Some("http://127.0.0.1:9000/predict".to_string()),
            anthropic_api_key: Some("sk-secret".to_string()),
            explainer_model: DEFAULT_EXPLAINER_MODEL.to_string(),
            timeout: Duration::from_secs(5),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
