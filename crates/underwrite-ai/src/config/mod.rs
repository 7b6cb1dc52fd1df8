use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

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

/// Raw-score window that lets a LOW scoring result pass for a given scoring segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssScoreBand {
    pub segment: String,
    pub min_score: f64,
    pub max_score: f64,
}

impl AssScoreBand {
    pub fn contains(&self, segment: &str, score: f64) -> bool {
        self.segment.eq_ignore_ascii_case(segment.trim())
            && score >= self.min_score
            && score <= self.max_score
    }
}

/// Underwriting thresholds and feature dials, passed explicitly into every rule stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub dsr_threshold: f64,
    pub max_vehicle_age: u32,
    pub fast_track_max_overdue_days: u32,
    pub min_top_up_disbursement_pct: f64,
    pub prime_max_months_since_expiry: u32,
    pub max_reject_nik: u32,
    pub max_reject_pmk_dsr: u32,
    pub same_name_bpkb: BTreeSet<String>,
    pub ass_bands: Vec<AssScoreBand>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            dsr_threshold: 35.0,
            max_vehicle_age: 23,
            fast_track_max_overdue_days: 30,
            min_top_up_disbursement_pct: 10.0,
            prime_max_months_since_expiry: 6,
            max_reject_nik: 3,
            max_reject_pmk_dsr: 2,
            same_name_bpkb: ["K", "P", "KK"].iter().map(|s| s.to_string()).collect(),
            ass_bands: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Read policy dials from the process environment, falling back to defaults for unset keys.
    /// `.env` files are not consulted here; load them once at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let same_name_bpkb = match env::var("POLICY_SAME_NAME_BPKB") {
            Ok(raw) => raw
                .split(',')
                .map(|code| code.trim().to_ascii_uppercase())
                .filter(|code| !code.is_empty())
                .collect(),
            Err(_) => defaults.same_name_bpkb,
        };

        let ass_bands = match env::var("POLICY_ASS_BANDS") {
            Ok(raw) => parse_ass_bands(&raw)?,
            Err(_) => defaults.ass_bands,
        };

        Ok(Self {
            dsr_threshold: env_or("POLICY_DSR_THRESHOLD", defaults.dsr_threshold)?,
            max_vehicle_age: env_or("POLICY_MAX_VEHICLE_AGE", defaults.max_vehicle_age)?,
            fast_track_max_overdue_days: env_or(
                "POLICY_MAX_OVERDUE_FAST_TRACK",
                defaults.fast_track_max_overdue_days,
            )?,
            min_top_up_disbursement_pct: env_or(
                "POLICY_MIN_TOPUP_DISBURSEMENT_PCT",
                defaults.min_top_up_disbursement_pct,
            )?,
            prime_max_months_since_expiry: env_or(
                "POLICY_PRIME_MAX_MONTHS_SINCE_EXPIRY",
                defaults.prime_max_months_since_expiry,
            )?,
            max_reject_nik: env_or("POLICY_MAX_REJECT_NIK", defaults.max_reject_nik)?,
            max_reject_pmk_dsr: env_or("POLICY_MAX_REJECT_PMK_DSR", defaults.max_reject_pmk_dsr)?,
            same_name_bpkb,
            ass_bands,
        })
    }

    pub fn is_same_name_bpkb(&self, code: &str) -> bool {
        self.same_name_bpkb
            .contains(code.trim().to_ascii_uppercase().as_str())
    }

    pub fn ass_override(&self, segment: &str, score: f64) -> Option<&AssScoreBand> {
        self.ass_bands
            .iter()
            .find(|band| band.contains(segment, score))
    }
}

/// Source of the policy snapshot used for one evaluation request.
pub trait PolicyProvider: Send + Sync {
    fn current(&self) -> Result<PolicyConfig, ConfigError>;
}

impl PolicyProvider for PolicyConfig {
    fn current(&self) -> Result<PolicyConfig, ConfigError> {
        Ok(self.clone())
    }
}

/// Re-reads process variables on every request so dial changes apply without a restart.
/// The `.env` file is loaded once, when the provider is built.
#[derive(Debug, Clone, Copy)]
pub struct EnvPolicyProvider {
    _loaded: (),
}

impl EnvPolicyProvider {
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        Self { _loaded: () }
    }

    pub fn from_env_file(path: impl AsRef<std::path::Path>) -> Self {
        dotenvy::from_path(path).ok();
        Self { _loaded: () }
    }
}

impl Default for EnvPolicyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyProvider for EnvPolicyProvider {
    fn current(&self) -> Result<PolicyConfig, ConfigError> {
        PolicyConfig::from_env()
    }
}

fn env_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidPolicyValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

// Format: `segment:min:max;segment:min:max`
fn parse_ass_bands(raw: &str) -> Result<Vec<AssScoreBand>, ConfigError> {
    let invalid = || ConfigError::InvalidPolicyValue {
        key: "POLICY_ASS_BANDS",
        value: raw.to_string(),
    };

    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split(':').map(str::trim);
            let segment = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
            let min_score = parts
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(invalid)?;
            let max_score = parts
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(invalid)?;
            if parts.next().is_some() || min_score > max_score {
                return Err(invalid());
            }
            Ok(AssScoreBand {
                segment: segment.to_string(),
                min_score,
                max_score,
            })
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPolicyValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPolicyValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidPolicyValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
