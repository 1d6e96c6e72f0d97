use crate::error::Error;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERVICE_TYPE: &str = "mpconn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(Error::InvalidValue {
                key: "BRIDGE_LOG_FORMAT".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Service identifier used when a start command supplies none
    pub default_service_type: String,
    /// Overrides the platform-reported device name
    pub device_name: Option<String>,
    /// How long a radio probe scans before stopping
    pub radio_scan_window: Duration,
    /// Delay between scan stop and scan controller teardown
    pub radio_teardown_delay: Duration,
    /// Upper bound on a radio probe's lifetime
    pub radio_probe_timeout: Duration,
    /// Lifetime of a transient advertise session
    pub transient_advertise_duration: Duration,
    pub log_format: LogFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_service_type: DEFAULT_SERVICE_TYPE.to_string(),
            device_name: None,
            radio_scan_window: Duration::from_millis(2000),
            radio_teardown_delay: Duration::from_millis(1000),
            radio_probe_timeout: Duration::from_millis(10_000),
            transient_advertise_duration: Duration::from_millis(3000),
            log_format: LogFormat::Pretty,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key/value source; missing keys take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let millis = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match lookup(key) {
                Some(raw) => {
                    let ms: u64 = raw.trim().parse().map_err(|_| Error::InvalidValue {
                        key: key.to_string(),
                        value: raw.clone(),
                    })?;
                    Ok(Duration::from_millis(ms))
                }
                None => Ok(default),
            }
        };

        let default_service_type = match lookup("BRIDGE_DEFAULT_SERVICE_TYPE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(service) if is_valid_service_type(&service) => service,
            Some(service) => {
                return Err(Error::InvalidValue {
                    key: "BRIDGE_DEFAULT_SERVICE_TYPE".to_string(),
                    value: service,
                }
                .into())
            }
            None => defaults.default_service_type,
        };

        let config = BridgeConfig {
            default_service_type,
            device_name: lookup("BRIDGE_DEVICE_NAME")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            radio_scan_window: millis("BRIDGE_RADIO_SCAN_WINDOW_MS", defaults.radio_scan_window)?,
            radio_teardown_delay: millis(
                "BRIDGE_RADIO_TEARDOWN_DELAY_MS",
                defaults.radio_teardown_delay,
            )?,
            radio_probe_timeout: millis(
                "BRIDGE_RADIO_PROBE_TIMEOUT_MS",
                defaults.radio_probe_timeout,
            )?,
            transient_advertise_duration: millis(
                "BRIDGE_TRANSIENT_ADVERTISE_MS",
                defaults.transient_advertise_duration,
            )?,
            log_format: match lookup("BRIDGE_LOG_FORMAT") {
                Some(raw) => raw.parse()?,
                None => defaults.log_format,
            },
        };

        if config.radio_probe_timeout < config.radio_scan_window + config.radio_teardown_delay {
            return Err(Error::Validation(
                "BRIDGE_RADIO_PROBE_TIMEOUT_MS must cover the scan window plus teardown delay"
                    .to_string(),
            )
            .into());
        }

        Ok(config)
    }
}

/// DNS-SD service name rules: 1-15 chars of `[a-z0-9-]`, no leading,
/// trailing or doubled hyphen, at least one letter.
pub fn is_valid_service_type(service_type: &str) -> bool {
    let bytes = service_type.as_bytes();
    if bytes.is_empty() || bytes.len() > 15 {
        return false;
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' || service_type.contains("--") {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.iter().any(|b| b.is_ascii_lowercase())
}
