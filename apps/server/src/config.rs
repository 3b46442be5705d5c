//! Server configuration loaded from `HW_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use holdwatch_core::collector::CollectorConfig;
use holdwatch_core::holdings::ZeroTotalPolicy;
use holdwatch_filings::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingSourceKind {
    /// SEC EDGAR full-text archives.
    Edgar,
    /// Bearer-token filing API.
    Api,
}

impl FromStr for FilingSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edgar" => Ok(FilingSourceKind::Edgar),
            "api" => Ok(FilingSourceKind::Api),
            other => Err(format!("expected edgar or api, got '{}'", other)),
        }
    }
}

/// Credentials for the bearer-token filing API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingApiConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub log_format: LogFormat,
    pub filing_source: FilingSourceKind,
    pub sec_user_agent: Option<String>,
    pub sec_requests_per_second: u32,
    pub filing_api: Option<FilingApiConfig>,
    pub openfigi_api_key: Option<String>,
    pub collector: CollectorConfig,
    pub fetch_retry: RetryPolicy,
    pub schedule_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: "./db/holdwatch.db".to_string(),
            log_format: LogFormat::Text,
            filing_source: FilingSourceKind::Edgar,
            sec_user_agent: None,
            sec_requests_per_second: 9,
            filing_api: None,
            openfigi_api_key: None,
            collector: CollectorConfig::default(),
            fetch_retry: RetryPolicy::default(),
            schedule_interval: Duration::from_secs(24 * 60 * 60),
            request_timeout: Duration::from_millis(30_000),
        }
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        let filing_source: FilingSourceKind =
            parse_or(&get, "HW_FILING_SOURCE", defaults.filing_source)?;

        let api_keys = [
            "HW_FILING_API_URL",
            "HW_FILING_API_TOKEN_URL",
            "HW_FILING_API_CLIENT_ID",
            "HW_FILING_API_CLIENT_SECRET",
        ];
        let api_values: Vec<Option<String>> = api_keys.iter().map(|&k| get(k)).collect();
        let filing_api = match api_values.as_slice() {
            [Some(base_url), Some(token_url), Some(client_id), Some(client_secret)] => {
                Some(FilingApiConfig {
                    base_url: base_url.clone(),
                    token_url: token_url.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                })
            }
            _ => None,
        };

        let sec_user_agent = get("HW_SEC_USER_AGENT");
        match filing_source {
            FilingSourceKind::Edgar if sec_user_agent.is_none() => {
                bail!("HW_SEC_USER_AGENT is required when HW_FILING_SOURCE=edgar")
            }
            FilingSourceKind::Api if filing_api.is_none() => {
                let missing: Vec<&str> = api_keys
                    .iter()
                    .zip(&api_values)
                    .filter(|(_, v)| v.is_none())
                    .map(|(k, _)| *k)
                    .collect();
                bail!(
                    "HW_FILING_SOURCE=api requires {}",
                    missing.join(", ")
                )
            }
            _ => {}
        }

        let collector = CollectorConfig {
            max_retries: parse_or(&get, "HW_MAX_RETRIES", defaults.collector.max_retries)?,
            stale_after: Duration::from_secs(
                60 * parse_or::<u64>(&get, "HW_STALE_AFTER_MINUTES", 120)?,
            ),
            concurrency: parse_or(&get, "HW_CONCURRENCY", defaults.collector.concurrency)?,
            target_quarters: parse_or(
                &get,
                "HW_TARGET_QUARTERS",
                defaults.collector.target_quarters,
            )?,
            parse_alert_threshold: parse_or(
                &get,
                "HW_PARSE_ALERT_THRESHOLD",
                defaults.collector.parse_alert_threshold,
            )?,
            zero_total_policy: parse_or(
                &get,
                "HW_ZERO_TOTAL_POLICY",
                ZeroTotalPolicy::RecordLowQuality,
            )?,
        };
        if collector.concurrency == 0 {
            bail!("HW_CONCURRENCY must be at least 1");
        }

        let fetch_retry = RetryPolicy {
            max_attempts: parse_or(
                &get,
                "HW_FETCH_MAX_ATTEMPTS",
                defaults.fetch_retry.max_attempts,
            )?,
            base_delay: Duration::from_millis(parse_or(&get, "HW_FETCH_BASE_DELAY_MS", 2000)?),
            ..defaults.fetch_retry
        };

        let schedule_hours: u64 = parse_or(&get, "HW_SCHEDULE_INTERVAL_HOURS", 24)?;
        if schedule_hours == 0 {
            bail!("HW_SCHEDULE_INTERVAL_HOURS must be at least 1");
        }

        Ok(Config {
            listen_addr: parse_or(&get, "HW_LISTEN_ADDR", defaults.listen_addr)?,
            db_path: get("HW_DB_PATH").unwrap_or(defaults.db_path),
            log_format: parse_or(&get, "HW_LOG_FORMAT", defaults.log_format)?,
            filing_source,
            sec_user_agent,
            sec_requests_per_second: parse_or(
                &get,
                "HW_SEC_REQUESTS_PER_SECOND",
                defaults.sec_requests_per_second,
            )?,
            filing_api,
            openfigi_api_key: get("HW_OPENFIGI_API_KEY"),
            collector,
            fetch_retry,
            schedule_interval: Duration::from_secs(schedule_hours * 60 * 60),
            request_timeout: Duration::from_millis(parse_or(
                &get,
                "HW_REQUEST_TIMEOUT_MS",
                30_000,
            )?),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid {}='{}'", key, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_edgar_user_agent() {
        let config = config_from(&[("HW_SEC_USER_AGENT", "Holdwatch ops@example.com")]).unwrap();

        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.db_path, "./db/holdwatch.db");
        assert_eq!(config.filing_source, FilingSourceKind::Edgar);
        assert_eq!(config.collector.max_retries, 3);
        assert_eq!(config.collector.stale_after, Duration::from_secs(7200));
        assert_eq!(config.fetch_retry.base_delay, Duration::from_millis(2000));
        assert_eq!(config.schedule_interval, Duration::from_secs(86_400));
    }

    #[test]
    fn test_edgar_requires_user_agent() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("HW_SEC_USER_AGENT"));
    }

    #[test]
    fn test_api_source_lists_missing_settings() {
        let err = config_from(&[
            ("HW_FILING_SOURCE", "api"),
            ("HW_FILING_API_URL", "https://filings.example.com"),
        ])
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("HW_FILING_API_TOKEN_URL"));
        assert!(!message.contains("HW_FILING_API_URL,"));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("HW_SEC_USER_AGENT", "Holdwatch ops@example.com"),
            ("HW_MAX_RETRIES", "5"),
            ("HW_STALE_AFTER_MINUTES", "30"),
            ("HW_ZERO_TOTAL_POLICY", "fail"),
            ("HW_LOG_FORMAT", "JSON"),
            ("HW_LISTEN_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(config.collector.max_retries, 5);
        assert_eq!(config.collector.stale_after, Duration::from_secs(1800));
        assert_eq!(config.collector.zero_total_policy, ZeroTotalPolicy::Fail);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.listen_addr.port(), 9000);
    }

    #[test]
    fn test_malformed_number_names_the_variable() {
        let err = config_from(&[
            ("HW_SEC_USER_AGENT", "Holdwatch ops@example.com"),
            ("HW_CONCURRENCY", "four"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("HW_CONCURRENCY"));
    }
}
