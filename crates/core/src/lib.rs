pub mod domain;
pub mod format;
pub mod ingest;
pub mod screen;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    pub const DEFAULT_QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRIES: u32 = 3;
    const DEFAULT_REQ_DELAY_MS: u64 = 100;
    const DEFAULT_PROGRESS_EVERY: usize = 50;
    const DEFAULT_PORT: u16 = 5000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub data_dir: PathBuf,
        pub sentry_dsn: Option<String>,
        /// Raw `PORT`; only the web binary validates it.
        pub port: Option<String>,
        pub quote_base_url: String,
        pub quote_req_delay: Duration,
        pub provider_timeout: Duration,
        pub provider_retries: u32,
        pub progress_every: usize,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                data_dir: PathBuf::from("."),
                sentry_dsn: None,
                port: None,
                quote_base_url: DEFAULT_QUOTE_BASE_URL.to_string(),
                quote_req_delay: Duration::from_millis(DEFAULT_REQ_DELAY_MS),
                provider_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                provider_retries: DEFAULT_RETRIES,
                progress_every: DEFAULT_PROGRESS_EVERY,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            Ok(Self {
                data_dir: std::env::var("DATA_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data_dir),
                sentry_dsn: std::env::var("SENTRY_DSN")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                port: std::env::var("PORT").ok().filter(|s| !s.trim().is_empty()),
                quote_base_url: std::env::var("QUOTE_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(defaults.quote_base_url),
                quote_req_delay: env_parse::<u64>("QUOTE_REQ_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.quote_req_delay),
                provider_timeout: env_parse::<u64>("PROVIDER_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.provider_timeout),
                provider_retries: env_parse::<u32>("PROVIDER_RETRIES")
                    .unwrap_or(defaults.provider_retries)
                    .max(1),
                progress_every: env_parse::<usize>("PROGRESS_EVERY")
                    .unwrap_or(defaults.progress_every),
            })
        }

        /// Listen port for the web binary; `PORT` unset means 5000.
        pub fn require_port(&self) -> anyhow::Result<u16> {
            match self.port.as_deref() {
                Some(raw) => raw
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("PORT must be a port number (got {raw:?})")),
                None => Ok(DEFAULT_PORT),
            }
        }

        pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
            reqwest::Client::builder()
                .timeout(self.provider_timeout)
                .user_agent(concat!("nearhigh/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("failed to build provider http client")
        }
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn port_is_validated_only_on_demand() {
            let settings = Settings {
                port: Some("not-a-port".to_string()),
                ..Settings::default()
            };
            assert!(settings.require_port().is_err());
            assert_eq!(settings.provider_retries, DEFAULT_RETRIES);

            assert_eq!(Settings::default().require_port().unwrap(), DEFAULT_PORT);

            let settings = Settings {
                port: Some(" 8080 ".to_string()),
                ..Settings::default()
            };
            assert_eq!(settings.require_port().unwrap(), 8080);
        }

        #[test]
        fn malformed_port_does_not_fail_settings_load() {
            std::env::set_var("PORT", "http");
            let settings = Settings::from_env().unwrap();
            std::env::remove_var("PORT");

            assert_eq!(settings.port.as_deref(), Some("http"));
            assert!(settings.require_port().is_err());
        }
    }
}
