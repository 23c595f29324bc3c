use std::env;

use crate::snow::depth_estimator::DepthEstimatorParams;

/// Process-wide configuration, loaded once at startup. Per-site/per-device
/// configuration is deliberately NOT here: it comes from the external
/// configuration store through [`crate::site::SiteConfigStore`].
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub grpc_port: u16,
    pub totals_refresh_secs: u64,
    pub events_refresh_secs: u64,
    pub rainfall_refresh_secs: u64,
    pub almanac_refresh_secs: u64,
    pub depth_estimator: DepthEstimatorParams,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env_parse("SERVER_PORT", 8080),
            grpc_port: env_parse("GRPC_PORT", 50051),
            totals_refresh_secs: env_parse("SNOW_TOTALS_REFRESH_SECS", 30),
            events_refresh_secs: env_parse("SNOW_EVENTS_REFRESH_SECS", 15 * 60),
            rainfall_refresh_secs: env_parse("RAINFALL_REFRESH_SECS", 60),
            almanac_refresh_secs: env_parse("ALMANAC_REFRESH_SECS", 60 * 60),
            depth_estimator: DepthEstimatorParams {
                window_minutes: env_parse("SNOW_DEPTH_WINDOW_MINUTES", 30),
                quantile: env_parse("SNOW_DEPTH_QUANTILE", 0.85),
                max_up_rate_in_per_hour: env_parse("SNOW_DEPTH_MAX_UP_RATE_IN_PER_HOUR", 4.0),
                max_down_rate_in_per_hour: env_parse("SNOW_DEPTH_MAX_DOWN_RATE_IN_PER_HOUR", 1.5),
            },
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.grpc_port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
