use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single weather station reading. Mirrors the `weather` hypertable: one row per
/// `(stationname, time)`. Nearly every channel is optional — stations report whatever
/// sensors they carry, and "unset" is a first-class value, not an error.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Reading {
    pub stationname: String,
    pub time: DateTime<Utc>,
    pub outside_temp: Option<f64>,
    pub inside_temp: Option<f64>,
    pub outside_humidity: Option<f64>,
    pub inside_humidity: Option<f64>,
    pub barometer: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_dir: Option<f64>,
    pub wind_speed_10min_avg: Option<f64>,
    pub rain_incremental: Option<f64>,
    pub rain_rate: Option<f64>,
    pub solar_watts: Option<f64>,
    pub potential_solar_watts: Option<f64>,
    pub uv_index: Option<f64>,
    pub soil_temp1: Option<f64>,
    pub leaf_wetness1: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub aqi_pm25: Option<f64>,
    pub snow_distance: Option<f64>,
    pub snow_depth: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub forecast_icon: Option<i32>,
    pub forecast_rule: Option<i32>,
    pub extra_float1: Option<f64>,
    pub extra_float2: Option<f64>,
    pub extra_float3: Option<f64>,
    pub extra_float4: Option<f64>,
    pub extra_float5: Option<f64>,
    pub extra_float6: Option<f64>,
    pub extra_float7: Option<f64>,
    pub extra_float8: Option<f64>,
    pub extra_float9: Option<f64>,
    pub extra_float10: Option<f64>,
    pub extra_text1: Option<String>,
    pub extra_text2: Option<String>,
    pub extra_text3: Option<String>,
    pub extra_text4: Option<String>,
    pub extra_text5: Option<String>,
    pub extra_text6: Option<String>,
    pub extra_text7: Option<String>,
    pub extra_text8: Option<String>,
    pub extra_text9: Option<String>,
    pub extra_text10: Option<String>,
}

/// A `Reading` plus the aggregate bucket it belongs to and the rain that fell during
/// the bucket. Produced by `weather_1m` / `weather_5m` / `weather_1h` / `weather_1d`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BucketReading {
    pub bucket: DateTime<Utc>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub reading: Reading,
    pub period_rain: f64,
}

/// Continuous-aggregate tiers the query planner chooses from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateTier {
    OneMinute,
    FiveMinute,
    OneHour,
    OneDay,
}

impl AggregateTier {
    pub fn table_name(self) -> &'static str {
        match self {
            AggregateTier::OneMinute => "weather_1m",
            AggregateTier::FiveMinute => "weather_5m",
            AggregateTier::OneHour => "weather_1h",
            AggregateTier::OneDay => "weather_1d",
        }
    }

    pub fn row_cap(self) -> usize {
        match self {
            AggregateTier::OneMinute => 360,
            AggregateTier::FiveMinute => 576,
            AggregateTier::OneHour => 336,
            AggregateTier::OneDay => 365,
        }
    }
}

/// One smoothed, rate-limited depth sample (table `snow_depth_est_5m`).
#[derive(Debug, Clone, Copy, FromRow)]
pub struct SnowDepthEstimate {
    pub time: DateTime<Utc>,
    pub snow_depth_est_in: f64,
}

/// `snow_totals_cache`: one UPSERT-only row per station.
#[derive(Debug, Clone, FromRow, Serialize, utoipa::ToSchema)]
pub struct SnowTotalsCache {
    pub stationname: String,
    pub snow_midnight: f64,
    pub snow_24h: f64,
    pub snow_72h: f64,
    pub snow_season: f64,
    pub base_distance: f64,
    pub computed_at: DateTime<Utc>,
}

/// A classified accumulation-engine segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnowEventType {
    Accumulation,
    Plateau,
    Redistribution,
    SpikeThenSettle,
}

impl SnowEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            SnowEventType::Accumulation => "accumulation",
            SnowEventType::Plateau => "plateau",
            SnowEventType::Redistribution => "redistribution",
            SnowEventType::SpikeThenSettle => "spike_then_settle",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "accumulation" => Some(SnowEventType::Accumulation),
            "plateau" => Some(SnowEventType::Plateau),
            "redistribution" => Some(SnowEventType::Redistribution),
            "spike_then_settle" => Some(SnowEventType::SpikeThenSettle),
            _ => None,
        }
    }
}

/// `snow_events_cache`: keyed `(stationname, hours, start_time)`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SnowEvent {
    pub stationname: String,
    pub hours: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_type: String,
    pub start_depth_mm: f64,
    pub end_depth_mm: f64,
    pub accumulation_mm: f64,
    pub computed_at: DateTime<Utc>,
}

/// `rainfall_summary`: rolling 24/48/72h rainfall totals, one row per station.
#[derive(Debug, Clone, FromRow, Serialize, utoipa::ToSchema)]
pub struct RainfallSummary {
    pub stationname: String,
    pub rain_24h: f64,
    pub rain_48h: f64,
    pub rain_72h: f64,
    pub last_updated: DateTime<Utc>,
}

/// `almanac_cache`: keyed `(stationname, metric_name)`.
#[derive(Debug, Clone, FromRow, Serialize, utoipa::ToSchema)]
pub struct AlmanacEntry {
    pub stationname: String,
    pub metric_name: String,
    pub value: f64,
    pub occurred_at: DateTime<Utc>,
    pub wind_dir: Option<f64>,
}

/// A device (sensor platform) scoped to a site.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub enabled: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub base_snow_distance: Option<f64>,
}

/// A virtual host serving one customer's weather data.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Site {
    pub id: String,
    pub hostname: Option<String>,
    pub device_id: Option<String>,
    pub snow_enabled: bool,
    pub snow_device_name: Option<String>,
    pub snow_base_distance: Option<f64>,
    pub forecast_provider_enabled: bool,
    pub is_portal: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}
