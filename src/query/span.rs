//! Span Fetcher & Transformer: thin wrapper around the query planner that
//! maps `BucketReading` to the wire DTO, computing cardinal direction and
//! converting snow depth mm -> in.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::BucketReading;
use crate::derived;
use crate::error::AppError;
use crate::query::planner::QueryPlanner;

/// One bucketed reading as served over REST/gRPC, with every present channel
/// copied through and the cardinal/snow conversions applied.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WeatherReadingDto {
    pub bucket: DateTime<Utc>,
    pub time: DateTime<Utc>,
    pub stationname: String,
    pub outside_temp: Option<f64>,
    pub inside_temp: Option<f64>,
    pub outside_humidity: Option<f64>,
    pub inside_humidity: Option<f64>,
    pub barometer: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_dir: Option<f64>,
    pub wind_cardinal: Option<&'static str>,
    pub wind_speed_10min_avg: Option<f64>,
    pub rain_incremental: Option<f64>,
    pub rain_rate: Option<f64>,
    pub period_rain: f64,
    pub solar_watts: Option<f64>,
    pub potential_solar_watts: Option<f64>,
    pub uv_index: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub aqi_pm25: Option<f64>,
    pub snow_depth_in: Option<f64>,
    pub battery_voltage: Option<f64>,
}

impl From<BucketReading> for WeatherReadingDto {
    fn from(row: BucketReading) -> Self {
        let reading = row.reading;
        Self {
            bucket: row.bucket,
            time: reading.time,
            stationname: reading.stationname,
            outside_temp: reading.outside_temp,
            inside_temp: reading.inside_temp,
            outside_humidity: reading.outside_humidity,
            inside_humidity: reading.inside_humidity,
            barometer: reading.barometer,
            wind_speed: reading.wind_speed,
            wind_dir: reading.wind_dir,
            wind_cardinal: reading.wind_dir.map(derived::cardinal_direction),
            wind_speed_10min_avg: reading.wind_speed_10min_avg,
            rain_incremental: reading.rain_incremental,
            rain_rate: reading.rain_rate,
            period_rain: row.period_rain,
            solar_watts: reading.solar_watts,
            potential_solar_watts: reading.potential_solar_watts,
            uv_index: reading.uv_index,
            pm25: reading.pm25,
            pm10: reading.pm10,
            co2: reading.co2,
            aqi_pm25: reading.aqi_pm25,
            snow_depth_in: reading.snow_depth.map(derived::mm_to_in),
            battery_voltage: reading.battery_voltage,
        }
    }
}

pub struct SpanFetcher {
    planner: QueryPlanner,
}

impl SpanFetcher {
    pub fn new(planner: QueryPlanner) -> Self {
        Self { planner }
    }

    /// Pre-allocates the destination slice to the input size, copying every
    /// present channel through.
    pub async fn fetch(
        &self,
        station: &str,
        span: Duration,
        base_distance_mm: Option<f64>,
    ) -> Result<Vec<WeatherReadingDto>, AppError> {
        let rows = self.planner.fetch_span(station, span, base_distance_mm).await?;
        let mut out = Vec::with_capacity(rows.len());
        out.extend(rows.into_iter().map(WeatherReadingDto::from));
        Ok(out)
    }
}
