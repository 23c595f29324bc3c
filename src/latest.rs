//! Latest Reading Fetcher: the most recent reading for a station, augmented
//! with cardinal direction, feels-like, sky condition, rolling rainfall,
//! storm rainfall, wind gust, and rain rate.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::db::{Reading, WeatherRepository};
use crate::derived::{self, SkyCondition};
use crate::error::AppError;
use crate::rainfall::RainfallSummariser;

/// Freshness window for "latest": no reading within the last 10 minutes
/// means `NoReadingsAvailable`, distinct from a DB error.
const FRESHNESS_WINDOW: Duration = Duration::minutes(10);

/// Window over which the dedicated rain-rate calculation extrapolates an
/// hourly rate from recent increments.
const RAIN_RATE_WINDOW: Duration = Duration::minutes(15);

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LatestReading {
    pub stationname: String,
    pub time: DateTime<Utc>,
    pub outside_temp: Option<f64>,
    pub inside_temp: Option<f64>,
    pub outside_humidity: Option<f64>,
    pub barometer: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_dir: Option<f64>,
    pub wind_cardinal: Option<&'static str>,
    pub feels_like: Option<f64>,
    pub sky_condition: Option<SkyCondition>,
    pub rain_rate: Option<f64>,
    pub rain_24h: f64,
    pub rain_48h: f64,
    pub rain_72h: f64,
    pub storm_rain: f64,
    pub wind_gust_10min: Option<f64>,
}

pub struct LatestReadingFetcher {
    weather: WeatherRepository,
    rainfall: RainfallSummariser,
}

impl LatestReadingFetcher {
    pub fn new(weather: WeatherRepository, rainfall: RainfallSummariser) -> Self {
        Self { weather, rainfall }
    }

    /// Spec §4.7 pipeline, steps 1-3.
    #[instrument(skip(self))]
    pub async fn fetch(&self, station: &str) -> Result<LatestReading, AppError> {
        let now = Utc::now();
        let reading = self
            .weather
            .find_newest_since(station, now - FRESHNESS_WINDOW)
            .await?
            .ok_or(AppError::NoReadingsAvailable)?;

        let rain = self.rainfall.with_recent(station).await?;
        let storm_rain = self.weather.storm_rainfall_total(station).await?;
        let wind_gust_10min = self.weather.wind_gust_10min(station).await?;
        let rain_rate = self.compute_rain_rate(station, now).await?.or(reading.rain_rate);

        Ok(augment(reading, rain.rain_24h, rain.rain_48h, rain.rain_72h, storm_rain, wind_gust_10min, rain_rate))
    }

    /// Dedicated rain-rate calculation: extrapolate the last 15 minutes of
    /// raw increments to an hourly rate.
    async fn compute_rain_rate(&self, station: &str, now: DateTime<Utc>) -> Result<Option<f64>, AppError> {
        let since = now - RAIN_RATE_WINDOW;
        let samples = self.weather.recent_rain_increments(station, since).await?;
        Ok(rain_rate_from_samples(&samples, since, now))
    }
}

/// Pure helper: total rain in `[since, now]` extrapolated to inches/hour.
/// `None` when there's nothing to extrapolate from.
fn rain_rate_from_samples(samples: &[(DateTime<Utc>, f64)], since: DateTime<Utc>, now: DateTime<Utc>) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().map(|(_, v)| v).sum();
    let elapsed_hours = (now - since).num_milliseconds() as f64 / 3_600_000.0;
    if elapsed_hours <= 0.0 {
        return None;
    }
    Some(total / elapsed_hours)
}

fn augment(
    reading: Reading,
    rain_24h: f64,
    rain_48h: f64,
    rain_72h: f64,
    storm_rain: f64,
    wind_gust_10min: Option<f64>,
    rain_rate: Option<f64>,
) -> LatestReading {
    let wind_cardinal = reading.wind_dir.map(derived::cardinal_direction);
    let feels_like = match (reading.outside_temp, reading.outside_humidity, reading.wind_speed) {
        (Some(t), Some(rh), Some(w)) => Some(derived::feels_like(t, rh, w)),
        _ => None,
    };
    let sky_condition = match (reading.solar_watts, reading.potential_solar_watts) {
        (Some(r), Some(p)) => Some(derived::sky_condition(r, p)),
        _ => None,
    };

    LatestReading {
        stationname: reading.stationname,
        time: reading.time,
        outside_temp: reading.outside_temp,
        inside_temp: reading.inside_temp,
        outside_humidity: reading.outside_humidity,
        barometer: reading.barometer,
        wind_speed: reading.wind_speed,
        wind_dir: reading.wind_dir,
        wind_cardinal,
        feels_like,
        sky_condition,
        rain_rate,
        rain_24h,
        rain_48h,
        rain_72h,
        storm_rain,
        wind_gust_10min,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rain_rate_extrapolates_to_hourly() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let since = now - Duration::minutes(15);
        let samples = vec![(since + Duration::minutes(5), 0.05), (since + Duration::minutes(10), 0.05)];
        let rate = rain_rate_from_samples(&samples, since, now).unwrap();
        assert!((rate - 0.4).abs() < 1e-6);
    }

    #[test]
    fn rain_rate_none_when_no_samples() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        assert!(rain_rate_from_samples(&[], now - Duration::minutes(15), now).is_none());
    }
}
