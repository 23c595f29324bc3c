//! Almanac Cache: per-station all-time extremes, served in O(1) from
//! `almanac_cache` and rewritten wholesale once an hour.

use chrono::Utc;
use tracing::{instrument, warn};

use crate::db::{AggregateTier, AlmanacEntry, AlmanacRepository, DbError, WeatherRepository};

/// `(metric name, source tier, source column, descending)`.
const METRICS: &[(&str, AggregateTier, &str, bool)] = &[
    ("high_temp", AggregateTier::OneDay, "outside_temp", true),
    ("low_temp", AggregateTier::OneDay, "outside_temp", false),
    ("high_wind_speed", AggregateTier::OneDay, "wind_speed", true),
    ("max_rain_hour", AggregateTier::OneHour, "period_rain", true),
    ("max_rain_day", AggregateTier::OneDay, "period_rain", true),
    ("low_barometer", AggregateTier::OneDay, "barometer", false),
    ("low_humidity", AggregateTier::OneDay, "outside_humidity", false),
    ("high_pm25", AggregateTier::OneDay, "pm25", true),
    ("high_pm10_in", AggregateTier::OneDay, "pm10", true),
    ("high_co2", AggregateTier::OneDay, "co2", true),
    ("high_aqi_pm25", AggregateTier::OneDay, "aqi_pm25", true),
];

pub struct AlmanacCache {
    weather: WeatherRepository,
    almanac: AlmanacRepository,
}

impl AlmanacCache {
    pub fn new(weather: WeatherRepository, almanac: AlmanacRepository) -> Self {
        Self { weather, almanac }
    }

    /// Hourly tick: rewrite all 11 metrics for one station in a single
    /// transaction. Snow extremes are deliberately excluded -- they require a
    /// per-request `base_distance` and are computed on demand.
    #[instrument(skip(self))]
    pub async fn refresh_station(&self, station: &str) -> Result<(), DbError> {
        let mut entries = Vec::with_capacity(METRICS.len());

        for &(name, tier, column, descending) in METRICS {
            match self.weather.extreme(tier, station, column, descending).await {
                Ok(Some((value, occurred_at, wind_dir))) => {
                    entries.push(AlmanacEntry {
                        stationname: station.to_string(),
                        metric_name: name.to_string(),
                        value,
                        occurred_at,
                        wind_dir,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(station, metric = name, error = %e, "almanac metric fetch failed, skipping");
                }
            }
        }

        self.almanac.replace_for_station(station, &entries).await
    }

    /// `GET /almanac?station=` backing call: one bounded SELECT, O(1) in the
    /// number of readings.
    #[instrument(skip(self))]
    pub async fn read(&self, station: &str) -> Result<Vec<AlmanacEntry>, DbError> {
        self.almanac.read_all(station).await
    }

    #[instrument(skip(self))]
    pub async fn tick(&self, stations: &[String]) -> Result<(), DbError> {
        let now = Utc::now();
        for station in stations {
            if let Err(e) = self.refresh_station(station).await {
                warn!(station = %station, error = %e, at = %now, "almanac refresh failed, retrying next hour");
            }
        }
        Ok(())
    }
}
