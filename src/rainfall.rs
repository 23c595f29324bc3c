//! Rainfall Summariser: keeps rolling 24/48/72 h totals per station in
//! `rainfall_summary` so readers never scan the raw table.

use chrono::{DateTime, Duration, Utc};
use tracing::{instrument, warn};

use crate::db::{AggregateTier, DbError, RainfallRepository, RainfallSummary, WeatherRepository};

const WINDOWS_HOURS: [i64; 3] = [24, 48, 72];

/// Composed rainfall for the `/snow` and `/latest` handlers: each window plus
/// whatever has fallen since the cache row was last written.
#[derive(Debug, Clone, Copy)]
pub struct RainfallWithRecent {
    pub rain_24h: f64,
    pub rain_48h: f64,
    pub rain_72h: f64,
}

pub struct RainfallSummariser {
    weather: WeatherRepository,
    rainfall: RainfallRepository,
}

impl RainfallSummariser {
    pub fn new(weather: WeatherRepository, rainfall: RainfallRepository) -> Self {
        Self { weather, rainfall }
    }

    /// One scheduler tick, run every minute: refresh every station that
    /// reported in the last 10 minutes.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<(), DbError> {
        let now = Utc::now();
        let stations = self
            .weather
            .stations_with_recent_readings(now - Duration::minutes(10))
            .await?;

        for station in stations {
            if let Err(e) = self.refresh_station(&station, now).await {
                warn!(station = %station, error = %e, "rainfall summary refresh failed, retrying next tick");
            }
        }
        Ok(())
    }

    async fn refresh_station(&self, station: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        let last_hour = now - Duration::hours(1);
        let last_5min = now - Duration::minutes(5);

        let mut summary = RainfallSummary {
            stationname: station.to_string(),
            rain_24h: 0.0,
            rain_48h: 0.0,
            rain_72h: 0.0,
            last_updated: now,
        };

        for &hours in &WINDOWS_HOURS {
            let since = now - Duration::hours(hours);
            let hourly = self
                .weather
                .period_rain_sum(AggregateTier::OneHour, station, since, last_hour)
                .await?;
            let five_min = self
                .weather
                .period_rain_sum(AggregateTier::FiveMinute, station, last_hour, last_5min)
                .await?;
            let tail = self.weather.rain_sum_since(station, last_5min).await?;
            let total = hourly + five_min + tail;

            match hours {
                24 => summary.rain_24h = total,
                48 => summary.rain_48h = total,
                72 => summary.rain_72h = total,
                _ => unreachable!(),
            }
        }

        self.rainfall.upsert(&summary).await
    }

    /// `GetRainfallWithRecent(station)`. Falls back to a direct 72h scan if
    /// no summary row exists yet.
    #[instrument(skip(self))]
    pub async fn with_recent(&self, station: &str) -> Result<RainfallWithRecent, DbError> {
        match self.rainfall.read(station).await? {
            Some(summary) => {
                let recent = self.weather.rain_sum_since(station, summary.last_updated).await?;
                Ok(RainfallWithRecent {
                    rain_24h: summary.rain_24h + recent,
                    rain_48h: summary.rain_48h + recent,
                    rain_72h: summary.rain_72h + recent,
                })
            }
            None => {
                let now = Utc::now();
                let rain_72h = self
                    .weather
                    .rain_sum_since(station, now - Duration::hours(72))
                    .await?;
                let rain_48h = self
                    .weather
                    .rain_sum_since(station, now - Duration::hours(48))
                    .await?;
                let rain_24h = self
                    .weather
                    .rain_sum_since(station, now - Duration::hours(24))
                    .await?;
                Ok(RainfallWithRecent { rain_24h, rain_48h, rain_72h })
            }
        }
    }
}
