//! Snow Cache Controller: drives the Depth Estimator and Accumulation
//! Engine on a schedule, maintaining `snow_totals_cache` and
//! `snow_events_cache` with a graceful-degradation contract — a refresh
//! failure never takes down a reader, it just leaves the previous value.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, instrument, warn};

use crate::db::{
    DbError, SnowCacheRepository, SnowDepthRepository, SnowEvent, SnowEventType, SnowTotalsCache, WeatherRepository,
};
use crate::error::ComputationFailed;
use crate::snow::accumulation::{pelt_events, smoothed_difference_total};
use crate::snow::depth_estimator::{self, DepthEstimatorParams, RawDepthSample};

/// How recently a 24h accumulation event must have ended to still count
/// towards "the current storm" for the `/snow` reading.
const STORM_LOOKBACK: Duration = Duration::hours(6);
/// Window over which the current accumulation rate is estimated.
const RATE_WINDOW: Duration = Duration::hours(2);

/// `GET /snow` response: current depth plus the cached totals, the
/// in-progress storm's accumulation, and a short-window rate.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SnowReading {
    pub stationname: String,
    pub depth_in: Option<f64>,
    pub snow_midnight: f64,
    pub snow_24h: f64,
    pub snow_72h: f64,
    pub snow_season: f64,
    pub storm_in: f64,
    pub rate_in_per_hr: Option<f64>,
}

/// Event cache windows, in hours.
const EVENT_WINDOWS_HOURS: [i64; 4] = [24, 72, 24 * 7, 24 * 30];

/// PELT penalty; within the documented 3.0-8.0 range for hourly data.
const PELT_PENALTY: f64 = 5.0;
const MIN_ACCUMULATION_MM: f64 = 5.0;
const HOURLY_MEDIAN_KERNEL: usize = 5;

/// Grace window for `ReadEvents`: scheduled interval (15 min) + 5 min.
const EVENTS_GRACE: Duration = Duration::minutes(20);

pub struct SnowCacheController {
    weather: WeatherRepository,
    depths: SnowDepthRepository,
    cache: SnowCacheRepository,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    params: DepthEstimatorParams,
}

impl SnowCacheController {
    pub fn new(
        weather: WeatherRepository,
        depths: SnowDepthRepository,
        cache: SnowCacheRepository,
        params: DepthEstimatorParams,
    ) -> Self {
        Self {
            weather,
            depths,
            cache,
            refresh_locks: Mutex::new(HashMap::new()),
            params,
        }
    }

    async fn lock_for(&self, station: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(station.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs the Depth Estimator, persisting the rewritten window.
    #[instrument(skip(self))]
    async fn update_depth_estimates(&self, station: &str, base_distance_mm: f64) -> Result<(), DbError> {
        let now = Utc::now();
        let latest = self.depths.latest_time(station).await?;
        let window_start = match latest {
            Some(t) => t - Duration::hours(6),
            None => depth_estimator::season_start(now),
        };
        let prev_estimate = self.depths.estimate_before(station, window_start).await?;

        let raw = self
            .weather
            .find_snow_distance_samples(station, base_distance_mm, window_start)
            .await?;
        if raw.is_empty() {
            return Ok(());
        }

        let samples: Vec<RawDepthSample> = raw
            .iter()
            .map(|(time, distance)| RawDepthSample {
                time: *time,
                depth_in: depth_estimator::mm_distance_to_depth_in(base_distance_mm, *distance),
            })
            .collect();

        let series = depth_estimator::estimate_series(&samples, &self.params, prev_estimate);
        let rows: Vec<crate::db::SnowDepthEstimate> = series
            .into_iter()
            .map(|(time, snow_depth_est_in)| crate::db::SnowDepthEstimate { time, snow_depth_est_in })
            .collect();

        self.depths.replace_from(station, window_start, &rows).await
    }

    /// Fetches the smoothed depth series (inches) over `[since, now]`.
    async fn fetch_smoothed_depths(&self, station: &str, since: DateTime<Utc>) -> Result<Vec<f64>, DbError> {
        let rows = self.weather.find_estimated_depths(station, since).await?;
        Ok(rows.into_iter().map(|(_, v)| v).collect())
    }

    /// Refreshes the snow totals cache for a station: short-window totals are
    /// cheap SQL aggregations; 72h and seasonal use the smoothed-differences
    /// strategy.
    /// Any failing field reuses its previous cached value; only if there is no
    /// previous cache at all does the whole refresh fail.
    #[instrument(skip(self))]
    pub async fn refresh_totals(&self, station: &str, base_distance_mm: f64) -> Result<(), DbError> {
        let lock = self.lock_for(station).await;
        let _guard = lock.lock().await;

        if let Err(e) = self.update_depth_estimates(station, base_distance_mm).await {
            warn!(station, error = %e, "depth estimate update failed, totals will use stale series");
        }

        let previous = self.cache.read_totals(station).await?;
        let now = Utc::now();

        let snow_midnight = self
            .compute_total_since(station, midnight_utc(now))
            .await
            .unwrap_or_else(|e| {
                warn!(station, error = %e, "snow_midnight refresh failed, reusing cache");
                previous.as_ref().map(|p| p.snow_midnight).unwrap_or(0.0)
            });

        let snow_24h = self
            .compute_total_since(station, now - Duration::hours(24))
            .await
            .unwrap_or_else(|e| {
                warn!(station, error = %e, "snow_24h refresh failed, reusing cache");
                previous.as_ref().map(|p| p.snow_24h).unwrap_or(0.0)
            });

        let snow_72h = self
            .compute_total_since(station, now - Duration::hours(72))
            .await
            .unwrap_or_else(|e| {
                warn!(station, error = %e, "snow_72h refresh failed, reusing cache");
                previous.as_ref().map(|p| p.snow_72h).unwrap_or(0.0)
            });

        let season_start = depth_estimator::season_start(now);
        let snow_season = self
            .compute_seasonal_total(station, season_start)
            .await
            .unwrap_or_else(|e| {
                warn!(station, error = %e, "snow_season refresh failed, reusing cache");
                previous.as_ref().map(|p| p.snow_season).unwrap_or(0.0)
            });

        let row = SnowTotalsCache {
            stationname: station.to_string(),
            snow_midnight,
            snow_24h,
            snow_72h,
            snow_season,
            base_distance: base_distance_mm,
            computed_at: now,
        };
        self.cache.upsert_totals(&row).await
    }

    async fn compute_total_since(&self, station: &str, since: DateTime<Utc>) -> Result<f64, DbError> {
        let depths = self.fetch_smoothed_depths(station, since).await?;
        Ok(smoothed_difference_total(&depths, None))
    }

    async fn compute_seasonal_total(&self, station: &str, season_start: DateTime<Utc>) -> Result<f64, DbError> {
        let depths = self.fetch_smoothed_depths(station, season_start).await?;
        let start_value = depths.first().copied();
        Ok(smoothed_difference_total(&depths, start_value))
    }

    /// Refreshes the snow events cache for a station: PELT over each of
    /// {24h,72h,7d,30d}.
    #[instrument(skip(self))]
    pub async fn refresh_events(&self, station: &str, base_distance_mm: f64) -> Result<(), DbError> {
        let lock = self.lock_for(station).await;
        let _guard = lock.lock().await;
        let now = Utc::now();

        for &hours in &EVENT_WINDOWS_HOURS {
            let since = now - Duration::hours(hours);
            let raw = match self.weather.find_hourly_depths(station, base_distance_mm, since).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(station, hours, error = %e, "hourly depth fetch failed, skipping event refresh");
                    continue;
                }
            };
            if raw.is_empty() {
                continue;
            }

            let times: Vec<DateTime<Utc>> = raw.iter().map(|(t, _)| *t).collect();
            let depths: Vec<f64> = raw.iter().map(|(_, d)| *d).collect();
            let filtered = crate::snow::pelt::median_filter(&depths, HOURLY_MEDIAN_KERNEL);

            let classified = match run_pelt_guarded(&filtered, PELT_PENALTY, MIN_ACCUMULATION_MM) {
                Ok(events) => events,
                Err(e) => {
                    error!(station, hours, error = %e.0, "PELT kernel fault, keeping previous events cache");
                    continue;
                }
            };

            let events: Vec<SnowEvent> = classified
                .into_iter()
                .filter(|e| e.accumulation_mm > 0.0)
                .map(|e| SnowEvent {
                    stationname: station.to_string(),
                    hours: hours as i32,
                    start_time: times[e.start_index],
                    end_time: times[e.end_index],
                    event_type: e.event_type.as_str().to_string(),
                    start_depth_mm: e.start_depth_mm,
                    end_depth_mm: e.end_depth_mm,
                    accumulation_mm: e.accumulation_mm,
                    computed_at: now,
                })
                .collect();

            self.cache.replace_events(station, hours as i32, &events).await?;
        }

        Ok(())
    }

    /// Serves cached events only within the freshness grace window,
    /// otherwise returns empty rather than stale data.
    #[instrument(skip(self))]
    pub async fn read_events(&self, station: &str, hours: i32) -> Result<Vec<SnowEvent>, DbError> {
        let computed_at = self.cache.events_computed_at(station, hours).await?;
        match computed_at {
            Some(t) if Utc::now() - t <= EVENTS_GRACE => self.cache.read_events(station, hours).await,
            _ => Ok(Vec::new()),
        }
    }

    pub async fn read_totals(&self, station: &str) -> Result<Option<SnowTotalsCache>, DbError> {
        self.cache.read_totals(station).await
    }

    /// `GET /snow` backing call: current smoothed depth, the cached totals,
    /// the active storm's accumulation, and a short-window rate -- all
    /// reads, no refresh triggered.
    #[instrument(skip(self))]
    pub async fn current_reading(&self, station: &str, base_distance_mm: f64) -> Result<SnowReading, DbError> {
        let now = Utc::now();
        let totals = self.cache.read_totals(station).await?;

        let recent = self.fetch_smoothed_depths(station, now - RATE_WINDOW).await?;
        let depth_in = match recent.last().copied() {
            Some(v) => Some(v),
            None => self
                .weather
                .find_latest(station)
                .await?
                .and_then(|r| r.snow_distance)
                .map(|distance_mm| depth_estimator::mm_distance_to_depth_in(base_distance_mm, distance_mm)),
        };
        let rate_in_per_hr = if recent.len() >= 2 {
            let span_hours = RATE_WINDOW.num_minutes() as f64 / 60.0;
            Some((recent[recent.len() - 1] - recent[0]) / span_hours)
        } else {
            None
        };

        let events = self.cache.read_events(station, 24).await.unwrap_or_default();
        let storm_in: f64 = events
            .iter()
            .filter(|e| e.event_type == SnowEventType::Accumulation.as_str() && now - e.end_time <= STORM_LOOKBACK)
            .map(|e| e.accumulation_mm / 25.4)
            .sum();

        Ok(SnowReading {
            stationname: station.to_string(),
            depth_in,
            snow_midnight: totals.as_ref().map(|t| t.snow_midnight).unwrap_or(0.0),
            snow_24h: totals.as_ref().map(|t| t.snow_24h).unwrap_or(0.0),
            snow_72h: totals.as_ref().map(|t| t.snow_72h).unwrap_or(0.0),
            snow_season: totals.as_ref().map(|t| t.snow_season).unwrap_or(0.0),
            storm_in,
            rate_in_per_hr,
        })
    }
}

fn midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

/// Runs PELT behind a panic boundary, converting a kernel panic into a
/// typed `ComputationFailed` rather than letting it propagate.
fn run_pelt_guarded(
    series: &[f64],
    penalty: f64,
    min_acc_mm: f64,
) -> Result<Vec<crate::snow::accumulation::ClassifiedEvent>, ComputationFailed> {
    std::panic::catch_unwind(AssertUnwindSafe(|| pelt_events(series, penalty, min_acc_mm)))
        .unwrap_or_else(|_| Err(ComputationFailed("PELT kernel panicked".into())))
}
