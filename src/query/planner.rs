//! Tiered Query Planner: picks the finest continuous aggregate whose row
//! count stays O(100) for a requested span, and fills in smoothed snow
//! depth where the estimator has one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::db::{AggregateTier, BucketReading, WeatherRepository};
use crate::error::AppError;

const MAX_SPAN: Duration = Duration::hours(8760);

/// Picks the tier for a span. Spans are inclusive at each upper bound
/// (`<= 6h` stays on `weather_1m`, etc).
pub fn pick_tier(span: Duration) -> Result<AggregateTier, AppError> {
    if span > MAX_SPAN {
        return Err(AppError::InvalidArgument(format!(
            "span {span} exceeds the 1 year maximum"
        )));
    }
    if span <= Duration::hours(6) {
        Ok(AggregateTier::OneMinute)
    } else if span <= Duration::hours(48) {
        Ok(AggregateTier::FiveMinute)
    } else if span <= Duration::days(14) {
        Ok(AggregateTier::OneHour)
    } else {
        Ok(AggregateTier::OneDay)
    }
}

pub struct QueryPlanner {
    weather: WeatherRepository,
}

impl QueryPlanner {
    pub fn new(weather: WeatherRepository) -> Self {
        Self { weather }
    }

    /// Fetches a tiered span and overlays smoothed snow depth where available.
    pub async fn fetch_span(
        &self,
        station: &str,
        span: Duration,
        base_distance_mm: Option<f64>,
    ) -> Result<Vec<BucketReading>, AppError> {
        let tier = pick_tier(span)?;
        let since = Utc::now() - span;
        let mut rows = self.weather.find_bucket_rows(tier, station, since).await?;

        if let Some(base_distance_mm) = base_distance_mm {
            if base_distance_mm > 0.0 {
                self.fill_in_snow_depth(&mut rows, station, since, base_distance_mm).await?;
            }
        }

        Ok(rows)
    }

    async fn fill_in_snow_depth(
        &self,
        rows: &mut [BucketReading],
        station: &str,
        since: DateTime<Utc>,
        base_distance_mm: f64,
    ) -> Result<(), AppError> {
        let estimates = self.weather.find_estimated_depths(station, since).await?;
        if estimates.is_empty() {
            for row in rows.iter_mut() {
                if let Some(snow_distance) = row.reading.snow_distance {
                    row.reading.snow_depth = Some(base_distance_mm - snow_distance);
                }
            }
            return Ok(());
        }

        let by_second: HashMap<i64, f64> =
            estimates.into_iter().map(|(t, v)| (t.timestamp(), v)).collect();

        for row in rows.iter_mut() {
            if let Some(&est_in) = by_second.get(&row.reading.time.timestamp()) {
                row.reading.snow_depth = Some(est_in * 25.4);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_one_minute_for_short_span() {
        assert_eq!(pick_tier(Duration::hours(1)).unwrap(), AggregateTier::OneMinute);
    }

    #[test]
    fn picks_five_minute_for_twelve_hours() {
        assert_eq!(pick_tier(Duration::hours(12)).unwrap(), AggregateTier::FiveMinute);
    }

    #[test]
    fn picks_one_hour_for_five_days() {
        assert_eq!(pick_tier(Duration::days(5)).unwrap(), AggregateTier::OneHour);
    }

    #[test]
    fn picks_one_day_for_thirty_days() {
        assert_eq!(pick_tier(Duration::days(30)).unwrap(), AggregateTier::OneDay);
    }

    #[test]
    fn rejects_span_over_one_year() {
        assert!(pick_tier(Duration::hours(9000)).is_err());
    }
}
