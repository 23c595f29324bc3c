//! Depth Estimator: turns raw `snowdistance` samples into a physically
//! plausible depth-in-inches series via local upper-quantile smoothing
//! followed by rate limiting.

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Tunable parameters for the smoothing and rate-limiting pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DepthEstimatorParams {
    pub window_minutes: i64,
    pub quantile: f64,
    pub max_up_rate_in_per_hour: f64,
    pub max_down_rate_in_per_hour: f64,
}

impl Default for DepthEstimatorParams {
    fn default() -> Self {
        Self {
            window_minutes: 30,
            quantile: 0.85,
            max_up_rate_in_per_hour: 4.0,
            max_down_rate_in_per_hour: 1.5,
        }
    }
}

/// A raw `(time, depth_in)` sample prior to smoothing.
#[derive(Debug, Clone, Copy)]
pub struct RawDepthSample {
    pub time: DateTime<Utc>,
    pub depth_in: f64,
}

/// October 1 local-calendar of the current year if `now`'s month is >= October,
/// else of the previous year (spec glossary "Season start").
pub fn season_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let year = if now.month() >= 10 { now.year() } else { now.year() - 1 };
    Utc.with_ymd_and_hms(year, 10, 1, 0, 0, 0).unwrap()
}

/// Converts raw sensor distance to depth above the calibrated base.
pub fn mm_distance_to_depth_in(base_distance_mm: f64, snowdistance_mm: f64) -> f64 {
    (base_distance_mm - snowdistance_mm) / 25.4
}

/// Local upper-quantile smoothing: for each sample, gather neighbours within
/// `window_minutes` on either side, sort, pick the quantile-indexed element,
/// and average a 3-sample band centred on it.
pub fn quantile_smooth(samples: &[RawDepthSample], params: &DepthEstimatorParams) -> Vec<f64> {
    let window = chrono::Duration::minutes(params.window_minutes);
    let mut smoothed = Vec::with_capacity(samples.len());

    for sample in samples {
        let lo = sample.time - window;
        let hi = sample.time + window;
        let mut neighbourhood: Vec<f64> = samples
            .iter()
            .filter(|s| s.time >= lo && s.time <= hi)
            .map(|s| s.depth_in)
            .collect();
        neighbourhood.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let n = neighbourhood.len();
        let idx = ((params.quantile * (n - 1) as f64).floor() as usize).min(n - 1);
        let band_start = idx.saturating_sub(1);
        let band_end = (idx + 1).min(n - 1);
        let band = &neighbourhood[band_start..=band_end];
        let avg = band.iter().sum::<f64>() / band.len() as f64;
        smoothed.push(avg);
    }

    smoothed
}

/// Rate limiting: integrates forward, clamping `Δdepth/Δt` to
/// `[-max_down, +max_up]`.
pub fn rate_limit(
    samples: &[RawDepthSample],
    smoothed: &[f64],
    params: &DepthEstimatorParams,
    prev_estimate: Option<(DateTime<Utc>, f64)>,
) -> Vec<f64> {
    let mut out = Vec::with_capacity(smoothed.len());
    let mut prev = prev_estimate;

    for (sample, &value) in samples.iter().zip(smoothed.iter()) {
        let limited = match prev {
            None => value,
            Some((prev_time, prev_depth)) => {
                let dt_hours =
                    (sample.time - prev_time).num_milliseconds() as f64 / 3_600_000.0;
                if dt_hours <= 0.0 {
                    prev_depth
                } else {
                    let rate = (value - prev_depth) / dt_hours;
                    let clamped =
                        rate.clamp(-params.max_down_rate_in_per_hour, params.max_up_rate_in_per_hour);
                    prev_depth + clamped * dt_hours
                }
            }
        };
        out.push(limited);
        prev = Some((sample.time, limited));
    }

    out
}

/// Runs the full pipeline (steps 2-4) over a fetched raw window, producing the
/// `(time, depth_in)` series to persist. Empty input is a no-op.
pub fn estimate_series(
    samples: &[RawDepthSample],
    params: &DepthEstimatorParams,
    prev_estimate: Option<(DateTime<Utc>, f64)>,
) -> Vec<(DateTime<Utc>, f64)> {
    if samples.is_empty() {
        return Vec::new();
    }
    let smoothed = quantile_smooth(samples, params);
    let limited = rate_limit(samples, &smoothed, params, prev_estimate);
    samples.iter().map(|s| s.time).zip(limited).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_at(minute: i64, depth: f64) -> RawDepthSample {
        RawDepthSample {
            time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            depth_in: depth,
        }
    }

    #[test]
    fn quantile_smoothing_rejects_low_outlier() {
        let samples = vec![
            sample_at(0, 10.0),
            sample_at(10, 10.0),
            sample_at(20, 2.0),
            sample_at(30, 10.0),
            sample_at(40, 10.0),
        ];
        let params = DepthEstimatorParams::default();
        let smoothed = quantile_smooth(&samples, &params);
        assert!((smoothed[2] - 10.0).abs() <= 2.0);
        assert!(smoothed[0] >= 8.0);
    }

    #[test]
    fn rate_limiter_caps_excessive_accumulation() {
        let samples = vec![sample_at(0, 5.0), sample_at(60, 15.0)];
        let params = DepthEstimatorParams {
            max_up_rate_in_per_hour: 4.0,
            ..Default::default()
        };
        let smoothed = vec![5.0, 15.0];
        let limited = rate_limit(&samples, &smoothed, &params, Some((samples[0].time, 5.0)));
        assert_eq!(limited[1], 9.0);
    }

    #[test]
    fn season_start_picks_october_by_month() {
        let july = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap();
        let start = season_start(july);
        assert_eq!(start.year(), 2025);
        assert_eq!(start.month(), 10);

        let november = Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap();
        let start = season_start(november);
        assert_eq!(start.year(), 2026);
    }
}
