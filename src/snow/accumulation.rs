//! Accumulation Engine: two coexisting strategies for turning a depth
//! series into totals or classified events.

use crate::db::SnowEventType;
use crate::error::ComputationFailed;
use crate::snow::pelt::{self, Segment};

/// Strategy (a): given the Depth Estimator's smoothed series, the total
/// accumulation over a window is `max - min`, clamped to >= 0, in mm.
/// Seasonal accumulation instead uses `max - depth_at_season_start` so a
/// settled spring doesn't zero out the season.
pub fn smoothed_difference_total(depths_in: &[f64], season_start_value: Option<f64>) -> f64 {
    if depths_in.is_empty() {
        return 0.0;
    }
    let max = depths_in.iter().cloned().fold(f64::MIN, f64::max);
    let total_in = match season_start_value {
        Some(start) => max - start,
        None => {
            let min = depths_in.iter().cloned().fold(f64::MAX, f64::min);
            max - min
        }
    };
    total_in.max(0.0) * 25.4
}

/// A classified accumulation-engine segment ready for persistence.
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub start_index: usize,
    pub end_index: usize,
    pub start_depth_mm: f64,
    pub end_depth_mm: f64,
    pub event_type: SnowEventType,
    pub accumulation_mm: f64,
}

fn classify(segment: &Segment, min_acc: f64) -> ClassifiedEvent {
    let net_change = segment.end_value - segment.start_value;
    let max_increase = segment.max_value - segment.start_value;
    let max_decrease = segment.start_value - segment.min_value;

    let (event_type, snow) = if max_increase >= min_acc && net_change >= min_acc / 2.0 {
        (SnowEventType::Accumulation, net_change)
    } else if max_increase >= min_acc {
        (SnowEventType::SpikeThenSettle, max_increase)
    } else if max_decrease >= min_acc {
        (SnowEventType::Redistribution, 0.0)
    } else {
        (SnowEventType::Plateau, 0.0)
    };

    ClassifiedEvent {
        start_index: segment.start_index,
        end_index: segment.end_index,
        start_depth_mm: segment.start_value,
        end_depth_mm: segment.end_value,
        event_type,
        accumulation_mm: snow.max(0.0),
    }
}

/// Strategy (b): the PELT event strategy. `depths_mm` must already be
/// median-filtered hourly depths; `penalty` is the configured constant.
/// Returns every segment (including plateaus); callers filter for
/// `accumulation_mm > 0` when caching events.
pub fn pelt_events(
    depths_mm: &[f64],
    penalty: f64,
    min_acc_mm: f64,
) -> Result<Vec<ClassifiedEvent>, ComputationFailed> {
    let segments = pelt::detect_segments(depths_mm, penalty)?;
    Ok(segments.iter().map(|s| classify(s, min_acc_mm)).collect())
}

/// Sum of `accumulation_mm` across classified segments — the PELT strategy's
/// total accumulation for a window.
pub fn total_accumulation(events: &[ClassifiedEvent]) -> f64 {
    events.iter().map(|e| e.accumulation_mm).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothed_difference_clamps_non_negative() {
        let depths = vec![5.0, 4.0, 3.0];
        assert_eq!(smoothed_difference_total(&depths, None), 0.0);
    }

    #[test]
    fn seasonal_uses_season_start_not_min() {
        let depths = vec![2.0, 10.0, 8.0];
        let total = smoothed_difference_total(&depths, Some(2.0));
        assert!((total - (10.0 - 2.0) * 25.4).abs() < 1e-6);
    }

    #[test]
    fn pelt_classifies_step_as_accumulation() {
        let series = vec![0.0, 0.0, 20.0, 20.0, 20.0, 30.0, 30.0];
        let events = pelt_events(&series, 3.0, 10.0).unwrap();
        let total: f64 = total_accumulation(&events);
        assert!(total >= 29.0);
    }

    #[test]
    fn events_are_non_negative() {
        let series = vec![10.0, 10.0, 2.0, 2.0, 2.0];
        let events = pelt_events(&series, 3.0, 5.0).unwrap();
        for e in &events {
            assert!(e.accumulation_mm >= 0.0);
        }
    }
}
