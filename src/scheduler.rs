use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::almanac::AlmanacCache;
use crate::rainfall::RainfallSummariser;
use crate::site::SiteRegistry;
use crate::snow::SnowCacheController;

/// Drives the Almanac Cache's hourly rewrite across every known station.
#[instrument(skip(almanac, sites, shutdown), fields(interval_secs = %interval_secs))]
pub async fn start_almanac_scheduler(
    almanac: Arc<AlmanacCache>,
    sites: Arc<SiteRegistry>,
    interval_secs: u64,
    shutdown: CancellationToken,
) {
    let mut interval = time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "almanac scheduler started");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                info!("almanac scheduler shutting down");
                return;
            }
        }

        let stations = known_stations(&sites);
        debug!(count = stations.len(), "almanac tick");
        if let Err(e) = almanac.tick(&stations).await {
            warn!(error = %e, "almanac tick failed, retrying next hour");
        }
    }
}

/// Drives the Rainfall Summariser's per-minute refresh; the summariser
/// discovers its own station list from recent readings.
#[instrument(skip(rainfall, shutdown), fields(interval_secs = %interval_secs))]
pub async fn start_rainfall_scheduler(rainfall: Arc<RainfallSummariser>, interval_secs: u64, shutdown: CancellationToken) {
    let mut interval = time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "rainfall scheduler started");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                info!("rainfall scheduler shutting down");
                return;
            }
        }

        if let Err(e) = rainfall.tick().await {
            warn!(error = %e, "rainfall tick failed, retrying next minute");
        }
    }
}

/// Drives the Snow Cache Controller's two independent refresh cycles (spec
/// §4.3): totals on a short interval, events on a longer one. Only stations
/// with a configured snow base distance are refreshed.
#[instrument(skip(snow, sites, shutdown), fields(totals_interval_secs = %totals_interval_secs, events_interval_secs = %events_interval_secs))]
pub async fn start_snow_scheduler(
    snow: Arc<SnowCacheController>,
    sites: Arc<SiteRegistry>,
    totals_interval_secs: u64,
    events_interval_secs: u64,
    shutdown: CancellationToken,
) {
    let mut totals_interval = time::interval(Duration::from_secs(totals_interval_secs));
    let mut events_interval = time::interval(Duration::from_secs(events_interval_secs));
    info!(totals_interval_secs, events_interval_secs, "snow scheduler started");

    loop {
        tokio::select! {
            _ = totals_interval.tick() => {
                for (station, base_distance_mm) in snow_stations(&sites) {
                    if let Err(e) = snow.refresh_totals(&station, base_distance_mm).await {
                        warn!(station = %station, error = %e, "snow totals refresh failed, retrying next tick");
                    }
                }
            }
            _ = events_interval.tick() => {
                for (station, base_distance_mm) in snow_stations(&sites) {
                    if let Err(e) = snow.refresh_events(&station, base_distance_mm).await {
                        warn!(station = %station, error = %e, "snow events refresh failed, retrying next tick");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("snow scheduler shutting down");
                return;
            }
        }
    }
}

fn known_stations(sites: &SiteRegistry) -> Vec<String> {
    sites.current().all_devices().map(|d| d.name.clone()).collect()
}

/// Stations with a configured, positive snow base distance, paired with that
/// distance in millimeters.
fn snow_stations(sites: &SiteRegistry) -> Vec<(String, f64)> {
    sites
        .current()
        .all_devices()
        .filter_map(|d| d.base_snow_distance.filter(|&mm| mm > 0.0).map(|mm| (d.name.clone(), mm)))
        .collect()
}
