use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server as TonicServer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::almanac::AlmanacCache;
use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::db::{AlmanacRepository, RainfallRepository, SnowCacheRepository, SnowDepthRepository, WeatherRepository};
use crate::grpc::proto::weather_apps_v1_server::WeatherAppsV1Server;
use crate::grpc::proto::weather_v1_server::WeatherV1Server;
use crate::grpc::weather_apps_v1::WeatherAppsV1Service;
use crate::grpc::weather_v1::WeatherV1Service;
use crate::grpc::GrpcState;
use crate::latest::LatestReadingFetcher;
use crate::query::planner::QueryPlanner;
use crate::query::span::SpanFetcher;
use crate::rainfall::RainfallSummariser;
use crate::scheduler;
use crate::site::{InMemorySiteConfigStore, SiteRegistry};
use crate::snow::SnowCacheController;
use crate::stream::LiveStreamPump;

/// Application with all spawned background tasks and both servers. Two
/// independent cancellation tokens drive shutdown: the REST listener and the
/// background schedulers stop on `shutdown`, while the gRPC listener stops
/// on a separate `grpc_shutdown` token that's only cancelled once the REST
/// listener has finished (or timed out), so the two listeners go down in
/// sequence rather than both at once.
pub struct Application {
    pub rest_handle: JoinHandle<Result<(), std::io::Error>>,
    pub grpc_handle: JoinHandle<Result<(), tonic::transport::Error>>,
    pub rainfall_scheduler_handle: JoinHandle<()>,
    pub almanac_scheduler_handle: JoinHandle<()>,
    pub snow_scheduler_handle: JoinHandle<()>,
    shutdown: CancellationToken,
    grpc_shutdown: CancellationToken,
}

impl Application {
    /// Build and initialize the application: repositories, the derived-query
    /// and caching layers, the site registry, both request-fabric listeners,
    /// and every scheduler.
    pub async fn build(config: Config, pool: PgPool) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        let weather = WeatherRepository::new(pool.clone());
        let almanac_repo = AlmanacRepository::new(pool.clone());
        let rainfall_repo = RainfallRepository::new(pool.clone());
        let snow_depths = SnowDepthRepository::new(pool.clone());
        let snow_cache_repo = SnowCacheRepository::new(pool.clone());

        let almanac = Arc::new(AlmanacCache::new(weather.clone(), almanac_repo));
        let snow = Arc::new(SnowCacheController::new(
            weather.clone(),
            snow_depths,
            snow_cache_repo,
            config.depth_estimator.clone(),
        ));
        let rainfall_for_latest = RainfallSummariser::new(weather.clone(), rainfall_repo.clone());
        let rainfall_for_scheduler = Arc::new(RainfallSummariser::new(weather.clone(), rainfall_repo));

        let latest = Arc::new(LatestReadingFetcher::new(weather.clone(), rainfall_for_latest));
        let planner_for_spans = QueryPlanner::new(weather.clone());
        let planner_for_grpc = Arc::new(QueryPlanner::new(weather.clone()));
        let spans = Arc::new(SpanFetcher::new(planner_for_spans));

        // Site/device configuration comes from an external store; this wires
        // the in-memory reference implementation with nothing loaded, so a
        // bare deployment still serves from localhost until a real store is
        // plugged in.
        let site_store = Arc::new(InMemorySiteConfigStore::default());
        let sites = Arc::new(SiteRegistry::load(site_store).await?);

        let pump = LiveStreamPump::new(weather.clone());

        let shutdown = CancellationToken::new();
        let grpc_shutdown = CancellationToken::new();

        info!("Spawning background schedulers");

        let rainfall_scheduler_handle = {
            let rainfall = rainfall_for_scheduler.clone();
            let interval = config.rainfall_refresh_secs;
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler::start_rainfall_scheduler(rainfall, interval, shutdown).await })
        };

        let almanac_scheduler_handle = {
            let almanac = almanac.clone();
            let sites = sites.clone();
            let interval = config.almanac_refresh_secs;
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler::start_almanac_scheduler(almanac, sites, interval, shutdown).await })
        };

        let snow_scheduler_handle = {
            let snow = snow.clone();
            let sites = sites.clone();
            let totals_interval = config.totals_refresh_secs;
            let events_interval = config.events_refresh_secs;
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                scheduler::start_snow_scheduler(snow, sites, totals_interval, events_interval, shutdown).await
            })
        };

        let app_state = AppState {
            sites: sites.clone(),
            spans: spans.clone(),
            latest: latest.clone(),
            almanac: almanac.clone(),
            snow: snow.clone(),
            config: Arc::new(config.clone()),
        };
        let rest_app = create_router(app_state).layer(TraceLayer::new_for_http());

        let rest_addr = config.server_addr();
        info!(%rest_addr, "starting REST listener");
        let rest_handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
                axum::serve(listener, rest_app).with_graceful_shutdown(shutdown.cancelled_owned()).await
            })
        };

        let grpc_state = GrpcState {
            weather: weather.clone(),
            latest,
            planner: planner_for_grpc,
            spans,
            pump,
            sites,
        };
        let weather_v1 = WeatherV1Server::new(WeatherV1Service::new(grpc_state.clone()));
        let weather_apps_v1 = WeatherAppsV1Server::new(WeatherAppsV1Service::new(grpc_state));

        let grpc_addr: std::net::SocketAddr = config.grpc_addr().parse()?;
        info!(%grpc_addr, "starting gRPC listener");
        let grpc_handle = {
            let grpc_shutdown = grpc_shutdown.clone();
            tokio::spawn(async move {
                TonicServer::builder()
                    .add_service(weather_v1)
                    .add_service(weather_apps_v1)
                    .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled_owned())
                    .await
            })
        };

        info!("Application initialized successfully");

        Ok(Self {
            rest_handle,
            grpc_handle,
            rainfall_scheduler_handle,
            almanac_scheduler_handle,
            snow_scheduler_handle,
            shutdown,
            grpc_shutdown,
        })
    }

    /// Runs until either listener exits on its own or a shutdown signal
    /// arrives, then brings both down in sequence: REST gets a graceful stop
    /// bounded by a 10 second deadline, and only once that's done (or timed
    /// out) does gRPC get its own graceful stop.
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        let Application {
            rest_handle,
            grpc_handle,
            rainfall_scheduler_handle,
            almanac_scheduler_handle,
            snow_scheduler_handle,
            shutdown,
            grpc_shutdown,
        } = self;

        let mut rest_handle = Some(rest_handle);
        let mut grpc_handle = Some(grpc_handle);

        tokio::select! {
            result = rest_handle.as_mut().unwrap() => {
                result??;
                rest_handle = None;
            }
            result = grpc_handle.as_mut().unwrap() => {
                result??;
                grpc_handle = None;
            }
            _ = shutdown.cancelled() => {}
        }

        shutdown.cancel();
        if let Some(handle) = rest_handle {
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(result) => result??,
                Err(_) => warn!("REST listener did not shut down within the 10 second deadline, stopping gRPC anyway"),
            }
        }

        grpc_shutdown.cancel();
        if let Some(handle) = grpc_handle {
            handle.await??;
        }

        rainfall_scheduler_handle.await.ok();
        almanac_scheduler_handle.await.ok();
        snow_scheduler_handle.await.ok();
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
