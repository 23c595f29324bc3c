// Integration tests for the HTTP API.
// Drives the real Axum router (`weathercore::api::create_router`) over a real
// Postgres/TimescaleDB test database via `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt; // For `.collect()`
use serde_json::Value;
use serial_test::serial;
use sqlx::PgPool;
use tower::ServiceExt; // For `oneshot`

use weathercore::almanac::AlmanacCache;
use weathercore::api::{create_router, AppState};
use weathercore::config::Config;
use weathercore::db::{
    AlmanacRepository, Reading, RainfallRepository, SnowCacheRepository, SnowDepthRepository, WeatherRepository,
};
use weathercore::latest::LatestReadingFetcher;
use weathercore::query::planner::QueryPlanner;
use weathercore::query::span::SpanFetcher;
use weathercore::rainfall::RainfallSummariser;
use weathercore::site::{InMemorySiteConfigStore, SiteRegistry};
use weathercore::snow::SnowCacheController;

const TEST_STATION: &str = "TEST_API_STATION";

async fn create_test_app(pool: PgPool) -> axum::Router {
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
        Default::default(),
    ));
    let rainfall_for_latest = RainfallSummariser::new(weather.clone(), rainfall_repo);
    let latest = Arc::new(LatestReadingFetcher::new(weather.clone(), rainfall_for_latest));
    let planner = QueryPlanner::new(weather.clone());
    let spans = Arc::new(SpanFetcher::new(planner));

    let site_store = Arc::new(InMemorySiteConfigStore::default());
    let sites = Arc::new(SiteRegistry::load(site_store).await.expect("site registry load"));

    let config = Config {
        database_url: String::new(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        grpc_port: 0,
        totals_refresh_secs: 30,
        events_refresh_secs: 900,
        rainfall_refresh_secs: 60,
        almanac_refresh_secs: 3600,
        depth_estimator: Default::default(),
    };

    let state = AppState {
        sites,
        spans,
        latest,
        almanac,
        snow,
        config: Arc::new(config),
    };

    create_router(state)
}

async fn cleanup(pool: &PgPool) {
    sqlx::query!("DELETE FROM weather WHERE stationname = $1", TEST_STATION)
        .execute(pool)
        .await
        .ok();
    sqlx::query!("DELETE FROM rainfall_summary WHERE stationname = $1", TEST_STATION)
        .execute(pool)
        .await
        .ok();
    sqlx::query!("DELETE FROM almanac_cache WHERE stationname = $1", TEST_STATION)
        .execute(pool)
        .await
        .ok();
}

fn reading_at(time: chrono::DateTime<Utc>, outside_temp: f64) -> Reading {
    Reading {
        stationname: TEST_STATION.to_string(),
        time,
        outside_temp: Some(outside_temp),
        outside_humidity: Some(55.0),
        barometer: Some(29.9),
        wind_speed: Some(3.0),
        wind_dir: Some(180.0),
        rain_incremental: Some(0.0),
        rain_rate: Some(0.0),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_latest_returns_not_found_for_unknown_station() {
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/latest?station=NO_SUCH_STATION")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn test_latest_returns_most_recent_reading() {
    let pool = common::test_pool().await;
    cleanup(&pool).await;

    let weather = WeatherRepository::new(pool.clone());
    weather.insert_reading(&reading_at(Utc::now(), 52.0)).await.unwrap();

    let app = create_test_app(pool.clone()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/latest?station={TEST_STATION}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["stationname"], TEST_STATION);
    assert_eq!(json["outside_temp"], 52.0);

    cleanup(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_span_endpoint_returns_readings_in_order() {
    let pool = common::test_pool().await;
    cleanup(&pool).await;

    let weather = WeatherRepository::new(pool.clone());
    let now = Utc::now();
    for i in 0..3 {
        let t = now - chrono::Duration::minutes(10 * (2 - i));
        weather
            .insert_reading(&reading_at(t, 40.0 + i as f64))
            .await
            .unwrap();
    }

    // `/span/1h` reads through the `weather_1m` continuous aggregate (spec
    // §4.6's tier table), which only reflects inserts after a refresh.
    sqlx::query("CALL refresh_continuous_aggregate('weather_1m', now() - interval '1 day', now() + interval '1 minute')")
        .execute(&pool)
        .await
        .unwrap();

    let app = create_test_app(pool.clone()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/span/1h?station={TEST_STATION}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let rows = json.as_array().expect("array response");
    assert!(rows.len() >= 3, "expected at least 3 rows, got {}", rows.len());

    cleanup(&pool).await;
}

#[tokio::test]
async fn test_span_endpoint_rejects_invalid_duration() {
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/span/not-a-duration?station={TEST_STATION}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_snow_endpoint_returns_reading_for_unknown_station() {
    // No base distance configured for this station (default site has none set),
    // but the snow cache controller still answers with zeroed-out totals rather
    // than erroring -- there's simply nothing cached yet.
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/snow?station={TEST_STATION}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_almanac_endpoint_empty_for_unknown_station() {
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/almanac?station={TEST_STATION}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_stationinfo_falls_back_to_local_dev_site() {
    // No sites configured in the in-memory store -> localhost host gets the
    // permissive stand-in site, not a 503.
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/stationinfo")
                .header("host", "127.0.0.1:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["site_id"], "local");
}

#[tokio::test]
async fn test_stationinfo_rejects_unconfigured_non_local_host() {
    // No sites loaded and a non-local Host header: resolution can't fall
    // back to the local-dev site, so it surfaces as 503
    // (AppError::ConfigUnconfigured) rather than a panic.
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/stationinfo")
                .header("host", "unknown.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_openapi_spec_is_served() {
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["info"]["title"], "Weather Telemetry Core API");
}

#[tokio::test]
async fn test_docs_page_served() {
    let pool = common::test_pool().await;
    let app = create_test_app(pool).await;

    let response = app
        .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
