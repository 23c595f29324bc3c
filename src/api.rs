use std::sync::Arc;

use axum::extract::{Host, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::almanac::AlmanacCache;
use crate::config::Config;
use crate::db::{AlmanacEntry, Device};
use crate::error::AppError;
use crate::latest::{LatestReading, LatestReadingFetcher};
use crate::query::parse_span_literal;
use crate::query::span::{SpanFetcher, WeatherReadingDto};
use crate::site::SiteRegistry;
use crate::snow::{SnowCacheController, SnowReading};

#[derive(Clone)]
pub struct AppState {
    pub sites: Arc<SiteRegistry>,
    pub spans: Arc<SpanFetcher>,
    pub latest: Arc<LatestReadingFetcher>,
    pub almanac: Arc<AlmanacCache>,
    pub snow: Arc<SnowCacheController>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
struct StationQuery {
    station: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct StationInfo {
    site_id: String,
    hostname: Option<String>,
    is_portal: bool,
    primary_device: Option<Device>,
}

/// Per-request site resolution: lowercase/strip-port the `Host` header, look
/// the site up, fall back to the default site. A request from localhost
/// against an unconfigured registry gets a permissive stand-in site instead
/// of a 503, so a bare `cargo run` with no sites loaded still serves locally.
fn resolve_site(state: &AppState, host: &str) -> Result<crate::db::Site, AppError> {
    let snapshot = state.sites.current();
    if snapshot.is_empty() {
        if crate::site::is_localhost(host) {
            return Ok(local_dev_site());
        }
        return Err(AppError::ConfigUnconfigured);
    }
    snapshot.resolve(host).cloned().ok_or(AppError::ConfigUnconfigured)
}

fn local_dev_site() -> crate::db::Site {
    crate::db::Site {
        id: "local".to_string(),
        hostname: None,
        device_id: None,
        snow_enabled: true,
        snow_device_name: None,
        snow_base_distance: None,
        forecast_provider_enabled: false,
        is_portal: false,
        tls_cert_path: None,
        tls_key_path: None,
    }
}

pub fn create_router(state: AppState) -> Router {
    let data_routes = Router::new()
        .route("/span/{duration}", get(get_span))
        .route("/latest", get(get_latest))
        .route("/snow", get(get_snow))
        .route("/almanac", get(get_almanac))
        .route("/forecast/{hours}", get(get_forecast))
        .route("/stationinfo", get(get_stationinfo))
        .route("/api/stations", get(get_stations))
        .route("/api/remote-stations", get(get_remote_stations))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state.clone());

    let html_routes = Router::new()
        .route("/", get(index))
        .route("/portal", get(portal))
        .route("/privacy", get(privacy))
        .route("/support", get(support))
        .route("/api-docs/openapi.json", get(openapi_spec))
        .route("/docs", get(redoc_ui));

    let mut router = Router::new().merge(data_routes).merge(html_routes);

    if let Ok(assets_dir) = std::env::var("REMOTEWEATHER_RESTSERVER_ASSETS_DIR") {
        let fonts = Router::new()
            .nest_service("/fonts", ServeDir::new(format!("{assets_dir}/fonts")))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            ));
        router = router.merge(fonts);
    } else {
        debug!("REMOTEWEATHER_RESTSERVER_ASSETS_DIR not set, /fonts/* is disabled");
    }

    router
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(get_span, get_latest, get_snow, get_almanac, get_stationinfo, get_stations, get_remote_stations),
    components(schemas(WeatherReadingDto, LatestReading, SnowReading, AlmanacEntry, Device, StationInfo)),
    tags(
        (name = "weather", description = "Tiered span, latest-reading, and almanac queries"),
        (name = "snow", description = "Snow depth and accumulation readings"),
        (name = "sites", description = "Site and device metadata")
    ),
    info(
        title = "Weather Telemetry Core API",
        version = "0.1.0",
        description = "Multi-tenant weather telemetry REST surface"
    )
)]
struct ApiDoc;

/// Generate the OpenAPI specification
pub fn generate_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(generate_openapi_spec())
}

async fn redoc_ui() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Weather Telemetry Core API</title>
    <meta charset="utf-8"/>
    <meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body>
    <redoc spec-url='/api-docs/openapi.json'></redoc>
    <script src="https://cdn.redoc.ly/redoc/latest/bundles/redoc.standalone.js"> </script>
</body>
</html>"#,
    )
}

async fn index() -> Html<&'static str> {
    Html("<!DOCTYPE html><html><body><h1>Weather Telemetry Core</h1></body></html>")
}

async fn portal() -> Html<&'static str> {
    Html("<!DOCTYPE html><html><body><h1>Station Portal</h1></body></html>")
}

async fn privacy() -> Html<&'static str> {
    Html("<!DOCTYPE html><html><body><h1>Privacy Policy</h1></body></html>")
}

async fn support() -> Html<&'static str> {
    Html("<!DOCTYPE html><html><body><h1>Support</h1></body></html>")
}

#[utoipa::path(
    get,
    path = "/span/{duration}",
    tag = "weather",
    params(
        ("duration" = String, Path, description = "Span literal, e.g. \"24h\""),
        ("station" = String, Query, description = "Station name")
    ),
    responses(
        (status = 200, description = "Tiered span of readings", body = [WeatherReadingDto]),
        (status = 400, description = "Invalid duration or unknown station")
    )
)]
#[instrument(skip(state), fields(station = %q.station, duration = %duration))]
async fn get_span(
    State(state): State<AppState>,
    Host(host): Host,
    Path(duration): Path<String>,
    Query(q): Query<StationQuery>,
) -> Result<Json<Vec<WeatherReadingDto>>, AppError> {
    let site = resolve_site(&state, &host)?;
    let span = parse_span_literal(&duration)?;
    let base_distance_mm = if site.snow_enabled { site.snow_base_distance } else { None };
    let rows = state.spans.fetch(&q.station, span, base_distance_mm).await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/latest",
    tag = "weather",
    params(("station" = String, Query, description = "Station name")),
    responses(
        (status = 200, description = "Most recent reading, augmented with totals", body = LatestReading),
        (status = 404, description = "No reading within the freshness window")
    )
)]
#[instrument(skip(state), fields(station = %q.station))]
async fn get_latest(
    State(state): State<AppState>,
    Host(host): Host,
    Query(q): Query<StationQuery>,
) -> Result<Json<LatestReading>, AppError> {
    resolve_site(&state, &host)?;
    let reading = state.latest.fetch(&q.station).await?;
    Ok(Json(reading))
}

#[utoipa::path(
    get,
    path = "/snow",
    tag = "snow",
    params(("station" = String, Query, description = "Station name")),
    responses((status = 200, description = "Snow depth and accumulation totals", body = SnowReading))
)]
#[instrument(skip(state), fields(station = %q.station))]
async fn get_snow(
    State(state): State<AppState>,
    Host(host): Host,
    Query(q): Query<StationQuery>,
) -> Result<Json<SnowReading>, AppError> {
    let site = resolve_site(&state, &host)?;
    let base_distance_mm = site.snow_base_distance.unwrap_or(0.0);
    let reading = state.snow.current_reading(&q.station, base_distance_mm).await?;
    Ok(Json(reading))
}

#[utoipa::path(
    get,
    path = "/almanac",
    tag = "weather",
    params(("station" = String, Query, description = "Station name")),
    responses((status = 200, description = "All-time per-metric extremes", body = [AlmanacEntry]))
)]
#[instrument(skip(state), fields(station = %q.station))]
async fn get_almanac(
    State(state): State<AppState>,
    Host(host): Host,
    Query(q): Query<StationQuery>,
) -> Result<Json<Vec<AlmanacEntry>>, AppError> {
    resolve_site(&state, &host)?;
    let entries = state.almanac.read(&q.station).await?;
    Ok(Json(entries))
}

/// Forecast pass-through, reachable only for sites with a forecast provider
/// configured. The provider integration itself is out of scope; this returns
/// the envelope a real provider would fill in.
#[instrument(skip(state))]
async fn get_forecast(
    State(state): State<AppState>,
    Host(host): Host,
    Path(hours): Path<u32>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let site = resolve_site(&state, &host).map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    if !site.forecast_provider_enabled {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!({ "hours": hours, "periods": [] })))
}

#[utoipa::path(
    get,
    path = "/stationinfo",
    tag = "sites",
    responses((status = 200, description = "Resolved site and primary device", body = StationInfo))
)]
#[instrument(skip(state))]
async fn get_stationinfo(State(state): State<AppState>, Host(host): Host) -> Result<Json<StationInfo>, AppError> {
    let site = resolve_site(&state, &host)?;
    let snapshot = state.sites.current();
    let primary_device = snapshot.primary_device(&site).cloned();
    Ok(Json(StationInfo {
        site_id: site.id,
        hostname: site.hostname,
        is_portal: site.is_portal,
        primary_device,
    }))
}

#[utoipa::path(
    get,
    path = "/api/stations",
    tag = "sites",
    responses((status = 200, description = "This site's device(s)", body = [Device]))
)]
#[instrument(skip(state))]
async fn get_stations(State(state): State<AppState>, Host(host): Host) -> Result<Json<Vec<Device>>, AppError> {
    let site = resolve_site(&state, &host)?;
    let snapshot = state.sites.current();
    Ok(Json(snapshot.primary_device(&site).cloned().into_iter().collect()))
}

#[utoipa::path(
    get,
    path = "/api/remote-stations",
    tag = "sites",
    responses((status = 200, description = "Devices belonging to other sites", body = [Device]))
)]
#[instrument(skip(state))]
async fn get_remote_stations(State(state): State<AppState>, Host(host): Host) -> Result<Json<Vec<Device>>, AppError> {
    let site = resolve_site(&state, &host)?;
    let snapshot = state.sites.current();
    let primary_id = snapshot.primary_device(&site).map(|d| d.id.clone());
    let remote: Vec<Device> = snapshot
        .all_devices()
        .filter(|d| Some(&d.id) != primary_id.as_ref())
        .cloned()
        .collect();
    Ok(Json(remote))
}
