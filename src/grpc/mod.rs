//! gRPC Intake: the `WeatherV1` (raw) and `WeatherAppsV1` (computed)
//! services. Both share the same persistence and derived-metric pipeline as
//! the REST surface -- computed channels are never stored, only produced on
//! read.

pub mod weather_apps_v1;
pub mod weather_v1;

pub mod proto {
    tonic::include_proto!("weathercore");
}

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tonic::Status;

use crate::db::{BucketReading, Reading};
use crate::derived;
use crate::latest::LatestReadingFetcher;
use crate::query::planner::QueryPlanner;
use crate::query::span::SpanFetcher;
use crate::site::SiteRegistry;
use crate::stream::LiveStreamPump;

/// Handles shared by both gRPC services -- the state both listeners are
/// built from.
#[derive(Clone)]
pub struct GrpcState {
    pub weather: crate::db::WeatherRepository,
    pub latest: Arc<LatestReadingFetcher>,
    pub planner: Arc<QueryPlanner>,
    pub spans: Arc<SpanFetcher>,
    pub pump: LiveStreamPump,
    pub sites: Arc<SiteRegistry>,
}

/// Rejects a stream/call whose station name isn't a known device.
pub(crate) fn require_known_station(sites: &SiteRegistry, station: &str) -> Result<(), Status> {
    if sites.current().has_station(station) {
        Ok(())
    } else {
        Err(Status::invalid_argument(format!("unknown station {station:?}")))
    }
}

pub(crate) fn proto_to_reading(msg: proto::WeatherReading) -> Result<Reading, Status> {
    let time = msg
        .time
        .ok_or_else(|| Status::invalid_argument("reading is missing a timestamp"))
        .and_then(timestamp_to_chrono)?;

    Ok(Reading {
        stationname: msg.stationname,
        time,
        outside_temp: msg.outside_temp,
        inside_temp: msg.inside_temp,
        outside_humidity: msg.outside_humidity,
        inside_humidity: msg.inside_humidity,
        barometer: msg.barometer,
        wind_speed: msg.wind_speed,
        wind_dir: msg.wind_dir,
        wind_speed_10min_avg: msg.wind_speed_10min_avg,
        rain_incremental: msg.rain_incremental,
        rain_rate: msg.rain_rate,
        solar_watts: msg.solar_watts,
        potential_solar_watts: msg.potential_solar_watts,
        uv_index: msg.uv_index,
        soil_temp1: msg.soil_temp1,
        leaf_wetness1: msg.leaf_wetness1,
        pm25: msg.pm25,
        pm10: msg.pm10,
        co2: msg.co2,
        aqi_pm25: msg.aqi_pm25,
        snow_distance: msg.snow_distance,
        snow_depth: msg.snow_depth,
        battery_voltage: msg.battery_voltage,
        forecast_icon: msg.forecast_icon,
        forecast_rule: msg.forecast_rule,
        extra_float1: msg.extra_float1,
        extra_float2: msg.extra_float2,
        extra_float3: msg.extra_float3,
        extra_float4: msg.extra_float4,
        extra_float5: msg.extra_float5,
        extra_float6: msg.extra_float6,
        extra_float7: msg.extra_float7,
        extra_float8: msg.extra_float8,
        extra_float9: msg.extra_float9,
        extra_float10: msg.extra_float10,
        extra_text1: msg.extra_text1,
        extra_text2: msg.extra_text2,
        extra_text3: msg.extra_text3,
        extra_text4: msg.extra_text4,
        extra_text5: msg.extra_text5,
        extra_text6: msg.extra_text6,
        extra_text7: msg.extra_text7,
        extra_text8: msg.extra_text8,
        extra_text9: msg.extra_text9,
        extra_text10: msg.extra_text10,
    })
}

pub(crate) fn reading_to_proto(r: Reading) -> proto::WeatherReading {
    proto::WeatherReading {
        stationname: r.stationname,
        time: Some(chrono_to_timestamp(r.time)),
        outside_temp: r.outside_temp,
        inside_temp: r.inside_temp,
        outside_humidity: r.outside_humidity,
        inside_humidity: r.inside_humidity,
        barometer: r.barometer,
        wind_speed: r.wind_speed,
        wind_dir: r.wind_dir,
        wind_speed_10min_avg: r.wind_speed_10min_avg,
        rain_incremental: r.rain_incremental,
        rain_rate: r.rain_rate,
        solar_watts: r.solar_watts,
        potential_solar_watts: r.potential_solar_watts,
        uv_index: r.uv_index,
        soil_temp1: r.soil_temp1,
        leaf_wetness1: r.leaf_wetness1,
        pm25: r.pm25,
        pm10: r.pm10,
        co2: r.co2,
        aqi_pm25: r.aqi_pm25,
        snow_distance: r.snow_distance,
        snow_depth: r.snow_depth,
        battery_voltage: r.battery_voltage,
        forecast_icon: r.forecast_icon,
        forecast_rule: r.forecast_rule,
        extra_float1: r.extra_float1,
        extra_float2: r.extra_float2,
        extra_float3: r.extra_float3,
        extra_float4: r.extra_float4,
        extra_float5: r.extra_float5,
        extra_float6: r.extra_float6,
        extra_float7: r.extra_float7,
        extra_float8: r.extra_float8,
        extra_float9: r.extra_float9,
        extra_float10: r.extra_float10,
        extra_text1: r.extra_text1,
        extra_text2: r.extra_text2,
        extra_text3: r.extra_text3,
        extra_text4: r.extra_text4,
        extra_text5: r.extra_text5,
        extra_text6: r.extra_text6,
        extra_text7: r.extra_text7,
        extra_text8: r.extra_text8,
        extra_text9: r.extra_text9,
        extra_text10: r.extra_text10,
    }
}

/// Builds the computed reading from a raw one, the way `latest::augment`
/// and `WeatherReadingDto` do it for REST.
pub(crate) fn computed_reading(reading: Reading) -> proto::ComputedWeatherReading {
    let wind_cardinal = reading.wind_dir.map(|d| derived::cardinal_direction(d).to_string());
    let feels_like = match (reading.outside_temp, reading.outside_humidity, reading.wind_speed) {
        (Some(t), Some(rh), Some(w)) => Some(derived::feels_like(t, rh, w)),
        _ => None,
    };
    let sky_condition = match (reading.solar_watts, reading.potential_solar_watts) {
        (Some(r), Some(p)) => Some(derived::sky_condition(r, p).as_str().to_string()),
        _ => None,
    };

    proto::ComputedWeatherReading {
        reading: Some(reading_to_proto(reading)),
        wind_cardinal,
        feels_like,
        sky_condition,
    }
}

pub(crate) fn bucket_reading_to_proto(row: BucketReading) -> proto::WeatherReading {
    reading_to_proto(row.reading)
}

fn timestamp_to_chrono(ts: prost_types::Timestamp) -> Result<DateTime<Utc>, Status> {
    Utc.timestamp_opt(ts.seconds, ts.nanos.max(0) as u32)
        .single()
        .ok_or_else(|| Status::invalid_argument("timestamp out of range"))
}

fn chrono_to_timestamp(t: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    }
}
