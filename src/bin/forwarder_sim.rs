//! A forwarder-facing test/demo client for the gRPC intake. The
//! station-specific wire codecs themselves are out of scope; this simulates
//! what a forwarder would send after decoding a station's own protocol, so
//! the intake path can be exercised end to end without real hardware.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use clap::Parser;
use tokio_stream::StreamExt;
use tonic::transport::Channel;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weathercore::grpc::proto::weather_v1_client::WeatherV1Client;
use weathercore::grpc::proto::WeatherReading;

#[derive(Parser)]
#[command(name = "forwarder-sim")]
#[command(about = "Simulates a station forwarder pushing readings over the gRPC intake")]
struct Cli {
    /// Read from a serial-attached console (mutually exclusive with --network)
    #[arg(long, conflicts_with = "network")]
    serial: bool,

    /// Read from a network-attached console
    #[arg(long, conflicts_with = "serial")]
    network: bool,

    /// gRPC intake address, e.g. http://127.0.0.1:50051
    #[arg(long, env = "FORWARDER_SERVER", default_value = "http://127.0.0.1:50051")]
    server: String,

    /// Station name this forwarder reports readings for
    #[arg(long, env = "FORWARDER_NAME")]
    name: String,

    /// Also uplink over APRS (out of scope for the intake itself; accepted
    /// and logged so the CLI surface matches a real forwarder's).
    #[arg(long)]
    aprs: bool,

    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    alt: Option<f64>,

    /// Number of synthetic readings to push before exiting
    #[arg(long, default_value_t = 5)]
    count: u32,

    /// Seconds between readings
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    #[arg(long, env = "FORWARDER_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(format!("forwarder_sim={}", cli.log)).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !cli.serial && !cli.network {
        eprintln!("one of --serial or --network is required");
        std::process::exit(2);
    }

    info!(
        station = %cli.name,
        server = %cli.server,
        serial = cli.serial,
        network = cli.network,
        aprs = cli.aprs,
        lat = ?cli.lat,
        lon = ?cli.lon,
        alt = ?cli.alt,
        "forwarder-sim starting"
    );

    let channel = connect_with_retry(&cli.server).await?;
    let mut client = WeatherV1Client::new(channel);

    let readings: Vec<WeatherReading> = (0..cli.count)
        .map(|i| synthetic_reading(&cli.name, i))
        .collect();
    let interval = Duration::from_secs(cli.interval_secs);

    // Space sends out the way a real forwarder paces readings off its own
    // station's sampling interval, rather than bursting the whole batch.
    let outbound = tokio_stream::iter(readings).then(move |reading| async move {
        tokio::time::sleep(interval).await;
        reading
    });
    let response = client.send_weather_readings(outbound).await?;
    info!(accepted = response.into_inner().accepted, "intake acknowledged readings");

    Ok(())
}

/// Reconnects with exponential backoff -- a forwarder's own reconnect loop,
/// not the server's concern.
async fn connect_with_retry(server: &str) -> Result<Channel, tonic::transport::Error> {
    let server = server.to_string();
    (|| {
        let server = server.clone();
        async move { Channel::from_shared(server)?.connect().await }
    })
    .retry(ExponentialBuilder::default().with_max_times(5))
    .notify(|err, dur| warn!(error = %err, delay = ?dur, "gRPC intake connect failed, retrying"))
    .await
}

fn synthetic_reading(station: &str, i: u32) -> WeatherReading {
    WeatherReading {
        stationname: station.to_string(),
        time: Some(prost_types::Timestamp {
            seconds: chrono::Utc::now().timestamp() + i as i64 * 5,
            nanos: 0,
        }),
        outside_temp: Some(45.0 + i as f64),
        inside_temp: Some(68.0),
        outside_humidity: Some(62.0),
        inside_humidity: Some(40.0),
        barometer: Some(29.92),
        wind_speed: Some(5.0 + (i % 3) as f64),
        wind_dir: Some((i as f64 * 37.0) % 360.0),
        wind_speed_10min_avg: Some(4.0),
        rain_incremental: Some(0.0),
        rain_rate: Some(0.0),
        solar_watts: Some(300.0),
        potential_solar_watts: Some(600.0),
        uv_index: Some(3.0),
        soil_temp1: None,
        leaf_wetness1: None,
        pm25: Some(8.0),
        pm10: Some(12.0),
        co2: None,
        aqi_pm25: None,
        snow_distance: None,
        snow_depth: None,
        battery_voltage: Some(12.6),
        forecast_icon: None,
        forecast_rule: None,
        extra_float1: None,
        extra_float2: None,
        extra_float3: None,
        extra_float4: None,
        extra_float5: None,
        extra_float6: None,
        extra_float7: None,
        extra_float8: None,
        extra_float9: None,
        extra_float10: None,
        extra_text1: None,
        extra_text2: None,
        extra_text3: None,
        extra_text4: None,
        extra_text5: None,
        extra_text6: None,
        extra_text7: None,
        extra_text8: None,
        extra_text9: None,
        extra_text10: None,
    }
}

