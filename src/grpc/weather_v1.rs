//! `WeatherV1`: the raw-schema gRPC service. Forwarders push readings here;
//! readers get back bare `WeatherReading`s with no computed channels.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, instrument, warn};

use super::proto::weather_v1_server::WeatherV1;
use super::proto::{Ack, SpanRequest, StationRequest, WeatherReading, WeatherSpan};
use super::{bucket_reading_to_proto, proto_to_reading, reading_to_proto, require_known_station, GrpcState};
use crate::query::parse_span_literal;

pub struct WeatherV1Service {
    state: GrpcState,
}

impl WeatherV1Service {
    pub fn new(state: GrpcState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl WeatherV1 for WeatherV1Service {
    /// Ingests a client stream, validating the station name on every message
    /// and acknowledging on `CloseAndRecv`.
    #[instrument(skip(self, request))]
    async fn send_weather_readings(
        &self,
        request: Request<Streaming<WeatherReading>>,
    ) -> Result<Response<Ack>, Status> {
        let mut stream = request.into_inner();
        let mut accepted = 0u32;

        while let Some(msg) = stream.next().await {
            let msg = msg?;
            require_known_station(&self.state.sites, &msg.stationname)?;
            let reading = proto_to_reading(msg)?;

            match self.state.weather.insert_reading(&reading).await {
                Ok(()) => accepted += 1,
                Err(e) => warn!(station = %reading.stationname, error = %e, "failed to persist ingested reading"),
            }
        }

        info!(accepted, "gRPC intake stream closed");
        Ok(Response::new(Ack { accepted }))
    }

    #[instrument(skip(self, request))]
    async fn get_weather_span(&self, request: Request<SpanRequest>) -> Result<Response<WeatherSpan>, Status> {
        let req = request.into_inner();
        require_known_station(&self.state.sites, &req.stationname)?;
        let span = parse_span_literal(&req.duration)?;

        let rows = self
            .state
            .planner
            .fetch_span(&req.stationname, span, None)
            .await
            .map_err(Into::<Status>::into)?;

        let readings = rows.into_iter().map(bucket_reading_to_proto).collect();
        Ok(Response::new(WeatherSpan { readings }))
    }

    #[instrument(skip(self, request))]
    async fn get_latest_reading(&self, request: Request<StationRequest>) -> Result<Response<WeatherReading>, Status> {
        let req = request.into_inner();
        require_known_station(&self.state.sites, &req.stationname)?;

        let reading = self
            .state
            .weather
            .find_latest(&req.stationname)
            .await
            .map_err(|e| Status::internal(e.to_string()))?
            .ok_or_else(|| Status::not_found("no readings available"))?;

        Ok(Response::new(reading_to_proto(reading)))
    }

    type GetLiveWeatherStream = Pin<Box<dyn Stream<Item = Result<WeatherReading, Status>> + Send + 'static>>;

    /// Server-streaming pump: strictly monotonic `time`, no heartbeat on
    /// no-advance, per-poll errors logged and never fatal.
    #[instrument(skip(self, request))]
    async fn get_live_weather(
        &self,
        request: Request<StationRequest>,
    ) -> Result<Response<Self::GetLiveWeatherStream>, Status> {
        let req = request.into_inner();
        require_known_station(&self.state.sites, &req.stationname)?;

        let stream = self
            .state
            .pump
            .subscribe(req.stationname)
            .map(|reading| Ok(reading_to_proto(reading)));

        Ok(Response::new(Box::pin(stream)))
    }
}
