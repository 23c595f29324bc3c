//! `WeatherAppsV1`: the end-user gRPC schema -- same semantics as
//! `WeatherV1`'s read side, but every reading carries the derived channels
//! computed on read.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::instrument;

use super::proto::weather_apps_v1_server::WeatherAppsV1;
use super::proto::{ComputedWeatherReading, ComputedWeatherSpan, SpanRequest, StationRequest};
use super::{computed_reading, require_known_station, GrpcState};
use crate::query::parse_span_literal;

pub struct WeatherAppsV1Service {
    state: GrpcState,
}

impl WeatherAppsV1Service {
    pub fn new(state: GrpcState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl WeatherAppsV1 for WeatherAppsV1Service {
    #[instrument(skip(self, request))]
    async fn get_weather_time_span(
        &self,
        request: Request<SpanRequest>,
    ) -> Result<Response<ComputedWeatherSpan>, Status> {
        let req = request.into_inner();
        require_known_station(&self.state.sites, &req.stationname)?;
        let span = parse_span_literal(&req.duration)?;

        let rows = self
            .state
            .planner
            .fetch_span(&req.stationname, span, None)
            .await
            .map_err(Into::<Status>::into)?;

        let readings = rows.into_iter().map(|row| computed_reading(row.reading)).collect();
        Ok(Response::new(ComputedWeatherSpan { readings }))
    }

    #[instrument(skip(self, request))]
    async fn get_current_reading(
        &self,
        request: Request<StationRequest>,
    ) -> Result<Response<ComputedWeatherReading>, Status> {
        let req = request.into_inner();
        require_known_station(&self.state.sites, &req.stationname)?;

        let reading = self
            .state
            .weather
            .find_latest(&req.stationname)
            .await
            .map_err(|e| Status::internal(e.to_string()))?
            .ok_or_else(|| Status::not_found("no readings available"))?;

        Ok(Response::new(computed_reading(reading)))
    }

    type StreamLiveWeatherStream = Pin<Box<dyn Stream<Item = Result<ComputedWeatherReading, Status>> + Send + 'static>>;

    #[instrument(skip(self, request))]
    async fn stream_live_weather(
        &self,
        request: Request<StationRequest>,
    ) -> Result<Response<Self::StreamLiveWeatherStream>, Status> {
        let req = request.into_inner();
        require_known_station(&self.state.sites, &req.stationname)?;

        let stream = self.state.pump.subscribe(req.stationname).map(|reading| Ok(computed_reading(reading)));
        Ok(Response::new(Box::pin(stream)))
    }
}
