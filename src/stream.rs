//! Live Stream Pump: a per-subscriber poll loop that pushes a reading only
//! when its `time` advances past the last one sent. No shared state beyond
//! the DB handle; cancellation is the caller dropping the stream (transport
//! disconnect propagates that way for both REST and gRPC).

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use tracing::debug;

use crate::db::{Reading, WeatherRepository};

const POLL_INTERVAL: StdDuration = StdDuration::from_secs(3);

enum PumpState {
    /// Not yet sent anything; poll immediately with no sleep.
    NotStarted,
    Started(Option<DateTime<Utc>>),
}

#[derive(Clone)]
pub struct LiveStreamPump {
    weather: WeatherRepository,
}

impl LiveStreamPump {
    pub fn new(weather: WeatherRepository) -> Self {
        Self { weather }
    }

    /// Subscribe to one station's live readings. The returned stream never
    /// emits the same reading twice and never emits a reading with
    /// `time <=` the previous one sent; it never ends on its own -- the
    /// caller drops it on cancellation.
    pub fn subscribe(&self, station: String) -> impl Stream<Item = Reading> + Send + 'static {
        let weather = self.weather.clone();
        stream::unfold((weather, station, PumpState::NotStarted), |(weather, station, mut state)| async move {
            loop {
                if matches!(state, PumpState::Started(_)) {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }

                match weather.find_latest(&station).await {
                    Ok(Some(reading)) => {
                        let t_last = match state {
                            PumpState::NotStarted => None,
                            PumpState::Started(t) => t,
                        };
                        let should_emit = t_last.is_none_or(|t| reading.time > t);
                        let next_time = Some(reading.time);
                        if should_emit {
                            return Some((reading, (weather, station, PumpState::Started(next_time))));
                        }
                        state = PumpState::Started(next_time);
                    }
                    Ok(None) => {
                        debug!(station = %station, "live stream: no reading available yet, continuing to poll");
                        state = PumpState::Started(match state {
                            PumpState::Started(t) => t,
                            PumpState::NotStarted => None,
                        });
                    }
                    Err(error) => {
                        debug!(station = %station, %error, "live stream: poll failed, continuing");
                        state = PumpState::Started(match state {
                            PumpState::Started(t) => t,
                            PumpState::NotStarted => None,
                        });
                    }
                }
            }
        })
    }
}
