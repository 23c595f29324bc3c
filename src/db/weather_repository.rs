use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::{AggregateTier, BucketReading, DbError, Reading};

/// Data access for the raw `weather` hypertable and its continuous aggregates
/// (`weather_1m`/`_5m`/`_1h`/`_1d`). Readings are append-only: this repository never
/// exposes an update or delete on the raw table.
#[derive(Clone)]
pub struct WeatherRepository {
    pool: PgPool,
}

impl WeatherRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one reading. Used by the gRPC intake; never called for updates.
    #[instrument(skip(self, reading), fields(stationname = %reading.stationname))]
    pub async fn insert_reading(&self, reading: &Reading) -> Result<(), DbError> {
        sqlx::query!(
            r#"
            INSERT INTO weather (
                stationname, time, outside_temp, inside_temp, outside_humidity, inside_humidity,
                barometer, wind_speed, wind_dir, wind_speed_10min_avg, rain_incremental, rain_rate,
                solar_watts, potential_solar_watts, uv_index, soil_temp1, leaf_wetness1,
                pm25, pm10, co2, aqi_pm25, snow_distance, snow_depth, battery_voltage,
                forecast_icon, forecast_rule,
                extra_float1, extra_float2, extra_float3, extra_float4, extra_float5,
                extra_float6, extra_float7, extra_float8, extra_float9, extra_float10,
                extra_text1, extra_text2, extra_text3, extra_text4, extra_text5,
                extra_text6, extra_text7, extra_text8, extra_text9, extra_text10
            )
            VALUES (
                $1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26,
                $27,$28,$29,$30,$31,$32,$33,$34,$35,$36,$37,$38,$39,$40,$41,$42,$43,$44,$45,$46
            )
            "#,
            reading.stationname,
            reading.time,
            reading.outside_temp,
            reading.inside_temp,
            reading.outside_humidity,
            reading.inside_humidity,
            reading.barometer,
            reading.wind_speed,
            reading.wind_dir,
            reading.wind_speed_10min_avg,
            reading.rain_incremental,
            reading.rain_rate,
            reading.solar_watts,
            reading.potential_solar_watts,
            reading.uv_index,
            reading.soil_temp1,
            reading.leaf_wetness1,
            reading.pm25,
            reading.pm10,
            reading.co2,
            reading.aqi_pm25,
            reading.snow_distance,
            reading.snow_depth,
            reading.battery_voltage,
            reading.forecast_icon,
            reading.forecast_rule,
            reading.extra_float1,
            reading.extra_float2,
            reading.extra_float3,
            reading.extra_float4,
            reading.extra_float5,
            reading.extra_float6,
            reading.extra_float7,
            reading.extra_float8,
            reading.extra_float9,
            reading.extra_float10,
            reading.extra_text1,
            reading.extra_text2,
            reading.extra_text3,
            reading.extra_text4,
            reading.extra_text5,
            reading.extra_text6,
            reading.extra_text7,
            reading.extra_text8,
            reading.extra_text9,
            reading.extra_text10,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest raw reading at or after `since` for a station.
    #[instrument(skip(self))]
    pub async fn find_newest_since(
        &self,
        station: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Reading>, DbError> {
        let reading = sqlx::query_as!(
            Reading,
            r#"
            SELECT stationname, time, outside_temp, inside_temp, outside_humidity, inside_humidity,
                   barometer, wind_speed, wind_dir, wind_speed_10min_avg, rain_incremental, rain_rate,
                   solar_watts, potential_solar_watts, uv_index, soil_temp1, leaf_wetness1,
                   pm25, pm10, co2, aqi_pm25, snow_distance, snow_depth, battery_voltage,
                   forecast_icon, forecast_rule,
                   extra_float1, extra_float2, extra_float3, extra_float4, extra_float5,
                   extra_float6, extra_float7, extra_float8, extra_float9, extra_float10,
                   extra_text1, extra_text2, extra_text3, extra_text4, extra_text5,
                   extra_text6, extra_text7, extra_text8, extra_text9, extra_text10
            FROM weather
            WHERE stationname = $1 AND time >= $2
            ORDER BY time DESC
            LIMIT 1
            "#,
            station,
            since,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(reading)
    }

    /// The newest raw reading for a station regardless of age, used by the
    /// Live Stream Pump, which has no freshness window of its own -- only
    /// the Latest Reading Fetcher's 10-minute rule does.
    #[instrument(skip(self))]
    pub async fn find_latest(&self, station: &str) -> Result<Option<Reading>, DbError> {
        let reading = sqlx::query_as!(
            Reading,
            r#"
            SELECT stationname, time, outside_temp, inside_temp, outside_humidity, inside_humidity,
                   barometer, wind_speed, wind_dir, wind_speed_10min_avg, rain_incremental, rain_rate,
                   solar_watts, potential_solar_watts, uv_index, soil_temp1, leaf_wetness1,
                   pm25, pm10, co2, aqi_pm25, snow_distance, snow_depth, battery_voltage,
                   forecast_icon, forecast_rule,
                   extra_float1, extra_float2, extra_float3, extra_float4, extra_float5,
                   extra_float6, extra_float7, extra_float8, extra_float9, extra_float10,
                   extra_text1, extra_text2, extra_text3, extra_text4, extra_text5,
                   extra_text6, extra_text7, extra_text8, extra_text9, extra_text10
            FROM weather
            WHERE stationname = $1
            ORDER BY time DESC
            LIMIT 1
            "#,
            station,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(reading)
    }

    /// Bucketed rows for a chosen tier within `[since, now]`, ordered by bucket.
    #[instrument(skip(self))]
    pub async fn find_bucket_rows(
        &self,
        tier: AggregateTier,
        station: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<BucketReading>, DbError> {
        let table = tier.table_name();
        let sql = format!(
            r#"
            SELECT bucket, stationname, time, outside_temp, inside_temp, outside_humidity, inside_humidity,
                   barometer, wind_speed, wind_dir, wind_speed_10min_avg, rain_incremental, rain_rate,
                   solar_watts, potential_solar_watts, uv_index, soil_temp1, leaf_wetness1,
                   pm25, pm10, co2, aqi_pm25, snow_distance, snow_depth, battery_voltage,
                   forecast_icon, forecast_rule,
                   extra_float1, extra_float2, extra_float3, extra_float4, extra_float5,
                   extra_float6, extra_float7, extra_float8, extra_float9, extra_float10,
                   extra_text1, extra_text2, extra_text3, extra_text4, extra_text5,
                   extra_text6, extra_text7, extra_text8, extra_text9, extra_text10,
                   period_rain
            FROM {table}
            WHERE bucket > $1 AND stationname = $2
            ORDER BY bucket
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(since)
            .bind(station)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(BucketReading::from_row_dynamic(&row)?);
        }
        debug!("fetched {} bucket rows from {}", out.len(), table);
        Ok(out)
    }

    /// Raw `snowdistance` samples for the depth estimator, filtered to
    /// `snowdistance < base_distance - 2mm`, in time order.
    #[instrument(skip(self))]
    pub async fn find_snow_distance_samples(
        &self,
        station: &str,
        base_distance_mm: f64,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, DbError> {
        let rows = sqlx::query!(
            r#"
            SELECT time, snow_distance as "snow_distance!"
            FROM weather_5m
            WHERE stationname = $1 AND bucket >= $2
              AND snow_distance IS NOT NULL AND snow_distance < $3
            ORDER BY time
            "#,
            station,
            since,
            base_distance_mm - 2.0,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.time, r.snow_distance)).collect())
    }

    /// Hourly raw depths (mm) for the PELT strategy, excluding the
    /// near-floor band.
    #[instrument(skip(self))]
    pub async fn find_hourly_depths(
        &self,
        station: &str,
        base_distance_mm: f64,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, DbError> {
        let rows = sqlx::query!(
            r#"
            SELECT bucket, snow_distance as "snow_distance!"
            FROM weather_1h
            WHERE stationname = $1 AND bucket >= $2
              AND snow_distance IS NOT NULL AND snow_distance < $3
            ORDER BY bucket
            "#,
            station,
            since,
            base_distance_mm - 2.0,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.bucket, base_distance_mm - r.snow_distance))
            .collect())
    }

    /// Smoothed depth estimates keyed by UNIX second, for snow fill-in (§4.6).
    #[instrument(skip(self))]
    pub async fn find_estimated_depths(
        &self,
        station: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, DbError> {
        let rows = sqlx::query!(
            r#"
            SELECT time, snow_depth_est_in
            FROM snow_depth_est_5m
            WHERE stationname = $1 AND time >= $2
            ORDER BY time
            "#,
            station,
            since,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.time, r.snow_depth_est_in)).collect())
    }

    /// `SELECT storm_start, storm_end, total FROM storm_rainfall(station)` (§4.7); only
    /// `total` is used by the caller.
    #[instrument(skip(self))]
    pub async fn storm_rainfall_total(&self, station: &str) -> Result<f64, DbError> {
        let row = sqlx::query!(
            r#"SELECT total as "total!" FROM storm_rainfall($1)"#,
            station
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.total).unwrap_or(0.0))
    }

    /// 10-minute wind gust for a station (§4.7).
    #[instrument(skip(self))]
    pub async fn wind_gust_10min(&self, station: &str) -> Result<Option<f64>, DbError> {
        let row = sqlx::query!(
            r#"
            SELECT max(wind_speed) as gust
            FROM weather
            WHERE stationname = $1 AND time >= now() - interval '10 minutes'
            "#,
            station
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| r.gust))
    }

    /// Recent readings used for the dedicated rain-rate calculation (§4.7).
    #[instrument(skip(self))]
    pub async fn recent_rain_increments(
        &self,
        station: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, DbError> {
        let rows = sqlx::query!(
            r#"
            SELECT time, rain_incremental as "rain_incremental!"
            FROM weather
            WHERE stationname = $1 AND time >= $2 AND rain_incremental IS NOT NULL
            ORDER BY time
            "#,
            station,
            since,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.time, r.rain_incremental)).collect())
    }

    /// Sum of `rainincremental` over `[since, now]`, used by the rainfall summariser's
    /// short tail and by `GetRainfallWithRecent` (§4.4).
    #[instrument(skip(self))]
    pub async fn rain_sum_since(&self, station: &str, since: DateTime<Utc>) -> Result<f64, DbError> {
        let row = sqlx::query!(
            r#"
            SELECT coalesce(sum(rain_incremental), 0.0) as "total!"
            FROM weather
            WHERE stationname = $1 AND time >= $2
            "#,
            station,
            since,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.total)
    }

    /// Sum of `period_rain` over `[since, until)` from a given continuous aggregate tier.
    #[instrument(skip(self))]
    pub async fn period_rain_sum(
        &self,
        tier: AggregateTier,
        station: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<f64, DbError> {
        let table = tier.table_name();
        let sql = format!(
            r#"SELECT coalesce(sum(period_rain), 0.0) as total FROM {table}
               WHERE stationname = $1 AND bucket >= $2 AND bucket < $3"#
        );
        let row: (f64,) = sqlx::query_as(&sql)
            .bind(station)
            .bind(since)
            .bind(until)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Distinct station names that received a reading since `since` (used by the
    /// rainfall summariser tick, §4.4).
    #[instrument(skip(self))]
    pub async fn stations_with_recent_readings(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query!(
            r#"SELECT DISTINCT stationname FROM weather WHERE time >= $1"#,
            since
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.stationname).collect())
    }

    /// Order a column (ascending or descending) from a daily or hourly aggregate,
    /// `NULLS LAST`, limit 1 — the almanac refresh's building block (§4.5).
    #[instrument(skip(self))]
    pub async fn extreme(
        &self,
        tier: AggregateTier,
        station: &str,
        column: &str,
        descending: bool,
    ) -> Result<Option<(f64, DateTime<Utc>, Option<f64>)>, DbError> {
        let table = tier.table_name();
        let direction = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            r#"SELECT {column} as value, bucket as occurred_at, wind_dir
               FROM {table}
               WHERE stationname = $1 AND {column} IS NOT NULL
               ORDER BY {column} {direction} NULLS LAST
               LIMIT 1"#
        );

        let row: Option<(f64, DateTime<Utc>, Option<f64>)> = sqlx::query_as(&sql)
            .bind(station)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

impl BucketReading {
    /// Build a `BucketReading` from a dynamically-typed row, since the tier table name
    /// (and therefore the query) is only known at runtime.
    fn from_row_dynamic(row: &sqlx::postgres::PgRow) -> Result<Self, DbError> {
        use sqlx::Row;
        Ok(BucketReading {
            bucket: row.try_get("bucket")?,
            period_rain: row.try_get("period_rain")?,
            reading: Reading {
                stationname: row.try_get("stationname")?,
                time: row.try_get("time")?,
                outside_temp: row.try_get("outside_temp")?,
                inside_temp: row.try_get("inside_temp")?,
                outside_humidity: row.try_get("outside_humidity")?,
                inside_humidity: row.try_get("inside_humidity")?,
                barometer: row.try_get("barometer")?,
                wind_speed: row.try_get("wind_speed")?,
                wind_dir: row.try_get("wind_dir")?,
                wind_speed_10min_avg: row.try_get("wind_speed_10min_avg")?,
                rain_incremental: row.try_get("rain_incremental")?,
                rain_rate: row.try_get("rain_rate")?,
                solar_watts: row.try_get("solar_watts")?,
                potential_solar_watts: row.try_get("potential_solar_watts")?,
                uv_index: row.try_get("uv_index")?,
                soil_temp1: row.try_get("soil_temp1")?,
                leaf_wetness1: row.try_get("leaf_wetness1")?,
                pm25: row.try_get("pm25")?,
                pm10: row.try_get("pm10")?,
                co2: row.try_get("co2")?,
                aqi_pm25: row.try_get("aqi_pm25")?,
                snow_distance: row.try_get("snow_distance")?,
                snow_depth: row.try_get("snow_depth")?,
                battery_voltage: row.try_get("battery_voltage")?,
                forecast_icon: row.try_get("forecast_icon")?,
                forecast_rule: row.try_get("forecast_rule")?,
                extra_float1: row.try_get("extra_float1")?,
                extra_float2: row.try_get("extra_float2")?,
                extra_float3: row.try_get("extra_float3")?,
                extra_float4: row.try_get("extra_float4")?,
                extra_float5: row.try_get("extra_float5")?,
                extra_float6: row.try_get("extra_float6")?,
                extra_float7: row.try_get("extra_float7")?,
                extra_float8: row.try_get("extra_float8")?,
                extra_float9: row.try_get("extra_float9")?,
                extra_float10: row.try_get("extra_float10")?,
                extra_text1: row.try_get("extra_text1")?,
                extra_text2: row.try_get("extra_text2")?,
                extra_text3: row.try_get("extra_text3")?,
                extra_text4: row.try_get("extra_text4")?,
                extra_text5: row.try_get("extra_text5")?,
                extra_text6: row.try_get("extra_text6")?,
                extra_text7: row.try_get("extra_text7")?,
                extra_text8: row.try_get("extra_text8")?,
                extra_text9: row.try_get("extra_text9")?,
                extra_text10: row.try_get("extra_text10")?,
            },
        })
    }
}
