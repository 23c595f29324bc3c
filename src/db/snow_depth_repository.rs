use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::{DbError, SnowDepthEstimate};

/// Data access for `snow_depth_est_5m`, the Depth Estimator's output series.
/// The estimator always rewrites a trailing window rather than appending
/// blindly, so every write here is delete-then-insert in one transaction.
#[derive(Clone)]
pub struct SnowDepthRepository {
    pool: PgPool,
}

impl SnowDepthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The latest persisted estimate time for a station, if any.
    #[instrument(skip(self))]
    pub async fn latest_time(&self, station: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        let row = sqlx::query!(
            r#"SELECT max(time) as "latest" FROM snow_depth_est_5m WHERE stationname = $1"#,
            station
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.latest)
    }

    /// The estimate at or immediately before `before`, used to seed the rate
    /// limiter's `prev_estimate` carry-forward value. Returns the point's own
    /// timestamp alongside the value so the rate limiter clamps against the
    /// true elapsed time rather than the window boundary.
    #[instrument(skip(self))]
    pub async fn estimate_before(
        &self,
        station: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, f64)>, DbError> {
        let row = sqlx::query!(
            r#"
            SELECT time, snow_depth_est_in
            FROM snow_depth_est_5m
            WHERE stationname = $1 AND time < $2
            ORDER BY time DESC
            LIMIT 1
            "#,
            station,
            before,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| (r.time, r.snow_depth_est_in)))
    }

    /// Replace `[window_start, ..]` for a station with a freshly computed series, in a
    /// single transaction. Any SQL failure aborts the whole write.
    #[instrument(skip(self, series), fields(stationname = %station, count = series.len()))]
    pub async fn replace_from(
        &self,
        station: &str,
        window_start: DateTime<Utc>,
        series: &[SnowDepthEstimate],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query!(
            "DELETE FROM snow_depth_est_5m WHERE stationname = $1 AND time >= $2",
            station,
            window_start,
        )
        .execute(&mut *tx)
        .await?;

        for point in series {
            sqlx::query!(
                r#"
                INSERT INTO snow_depth_est_5m (stationname, time, snow_depth_est_in)
                VALUES ($1, $2, $3)
                "#,
                station,
                point.time,
                point.snow_depth_est_in,
            )
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("replaced {} depth estimates for {}", series.len(), station);
        Ok(())
    }
}
