use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::db::{DbError, SnowEvent, SnowTotalsCache};

/// Data access for `snow_totals_cache` (UPSERT-only) and `snow_events_cache`
/// (delete-then-insert per `(station, hours)`).
#[derive(Clone)]
pub struct SnowCacheRepository {
    pool: PgPool,
}

impl SnowCacheRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn read_totals(&self, station: &str) -> Result<Option<SnowTotalsCache>, DbError> {
        let row = sqlx::query_as!(
            SnowTotalsCache,
            r#"
            SELECT stationname, snow_midnight, snow_24h, snow_72h, snow_season, base_distance, computed_at
            FROM snow_totals_cache
            WHERE stationname = $1
            "#,
            station
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self))]
    pub async fn upsert_totals(&self, row: &SnowTotalsCache) -> Result<(), DbError> {
        sqlx::query!(
            r#"
            INSERT INTO snow_totals_cache
                (stationname, snow_midnight, snow_24h, snow_72h, snow_season, base_distance, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (stationname) DO UPDATE SET
                snow_midnight = EXCLUDED.snow_midnight,
                snow_24h = EXCLUDED.snow_24h,
                snow_72h = EXCLUDED.snow_72h,
                snow_season = EXCLUDED.snow_season,
                base_distance = EXCLUDED.base_distance,
                computed_at = EXCLUDED.computed_at
            "#,
            row.stationname,
            row.snow_midnight,
            row.snow_24h,
            row.snow_72h,
            row.snow_season,
            row.base_distance,
            row.computed_at,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn read_events(
        &self,
        station: &str,
        hours: i32,
    ) -> Result<Vec<SnowEvent>, DbError> {
        let rows = sqlx::query!(
            r#"
            SELECT stationname, hours, start_time, end_time, event_type,
                   start_depth_mm, end_depth_mm, accumulation_mm, computed_at
            FROM snow_events_cache
            WHERE stationname = $1 AND hours = $2
            ORDER BY start_time
            "#,
            station,
            hours,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SnowEvent {
                stationname: r.stationname,
                hours: r.hours,
                start_time: r.start_time,
                end_time: r.end_time,
                event_type: r.event_type,
                start_depth_mm: r.start_depth_mm,
                end_depth_mm: r.end_depth_mm,
                accumulation_mm: r.accumulation_mm,
                computed_at: r.computed_at,
            })
            .collect())
    }

    /// `computed_at` of the freshest refresh for `(station, hours)`, used by the
    /// controller's grace-window freshness check.
    #[instrument(skip(self))]
    pub async fn events_computed_at(
        &self,
        station: &str,
        hours: i32,
    ) -> Result<Option<DateTime<Utc>>, DbError> {
        let row = sqlx::query!(
            r#"
            SELECT max(computed_at) as "computed_at" FROM snow_events_cache
            WHERE stationname = $1 AND hours = $2
            "#,
            station,
            hours,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.computed_at)
    }

    /// Delete-then-insert all events for `(station, hours)` in one transaction.
    #[instrument(skip(self, events), fields(stationname = %station, hours = %hours, count = events.len()))]
    pub async fn replace_events(
        &self,
        station: &str,
        hours: i32,
        events: &[SnowEvent],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query!(
            "DELETE FROM snow_events_cache WHERE stationname = $1 AND hours = $2",
            station,
            hours,
        )
        .execute(&mut *tx)
        .await?;

        for event in events {
            sqlx::query!(
                r#"
                INSERT INTO snow_events_cache
                    (stationname, hours, start_time, end_time, event_type,
                     start_depth_mm, end_depth_mm, accumulation_mm, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
                event.stationname,
                event.hours,
                event.start_time,
                event.end_time,
                event.event_type,
                event.start_depth_mm,
                event.end_depth_mm,
                event.accumulation_mm,
                event.computed_at,
            )
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
