use sqlx::PgPool;
use tracing::instrument;

use crate::db::{AlmanacEntry, DbError};

/// Data access for `almanac_cache`. Rows are replaced wholesale per station
/// on refresh, never individually updated.
#[derive(Clone)]
pub struct AlmanacRepository {
    pool: PgPool,
}

impl AlmanacRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn read_all(&self, station: &str) -> Result<Vec<AlmanacEntry>, DbError> {
        let rows = sqlx::query_as!(
            AlmanacEntry,
            r#"
            SELECT stationname, metric_name, value, occurred_at, wind_dir
            FROM almanac_cache
            WHERE stationname = $1
            ORDER BY metric_name
            "#,
            station
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Replace every metric row for a station in one transaction.
    #[instrument(skip(self, entries), fields(stationname = %station, count = entries.len()))]
    pub async fn replace_for_station(
        &self,
        station: &str,
        entries: &[AlmanacEntry],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query!("DELETE FROM almanac_cache WHERE stationname = $1", station)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query!(
                r#"
                INSERT INTO almanac_cache (stationname, metric_name, value, occurred_at, wind_dir)
                VALUES ($1, $2, $3, $4, $5)
                "#,
                entry.stationname,
                entry.metric_name,
                entry.value,
                entry.occurred_at,
                entry.wind_dir,
            )
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
