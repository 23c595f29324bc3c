use sqlx::PgPool;
use tracing::instrument;

use crate::db::{DbError, RainfallSummary};

/// Data access for `rainfall_summary`.
#[derive(Clone)]
pub struct RainfallRepository {
    pool: PgPool,
}

impl RainfallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn read(&self, station: &str) -> Result<Option<RainfallSummary>, DbError> {
        let row = sqlx::query_as!(
            RainfallSummary,
            r#"
            SELECT stationname, rain_24h, rain_48h, rain_72h, last_updated
            FROM rainfall_summary
            WHERE stationname = $1
            "#,
            station
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self))]
    pub async fn upsert(&self, row: &RainfallSummary) -> Result<(), DbError> {
        sqlx::query!(
            r#"
            INSERT INTO rainfall_summary (stationname, rain_24h, rain_48h, rain_72h, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (stationname) DO UPDATE SET
                rain_24h = EXCLUDED.rain_24h,
                rain_48h = EXCLUDED.rain_48h,
                rain_72h = EXCLUDED.rain_72h,
                last_updated = EXCLUDED.last_updated
            "#,
            row.stationname,
            row.rain_24h,
            row.rain_48h,
            row.rain_72h,
            row.last_updated,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
