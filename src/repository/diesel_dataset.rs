//! Diesel-based dataset repository for SQLite.

use diesel::prelude::*;

use super::diesel_models::{DatasetRecord, NewDataset};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::parse_datetime;
use crate::error::EngineError;
use crate::models::Dataset;
use crate::schema::datasets;

impl From<DatasetRecord> for Dataset {
    fn from(record: DatasetRecord) -> Self {
        Dataset {
            id: record.id,
            name: record.name,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Diesel-based dataset repository.
#[derive(Clone)]
pub struct DieselDatasetRepository {
    pool: SqlitePool,
}

impl DieselDatasetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Dataset>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            datasets::table
                .find(&id)
                .first::<DatasetRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(Dataset::from))
    }

    pub async fn get_all(&self) -> Result<Vec<Dataset>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            datasets::table
                .order(datasets::id.asc())
                .load::<DatasetRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Dataset::from).collect())
    }

    pub async fn save(&self, dataset: &Dataset) -> Result<(), diesel::result::Error> {
        let id = dataset.id.clone();
        let name = dataset.name.clone();
        let created_at = dataset.created_at.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::replace_into(datasets::table)
                .values(NewDataset {
                    id: &id,
                    name: &name,
                    created_at: &created_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Resolve a dataset or fail with the list of known datasets, so an
    /// operator typo is surfaced immediately rather than ignored.
    pub async fn require(&self, id: &str) -> Result<Dataset, EngineError> {
        if let Some(dataset) = self.get(id).await? {
            return Ok(dataset);
        }
        let known = self
            .get_all()
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect::<Vec<_>>();
        Err(EngineError::DatasetNotFound {
            requested: id.to_string(),
            known,
        })
    }
}
