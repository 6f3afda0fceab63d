use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::WasteCategory;
use crate::db::queries;
use crate::error::AppError;

/// Read-only view of the active waste categories.
#[derive(Clone)]
pub struct CatalogStore {
    pool: PgPool,
}

impl CatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<WasteCategory>, AppError> {
        Ok(queries::list_active_categories(&self.pool).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<WasteCategory, AppError> {
        queries::get_active_category(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("waste category {} not found", id)))
    }
}

/// Fails with the first id that is unknown or retired.
pub(crate) async fn ensure_active_categories<'e, E>(executor: E, ids: &[Uuid]) -> Result<(), AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let mut wanted = ids.to_vec();
    wanted.sort();
    wanted.dedup();

    let found = queries::active_category_ids(executor, &wanted).await?;
    match first_missing(&wanted, &found) {
        Some(id) => Err(AppError::NotFound(format!("waste category {} not found", id))),
        None => Ok(()),
    }
}

fn first_missing(wanted: &[Uuid], found: &[Uuid]) -> Option<Uuid> {
    wanted.iter().copied().find(|id| !found.contains(id))
}
