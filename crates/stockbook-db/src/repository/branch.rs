//! # Branch Repository

use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::Branch;

const BRANCH_COLUMNS: &str = "id, code, name, is_active, created_at";

/// Repository for branch rows.
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: SqlitePool,
}

impl BranchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BranchRepository { pool }
    }

    pub async fn insert(&self, branch: &Branch) -> DbResult<()> {
        debug!(id = %branch.id, code = %branch.code, "Inserting branch");

        sqlx::query(
            r#"
            INSERT INTO branches (id, code, name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.code)
        .bind(&branch.name)
        .bind(branch.is_active)
        .bind(branch.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Branch>> {
        Self::fetch(&self.pool, id).await
    }

    pub async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Branch>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1");
        let branch = sqlx::query_as::<_, Branch>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(branch)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Branch>> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE code = ?1");
        let branch = sqlx::query_as::<_, Branch>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(branch)
    }

    pub async fn list(&self) -> DbResult<Vec<Branch>> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches ORDER BY code");
        let branches = sqlx::query_as::<_, Branch>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(branches)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
