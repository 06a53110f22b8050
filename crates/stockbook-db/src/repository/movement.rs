//! # Movement Repository
//!
//! The Movement Log. Rows are inserted and read, never updated or deleted
//! (triggers abort any attempt).

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::{Movement, MovementFilter};

const MOVEMENT_COLUMNS: &str = r#"
    id, product_id, branch_id, movement_type, quantity, unit_cost_cents,
    reference_type, reference_id, user_id, notes, created_at
"#;

/// Repository for stock movements.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    pub async fn insert(conn: &mut SqliteConnection, movement: &Movement) -> DbResult<()> {
        debug!(
            id = %movement.id,
            product_id = %movement.product_id,
            branch_id = %movement.branch_id,
            quantity = movement.quantity,
            reference_type = movement.reference_type.as_str(),
            "Appending stock movement"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, branch_id, movement_type, quantity, unit_cost_cents,
                reference_type, reference_id, user_id, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.product_id)
        .bind(&movement.branch_id)
        .bind(movement.movement_type)
        .bind(movement.quantity)
        .bind(movement.unit_cost_cents)
        .bind(movement.reference_type)
        .bind(&movement.reference_id)
        .bind(&movement.user_id)
        .bind(&movement.notes)
        .bind(movement.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Movements matching `filter`, newest first, at most
    /// `filter.effective_limit()` rows.
    pub async fn list(&self, filter: &MovementFilter) -> DbResult<Vec<Movement>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE 1 = 1"));

        if let Some(product_id) = &filter.product_id {
            query.push(" AND product_id = ").push_bind(product_id.clone());
        }
        if let Some(branch_id) = &filter.branch_id {
            query.push(" AND branch_id = ").push_bind(branch_id.clone());
        }
        if let Some(reference_type) = filter.reference_type {
            query.push(" AND reference_type = ").push_bind(reference_type);
        }
        if let Some(reference_id) = &filter.reference_id {
            query.push(" AND reference_id = ").push_bind(reference_id.clone());
        }

        // rowid breaks ties between movements written in the same instant
        query
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(filter.effective_limit());

        let movements = query
            .build_query_as::<Movement>()
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::fixtures;
    use chrono::Utc;
    use stockbook_core::{MovementType, ReferenceType};
    use uuid::Uuid;

    fn movement(product_id: &str, branch_id: &str, qty: i64, reference: ReferenceType) -> Movement {
        Movement {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            movement_type: MovementType::from_delta(qty),
            quantity: qty,
            unit_cost_cents: None,
            reference_type: reference,
            reference_id: Some("ref-1".to_string()),
            user_id: "tester".to_string(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_filters_and_order() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let coke = fixtures::product(&db, "COKE", 1_850).await;
        let chips = fixtures::product(&db, "CHIPS", 1_500).await;

        let mut tx = db.begin().await.unwrap();
        for m in [
            movement(&coke.id, &branch.id, 10, ReferenceType::Adjustment),
            movement(&coke.id, &branch.id, -2, ReferenceType::PosSale),
            movement(&chips.id, &branch.id, 4, ReferenceType::Adjustment),
        ] {
            MovementRepository::insert(&mut tx, &m).await.unwrap();
        }
        tx.commit().await.unwrap();

        let coke_moves = db
            .movements()
            .list(&MovementFilter::for_key(&coke.id, &branch.id))
            .await
            .unwrap();
        assert_eq!(coke_moves.len(), 2);
        // newest first
        assert_eq!(coke_moves[0].quantity, -2);
        assert_eq!(coke_moves[0].movement_type, MovementType::Out);

        let adjustments = db
            .movements()
            .list(&MovementFilter {
                reference_type: Some(ReferenceType::Adjustment),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(adjustments.len(), 2);

        let limited = db
            .movements()
            .list(&MovementFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_log_is_append_only() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let coke = fixtures::product(&db, "COKE", 1_850).await;

        let mut tx = db.begin().await.unwrap();
        MovementRepository::insert(&mut tx, &movement(&coke.id, &branch.id, 1, ReferenceType::Adjustment))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let update = sqlx::query("UPDATE stock_movements SET quantity = 100")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(update, Err(DbError::ConstraintViolation { .. })));

        let delete = sqlx::query("DELETE FROM stock_movements")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(delete, Err(DbError::ConstraintViolation { .. })));
    }

    #[tokio::test]
    async fn test_sign_must_match_type() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let coke = fixtures::product(&db, "COKE", 1_850).await;

        let mut bad = movement(&coke.id, &branch.id, 3, ReferenceType::Adjustment);
        bad.movement_type = MovementType::Out;

        let mut tx = db.begin().await.unwrap();
        let err = MovementRepository::insert(&mut tx, &bad).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
    }
}
