//! Read-only stock views: per-branch levels and low-stock alerts.

use stockbook_core::validation::validate_required;
use stockbook_core::{AlertLevel, LedgerError, LedgerResult, LowStockAlert, StockLevel, StockStatus};
use stockbook_db::{BranchRepository, Database};

#[derive(Debug, Clone)]
pub struct Reports {
    db: Database,
}

impl Reports {
    pub fn new(db: Database) -> Self {
        Reports { db }
    }

    /// Active products at or below their reorder point, lowest first.
    ///
    /// `branch_id = None` covers every branch.
    pub async fn low_stock_alerts(&self, branch_id: Option<&str>) -> LedgerResult<Vec<LowStockAlert>> {
        let rows = self.db.balances().stock_rows(branch_id).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let available = row.available();
                let level = AlertLevel::classify(available, row.min_stock, row.reorder_point)?;
                Some(LowStockAlert {
                    product_id: row.product_id,
                    sku: row.sku,
                    name: row.name,
                    branch_id: row.branch_id,
                    branch_name: row.branch_name,
                    available,
                    min_stock: row.min_stock,
                    reorder_point: row.reorder_point,
                    level,
                })
            })
            .collect())
    }

    /// Every stocked active product at a branch, by SKU.
    pub async fn stock_levels(&self, branch_id: &str) -> LedgerResult<Vec<StockLevel>> {
        validate_required("branch_id", branch_id)?;
        if BranchRepository::fetch(self.db.pool(), branch_id).await?.is_none() {
            return Err(LedgerError::BranchNotFound(branch_id.to_string()));
        }

        let mut levels: Vec<StockLevel> = self
            .db
            .balances()
            .stock_rows(Some(branch_id))
            .await?
            .into_iter()
            .map(|row| {
                let available = row.available();
                StockLevel {
                    status: StockStatus::classify(available, row.min_stock, row.reorder_point),
                    product_id: row.product_id,
                    sku: row.sku,
                    name: row.name,
                    branch_id: row.branch_id,
                    quantity: row.quantity,
                    reserved: row.reserved,
                    available,
                    min_stock: row.min_stock,
                    reorder_point: row.reorder_point,
                }
            })
            .collect();
        levels.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(levels)
    }
}
