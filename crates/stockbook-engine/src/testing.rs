//! Engine fixtures shared by the unit tests.

use chrono::Utc;
use uuid::Uuid;

use stockbook_core::{
    Adjustment, Branch, NewSale, PaymentMethod, Product, SaleLine, SaleWithItems,
};
use stockbook_db::Database;

use crate::{DocumentNumbers, LedgerConfig, LedgerEngine};

/// An in-memory engine with two branches and two products.
///
/// COKE sells at 25.00, CHIPS at 75.00; both have min stock 2 and reorder
/// point 5.
pub struct Fixture {
    pub engine: LedgerEngine,
    pub centro: Branch,
    pub norte: Branch,
    pub coke: Product,
    pub chips: Product,
}

pub async fn fixture() -> Fixture {
    build(LedgerConfig::in_memory(), DocumentNumbers::default()).await
}

pub async fn fixture_with(config: LedgerConfig) -> Fixture {
    build(config, DocumentNumbers::default()).await
}

pub async fn fixture_with_numbers(numbers: DocumentNumbers) -> Fixture {
    build(LedgerConfig::in_memory(), numbers).await
}

async fn build(config: LedgerConfig, numbers: DocumentNumbers) -> Fixture {
    let db = Database::new(config.db_config()).await.unwrap();
    let engine = LedgerEngine::with_numbers(db, &config, numbers);

    let centro = branch(&engine, "CENTRO").await;
    let norte = branch(&engine, "NORTE").await;
    let coke = product(&engine, "COKE", 2_500).await;
    let chips = product(&engine, "CHIPS", 7_500).await;

    Fixture {
        engine,
        centro,
        norte,
        coke,
        chips,
    }
}

pub async fn branch(engine: &LedgerEngine, code: &str) -> Branch {
    let branch = Branch {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
        name: format!("Sucursal {code}"),
        is_active: true,
        created_at: Utc::now(),
    };
    engine.database().branches().insert(&branch).await.unwrap();
    branch
}

pub async fn product(engine: &LedgerEngine, sku: &str, price_cents: i64) -> Product {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        sku: sku.to_string(),
        name: format!("Product {sku}"),
        price_cents,
        cost_cents: None,
        min_stock: 2,
        reorder_point: 5,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    engine.database().products().insert(&product).await.unwrap();
    product
}

/// Receives `qty` units through an adjustment.
pub async fn stock(engine: &LedgerEngine, product_id: &str, branch_id: &str, qty: i64) {
    engine
        .ledger()
        .adjust_inventory(Adjustment {
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            delta: qty,
            unit_cost_cents: None,
            notes: Some("test stock".to_string()),
            actor_id: "admin".to_string(),
        })
        .await
        .unwrap();
}

pub async fn cash_sale(
    engine: &LedgerEngine,
    register_id: &str,
    product_id: &str,
    qty: i64,
) -> SaleWithItems {
    engine
        .sales()
        .create_sale(NewSale {
            register_id: register_id.to_string(),
            items: vec![SaleLine::new(product_id, qty)],
            payment_method: PaymentMethod::Cash,
            discount_cents: 0,
            actor_id: "cashier".to_string(),
        })
        .await
        .unwrap()
}
