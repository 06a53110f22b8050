//! # Seed Data Generator
//!
//! Populates a ledger database with branches, products and opening stock
//! for development. Stock goes in through the ledger, so every seeded
//! balance has the ADJUSTMENT movements that explain it.
//!
//! ## Usage
//! ```bash
//! # Three branches, every catalog product, 40 units each
//! cargo run -p stockbook-engine --bin seed
//!
//! # Custom opening stock and database
//! cargo run -p stockbook-engine --bin seed -- --stock 100 --db ./data/stockbook.db
//! ```
//!
//! Configuration not given on the command line comes from the
//! `STOCKBOOK_*` environment variables (see `LedgerConfig`).

use std::env;
use std::path::PathBuf;

use chrono::Utc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use stockbook_core::{Adjustment, Branch, Product};
use stockbook_engine::{LedgerConfig, LedgerEngine};

/// Branch codes and display names.
const BRANCHES: &[(&str, &str)] = &[
    ("CENTRO", "Sucursal Centro"),
    ("NORTE", "Sucursal Norte"),
    ("SUR", "Sucursal Sur"),
];

/// (category code, product names, base price in cents)
const CATALOG: &[(&str, &[&str], i64)] = &[
    (
        "BEV",
        &[
            "Coca-Cola 600ml",
            "Sprite 600ml",
            "Agua Natural 1L",
            "Jugo de Naranja 1L",
            "Te Helado 500ml",
        ],
        1_850,
    ),
    (
        "SNK",
        &[
            "Papas Clasicas",
            "Cacahuates Japoneses",
            "Galletas de Avena",
            "Chocolate con Leche",
        ],
        2_200,
    ),
    (
        "DRY",
        &["Leche Entera 1L", "Queso Fresco", "Yogurt Natural", "Mantequilla"],
        3_100,
    ),
    (
        "GRO",
        &[
            "Arroz 1kg",
            "Frijol Negro 1kg",
            "Aceite Vegetal 1L",
            "Azucar 1kg",
            "Pasta Spaghetti",
        ],
        2_700,
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config = LedgerConfig::load()?;
    let mut stock: i64 = 40;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    stock = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockbook Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --stock <N>    Opening units per product and branch (default: 40)");
                println!("  -d, --db <PATH>    Database file path (default: $STOCKBOOK_DATABASE_PATH)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Stockbook Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database_path.display());
    println!("Opening stock: {} units", stock);
    println!();

    let engine = LedgerEngine::connect(config).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = engine.database().branches().list().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} branches", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    let mut branches = Vec::with_capacity(BRANCHES.len());
    for (code, name) in BRANCHES {
        let branch = Branch {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        engine.database().branches().insert(&branch).await?;
        branches.push(branch);
    }
    println!("✓ Created {} branches", branches.len());

    let mut products = Vec::new();
    for (category, names, base_price) in CATALOG {
        for (index, name) in names.iter().enumerate() {
            let product = generate_product(category, name, *base_price, index);
            engine.database().products().insert(&product).await?;
            products.push(product);
        }
    }
    println!("✓ Created {} products", products.len());

    let mut movements = 0;
    if stock > 0 {
        for branch in &branches {
            for product in &products {
                engine
                    .ledger()
                    .adjust_inventory(Adjustment {
                        product_id: product.id.clone(),
                        branch_id: branch.id.clone(),
                        delta: stock,
                        unit_cost_cents: product.cost_cents,
                        notes: Some("Opening stock".to_string()),
                        actor_id: "seed".to_string(),
                    })
                    .await?;
                movements += 1;
            }
        }
    }
    println!("✓ Recorded {} opening stock movements", movements);

    let drifted = engine
        .ledger()
        .reconcile_all()
        .await?
        .into_iter()
        .filter(|r| !r.is_consistent())
        .count();
    println!();
    println!("Reconciliation: {} keys out of balance", drifted);

    println!();
    println!("✓ Seed complete in {:?}", start.elapsed());

    Ok(())
}

/// `RUST_LOG` wins; otherwise info for stockbook, warn for sqlx.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockbook=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// A catalog product with a deterministic SKU, price and cost.
fn generate_product(category: &str, name: &str, base_price: i64, index: usize) -> Product {
    let now = Utc::now();

    let sku = format!("{}-{:03}", category, index + 1);

    // Spread prices a little within the category.
    let price_cents = base_price + (index as i64 * 350);

    // Cost at 60-75% of price
    let cost_pct = 60 + (index as i64 * 5) % 16;
    let cost_cents = Some(price_cents * cost_pct / 100);

    Product {
        id: Uuid::new_v4().to_string(),
        sku,
        name: name.to_string(),
        price_cents,
        cost_cents,
        min_stock: 5,
        reorder_point: 15,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
