//! Seed data script - populates the database with a demo floor and menu
//!
//! Run with: cargo run --bin seed-data -- --tables 8
//!
//! This creates:
//! - numbered dining tables (T1, T2, ...)
//! - a small menu, some dishes with tracked stock
//! - optionally a staff token for trying the staff endpoints

use chrono::{Duration, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tracing::info;
use uuid::Uuid;

use table_order_api::{
    auth::{issue_staff_token, StaffRole},
    config, db,
    entities::{dining_table, menu_item},
    models::TableStatus,
};

#[derive(Parser)]
#[command(name = "seed-data", about = "Populate a table-order database with demo data", version)]
struct Cli {
    #[arg(long, default_value_t = 8, help = "Number of dining tables to create")]
    tables: u32,

    #[arg(long, help = "Also print a staff token with this role (staff, admin, kitchen, cashier)")]
    staff_role: Option<StaffRole>,

    #[arg(long, default_value_t = 12, help = "Lifetime of the printed staff token in hours")]
    token_hours: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!("=== Table Order Seed Data ===");

    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&pool).await?;

    info!("Creating tables...");
    let created_tables = create_tables(&pool, cli.tables).await?;
    info!("  Created {} tables", created_tables);

    info!("Creating menu...");
    let created_items = create_menu(&pool).await?;
    info!("  Created {} menu items", created_items);

    if let Some(role) = cli.staff_role {
        let token = issue_staff_token(
            &cfg.jwt_secret,
            &format!("seed-{}", role),
            Some("Seed Staff".to_string()),
            role,
            Duration::hours(cli.token_hours),
        )?;
        println!("{}", token);
    }

    info!("=== Seed Data Complete ===");
    info!("Try: curl -X POST http://localhost:8080/api/v1/sessions -H 'content-type: application/json' -d '{{\"table_number\":\"T1\"}}'");

    Ok(())
}

/// Creates T1..Tn, skipping numbers that already exist.
async fn create_tables(pool: &db::DbPool, count: u32) -> anyhow::Result<usize> {
    let now = Utc::now();
    let mut created = 0;

    for n in 1..=count {
        let table_number = format!("T{}", n);
        let exists = dining_table::Entity::find()
            .filter(dining_table::Column::TableNumber.eq(table_number.as_str()))
            .one(pool)
            .await?
            .is_some();
        if exists {
            continue;
        }

        dining_table::ActiveModel {
            id: Set(Uuid::new_v4()),
            table_number: Set(table_number.clone()),
            qr_code: Set(Some(format!("table-order://tables/{}", table_number))),
            capacity: Set(if n % 3 == 0 { 6 } else { 4 }),
            status: Set(TableStatus::Available),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(pool)
        .await?;
        created += 1;
    }

    Ok(created)
}

async fn create_menu(pool: &db::DbPool) -> anyhow::Result<usize> {
    // (name, price, preparation minutes, tracked stock)
    let dishes: Vec<(&str, Decimal, i32, Option<i32>)> = vec![
        ("Tom Yum Soup", dec!(50000), 15, Some(30)),
        ("Nasi Goreng Spesial", dec!(45000), 12, None),
        ("Sate Ayam", dec!(38000), 15, Some(40)),
        ("Gado-Gado", dec!(32000), 10, None),
        ("Rendang Sapi", dec!(65000), 5, Some(20)),
        ("Es Teh Manis", dec!(8000), 2, None),
        ("Es Jeruk", dec!(12000), 3, None),
        ("Pisang Goreng", dec!(18000), 8, Some(25)),
    ];

    let now = Utc::now();
    let mut created = 0;

    for (name, price, preparation_time, stock_quantity) in dishes {
        let exists = menu_item::Entity::find()
            .filter(menu_item::Column::Name.eq(name))
            .one(pool)
            .await?
            .is_some();
        if exists {
            continue;
        }

        menu_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            category_id: Set(None),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            is_available: Set(true),
            preparation_time: Set(Some(preparation_time)),
            stock_quantity: Set(stock_quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(pool)
        .await?;
        created += 1;
    }

    Ok(created)
}
