//! Database configuration module.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs without hand-written SQL.

use crate::entities::{Account, BankAccount, FundingSchedule, Link, Spending, Transaction};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

/// Establishes a connection to the database at `url`.
pub async fn create_connection(url: &str) -> Result<DatabaseConnection> {
    let db = Database::connect(url).await?;
    info!(backend = ?db.get_database_backend(), "Connected to database");
    Ok(db)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates every table that does not exist yet.
///
/// Tables are created parents first so foreign keys always have a target.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Account).await?;
    create_table(db, &schema, Link).await?;
    create_table(db, &schema, BankAccount).await?;
    create_table(db, &schema, FundingSchedule).await?;
    create_table(db, &schema, Spending).await?;
    create_table(db, &schema, Transaction).await?;

    Ok(())
}
