//! Orders load: denormalized `customer`, `orders` and `order_items` go in
//! as-is; `product` arrives with duplicate ids and is promoted from a
//! staging table keeping the highest list price per product.
use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use super::{read_table_csv, RunSummary};
use crate::config::LoadConfig;
use crate::database_ops::{bulk_insert, promote, DedupPlan, LoadSession, RunStage, ORDERS};
use crate::util::db::Db;

pub const PIPELINE: &str = "orders";

/// CSV file name, target table, default delimiter.
type Source = (&'static str, &'static str, u8);

const DIMENSIONS: [Source; 2] = [("customer", "customer", b';'), ("product", "product_temp", b',')];
const DEPENDENTS: [Source; 2] = [("orders", "orders", b','), ("order_items", "order_items", b',')];

fn input_files() -> Vec<&'static str> {
    DIMENSIONS
        .iter()
        .chain(DEPENDENTS.iter())
        .map(|(file, _, _)| *file)
        .collect()
}

pub fn product_plan() -> Result<DedupPlan> {
    Ok(DedupPlan {
        staging: ORDERS.table("product_temp")?,
        target: ORDERS.table("product")?,
        key_column: "product_id",
        rank_column: "list_price",
    })
}

#[instrument(skip(cfg), fields(dedup = ?cfg.dedup))]
pub async fn run(cfg: &LoadConfig) -> Result<RunSummary> {
    cfg.preflight(PIPELINE, &input_files())?;
    let db = Db::connect(&cfg.database_url).await?;
    let outcome = load(&db, cfg).await;
    db.close().await;
    outcome
}

async fn load(db: &Db, cfg: &LoadConfig) -> Result<RunSummary> {
    let mut summary = RunSummary::new(PIPELINE);
    let mut session = LoadSession::begin(db, PIPELINE).await?;
    let chunk = cfg.insert_chunk_rows;

    ORDERS
        .create(session.conn())
        .await
        .context("create orders schema")?;
    session.advance(RunStage::SchemaCreated)?;
    if cfg.schema_only {
        // deferred foreign keys stay off: a later full load fills order_items before product
        session.commit_schema_only().await?;
        info!("orders schema committed; no rows loaded");
        return Ok(summary);
    }

    for (file, table, delimiter) in DIMENSIONS {
        let def = ORDERS.table(table)?;
        let ds = read_table_csv(cfg, file, delimiter)?;
        let written = bulk_insert(session.conn(), def, &ds, chunk).await?;
        summary.record(def.name, written);
    }
    session.advance(RunStage::DimensionsLoaded)?;

    // natural ids are loaded verbatim here; there is nothing to resolve
    debug!("orders schema carries no composite keys");
    session.advance(RunStage::KeysResolved)?;
    session.advance(RunStage::DependentsRemapped)?;

    for (file, table, delimiter) in DEPENDENTS {
        let def = ORDERS.table(table)?;
        let ds = read_table_csv(cfg, file, delimiter)?;
        let written = bulk_insert(session.conn(), def, &ds, chunk).await?;
        summary.record(def.name, written);
    }
    session.advance(RunStage::DependentsLoaded)?;

    let plan = product_plan()?;
    let promoted = promote(session.conn(), &plan, cfg.dedup, chunk).await?;
    summary.record(plan.target.name, promoted);
    ORDERS
        .add_deferred_foreign_keys(session.conn())
        .await
        .context("add post-promotion foreign keys")?;
    session.advance(RunStage::Deduplicated)?;

    session.commit().await?;
    info!(total = summary.total_rows(), "orders load committed");
    summary.log();
    Ok(summary)
}
