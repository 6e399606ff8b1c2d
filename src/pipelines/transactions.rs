//! Star-ish load: `job`, `postal_object` and `product` get surrogate ids,
//! `customer` and `transaction` reference them through resolved keys.
use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::{read_table_csv, RunSummary};
use crate::config::LoadConfig;
use crate::database_ops::{
    bulk_insert, resolve_key_map, KeySource, LoadSession, RunStage, TRANSACTIONS,
};
use crate::normalization::{remap, RemapPlan};
use crate::util::db::Db;

pub const PIPELINE: &str = "transactions";

const DIMENSIONS: [&str; 3] = ["job", "postal_object", "product"];
const INPUT_FILES: [&str; 5] = ["job", "postal_object", "product", "customer", "transaction"];

pub const JOB_KEY: KeySource<'static> = KeySource {
    table: "job",
    id_column: "id",
    columns: &["job_title", "job_industry_category", "wealth_segment"],
};

pub const POSTAL_OBJECT_KEY: KeySource<'static> = KeySource {
    table: "postal_object",
    id_column: "id",
    columns: &["postcode", "state"],
};

pub const PRODUCT_KEY: KeySource<'static> = KeySource {
    table: "product",
    id_column: "id",
    columns: &[
        "product_number",
        "brand",
        "product_line",
        "product_class",
        "product_size",
    ],
};

pub const CUSTOMER_JOB: RemapPlan<'static> = RemapPlan {
    natural_columns: &["job_title", "job_industry_category", "wealth_segment"],
    target_column: "job_id",
    drop_columns: &[],
};

pub const CUSTOMER_POSTAL_OBJECT: RemapPlan<'static> = RemapPlan {
    natural_columns: &["postcode", "state"],
    target_column: "postal_object_id",
    drop_columns: &[],
};

/// In `transaction.csv`, `product_id` holds the external product number.
pub const TRANSACTION_PRODUCT: RemapPlan<'static> = RemapPlan {
    natural_columns: &[
        "product_id",
        "brand",
        "product_line",
        "product_class",
        "product_size",
    ],
    target_column: "product_id",
    drop_columns: &[],
};

#[instrument(skip(cfg))]
pub async fn run(cfg: &LoadConfig) -> Result<RunSummary> {
    cfg.preflight(PIPELINE, &INPUT_FILES)?;
    let db = Db::connect(&cfg.database_url).await?;
    let outcome = load(&db, cfg).await;
    db.close().await;
    outcome
}

async fn load(db: &Db, cfg: &LoadConfig) -> Result<RunSummary> {
    let mut summary = RunSummary::new(PIPELINE);
    let mut session = LoadSession::begin(db, PIPELINE).await?;
    let chunk = cfg.insert_chunk_rows;

    TRANSACTIONS
        .create(session.conn())
        .await
        .context("create transactions schema")?;
    session.advance(RunStage::SchemaCreated)?;
    if cfg.schema_only {
        session.commit_schema_only().await?;
        info!("transactions schema committed; no rows loaded");
        return Ok(summary);
    }

    for table in DIMENSIONS {
        let def = TRANSACTIONS.table(table)?;
        let ds = read_table_csv(cfg, table, b',')?;
        let written = bulk_insert(session.conn(), def, &ds, chunk).await?;
        summary.record(def.name, written);
    }
    session.advance(RunStage::DimensionsLoaded)?;

    let policy = cfg.key_collision;
    let job_keys = resolve_key_map(session.conn(), TRANSACTIONS.table("job")?, &JOB_KEY, policy).await?;
    let postal_keys = resolve_key_map(
        session.conn(),
        TRANSACTIONS.table("postal_object")?,
        &POSTAL_OBJECT_KEY,
        policy,
    )
    .await?;
    let product_keys =
        resolve_key_map(session.conn(), TRANSACTIONS.table("product")?, &PRODUCT_KEY, policy).await?;
    session.advance(RunStage::KeysResolved)?;

    let customers = read_table_csv(cfg, "customer", b',')?;
    let customers = remap(&customers, &job_keys, &CUSTOMER_JOB).context("customer -> job")?;
    let customers = remap(&customers, &postal_keys, &CUSTOMER_POSTAL_OBJECT)
        .context("customer -> postal_object")?;

    let transactions = read_table_csv(cfg, "transaction", b',')?;
    let transactions = remap(&transactions, &product_keys, &TRANSACTION_PRODUCT)
        .context("transaction -> product")?;
    // key maps are process-scoped and not needed past remapping
    drop((job_keys, postal_keys, product_keys));
    session.advance(RunStage::DependentsRemapped)?;

    let customer_table = TRANSACTIONS.table("customer")?;
    let written = bulk_insert(session.conn(), customer_table, &customers, chunk).await?;
    summary.record(customer_table.name, written);

    let transaction_table = TRANSACTIONS.table("transaction")?;
    let written = bulk_insert(session.conn(), transaction_table, &transactions, chunk).await?;
    summary.record(transaction_table.name, written);
    session.advance(RunStage::DependentsLoaded)?;

    session.commit().await?;
    info!(total = summary.total_rows(), "transactions load committed");
    summary.log();
    Ok(summary)
}
