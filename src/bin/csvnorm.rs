use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use csv_normalizer::database_ops::schema::SCHEMAS;
use csv_normalizer::database_ops::DedupMode;
use csv_normalizer::normalization::CollisionPolicy;
use csv_normalizer::pipelines::{orders, transactions};
use csv_normalizer::util::env;
use csv_normalizer::{logging, LoadConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "csvnorm", version, about = "Normalize CSV exports into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v, -vv). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Load job/postal_object/product, then customer and transaction with resolved keys
    Transactions(RunArgs),
    /// Load customer/orders/order_items and promote deduplicated products
    Orders(RunArgs),
    /// Print the table catalogue of both schemas
    Tables,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Override the database URL (defaults to DATABASE_URL / DB_* env)
    #[arg(long)]
    db_url: Option<String>,
    /// Directory holding <table>.csv files (defaults to DATA_DIR or ./data_to_insert)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// What to do when two dimension rows share a composite key
    #[arg(long, value_enum)]
    key_collision: Option<CollisionPolicy>,
    /// Where duplicate products are ranked
    #[arg(long, value_enum)]
    dedup: Option<DedupMode>,
    /// Cap rows per INSERT statement
    #[arg(long)]
    chunk_rows: Option<usize>,
    /// Create the schema and commit without loading any rows
    #[arg(long)]
    schema_only: bool,
}

impl RunArgs {
    fn into_config(self) -> Result<LoadConfig> {
        let mut cfg = LoadConfig::resolve(self.db_url)?;
        if let Some(dir) = self.data_dir {
            cfg.data_dir = dir;
        }
        if let Some(policy) = self.key_collision {
            cfg.key_collision = policy;
        }
        if let Some(mode) = self.dedup {
            cfg.dedup = mode;
        }
        if self.chunk_rows.is_some() {
            cfg.insert_chunk_rows = self.chunk_rows;
        }
        cfg.schema_only |= self.schema_only;
        Ok(cfg)
    }
}

fn print_tables() {
    for schema in SCHEMAS {
        println!("schema {}", schema.name);
        for table in schema.tables {
            println!("  {}", table.name);
            for column in table.columns {
                println!("    - {:28} {}", column.name, column.ty);
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(logging::filter_for_verbosity(cli.verbose))?;
    env::bootstrap_cli("csvnorm");

    let summary = match cli.command {
        Commands::Tables => {
            print_tables();
            return Ok(());
        }
        Commands::Transactions(args) => {
            let cfg = args.into_config()?;
            transactions::run(&cfg).await?
        }
        Commands::Orders(args) => {
            let cfg = args.into_config()?;
            orders::run(&cfg).await?
        }
    };

    info!(
        pipeline = summary.pipeline,
        tables = summary.tables.len(),
        rows = summary.total_rows(),
        "done"
    );
    Ok(())
}
