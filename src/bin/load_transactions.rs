use anyhow::Result;
use csv_normalizer::util::env;
use csv_normalizer::{logging, pipelines::transactions, LoadConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init_tracing(logging::DEFAULT_FILTER)?;
    env::bootstrap_cli("load_transactions");
    let cfg = LoadConfig::from_env()?;
    transactions::run(&cfg).await?;
    Ok(())
}
