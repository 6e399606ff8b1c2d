use anyhow::Result;
use csv_normalizer::util::env;
use csv_normalizer::{logging, pipelines::orders, LoadConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init_tracing(logging::DEFAULT_FILTER)?;
    env::bootstrap_cli("load_orders");
    let cfg = LoadConfig::from_env()?;
    orders::run(&cfg).await?;
    Ok(())
}
