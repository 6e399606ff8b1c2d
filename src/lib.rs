pub mod config;
pub mod database_ops;
pub mod logging;
pub mod normalization;
pub mod pipelines;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use config::LoadConfig;
pub use pipelines::RunSummary;
