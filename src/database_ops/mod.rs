pub mod loader;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod staging;

pub use loader::{bulk_insert, LoadError, PreparedBatch};
pub use resolver::{resolve_key_map, KeySource};
pub use schema::{SchemaDef, TableDef, ORDERS, TRANSACTIONS};
pub use session::{LoadSession, RunStage, StageError};
pub use staging::{promote, DedupMode, DedupPlan};
