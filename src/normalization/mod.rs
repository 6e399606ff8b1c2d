//! In-memory side of the load: values, datasets, composite keys, key
//! remapping and deduplication. Nothing here touches the database.
pub mod dataset;
pub mod dedup;
pub mod keys;
pub mod remap;
pub mod value;

pub use dataset::Dataset;
pub use dedup::{dedup_by_highest, keep_max_by};
pub use keys::{CollisionPolicy, CompositeKey, KeyError, KeyMap};
pub use remap::{remap, RemapPlan};
pub use value::{SqlType, Value};
