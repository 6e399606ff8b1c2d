//! Composite natural keys and the per-dimension key map built from them.
//!
//! A [`CompositeKey`] is an ordered tuple of nullable text components. Two
//! keys are equal only when every component is equal, so `("a_b", None)`
//! and `("a", "b")` stay distinct even though their display tokens look
//! alike.
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use thiserror::Error;
use tracing::warn;

use super::value::{SqlType, Value};

/// Placeholder printed for a missing component in a key token.
pub const MISSING_COMPONENT: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey(Vec<Option<String>>);

impl CompositeKey {
    /// Empty strings are folded into `None`.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self(
            parts
                .into_iter()
                .map(|p| p.map(Into::into).filter(|s: &String| !s.is_empty()))
                .collect(),
        )
    }

    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        Self(values.into_iter().map(|v| v.borrow().key_text()).collect())
    }

    /// Human-readable token: components joined by `_`, missing ones printed
    /// as `_`.
    pub fn token(&self) -> String {
        self.0
            .iter()
            .map(|p| p.as_deref().unwrap_or(MISSING_COMPONENT))
            .join("_")
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// What to do when two dimension rows share a composite key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CollisionPolicy {
    /// The row read later replaces the earlier mapping.
    #[default]
    LastWriteWins,
    /// Duplicate keys abort the run.
    Fail,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("{table}: no surrogate id for key {key} (row {row})")]
    KeyNotFound {
        table: String,
        key: String,
        row: usize,
    },
    #[error("{table}: key {key} maps to both id {first} and id {second}")]
    DuplicateKey {
        table: String,
        key: String,
        first: i64,
        second: i64,
    },
    #[error("column {column} not present in dataset")]
    MissingColumn { column: String },
}

/// Composite key -> surrogate id for one dimension table.
#[derive(Debug, Clone)]
pub struct KeyMap {
    table: String,
    columns: Vec<String>,
    /// Column types of the dimension's key, one per component. Empty means
    /// components are compared as plain text.
    key_types: Vec<SqlType>,
    ids: HashMap<CompositeKey, i64>,
    collisions: usize,
}

impl KeyMap {
    pub fn new<S: Into<String>>(table: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            key_types: Vec::new(),
            ids: HashMap::new(),
            collisions: 0,
        }
    }

    pub fn from_rows<S, I>(
        table: &str,
        columns: &[S],
        rows: I,
        policy: CollisionPolicy,
    ) -> Result<Self, KeyError>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = (i64, CompositeKey)>,
    {
        let mut map = KeyMap::new(table, columns.iter().map(|c| c.as_ref().to_string()));
        for (id, key) in rows {
            map.insert(key, id, policy)?;
        }
        Ok(map)
    }

    pub fn with_key_types(mut self, types: Vec<SqlType>) -> Self {
        self.key_types = types;
        self
    }

    pub fn insert(
        &mut self,
        key: CompositeKey,
        id: i64,
        policy: CollisionPolicy,
    ) -> Result<(), KeyError> {
        match self.ids.get(&key).copied() {
            Some(first) if first != id => match policy {
                CollisionPolicy::Fail => {
                    return Err(KeyError::DuplicateKey {
                        table: self.table.clone(),
                        key: key.token(),
                        first,
                        second: id,
                    })
                }
                CollisionPolicy::LastWriteWins => {
                    self.collisions += 1;
                    warn!(
                        table = %self.table,
                        key = %key,
                        replaced = first,
                        id,
                        "duplicate composite key; keeping later row"
                    );
                }
            },
            _ => {}
        }
        self.ids.insert(key, id);
        Ok(())
    }

    pub fn get(&self, key: &CompositeKey) -> Option<i64> {
        self.ids.get(key).copied()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn key_types(&self) -> &[SqlType] {
        &self.key_types
    }

    /// Key for a dependent row: each cell is first coerced to the type the
    /// dimension stored, so `0800` and ` 800` both meet an integer `800`.
    /// Cells that do not coerce keep their raw text and simply miss.
    pub fn key_for<'a, I>(&self, cells: I) -> CompositeKey
    where
        I: IntoIterator<Item = &'a Value>,
    {
        CompositeKey::from_values(cells.into_iter().enumerate().map(|(pos, cell)| {
            self.key_types
                .get(pos)
                .and_then(|ty| cell.coerce(*ty))
                .unwrap_or_else(|| cell.clone())
        }))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of keys that were overwritten under `LastWriteWins`.
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[Option<&str>]) -> CompositeKey {
        CompositeKey::new(parts.iter().copied())
    }

    #[test]
    fn token_uses_placeholder_for_missing_components() {
        let k = key(&[None, Some("Health"), Some("Mass Customer")]);
        assert_eq!(k.token(), "__Health_Mass Customer");
        assert_eq!(key(&[Some(""), Some("x")]), key(&[None, Some("x")]));
    }

    #[test]
    fn tuple_keys_do_not_collide_like_tokens() {
        let a = key(&[Some("a_b"), None]);
        let b = key(&[Some("a"), Some("b")]);
        assert_ne!(a, b);

        let rows = vec![(1, a.clone()), (2, b.clone())];
        let map = KeyMap::from_rows("job", &["x", "y"], rows, CollisionPolicy::Fail).unwrap();
        assert_eq!(map.get(&a), Some(1));
        assert_eq!(map.get(&b), Some(2));
    }

    #[test]
    fn every_row_maps_to_its_own_id() {
        let rows = vec![
            (1, key(&[Some("2000"), Some("NSW")])),
            (2, key(&[Some("3000"), Some("VIC")])),
            (3, key(&[Some("4000"), Some("QLD")])),
        ];
        let map = KeyMap::from_rows(
            "postal_object",
            &["postcode", "state"],
            rows.clone(),
            CollisionPolicy::LastWriteWins,
        )
        .unwrap();
        assert_eq!(map.len(), 3);
        for (id, k) in rows {
            assert_eq!(map.get(&k), Some(id));
        }
        assert_eq!(map.columns(), ["postcode", "state"]);
    }

    #[test]
    fn later_row_wins_on_duplicate_key() {
        let dup = key(&[Some("2000"), Some("NSW")]);
        let rows = vec![(1, dup.clone()), (9, dup.clone())];
        let map = KeyMap::from_rows(
            "postal_object",
            &["postcode", "state"],
            rows,
            CollisionPolicy::LastWriteWins,
        )
        .unwrap();
        assert_eq!(map.get(&dup), Some(9));
        assert_eq!(map.collisions(), 1);
    }

    #[test]
    fn typed_components_normalize_dependent_spelling() {
        let map = KeyMap::from_rows(
            "postal_object",
            &["postcode", "state"],
            vec![(4, key(&[Some("800"), Some("NT")]))],
            CollisionPolicy::Fail,
        )
        .unwrap()
        .with_key_types(vec![SqlType::Integer, SqlType::Text]);

        for raw in ["800", "0800", " 800", "800.0"] {
            let cells = [Value::text(raw), Value::text("NT")];
            assert_eq!(map.get(&map.key_for(&cells)), Some(4), "{raw:?}");
        }
        let unparsable = [Value::text("N/A"), Value::text("NT")];
        assert_eq!(map.key_for(&unparsable).token(), "N/A_NT");
        assert_eq!(map.get(&map.key_for(&unparsable)), None);
    }

    #[test]
    fn untyped_map_compares_raw_text() {
        let map = KeyMap::from_rows(
            "postal_object",
            &["postcode", "state"],
            vec![(4, key(&[Some("800"), Some("NT")]))],
            CollisionPolicy::Fail,
        )
        .unwrap();
        let cells = [Value::text("0800"), Value::text("NT")];
        assert_eq!(map.get(&map.key_for(&cells)), None);
    }

    #[test]
    fn fail_policy_rejects_duplicate_key() {
        let dup = key(&[Some("2000"), Some("NSW")]);
        let rows = vec![(1, dup.clone()), (9, dup)];
        let err = KeyMap::from_rows(
            "postal_object",
            &["postcode", "state"],
            rows,
            CollisionPolicy::Fail,
        )
        .unwrap_err();
        match err {
            KeyError::DuplicateKey {
                first, second, key, ..
            } => {
                assert_eq!((first, second), (1, 9));
                assert_eq!(key, "2000_NSW");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
