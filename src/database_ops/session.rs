//! The run transaction and the stage machine that guards it.
use anyhow::{Context, Result};
use sqlx::{PgConnection, Postgres, Transaction};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::util::db::Db;

/// Stages of one load run. `Deduplicated` is the only optional stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunStage {
    Uninitialized,
    SchemaCreated,
    DimensionsLoaded,
    KeysResolved,
    DependentsRemapped,
    DependentsLoaded,
    Deduplicated,
    Committed,
}

impl RunStage {
    pub fn can_advance_to(self, next: RunStage) -> bool {
        use RunStage::*;
        matches!(
            (self, next),
            (Uninitialized, SchemaCreated)
                | (SchemaCreated, DimensionsLoaded)
                | (DimensionsLoaded, KeysResolved)
                | (KeysResolved, DependentsRemapped)
                | (DependentsRemapped, DependentsLoaded)
                | (DependentsLoaded, Deduplicated)
                | (DependentsLoaded, Committed)
                | (Deduplicated, Committed)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStage::Uninitialized => "uninitialized",
            RunStage::SchemaCreated => "schema_created",
            RunStage::DimensionsLoaded => "dimensions_loaded",
            RunStage::KeysResolved => "keys_resolved",
            RunStage::DependentsRemapped => "dependents_remapped",
            RunStage::DependentsLoaded => "dependents_loaded",
            RunStage::Deduplicated => "deduplicated",
            RunStage::Committed => "committed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal stage transition {from} -> {to}")]
pub struct StageError {
    pub from: RunStage,
    pub to: RunStage,
}

/// Current stage plus the transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTracker {
    stage: RunStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            stage: RunStage::Uninitialized,
        }
    }
}

impl StageTracker {
    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn advance(&mut self, to: RunStage) -> Result<(), StageError> {
        if !self.stage.can_advance_to(to) {
            return Err(StageError {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        Ok(())
    }

    /// A schema-only run ends straight after the DDL. No other stage may
    /// shortcut to `Committed`.
    pub fn close_schema_only(&mut self) -> Result<(), StageError> {
        if self.stage != RunStage::SchemaCreated {
            return Err(StageError {
                from: self.stage,
                to: RunStage::Committed,
            });
        }
        self.stage = RunStage::Committed;
        Ok(())
    }
}

/// One run: a single transaction on the single pooled connection, plus the
/// stage it has reached. Dropping the session without [`commit`] rolls the
/// transaction back.
///
/// [`commit`]: LoadSession::commit
pub struct LoadSession {
    pipeline: &'static str,
    tx: Transaction<'static, Postgres>,
    stages: StageTracker,
}

impl LoadSession {
    pub async fn begin(db: &Db, pipeline: &'static str) -> Result<Self> {
        let tx = db.begin().await?;
        info!(pipeline, "run transaction opened");
        Ok(Self {
            pipeline,
            tx,
            stages: StageTracker::default(),
        })
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub fn stage(&self) -> RunStage {
        self.stages.stage()
    }

    /// Move to the next stage. `Committed` is only reachable via `commit`.
    pub fn advance(&mut self, to: RunStage) -> Result<()> {
        if to == RunStage::Committed {
            anyhow::bail!("use LoadSession::commit to finish the run");
        }
        self.stages.advance(to)?;
        info!(pipeline = self.pipeline, stage = %to, "stage reached");
        Ok(())
    }

    pub async fn commit(self) -> Result<RunStage> {
        self.finish(false).await
    }

    /// Commit the DDL alone. Legal only right after `SchemaCreated`.
    pub async fn commit_schema_only(self) -> Result<RunStage> {
        self.finish(true).await
    }

    async fn finish(self, schema_only: bool) -> Result<RunStage> {
        let LoadSession {
            pipeline,
            tx,
            mut stages,
        } = self;
        let closed = if schema_only {
            stages.close_schema_only()
        } else {
            stages.advance(RunStage::Committed)
        };
        if let Err(e) = closed {
            warn!(pipeline, stage = %e.from, "refusing to commit; rolling back");
            tx.rollback().await.context("rollback after refused commit")?;
            return Err(e.into());
        }
        tx.commit().await.context("commit run transaction")?;
        info!(pipeline, schema_only, "run committed");
        Ok(RunStage::Committed)
    }
}
