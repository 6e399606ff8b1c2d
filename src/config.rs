use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use tracing::info;

use crate::database_ops::DedupMode;
use crate::normalization::CollisionPolicy;
use crate::util::env::{self as env_util, env_flag, env_opt, env_parse_opt, redact_value};

pub const DEFAULT_DATA_DIR: &str = "data_to_insert";

/// Everything one pipeline run needs. Built from the environment, then
/// overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub key_collision: CollisionPolicy,
    pub dedup: DedupMode,
    /// Optional cap on rows per INSERT statement.
    pub insert_chunk_rows: Option<usize>,
    /// Create the schema, commit, and load nothing.
    pub schema_only: bool,
}

impl LoadConfig {
    pub fn from_env() -> Result<Self> {
        Self::resolve(None)
    }

    /// Like `from_env`, but an explicit URL skips env-based URL resolution.
    pub fn resolve(database_url: Option<String>) -> Result<Self> {
        env_util::init_env();
        let database_url = match database_url {
            Some(url) => url,
            None => env_util::db_url()?,
        };
        Ok(Self {
            database_url,
            data_dir: env_opt("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            key_collision: parse_choice("KEY_COLLISION")?.unwrap_or_default(),
            dedup: parse_choice("DEDUP_MODE")?.unwrap_or_default(),
            insert_chunk_rows: env_parse_opt("INSERT_CHUNK_ROWS"),
            schema_only: env_flag("SCHEMA_ONLY", false),
        })
    }

    /// Log a redacted snapshot of the resolved settings and check that every
    /// input file is in place before a connection is opened.
    pub fn preflight(&self, pipeline: &str, files: &[&str]) -> Result<()> {
        let chunk = self
            .insert_chunk_rows
            .map_or_else(|| "auto".to_string(), |n| n.to_string());
        info!(
            target = "preflight",
            pipeline,
            database_url = %redact_value("DATABASE_URL", &self.database_url),
            data_dir = %self.data_dir.display(),
            key_collision = ?self.key_collision,
            dedup = ?self.dedup,
            insert_chunk_rows = %chunk,
            schema_only = self.schema_only,
            "configuration snapshot"
        );

        if self.insert_chunk_rows == Some(0) {
            bail!("INSERT_CHUNK_ROWS must be at least 1");
        }
        if self.schema_only {
            return Ok(());
        }
        let missing: Vec<String> = files
            .iter()
            .map(|f| self.csv_path(f))
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            bail!("{pipeline}: missing input files: {}", missing.join(", "));
        }
        Ok(())
    }

    pub fn csv_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.csv"))
    }

    /// `CSV_DELIMITER_<TABLE>` overrides the pipeline's default for one file.
    pub fn delimiter_for(&self, table: &str, default: u8) -> Result<u8> {
        let key = format!("CSV_DELIMITER_{}", table.to_ascii_uppercase());
        match std::env::var(&key) {
            Ok(raw) if !raw.is_empty() => {
                parse_delimiter(&raw).with_context(|| format!("invalid {key}"))
            }
            _ => Ok(default),
        }
    }
}

fn parse_choice<T: ValueEnum>(key: &str) -> Result<Option<T>> {
    env_opt(key)
        .map(|raw| T::from_str(raw.trim(), true).map_err(|e| anyhow!("invalid {key}: {e}")))
        .transpose()
}

/// Single-byte delimiter; `\t` and `tab` mean a tab.
pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        s if s.len() == 1 => Ok(s.as_bytes()[0]),
        s => Err(anyhow!("delimiter must be a single byte, got {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LoadConfig {
        LoadConfig {
            database_url: "postgresql://localhost/test".into(),
            data_dir: PathBuf::from("fixtures"),
            key_collision: CollisionPolicy::default(),
            dedup: DedupMode::default(),
            insert_chunk_rows: None,
            schema_only: false,
        }
    }

    #[test]
    fn delimiters_parse() {
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert!(parse_delimiter(";;").is_err());
    }

    #[test]
    fn csv_path_is_table_name_under_data_dir() {
        assert_eq!(
            cfg().csv_path("postal_object"),
            PathBuf::from("fixtures").join("postal_object.csv")
        );
    }

    #[test]
    fn delimiter_falls_back_to_default() {
        assert_eq!(cfg().delimiter_for("no_such_table_xyz", b';').unwrap(), b';');
    }

    #[test]
    fn defaults_are_last_write_wins_and_sql() {
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::LastWriteWins);
        assert_eq!(DedupMode::default(), DedupMode::Sql);
        assert_eq!(
            CollisionPolicy::from_str("last-write-wins", true).unwrap(),
            CollisionPolicy::LastWriteWins
        );
        assert_eq!(DedupMode::from_str("MEMORY", true).unwrap(), DedupMode::Memory);
    }

    #[test]
    fn preflight_reports_missing_inputs() {
        let err = cfg().preflight("transactions", &["job", "customer"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("job.csv"), "{msg}");
        assert!(msg.contains("customer.csv"), "{msg}");
    }

    #[test]
    fn preflight_passes_when_inputs_exist() {
        let dir = std::env::temp_dir().join(format!("csvnorm-preflight-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("job.csv"), "job_title\n").unwrap();
        let mut c = cfg();
        c.data_dir = dir.clone();
        let outcome = c.preflight("transactions", &["job"]);
        std::fs::remove_dir_all(&dir).unwrap();
        outcome.unwrap();
    }

    #[test]
    fn schema_only_needs_no_inputs_but_chunk_cap_is_checked() {
        let mut c = cfg();
        c.schema_only = true;
        assert!(c.preflight("orders", &["customer"]).is_ok());
        c.insert_chunk_rows = Some(0);
        assert!(c.preflight("orders", &["customer"]).is_err());
    }
}
