//! # Database Migration System
//!
//! Applies the SQL files under `migrations/` in version order and records each
//! applied version in `filer_schema_migrations`. Several workers may start at
//! once, so the whole run is serialized with a session advisory lock:
//!
//! ```sql
//! SELECT pg_advisory_lock(7411520946104337)
//! ```
//!
//! Files follow `YYYYMMDDHHMMSS_description.sql`; anything else in the
//! directory is ignored.

use crate::error::{FilerError, FilerResult};
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const MIGRATION_LOCK_KEY: i64 = 7_411_520_946_104_337;

/// A single migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS)
    pub version: String,
    pub name: String,
    pub path: PathBuf,
}

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply every outstanding migration found in `directory`
    pub async fn run_all(pool: &PgPool, directory: &Path) -> FilerResult<usize> {
        let mut conn = pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let result = Self::run_outstanding(pool, directory).await;

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        result
    }

    async fn run_outstanding(pool: &PgPool, directory: &Path) -> FilerResult<usize> {
        Self::ensure_migration_table(pool).await?;

        let migrations = Self::discover(directory)?;
        let applied = Self::applied_versions(pool).await?;
        let mut count = 0;

        for migration in migrations.values() {
            if applied.contains(&migration.version) {
                continue;
            }
            info!(
                version = %migration.version,
                name = %migration.name,
                "🗄️ DATABASE: Applying migration"
            );

            let sql = fs::read_to_string(&migration.path).map_err(|e| {
                FilerError::Configuration(format!(
                    "cannot read migration {}: {e}",
                    migration.path.display()
                ))
            })?;

            let mut tx = pool.begin().await?;
            sqlx::raw_sql(&sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO filer_schema_migrations (version) VALUES ($1)")
                .bind(&migration.version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            count += 1;
        }

        Ok(count)
    }

    /// Migration files in `directory`, keyed and ordered by version
    pub fn discover(directory: &Path) -> FilerResult<BTreeMap<String, Migration>> {
        let mut migrations = BTreeMap::new();
        if !directory.exists() {
            return Ok(migrations);
        }

        let entries = fs::read_dir(directory).map_err(|e| {
            FilerError::Configuration(format!(
                "cannot read migrations directory {}: {e}",
                directory.display()
            ))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "sql") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some((version, name)) = Self::parse_migration_filename(stem) {
                migrations.insert(
                    version.clone(),
                    Migration {
                        version,
                        name,
                        path,
                    },
                );
            }
        }

        Ok(migrations)
    }

    /// `YYYYMMDDHHMMSS_name` -> (version, "name")
    pub fn parse_migration_filename(filename: &str) -> Option<(String, String)> {
        if filename.len() < 15 || !filename.is_char_boundary(14) {
            return None;
        }

        let (version, rest) = filename.split_at(14);
        if !version.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let name = rest.strip_prefix('_').unwrap_or(rest).replace('_', " ");
        Some((version.to_string(), name))
    }

    async fn ensure_migration_table(pool: &PgPool) -> FilerResult<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS filer_schema_migrations (
                version VARCHAR(14) PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn applied_versions(pool: &PgPool) -> FilerResult<HashSet<String>> {
        let rows = sqlx::query("SELECT version FROM filer_schema_migrations")
            .fetch_all(pool)
            .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("version").map_err(FilerError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migration_filename() {
        assert_eq!(
            DatabaseMigrations::parse_migration_filename("20240101000000_create_filings"),
            Some(("20240101000000".to_string(), "create filings".to_string()))
        );
        assert_eq!(DatabaseMigrations::parse_migration_filename("init"), None);
        assert_eq!(
            DatabaseMigrations::parse_migration_filename("2024010100000x_bad_version"),
            None
        );
    }

    #[test]
    fn test_discover_orders_by_version_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("20240201000000_second.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("20240101000000_first.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();

        let migrations = DatabaseMigrations::discover(dir.path()).unwrap();
        let names: Vec<_> = migrations.values().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_missing_directory_yields_no_migrations() {
        let migrations = DatabaseMigrations::discover(Path::new("/nonexistent/migrations")).unwrap();
        assert!(migrations.is_empty());
    }
}
