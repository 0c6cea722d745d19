use std::collections::HashSet;

use libsql::params;
use thiserror::Error;
use tracing::warn;

use crate::db::{Database, DbError};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_initial",
        sql: include_str!("../../../migrations/001_initial.sql"),
    },
    Migration {
        version: "002_add_recheck_columns",
        sql: include_str!("../../../migrations/002_add_recheck_columns.sql"),
    },
];

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("migration failed: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Early journals keyed `messages.id` as an INTEGER rowid. The identifier the
/// gateway exposes is an opaque string, so such a table cannot be migrated in
/// place; it is dropped and rebuilt from scratch. The journal is regenerable
/// from the mailbox, so losing the old rows is acceptable.
async fn drop_legacy_journal(conn: &libsql::Connection) -> Result<(), MigrationError> {
    let mut rows = conn.query("PRAGMA table_info(messages)", ()).await?;
    let mut legacy = false;
    while let Some(row) = rows.next().await? {
        let name: String = row.get(1)?;
        let column_type: String = row.get(2)?;
        if name == "id" && column_type.eq_ignore_ascii_case("INTEGER") {
            legacy = true;
        }
    }

    if legacy {
        warn!("journal has legacy integer message ids; dropping and recreating the table");
        conn.execute("DROP TABLE messages", ()).await?;
        // Forget the recorded migrations so the schema is rebuilt in full.
        conn.execute(
            "DELETE FROM schema_migrations WHERE version LIKE '0%'",
            (),
        )
        .await?;
    }

    Ok(())
}

async fn apply_migrations(
    conn: &libsql::Connection,
    migrations: &[Migration],
) -> Result<(), MigrationError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
        (),
    )
    .await?;

    drop_legacy_journal(conn).await?;

    let mut applied = HashSet::new();
    let mut rows = conn
        .query("SELECT version FROM schema_migrations", ())
        .await?;
    while let Some(row) = rows.next().await? {
        let version: String = row.get(0)?;
        applied.insert(version);
    }

    for migration in migrations {
        if applied.contains(migration.version) {
            continue;
        }

        let tx = conn.transaction().await?;
        tx.execute_batch(migration.sql).await?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))",
            params![migration.version],
        )
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

pub async fn run_migrations(db: &Database) -> Result<(), MigrationError> {
    let conn = db.connection().await?;
    apply_migrations(&conn, MIGRATIONS).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::{Connection, params};
    use tempfile::TempDir;

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name = ?1",
                params![name],
            )
            .await
            .expect("query sqlite_master");
        rows.next().await.expect("row result").is_some()
    }

    async fn column_type(conn: &Connection, table: &str, column: &str) -> Option<String> {
        let mut rows = conn
            .query(&format!("PRAGMA table_info({table})"), ())
            .await
            .expect("pragma table_info");
        while let Some(row) = rows.next().await.expect("row result") {
            let name: String = row.get(1).expect("name");
            if name == column {
                return Some(row.get(2).expect("type"));
            }
        }
        None
    }

    #[tokio::test]
    async fn applies_migrations_and_records_versions() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("journal.sqlite");
        let db = Database::open(&db_path).await.expect("create db");

        run_migrations(&db).await.expect("migrations succeed");

        let conn = db.connection().await.expect("open connection");
        assert!(table_exists(&conn, "messages").await);
        assert!(
            column_type(&conn, "messages", "ambiguous_candidates")
                .await
                .is_some(),
            "recheck columns should exist after migrations"
        );

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_migrations", ())
            .await
            .expect("query schema_migrations");
        let count: i64 = rows
            .next()
            .await
            .expect("row")
            .expect("row value")
            .get(0)
            .expect("count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn rerunning_migrations_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("journal.sqlite");
        let db = Database::open(&db_path).await.expect("create db");

        run_migrations(&db).await.expect("initial migration");
        run_migrations(&db).await.expect("second migration");

        let conn = db.connection().await.expect("open connection");
        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_migrations", ())
            .await
            .expect("query count");
        let count: i64 = rows
            .next()
            .await
            .expect("row")
            .expect("row value")
            .get(0)
            .expect("count");
        assert_eq!(count, 2, "migrations should only record once each");
    }

    #[tokio::test]
    async fn legacy_integer_keyed_journal_is_rebuilt() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("journal.sqlite");
        let db = Database::open(&db_path).await.expect("create db");
        let conn = db.connection().await.expect("open connection");

        // Simulate a journal created before message ids became strings.
        conn.execute(
            "CREATE TABLE messages (id INTEGER PRIMARY KEY, subject TEXT)",
            (),
        )
        .await
        .expect("create legacy table");
        conn.execute(
            "INSERT INTO messages (id, subject) VALUES (1, 'old row')",
            params![],
        )
        .await
        .expect("insert legacy row");

        run_migrations(&db).await.expect("migrations succeed");

        assert_eq!(
            column_type(&conn, "messages", "id").await.as_deref(),
            Some("TEXT"),
            "journal should be rebuilt with text ids"
        );

        let mut rows = conn
            .query("SELECT COUNT(*) FROM messages", ())
            .await
            .expect("count rows");
        let count: i64 = rows
            .next()
            .await
            .expect("row")
            .expect("row value")
            .get(0)
            .expect("count");
        assert_eq!(count, 0, "legacy rows are discarded");
    }

    #[tokio::test]
    async fn migration_failure_rolls_back() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("journal.sqlite");
        let db = Database::open(&db_path).await.expect("create db");
        let conn = db.connection().await.expect("open connection");

        let failing_migrations = [Migration {
            version: "003_failure",
            sql: "CREATE TABLE should_not_persist(id INTEGER);\nINVALID SQL STATEMENT;",
        }];

        let err = apply_migrations(&conn, &failing_migrations)
            .await
            .expect_err("migration should fail");
        match err {
            MigrationError::LibSql(_) => {}
            other => panic!("unexpected error: {other}"),
        }

        assert!(
            !table_exists(&conn, "should_not_persist").await,
            "failed migration should roll back schema changes"
        );

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM schema_migrations WHERE version = '003_failure'",
                (),
            )
            .await
            .expect("query migrations");
        let count: i64 = rows
            .next()
            .await
            .expect("row")
            .expect("row value")
            .get(0)
            .expect("count");
        assert_eq!(
            count, 0,
            "failed migrations should not be recorded in schema_migrations"
        );
    }
}
