use std::collections::HashMap;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use libsql::{Row, params};
use serde::Serialize;
use thiserror::Error;

use crate::db::{Database, DbError};

const RECORD_COLUMNS: &str = "id, received_at, sender, recipient, cc, subject, body, mass_mail, attachment_kinds, predicted_category, confidence, corrected_category, is_read, last_recheck_at, ambiguous_candidates";

/// A journaled classification decision for one mailbox message.
///
/// The row is keyed by the opaque message identifier the gateway exposes and
/// is never deleted; ingest re-runs update the classification fields while
/// correction and recheck state survives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub cc: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub mass_mail: bool,
    pub attachment_kinds: Vec<String>,
    pub predicted_category: String,
    pub confidence: f64,
    pub corrected_category: Option<String>,
    pub is_read: bool,
    pub last_recheck_at: Option<DateTime<Utc>>,
    pub ambiguous_candidates: Option<Vec<String>>,
}

impl MessageRecord {
    /// The category the journal currently believes is true: an explicit
    /// correction wins over the model's prediction.
    pub fn local_category(&self) -> &str {
        self.corrected_category
            .as_deref()
            .unwrap_or(&self.predicted_category)
    }
}

/// Classification fields written by ingest. Correction, recheck and
/// notification state is deliberately absent: an upsert can never touch it.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub cc: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub mass_mail: bool,
    pub attachment_kinds: Vec<String>,
    pub predicted_category: String,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("message record not found: {0}")]
    NotFound(String),
}

#[derive(Clone)]
pub struct Journal {
    db: Database,
}

impl Journal {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a record or refresh the classification fields of an existing
    /// one. `corrected_category`, `last_recheck_at`, `ambiguous_candidates`
    /// and `is_read` keep whatever was last written to them explicitly.
    pub async fn upsert(&self, record: NewRecord) -> Result<MessageRecord, JournalError> {
        let NewRecord {
            id,
            received_at,
            sender,
            recipient,
            cc,
            subject,
            body,
            mass_mail,
            attachment_kinds,
            predicted_category,
            confidence,
        } = record;

        let attachment_kinds_json = serde_json::to_string(&attachment_kinds)?;
        let id_for_error = id.clone();

        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO messages (
                        id, received_at, sender, recipient, cc, subject, body,
                        mass_mail, attachment_kinds, predicted_category, confidence, is_read)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)
                     ON CONFLICT(id) DO UPDATE SET
                        received_at = excluded.received_at,
                        sender = excluded.sender,
                        recipient = excluded.recipient,
                        cc = excluded.cc,
                        subject = excluded.subject,
                        body = excluded.body,
                        mass_mail = excluded.mass_mail,
                        attachment_kinds = excluded.attachment_kinds,
                        predicted_category = excluded.predicted_category,
                        confidence = excluded.confidence
                     RETURNING {RECORD_COLUMNS}"
                ),
                params![
                    id,
                    to_rfc3339(received_at),
                    sender,
                    recipient,
                    cc,
                    subject,
                    body,
                    mass_mail as i64,
                    attachment_kinds_json,
                    predicted_category,
                    confidence
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_record(row),
            None => Err(JournalError::NotFound(id_for_error)),
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<MessageRecord>, JournalError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    /// Record the user-confirmed category. Writing the same value twice is a
    /// no-op.
    pub async fn set_correction(&self, id: &str, category: &str) -> Result<(), JournalError> {
        let conn = self.db.connection().await?;
        let affected = conn
            .execute(
                "UPDATE messages SET corrected_category = ?2 WHERE id = ?1",
                params![id, category],
            )
            .await?;

        if affected == 0 {
            return Err(JournalError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Stamp a finished reconciliation pass: refreshes `last_recheck_at` and
    /// sets or clears the ambiguity flag in the same statement.
    pub async fn set_recheck(
        &self,
        id: &str,
        ambiguous_candidates: Option<&[String]>,
    ) -> Result<(), JournalError> {
        let candidates_json = match ambiguous_candidates {
            Some(candidates) if !candidates.is_empty() => {
                Some(serde_json::to_string(candidates)?)
            }
            _ => None,
        };

        let conn = self.db.connection().await?;
        let affected = conn
            .execute(
                "UPDATE messages SET last_recheck_at = ?2, ambiguous_candidates = ?3 WHERE id = ?1",
                params![id, now_rfc3339(), candidates_json],
            )
            .await?;

        if affected == 0 {
            return Err(JournalError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Records due for another reconciliation pass, newest first.
    ///
    /// Eligibility follows a gliding scale: the older the message, the longer
    /// the minimum gap since its last recheck.
    ///
    /// | age          | minimum gap |
    /// |--------------|-------------|
    /// | < 1 day      | 12 hours    |
    /// | 1 - 7 days   | 24 hours    |
    /// | 7 - 30 days  | 7 days      |
    /// | > 30 days    | 30 days     |
    pub async fn select_recheck_candidates(
        &self,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, JournalError> {
        let now = Utc::now();

        let age_1d = to_rfc3339(now - Duration::days(1));
        let age_7d = to_rfc3339(now - Duration::days(7));
        let age_30d = to_rfc3339(now - Duration::days(30));

        let gap_12h = to_rfc3339(now - Duration::hours(12));
        let gap_24h = to_rfc3339(now - Duration::hours(24));
        let gap_7d = to_rfc3339(now - Duration::days(7));
        let gap_30d = to_rfc3339(now - Duration::days(30));

        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM messages
                     WHERE
                        (received_at > ?1 AND (last_recheck_at IS NULL OR last_recheck_at < ?2))
                        OR (received_at <= ?1 AND received_at > ?3
                            AND (last_recheck_at IS NULL OR last_recheck_at < ?4))
                        OR (received_at <= ?3 AND received_at > ?5
                            AND (last_recheck_at IS NULL OR last_recheck_at < ?6))
                        OR (received_at <= ?5 AND (last_recheck_at IS NULL OR last_recheck_at < ?7))
                     ORDER BY received_at DESC
                     LIMIT ?8"
                ),
                params![
                    age_1d,
                    gap_12h,
                    age_7d,
                    gap_24h,
                    age_30d,
                    gap_7d,
                    gap_30d,
                    limit as i64
                ],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Classification counts per predicted category, optionally bounded by
    /// received-at range.
    pub async fn stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, i64>, JournalError> {
        let conn = self.db.connection().await?;
        let mut rows = match (start, end) {
            (Some(start), Some(end)) => {
                conn.query(
                    "SELECT predicted_category, COUNT(*) FROM messages
                     WHERE received_at >= ?1 AND received_at <= ?2
                     GROUP BY predicted_category",
                    params![to_rfc3339(start), to_rfc3339(end)],
                )
                .await?
            }
            (Some(start), None) => {
                conn.query(
                    "SELECT predicted_category, COUNT(*) FROM messages
                     WHERE received_at >= ?1
                     GROUP BY predicted_category",
                    params![to_rfc3339(start)],
                )
                .await?
            }
            (None, Some(end)) => {
                conn.query(
                    "SELECT predicted_category, COUNT(*) FROM messages
                     WHERE received_at <= ?1
                     GROUP BY predicted_category",
                    params![to_rfc3339(end)],
                )
                .await?
            }
            (None, None) => {
                conn.query(
                    "SELECT predicted_category, COUNT(*) FROM messages GROUP BY predicted_category",
                    (),
                )
                .await?
            }
        };

        let mut stats = HashMap::new();
        while let Some(row) = rows.next().await? {
            let category: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.insert(category, count);
        }
        Ok(stats)
    }

    pub async fn unread(&self) -> Result<Vec<MessageRecord>, JournalError> {
        self.select_many(&format!(
            "SELECT {RECORD_COLUMNS} FROM messages WHERE is_read = 0 ORDER BY received_at DESC"
        ))
        .await
    }

    /// Mark records as read. `None` acknowledges every unread record.
    pub async fn ack(&self, ids: Option<&[String]>) -> Result<(), JournalError> {
        let conn = self.db.connection().await?;
        match ids {
            Some(ids) => {
                for id in ids {
                    conn.execute(
                        "UPDATE messages SET is_read = 1 WHERE id = ?1",
                        params![id.as_str()],
                    )
                    .await?;
                }
            }
            None => {
                conn.execute("UPDATE messages SET is_read = 1 WHERE is_read = 0", ())
                    .await?;
            }
        }
        Ok(())
    }

    /// Fetch all unread records and acknowledge them in the same call.
    pub async fn pop_unread(&self) -> Result<Vec<MessageRecord>, JournalError> {
        let unread = self.unread().await?;
        if !unread.is_empty() {
            let ids: Vec<String> = unread.iter().map(|record| record.id.clone()).collect();
            self.ack(Some(&ids)).await?;
        }
        Ok(unread)
    }

    pub async fn read_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MessageRecord>, JournalError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM messages
                     WHERE is_read = 1 AND received_at >= ?1 AND received_at <= ?2
                     ORDER BY received_at DESC"
                ),
                params![to_rfc3339(start), to_rfc3339(end)],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Records whose last reconciliation pass was inconclusive.
    pub async fn list_ambiguous(&self) -> Result<Vec<MessageRecord>, JournalError> {
        self.select_many(&format!(
            "SELECT {RECORD_COLUMNS} FROM messages
             WHERE ambiguous_candidates IS NOT NULL
             ORDER BY received_at DESC"
        ))
        .await
    }

    /// Records the user has never corrected, eligible for bulk reclassify.
    pub async fn list_uncorrected(&self) -> Result<Vec<MessageRecord>, JournalError> {
        self.select_many(&format!(
            "SELECT {RECORD_COLUMNS} FROM messages
             WHERE corrected_category IS NULL
             ORDER BY received_at DESC"
        ))
        .await
    }

    /// Raw statement escape hatch for tests that need to shape rows in ways
    /// the public surface forbids (e.g. backdating timestamps).
    #[cfg(test)]
    pub(crate) async fn raw_execute(&self, sql: &str) -> Result<(), JournalError> {
        let conn = self.db.connection().await?;
        conn.execute(sql, ()).await?;
        Ok(())
    }

    async fn select_many(&self, sql: &str) -> Result<Vec<MessageRecord>, JournalError> {
        let conn = self.db.connection().await?;
        let mut rows = conn.query(sql, ()).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }
}

fn row_to_record(row: Row) -> Result<MessageRecord, JournalError> {
    let received_at: String = row.get(1)?;
    let mass_mail: i64 = row.get(7)?;
    let attachment_kinds: String = row.get(8)?;
    let is_read: i64 = row.get(12)?;
    let last_recheck_at: Option<String> = row.get(13)?;
    let ambiguous_candidates: Option<String> = row.get(14)?;

    Ok(MessageRecord {
        id: row.get(0)?,
        received_at: DateTime::parse_from_rfc3339(&received_at)?.with_timezone(&Utc),
        sender: row.get(2)?,
        recipient: row.get(3)?,
        cc: row.get(4)?,
        subject: row.get(5)?,
        body: row.get(6)?,
        mass_mail: mass_mail != 0,
        attachment_kinds: serde_json::from_str(&attachment_kinds)?,
        predicted_category: row.get(9)?,
        confidence: row.get(10)?,
        corrected_category: row.get(11)?,
        is_read: is_read != 0,
        last_recheck_at: match last_recheck_at {
            Some(value) => Some(DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc)),
            None => None,
        },
        ambiguous_candidates: match ambiguous_candidates {
            Some(value) => Some(serde_json::from_str(&value)?),
            None => None,
        },
    })
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use tempfile::TempDir;

    async fn setup_journal() -> (Journal, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db_name = format!("journal_{}.sqlite", uuid::Uuid::new_v4());
        let db_path = dir.path().join(db_name);
        let db = Database::open(&db_path).await.expect("create db");
        run_migrations(&db).await.expect("migrations");
        (Journal::new(db), dir)
    }

    fn sample_record(id: &str, received_at: DateTime<Utc>) -> NewRecord {
        NewRecord {
            id: id.to_string(),
            received_at,
            sender: Some("alice@example.com".into()),
            recipient: Some("me@example.com".into()),
            cc: None,
            subject: Some("Hello".into()),
            body: Some("Hi there".into()),
            mass_mail: false,
            attachment_kinds: vec!["PDF".into()],
            predicted_category: "FOCUS".into(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn upsert_creates_new_record() {
        let (journal, _dir) = setup_journal().await;
        let stored = journal
            .upsert(sample_record("m1", Utc::now()))
            .await
            .expect("upsert");

        assert_eq!(stored.id, "m1");
        assert_eq!(stored.predicted_category, "FOCUS");
        assert_eq!(stored.attachment_kinds, vec!["PDF"]);
        assert!(stored.corrected_category.is_none());
        assert!(stored.last_recheck_at.is_none());
        assert!(!stored.is_read);
    }

    #[tokio::test]
    async fn upsert_preserves_correction_and_recheck_state() {
        let (journal, _dir) = setup_journal().await;
        journal
            .upsert(sample_record("m1", Utc::now()))
            .await
            .expect("insert");

        journal
            .set_correction("m1", "URGENT")
            .await
            .expect("correction");
        journal
            .set_recheck("m1", Some(&["FOCUS".into(), "URGENT".into()]))
            .await
            .expect("recheck");
        journal.ack(Some(&["m1".into()])).await.expect("ack");

        let mut update = sample_record("m1", Utc::now());
        update.predicted_category = "NOISE".into();
        update.confidence = 0.4;
        let updated = journal.upsert(update).await.expect("upsert again");

        assert_eq!(updated.predicted_category, "NOISE");
        assert_eq!(updated.corrected_category.as_deref(), Some("URGENT"));
        assert!(updated.last_recheck_at.is_some());
        assert_eq!(
            updated.ambiguous_candidates,
            Some(vec!["FOCUS".to_string(), "URGENT".to_string()])
        );
        assert!(updated.is_read, "is_read must survive upserts");
    }

    #[tokio::test]
    async fn local_category_prefers_correction() {
        let (journal, _dir) = setup_journal().await;
        journal
            .upsert(sample_record("m1", Utc::now()))
            .await
            .expect("insert");

        let record = journal.get_by_id("m1").await.expect("get").expect("some");
        assert_eq!(record.local_category(), "FOCUS");

        journal
            .set_correction("m1", "URGENT")
            .await
            .expect("correction");
        let record = journal.get_by_id("m1").await.expect("get").expect("some");
        assert_eq!(record.local_category(), "URGENT");
    }

    #[tokio::test]
    async fn set_correction_unknown_id_errors() {
        let (journal, _dir) = setup_journal().await;
        let err = journal
            .set_correction("missing", "FOCUS")
            .await
            .expect_err("missing id should error");
        assert!(matches!(err, JournalError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_recheck_sets_and_clears_ambiguity() {
        let (journal, _dir) = setup_journal().await;
        journal
            .upsert(sample_record("m1", Utc::now()))
            .await
            .expect("insert");

        journal
            .set_recheck("m1", Some(&["A".into(), "B".into()]))
            .await
            .expect("recheck ambiguous");
        let record = journal.get_by_id("m1").await.expect("get").expect("some");
        assert_eq!(
            record.ambiguous_candidates,
            Some(vec!["A".to_string(), "B".to_string()])
        );
        let first_recheck = record.last_recheck_at.expect("recheck stamped");

        journal.set_recheck("m1", None).await.expect("recheck clear");
        let record = journal.get_by_id("m1").await.expect("get").expect("some");
        assert!(record.ambiguous_candidates.is_none());
        assert!(record.last_recheck_at.expect("stamped") >= first_recheck);
    }

    async fn seed_with_recheck(
        journal: &Journal,
        id: &str,
        age: Duration,
        recheck_gap: Option<Duration>,
    ) {
        let now = Utc::now();
        journal
            .upsert(sample_record(id, now - age))
            .await
            .expect("insert");
        if let Some(gap) = recheck_gap {
            // Backdate last_recheck_at directly; set_recheck always stamps now.
            journal.set_recheck(id, None).await.expect("recheck");
            let conn = journal.db.connection().await.expect("conn");
            conn.execute(
                "UPDATE messages SET last_recheck_at = ?2 WHERE id = ?1",
                params![id, to_rfc3339(now - gap)],
            )
            .await
            .expect("backdate");
        }
    }

    #[tokio::test]
    async fn recheck_candidates_follow_gliding_scale() {
        let (journal, _dir) = setup_journal().await;

        // < 1 day band: 12 hour gap.
        seed_with_recheck(&journal, "fresh-due", Duration::hours(2), None).await;
        seed_with_recheck(
            &journal,
            "fresh-recent",
            Duration::hours(2),
            Some(Duration::hours(1)),
        )
        .await;
        seed_with_recheck(
            &journal,
            "fresh-stale",
            Duration::hours(20),
            Some(Duration::hours(13)),
        )
        .await;

        // 1 - 7 day band: 24 hour gap.
        seed_with_recheck(
            &journal,
            "week-due",
            Duration::days(3),
            Some(Duration::hours(25)),
        )
        .await;
        seed_with_recheck(
            &journal,
            "week-recent",
            Duration::days(3),
            Some(Duration::hours(2)),
        )
        .await;

        // 7 - 30 day band: 7 day gap.
        seed_with_recheck(
            &journal,
            "month-due",
            Duration::days(10),
            Some(Duration::days(8)),
        )
        .await;
        seed_with_recheck(
            &journal,
            "month-recent",
            Duration::days(10),
            Some(Duration::days(2)),
        )
        .await;

        // > 30 day band: 30 day gap.
        seed_with_recheck(&journal, "old-due", Duration::days(45), None).await;
        seed_with_recheck(
            &journal,
            "old-recent",
            Duration::days(45),
            Some(Duration::days(29)),
        )
        .await;

        let candidates = journal
            .select_recheck_candidates(50)
            .await
            .expect("candidates");
        let ids: Vec<&str> = candidates.iter().map(|r| r.id.as_str()).collect();

        assert_eq!(
            ids,
            vec!["fresh-due", "fresh-stale", "week-due", "month-due", "old-due"],
            "only due records, newest first"
        );
    }

    #[tokio::test]
    async fn recheck_candidates_respect_limit() {
        let (journal, _dir) = setup_journal().await;
        for i in 0..5 {
            seed_with_recheck(
                &journal,
                &format!("m{i}"),
                Duration::hours(2 + i as i64),
                None,
            )
            .await;
        }

        let candidates = journal
            .select_recheck_candidates(2)
            .await
            .expect("candidates");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "m0", "newest message first");
    }

    #[tokio::test]
    async fn stats_count_per_category_with_range() {
        let (journal, _dir) = setup_journal().await;
        let now = Utc::now();

        let mut old = sample_record("old", now - Duration::days(10));
        old.predicted_category = "NOISE".into();
        journal.upsert(old).await.expect("insert old");
        journal
            .upsert(sample_record("new-1", now))
            .await
            .expect("insert new-1");
        journal
            .upsert(sample_record("new-2", now))
            .await
            .expect("insert new-2");

        let all = journal.stats(None, None).await.expect("stats");
        assert_eq!(all.get("FOCUS"), Some(&2));
        assert_eq!(all.get("NOISE"), Some(&1));

        let recent = journal
            .stats(Some(now - Duration::days(1)), None)
            .await
            .expect("stats range");
        assert_eq!(recent.get("FOCUS"), Some(&2));
        assert!(recent.get("NOISE").is_none());
    }

    #[tokio::test]
    async fn unread_ack_and_pop_cycle() {
        let (journal, _dir) = setup_journal().await;
        journal
            .upsert(sample_record("m1", Utc::now()))
            .await
            .expect("insert");
        journal
            .upsert(sample_record("m2", Utc::now()))
            .await
            .expect("insert");

        assert_eq!(journal.unread().await.expect("unread").len(), 2);

        journal.ack(Some(&["m1".into()])).await.expect("ack one");
        let unread = journal.unread().await.expect("unread");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "m2");

        let popped = journal.pop_unread().await.expect("pop");
        assert_eq!(popped.len(), 1);
        assert!(journal.unread().await.expect("unread").is_empty());
    }

    #[tokio::test]
    async fn ack_all_marks_everything() {
        let (journal, _dir) = setup_journal().await;
        journal
            .upsert(sample_record("m1", Utc::now()))
            .await
            .expect("insert");
        journal
            .upsert(sample_record("m2", Utc::now()))
            .await
            .expect("insert");

        journal.ack(None).await.expect("ack all");
        assert!(journal.unread().await.expect("unread").is_empty());
    }

    #[tokio::test]
    async fn read_in_range_returns_acknowledged_records() {
        let (journal, _dir) = setup_journal().await;
        let now = Utc::now();
        journal
            .upsert(sample_record("m1", now - Duration::hours(1)))
            .await
            .expect("insert");
        journal
            .upsert(sample_record("m2", now - Duration::days(3)))
            .await
            .expect("insert");
        journal.ack(None).await.expect("ack all");

        let in_range = journal
            .read_in_range(now - Duration::days(1), now)
            .await
            .expect("read range");
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].id, "m1");
    }

    #[tokio::test]
    async fn list_ambiguous_and_uncorrected() {
        let (journal, _dir) = setup_journal().await;
        journal
            .upsert(sample_record("plain", Utc::now()))
            .await
            .expect("insert");
        journal
            .upsert(sample_record("flagged", Utc::now()))
            .await
            .expect("insert");
        journal
            .upsert(sample_record("corrected", Utc::now()))
            .await
            .expect("insert");

        journal
            .set_recheck("flagged", Some(&["A".into(), "B".into()]))
            .await
            .expect("flag");
        journal
            .set_correction("corrected", "URGENT")
            .await
            .expect("correct");

        let ambiguous = journal.list_ambiguous().await.expect("ambiguous");
        assert_eq!(ambiguous.len(), 1);
        assert_eq!(ambiguous[0].id, "flagged");

        let uncorrected = journal.list_uncorrected().await.expect("uncorrected");
        let ids: Vec<&str> = uncorrected.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"plain"));
        assert!(ids.contains(&"flagged"));
        assert!(!ids.contains(&"corrected"));
    }
}
