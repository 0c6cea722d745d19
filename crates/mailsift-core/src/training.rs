use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::journal::MessageRecord;

#[derive(Debug, Error)]
pub enum TrainingDataError {
    #[error("failed to write training data: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode training example: {0}")]
    Json(#[from] serde_json::Error),
}

/// One line of the supervised-learning corpus. Field names and casing are a
/// wire contract with the training pipeline.
#[derive(Serialize)]
struct TrainingLine<'a> {
    subject: &'a str,
    body: &'a str,
    from: &'a str,
    to: &'a str,
    cc: &'a str,
    mass_mail: bool,
    attachment_types: &'a [String],
}

/// Append-only writer for the per-category `{category}.jsonl` corpus files.
///
/// The journal stays authoritative: a failed append is logged by the caller
/// and never rolls anything back, since the corpus can be regenerated from
/// the journal.
#[derive(Clone)]
pub struct TrainingEmitter {
    dir: PathBuf,
}

impl TrainingEmitter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Append one example labelled `category`, creating the directory and
    /// file on first use. Categories are hierarchical (`a/b`), which maps to
    /// nested directories here.
    pub async fn append(
        &self,
        category: &str,
        record: &MessageRecord,
    ) -> Result<(), TrainingDataError> {
        let line = TrainingLine {
            subject: record.subject.as_deref().unwrap_or_default(),
            body: record.body.as_deref().unwrap_or_default(),
            from: record.sender.as_deref().unwrap_or_default(),
            to: record.recipient.as_deref().unwrap_or_default(),
            cc: record.cc.as_deref().unwrap_or_default(),
            mass_mail: record.mass_mail,
            attachment_types: &record.attachment_kinds,
        };
        let mut encoded = serde_json::to_string(&line)?;
        encoded.push('\n');

        let path = self.dir.join(format!("{category}.jsonl"));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(encoded.as_bytes()).await?;
        file.flush().await?;

        info!(category, message_id = %record.id, "appended training example");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_record() -> MessageRecord {
        MessageRecord {
            id: "m1".into(),
            received_at: Utc::now(),
            sender: Some("alice@example.com".into()),
            recipient: Some("me@example.com".into()),
            cc: None,
            subject: Some("Hello".into()),
            body: Some("Hi there".into()),
            mass_mail: true,
            attachment_kinds: vec!["PDF".into(), "ICS".into()],
            predicted_category: "NOISE".into(),
            confidence: 0.4,
            corrected_category: None,
            is_read: false,
            last_recheck_at: None,
            ambiguous_candidates: None,
        }
    }

    #[tokio::test]
    async fn append_writes_one_json_line_with_exact_fields() {
        let dir = TempDir::new().expect("temp dir");
        let emitter = TrainingEmitter::new(dir.path());

        emitter
            .append("FOCUS", &sample_record())
            .await
            .expect("append");

        let contents = std::fs::read_to_string(dir.path().join("FOCUS.jsonl")).expect("read file");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("valid json");
        assert_eq!(parsed["subject"], "Hello");
        assert_eq!(parsed["body"], "Hi there");
        assert_eq!(parsed["from"], "alice@example.com");
        assert_eq!(parsed["to"], "me@example.com");
        assert_eq!(parsed["cc"], "");
        assert_eq!(parsed["mass_mail"], true);
        assert_eq!(parsed["attachment_types"][0], "PDF");
        assert_eq!(parsed["attachment_types"][1], "ICS");
        assert_eq!(
            parsed.as_object().expect("object").len(),
            7,
            "line carries exactly the corpus fields"
        );
    }

    #[tokio::test]
    async fn append_accumulates_lines() {
        let dir = TempDir::new().expect("temp dir");
        let emitter = TrainingEmitter::new(dir.path());

        emitter
            .append("FOCUS", &sample_record())
            .await
            .expect("first");
        emitter
            .append("FOCUS", &sample_record())
            .await
            .expect("second");

        let contents = std::fs::read_to_string(dir.path().join("FOCUS.jsonl")).expect("read file");
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn hierarchical_categories_map_to_nested_directories() {
        let dir = TempDir::new().expect("temp dir");
        let emitter = TrainingEmitter::new(dir.path());

        emitter
            .append("work/reports", &sample_record())
            .await
            .expect("append");

        assert!(dir.path().join("work/reports.jsonl").exists());
    }
}
