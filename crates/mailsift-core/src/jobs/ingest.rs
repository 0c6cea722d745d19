use chrono::Utc;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::features::{extract_features, format_model_input};
use crate::jobs::{JobError, RunDetail, RunStatus, RunSummary, is_fatal, none_if_empty};
use crate::journal::NewRecord;

/// One ingest pass: list unclassified mail, classify, label, journal.
///
/// Per-message failures are logged and skipped; a gateway-wide listing
/// failure aborts the pass with an empty result and the next scheduled run
/// picks the batch up again.
pub(crate) async fn run(engine: &Engine, limit: usize) -> RunSummary {
    let known = engine.classifier.categories();

    let batch = match engine.gateway.list_unclassified(&known, limit).await {
        Ok(batch) => batch,
        Err(err) => {
            error!(error = %err, "failed to list unclassified messages; aborting ingest pass");
            return RunSummary::empty();
        }
    };
    info!(count = batch.len(), "found unclassified messages");

    let mut details = Vec::new();
    for (id, raw) in batch {
        match classify_message(engine, &id, &raw, &known).await {
            Ok(detail) => {
                info!(
                    message_id = %detail.id,
                    category = %detail.category,
                    confidence = detail.confidence,
                    "classified message"
                );
                details.push(detail);
            }
            Err(err) => {
                if is_fatal(&err) {
                    error!(message_id = %id, error = %err, "fatal gateway error; aborting ingest pass");
                    break;
                }
                warn!(message_id = %id, error = %err, "failed to process message; skipping");
            }
        }
    }

    RunSummary {
        status: RunStatus::Success,
        processed_count: details.len(),
        details,
    }
}

async fn classify_message(
    engine: &Engine,
    id: &str,
    raw: &[u8],
    known: &[String],
) -> Result<RunDetail, JobError> {
    let features = extract_features(raw)?;
    let input = format_model_input(&features, &engine.settings.self_addresses);
    let prediction = engine.classifier.predict(&input).await?;

    if !known.iter().any(|category| *category == prediction.category) {
        return Err(JobError::UnknownCategory(prediction.category));
    }

    engine.gateway.add_label(id, &prediction.category).await?;

    // The server label is now authoritative. If the upsert below fails the
    // next listing skips this message and the recheck cycle repopulates the
    // journal through the correction path.
    let record = engine
        .journal
        .upsert(NewRecord {
            id: id.to_string(),
            received_at: features.received_at.unwrap_or_else(Utc::now),
            sender: none_if_empty(features.sender),
            recipient: none_if_empty(features.recipient),
            cc: none_if_empty(features.cc),
            subject: none_if_empty(features.subject),
            body: none_if_empty(features.body),
            mass_mail: features.mass_mail,
            attachment_kinds: features.attachment_kinds,
            predicted_category: prediction.category.clone(),
            confidence: prediction.confidence,
        })
        .await?;

    Ok(RunDetail {
        id: record.id,
        sender: record.sender,
        recipient: record.recipient,
        subject: record.subject,
        category: prediction.category,
        confidence: prediction.confidence,
    })
}
