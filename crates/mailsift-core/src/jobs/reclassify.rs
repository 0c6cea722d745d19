use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::features::{extract_features, format_model_input};
use crate::jobs::{JobError, RunStatus, is_fatal, none_if_empty};
use crate::journal::{MessageRecord, NewRecord};

#[derive(Debug, Clone, Serialize)]
pub struct ReclassifyReport {
    pub status: RunStatus,
    pub processed: usize,
    pub updated: usize,
    pub errors: usize,
}

impl ReclassifyReport {
    pub(crate) fn skipped() -> Self {
        Self {
            status: RunStatus::Skipped,
            processed: 0,
            updated: 0,
            errors: 0,
        }
    }
}

/// One-shot re-evaluation of uncorrected journal records against the current
/// model. Where the prediction changed, the server label moves with it.
pub(crate) async fn run(engine: &Engine, limit: usize) -> ReclassifyReport {
    let mut records = match engine.journal.list_uncorrected().await {
        Ok(records) => records,
        Err(err) => {
            error!(error = %err, "failed to list uncorrected records; aborting reclassify");
            return ReclassifyReport {
                status: RunStatus::Success,
                processed: 0,
                updated: 0,
                errors: 0,
            };
        }
    };
    if records.len() > limit {
        info!(total = records.len(), limit, "limiting reclassification batch");
        records.truncate(limit);
    }

    let known = engine.classifier.categories();

    let processed = records.len();
    let mut updated = 0;
    let mut errors = 0;
    for record in &records {
        match reclassify_message(engine, record, &known).await {
            Ok(true) => updated += 1,
            Ok(false) => {}
            Err(err) => {
                errors += 1;
                if is_fatal(&err) {
                    error!(message_id = %record.id, error = %err, "fatal gateway error; aborting reclassify pass");
                    break;
                }
                warn!(message_id = %record.id, error = %err, "failed to reclassify message; skipping");
            }
        }
    }

    info!(processed, updated, errors, "reclassification finished");
    ReclassifyReport {
        status: RunStatus::Success,
        processed,
        updated,
        errors,
    }
}

async fn reclassify_message(
    engine: &Engine,
    record: &MessageRecord,
    known: &[String],
) -> Result<bool, JobError> {
    let Some(raw) = engine.gateway.fetch(&record.id).await? else {
        // Without the message we cannot move its labels either, so skip.
        warn!(message_id = %record.id, "message no longer in mailbox; skipping");
        return Ok(false);
    };

    let features = extract_features(&raw)?;
    let input = format_model_input(&features, &engine.settings.self_addresses);
    let prediction = engine.classifier.predict(&input).await?;

    if !known.iter().any(|category| *category == prediction.category) {
        return Err(JobError::UnknownCategory(prediction.category));
    }

    if prediction.category == record.predicted_category {
        return Ok(false);
    }

    info!(
        message_id = %record.id,
        from = %record.predicted_category,
        to = %prediction.category,
        confidence = prediction.confidence,
        "reclassification changed prediction"
    );

    engine
        .gateway
        .remove_label(&record.id, &record.predicted_category)
        .await?;
    engine
        .gateway
        .add_label(&record.id, &prediction.category)
        .await?;

    engine
        .journal
        .upsert(NewRecord {
            id: record.id.clone(),
            // Keep the original timestamp; only the prediction moved.
            received_at: record.received_at,
            sender: none_if_empty(features.sender),
            recipient: none_if_empty(features.recipient),
            cc: none_if_empty(features.cc),
            subject: none_if_empty(features.subject),
            body: none_if_empty(features.body),
            mass_mail: features.mass_mail,
            attachment_kinds: features.attachment_kinds,
            predicted_category: prediction.category,
            confidence: prediction.confidence,
        })
        .await?;

    Ok(true)
}
