use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::jobs::{JobError, RunStatus, is_fatal};
use crate::journal::MessageRecord;

#[derive(Debug, Clone, Serialize)]
pub struct RecheckReport {
    pub status: RunStatus,
    pub checked: usize,
    pub updated: usize,
    pub ambiguous: usize,
}

impl RecheckReport {
    pub(crate) fn skipped() -> Self {
        Self {
            status: RunStatus::Skipped,
            checked: 0,
            updated: 0,
            ambiguous: 0,
        }
    }

    fn empty() -> Self {
        Self {
            status: RunStatus::Success,
            checked: 0,
            updated: 0,
            ambiguous: 0,
        }
    }
}

/// What the server-side label set means for one message, given the journaled
/// truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The user removed every trained label; nothing to learn from.
    Untouched,
    /// The single trained label matches the journaled truth.
    Unchanged,
    /// The user relabelled the message to `to`. `cleanup` means the old local
    /// label is still on the server and must be removed; `verified` means the
    /// verification sentinel accompanied the change.
    Correction {
        to: String,
        cleanup: bool,
        verified: bool,
    },
    /// The user affirmed the current truth with the verification sentinel.
    Verification { of: String },
    /// More than one plausible new label; surfaced to the operator, no side
    /// effects.
    Ambiguous { candidates: Vec<String> },
}

/// Classify a message's divergence from the journal.
///
/// `local` is the journaled truth (correction over prediction), `trained` the
/// server labels that belong to the classifier's category set, `verified`
/// whether the verification sentinel is present.
///
/// The engine never guesses which label to remove: cleanup only happens when
/// the old label is provably still present next to exactly one new one.
pub fn reconcile(local: &str, trained: &[String], verified: bool) -> Reconciliation {
    match trained.len() {
        0 => Reconciliation::Untouched,
        1 => {
            let candidate = &trained[0];
            if candidate == local {
                if verified {
                    Reconciliation::Verification {
                        of: candidate.clone(),
                    }
                } else {
                    Reconciliation::Unchanged
                }
            } else {
                // Only the new label is present, so the old one is already
                // gone and needs no cleanup.
                Reconciliation::Correction {
                    to: candidate.clone(),
                    cleanup: false,
                    verified,
                }
            }
        }
        _ => {
            let others: Vec<&String> = trained.iter().filter(|label| *label != local).collect();
            if others.len() == trained.len() {
                // The old label is gone but several new ones compete.
                return Reconciliation::Ambiguous {
                    candidates: trained.to_vec(),
                };
            }
            if others.len() == 1 {
                // {old, new}: the new label is the correction, the old one is
                // still on the server and gets cleaned up.
                return Reconciliation::Correction {
                    to: others[0].clone(),
                    cleanup: true,
                    verified,
                };
            }
            Reconciliation::Ambiguous {
                candidates: trained.to_vec(),
            }
        }
    }
}

/// One reconciliation pass over the gliding-scale candidate set.
pub(crate) async fn run(engine: &Engine, limit: usize) -> RecheckReport {
    let candidates = match engine.journal.select_recheck_candidates(limit).await {
        Ok(candidates) => candidates,
        Err(err) => {
            error!(error = %err, "failed to select recheck candidates; aborting pass");
            return RecheckReport::empty();
        }
    };
    if candidates.is_empty() {
        info!("no candidates for recheck");
        return RecheckReport::empty();
    }
    info!(count = candidates.len(), "checking messages for external corrections");

    let ids: Vec<String> = candidates.iter().map(|record| record.id.clone()).collect();
    let label_sets = match engine.gateway.labels_of(&ids).await {
        Ok(label_sets) => label_sets,
        Err(err) => {
            error!(error = %err, "failed to read server labels; aborting pass");
            return RecheckReport::empty();
        }
    };

    let known: HashSet<String> = engine.classifier.categories().into_iter().collect();

    let checked = candidates.len();
    let mut updated = 0;
    let mut ambiguous = 0;
    for record in candidates {
        match reconcile_candidate(engine, &record, &label_sets, &known).await {
            Ok(Outcome::Updated) => updated += 1,
            Ok(Outcome::Ambiguous) => ambiguous += 1,
            Ok(Outcome::Unchanged) => {}
            Err(err) => {
                if is_fatal(&err) {
                    error!(message_id = %record.id, error = %err, "fatal gateway error; aborting recheck pass");
                    break;
                }
                warn!(message_id = %record.id, error = %err, "failed to reconcile message; skipping");
            }
        }
    }

    info!(checked, updated, ambiguous, "recheck finished");
    RecheckReport {
        status: RunStatus::Success,
        checked,
        updated,
        ambiguous,
    }
}

enum Outcome {
    Updated,
    Ambiguous,
    Unchanged,
}

async fn reconcile_candidate(
    engine: &Engine,
    record: &MessageRecord,
    label_sets: &HashMap<String, Vec<String>>,
    known: &HashSet<String>,
) -> Result<Outcome, JobError> {
    let Some(present) = label_sets.get(&record.id) else {
        // Gone from the mailbox. Refresh the stamp so the candidate query
        // does not loop on it; an existing ambiguity flag is kept as-is.
        engine
            .journal
            .set_recheck(&record.id, record.ambiguous_candidates.as_deref())
            .await?;
        return Ok(Outcome::Unchanged);
    };

    let local = record.local_category().to_string();
    let trained: Vec<String> = present
        .iter()
        .filter(|label| known.contains(*label))
        .cloned()
        .collect();
    let verified = present
        .iter()
        .any(|label| *label == engine.settings.verification_label);

    match reconcile(&local, &trained, verified) {
        Reconciliation::Untouched | Reconciliation::Unchanged => {
            engine.journal.set_recheck(&record.id, None).await?;
            Ok(Outcome::Unchanged)
        }
        Reconciliation::Correction {
            to,
            cleanup,
            verified,
        } => {
            info!(message_id = %record.id, from = %local, to = %to, "detected external correction");
            engine.journal.set_correction(&record.id, &to).await?;
            emit_training(engine, &to, record).await;

            if cleanup {
                info!(message_id = %record.id, label = %local, "removing superseded label");
                engine.gateway.remove_label(&record.id, &local).await?;
            }
            if verified {
                engine
                    .gateway
                    .remove_label(&record.id, &engine.settings.verification_label)
                    .await?;
            }

            engine.journal.set_recheck(&record.id, None).await?;
            Ok(Outcome::Updated)
        }
        Reconciliation::Verification { of } => {
            info!(message_id = %record.id, category = %of, "user verified prediction");
            engine.journal.set_correction(&record.id, &of).await?;
            emit_training(engine, &of, record).await;
            engine
                .gateway
                .remove_label(&record.id, &engine.settings.verification_label)
                .await?;

            engine.journal.set_recheck(&record.id, None).await?;
            Ok(Outcome::Updated)
        }
        Reconciliation::Ambiguous { candidates } => {
            info!(message_id = %record.id, candidates = ?candidates, "ambiguous label set");
            engine
                .journal
                .set_recheck(&record.id, Some(&candidates))
                .await?;
            Ok(Outcome::Ambiguous)
        }
    }
}

/// At most one training example per message per pass: every terminal branch
/// calls this at most once. Append failures never roll the journal back.
async fn emit_training(engine: &Engine, category: &str, record: &MessageRecord) {
    if let Err(err) = engine.emitter.append(category, record).await {
        warn!(message_id = %record.id, error = %err, "failed to append training example");
    }
}
