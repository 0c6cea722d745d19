use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::classifier::Classifier;
use crate::gateway::MailGateway;
use crate::jobs::{self, RecheckReport, ReclassifyReport, RunSummary};
use crate::journal::{Journal, JournalError, MessageRecord};
use crate::training::TrainingEmitter;

/// Static knobs the jobs need beyond their collaborators.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// The mailbox owner's addresses, lowercased. Drives role detection.
    pub self_addresses: Vec<String>,
    /// Sentinel label the operator applies to affirm a prediction.
    pub verification_label: String,
}

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("unknown message id: {0}")]
    UnknownMessage(String),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// The classification engine: journal, gateway, classifier, corpus writer and
/// the process-wide job permit, built once at startup and threaded through
/// every operation.
///
/// The permit serialises {ingest, recheck, reclassify}: acquisition is
/// non-blocking and a contender that loses simply reports `skipped`. The
/// guard is held across the whole pass, so it is released on every exit path
/// including panics.
pub struct Engine {
    pub(crate) journal: Journal,
    pub(crate) gateway: Arc<dyn MailGateway>,
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) emitter: TrainingEmitter,
    pub(crate) settings: EngineSettings,
    permit: Semaphore,
}

impl Engine {
    pub fn new(
        journal: Journal,
        gateway: Arc<dyn MailGateway>,
        classifier: Arc<dyn Classifier>,
        emitter: TrainingEmitter,
        settings: EngineSettings,
    ) -> Self {
        Self {
            journal,
            gateway,
            classifier,
            emitter,
            settings,
            permit: Semaphore::new(1),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// The classifier's category set as of now. Jobs snapshot this once at
    /// start; a model swap mid-job is never observed.
    pub fn categories(&self) -> Vec<String> {
        self.classifier.categories()
    }

    /// Classify up to `limit` currently-unclassified messages.
    pub async fn run_ingest(&self, limit: usize) -> RunSummary {
        let Ok(_permit) = self.permit.try_acquire() else {
            warn!("another job is already running; skipping ingest");
            return RunSummary::skipped();
        };
        jobs::ingest::run(self, limit).await
    }

    /// Reconcile up to `limit` previously-classified messages against their
    /// current server-side label sets.
    pub async fn run_recheck(&self, limit: usize) -> RecheckReport {
        let Ok(_permit) = self.permit.try_acquire() else {
            warn!("another job is already running; skipping recheck");
            return RecheckReport::skipped();
        };
        jobs::recheck::run(self, limit).await
    }

    /// Re-predict up to `limit` uncorrected journal records against the
    /// current model, moving server labels where the prediction changed.
    pub async fn run_reclassify(&self, limit: usize) -> ReclassifyReport {
        let Ok(_permit) = self.permit.try_acquire() else {
            warn!("another job is already running; skipping reclassify");
            return ReclassifyReport::skipped();
        };
        jobs::reclassify::run(self, limit).await
    }

    /// Operator-supplied correction: the same pathway reconciliation uses.
    /// The training example is emitted from the journaled record as it stood
    /// before the correction.
    pub async fn apply_correction(
        &self,
        id: &str,
        category: &str,
    ) -> Result<MessageRecord, CorrectionError> {
        let known = self.classifier.categories();
        if !known.iter().any(|c| c == category) {
            return Err(CorrectionError::UnknownCategory(category.to_string()));
        }

        let Some(record) = self.journal.get_by_id(id).await? else {
            return Err(CorrectionError::UnknownMessage(id.to_string()));
        };

        self.journal.set_correction(id, category).await?;
        if let Err(err) = self.emitter.append(category, &record).await {
            // The journal is authoritative; the corpus can be regenerated.
            warn!(message_id = %id, error = %err, "failed to append training example");
        }

        Ok(record)
    }
}
