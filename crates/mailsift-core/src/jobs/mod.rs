use serde::Serialize;
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::features::FeatureError;
use crate::gateway::GatewayError;
use crate::journal::JournalError;

pub(crate) mod ingest;
pub(crate) mod recheck;
pub(crate) mod reclassify;

pub use recheck::{Reconciliation, RecheckReport, reconcile};
pub use reclassify::ReclassifyReport;

/// Whether a job actually ran or was turned away by the permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Skipped,
}

/// Per-message result of an ingest pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    pub id: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub category: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub processed_count: usize,
    pub details: Vec<RunDetail>,
}

impl RunSummary {
    pub(crate) fn skipped() -> Self {
        Self {
            status: RunStatus::Skipped,
            processed_count: 0,
            details: Vec::new(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            status: RunStatus::Success,
            processed_count: 0,
            details: Vec::new(),
        }
    }
}

/// Everything that can go wrong while processing a single message. Jobs log
/// these and move on to the next message; they never abort the batch.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("category {0} is not in the classifier's label set")]
    UnknownCategory(String),
}

pub(crate) fn none_if_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Auth-class gateway failures will hit every remaining message too, so the
/// batch stops instead of hammering the server.
pub(crate) fn is_fatal(err: &JobError) -> bool {
    matches!(err, JobError::Gateway(gateway_err) if gateway_err.is_fatal())
}
