use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single classification decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub category: String,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read label mapping: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid label mapping: {0}")]
    Json(#[from] serde_json::Error),
    #[error("classifier returned a label outside its category set: {0}")]
    UnknownLabel(String),
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// The trained text classifier, reduced to the two capabilities the engine
/// needs. Implementations must be deterministic for a fixed model snapshot.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one formatted input string.
    async fn predict(&self, input: &str) -> Result<Prediction, ClassifierError>;

    /// The closed category set of the loaded model. Jobs snapshot this once
    /// at start and never observe a mid-job model swap.
    fn categories(&self) -> Vec<String>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    label: String,
    score: f64,
}

/// Production classifier: categories come from the model directory's
/// `label_mapping.json` (the artifact training writes), predictions from the
/// local inference sidecar serving the same model.
#[derive(Debug)]
pub struct HttpClassifier {
    http: reqwest::Client,
    endpoint: String,
    categories: Vec<String>,
}

impl HttpClassifier {
    pub fn load(
        model_dir: &Path,
        endpoint: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self, ClassifierError> {
        let raw = std::fs::read_to_string(model_dir.join("label_mapping.json"))?;
        let mapping: HashMap<String, String> = serde_json::from_str(&raw)?;

        let mut categories: Vec<String> = mapping.into_values().collect();
        categories.sort();
        categories.dedup();

        let endpoint: String = endpoint.into();
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            categories,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn predict(&self, input: &str) -> Result<Prediction, ClassifierError> {
        let response = self
            .http
            .post(format!("{}/predict", self.endpoint))
            .json(&PredictRequest { input })
            .send()
            .await?
            .error_for_status()?;

        let body: PredictResponse = response.json().await?;
        if !self.categories.contains(&body.label) {
            return Err(ClassifierError::UnknownLabel(body.label));
        }

        Ok(Prediction {
            category: body.label,
            confidence: body.score,
        })
    }

    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }
}

/// Scripted classifier for tests: a fixed category set and a queue of
/// predictions returned in order.
#[derive(Default, Clone)]
pub struct MockClassifier {
    categories: Vec<String>,
    responses: Arc<Mutex<VecDeque<Result<Prediction, ClassifierError>>>>,
    call_count: Arc<AtomicUsize>,
}

impl MockClassifier {
    pub fn with_categories(categories: &[&str]) -> Self {
        Self {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn enqueue(&self, response: Result<Prediction, ClassifierError>) {
        let mut guard = self.responses.lock().expect("lock responses");
        guard.push_back(response);
    }

    pub fn enqueue_prediction(&self, category: &str, confidence: f64) {
        self.enqueue(Ok(Prediction {
            category: category.to_string(),
            confidence,
        }));
    }

    /// Number of times `predict` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn predict(&self, _input: &str) -> Result<Prediction, ClassifierError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.responses.lock().expect("lock responses");
        guard.pop_front().unwrap_or_else(|| {
            Err(ClassifierError::Unavailable(
                "mock prediction not provided".to_string(),
            ))
        })
    }

    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }
}
