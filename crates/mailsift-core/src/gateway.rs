use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway connection error: {0}")]
    Connection(String),
    #[error("gateway authentication failed: {0}")]
    Auth(String),
    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Fatal errors abort the whole job batch; everything else is retried by
    /// the next scheduled pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }
}

/// The mailbox operations the engine consumes. Any implementation satisfying
/// this contract is substitutable; the production binding is IMAP.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Unread messages whose server-side label set contains none of
    /// `known_categories`, newest first, at most `limit`. Returns
    /// `(message id, raw RFC-822 bytes)` pairs.
    async fn list_unclassified(
        &self,
        known_categories: &[String],
        limit: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, GatewayError>;

    /// Raw bytes of one message, `None` if it is gone from the mailbox.
    async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>, GatewayError>;

    /// Current label set per message. Ids missing from the result are absent
    /// from the mailbox.
    async fn labels_of(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, GatewayError>;

    /// Idempotent: labelling an already-labelled message is a no-op.
    async fn add_label(&self, id: &str, category: &str) -> Result<(), GatewayError>;

    /// Idempotent: removing an absent label is a no-op.
    async fn remove_label(&self, id: &str, category: &str) -> Result<(), GatewayError>;
}

#[derive(Default)]
struct MockGatewayState {
    unclassified: Vec<(String, Vec<u8>)>,
    bodies: HashMap<String, Vec<u8>>,
    labels: HashMap<String, Vec<String>>,
    added: Vec<(String, String)>,
    removed: Vec<(String, String)>,
    fail_add_for: HashSet<String>,
    fail_listing: bool,
}

/// In-memory gateway for tests. Label writes are reflected in the visible
/// label sets, so a labelled message drops out of the unclassified listing
/// the way a real mailbox behaves.
#[derive(Default, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockGatewayState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_unclassified(&self, id: &str, raw: &[u8]) {
        let mut state = self.state.lock().expect("lock state");
        state.unclassified.push((id.to_string(), raw.to_vec()));
        state.bodies.insert(id.to_string(), raw.to_vec());
    }

    pub fn set_body(&self, id: &str, raw: &[u8]) {
        let mut state = self.state.lock().expect("lock state");
        state.bodies.insert(id.to_string(), raw.to_vec());
    }

    pub fn set_labels(&self, id: &str, labels: &[&str]) {
        let mut state = self.state.lock().expect("lock state");
        state
            .labels
            .insert(id.to_string(), labels.iter().map(|l| l.to_string()).collect());
    }

    /// Make `add_label` fail for one id with a protocol error.
    pub fn fail_add_label_for(&self, id: &str) {
        let mut state = self.state.lock().expect("lock state");
        state.fail_add_for.insert(id.to_string());
    }

    /// Make the next `list_unclassified` fail with a connection error.
    pub fn fail_listing(&self) {
        let mut state = self.state.lock().expect("lock state");
        state.fail_listing = true;
    }

    pub fn added_labels(&self) -> Vec<(String, String)> {
        self.state.lock().expect("lock state").added.clone()
    }

    pub fn removed_labels(&self) -> Vec<(String, String)> {
        self.state.lock().expect("lock state").removed.clone()
    }

    pub fn labels(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .expect("lock state")
            .labels
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MailGateway for MockGateway {
    async fn list_unclassified(
        &self,
        known_categories: &[String],
        limit: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, GatewayError> {
        let mut state = self.state.lock().expect("lock state");
        if state.fail_listing {
            state.fail_listing = false;
            return Err(GatewayError::Connection("mock listing failure".into()));
        }

        let known: HashSet<&String> = known_categories.iter().collect();
        Ok(state
            .unclassified
            .iter()
            .filter(|(id, _)| {
                state
                    .labels
                    .get(id)
                    .map(|labels| labels.iter().all(|label| !known.contains(label)))
                    .unwrap_or(true)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let state = self.state.lock().expect("lock state");
        Ok(state.bodies.get(id).cloned())
    }

    async fn labels_of(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, GatewayError> {
        let state = self.state.lock().expect("lock state");
        Ok(ids
            .iter()
            .filter_map(|id| state.labels.get(id).map(|labels| (id.clone(), labels.clone())))
            .collect())
    }

    async fn add_label(&self, id: &str, category: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("lock state");
        if state.fail_add_for.contains(id) {
            return Err(GatewayError::Protocol(format!(
                "mock add_label failure for {id}"
            )));
        }
        state.added.push((id.to_string(), category.to_string()));
        let labels = state.labels.entry(id.to_string()).or_default();
        if !labels.iter().any(|label| label == category) {
            labels.push(category.to_string());
        }
        Ok(())
    }

    async fn remove_label(&self, id: &str, category: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("lock state");
        state.removed.push((id.to_string(), category.to_string()));
        if let Some(labels) = state.labels.get_mut(id) {
            labels.retain(|label| label != category);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn labelled_messages_drop_out_of_unclassified_listing() {
        let gateway = MockGateway::new();
        gateway.queue_unclassified("m1", b"raw");
        gateway.queue_unclassified("m2", b"raw");

        let known = vec!["FOCUS".to_string()];
        let listed = gateway
            .list_unclassified(&known, 10)
            .await
            .expect("listing");
        assert_eq!(listed.len(), 2);

        gateway.add_label("m1", "FOCUS").await.expect("add label");
        let listed = gateway
            .list_unclassified(&known, 10)
            .await
            .expect("listing");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "m2");
    }

    #[tokio::test]
    async fn labels_of_omits_unknown_ids() {
        let gateway = MockGateway::new();
        gateway.set_labels("m1", &["FOCUS"]);

        let labels = gateway
            .labels_of(&["m1".to_string(), "gone".to_string()])
            .await
            .expect("labels_of");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["m1"], vec!["FOCUS"]);
    }

    #[tokio::test]
    async fn remove_label_is_idempotent() {
        let gateway = MockGateway::new();
        gateway.set_labels("m1", &["FOCUS"]);

        gateway.remove_label("m1", "FOCUS").await.expect("remove");
        gateway
            .remove_label("m1", "FOCUS")
            .await
            .expect("second remove is a no-op");
        assert!(gateway.labels("m1").is_empty());
    }
}
