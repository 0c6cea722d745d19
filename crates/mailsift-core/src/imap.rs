use std::collections::{HashMap, HashSet};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use native_tls::TlsStream;
use regex::Regex;
use tracing::warn;

use crate::config::ImapConfig;
use crate::gateway::{GatewayError, MailGateway};

type ImapSession = imap::Session<TlsStream<TcpStream>>;

// Gmail exposes stable message ids and label sets through the X-GM-MSGID and
// X-GM-LABELS fetch attributes. Those are not part of the standard fetch
// grammar, so the metadata responses are read raw and picked apart here.
static FETCH_SEQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\* (\d+) FETCH").expect("valid regex"));
static X_GM_MSGID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"X-GM-MSGID (\d+)").expect("valid regex"));
static X_GM_LABELS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"X-GM-LABELS \(((?:[^()"]+|"(?:\\.|[^"\\])*")*)\)"#).expect("valid regex")
});
static LABEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"\\]*(?:\\.[^"\\]*)*)"|([^"\s()]+)"#).expect("valid regex")
});

/// Gmail-IMAP implementation of [`MailGateway`].
///
/// The underlying `imap` session is blocking; every operation hops onto the
/// blocking thread pool and reconnects lazily when the cached session has
/// gone stale.
pub struct ImapGateway {
    config: ImapConfig,
    session: Arc<Mutex<Option<ImapSession>>>,
}

impl ImapGateway {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_session<T, F>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce(&mut ImapSession, &ImapConfig) -> Result<T, GatewayError> + Send + 'static,
        T: Send + 'static,
    {
        let config = self.config.clone();
        let slot = Arc::clone(&self.session);

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| GatewayError::Connection("imap session lock poisoned".into()))?;
            ensure_session(&mut guard, &config)?;

            let result = match guard.as_mut() {
                Some(session) => op(session, &config),
                None => Err(GatewayError::Connection("imap session unavailable".into())),
            };

            // A connection-level failure invalidates the cached session so
            // the next call reconnects instead of reusing a dead socket.
            if matches!(result, Err(GatewayError::Connection(_))) {
                *guard = None;
            }
            result
        })
        .await
        .map_err(|err| GatewayError::Connection(format!("imap worker task failed: {err}")))?
    }
}

fn ensure_session(
    slot: &mut Option<ImapSession>,
    config: &ImapConfig,
) -> Result<(), GatewayError> {
    if let Some(session) = slot.as_mut() {
        if session.noop().is_ok() {
            return Ok(());
        }
        *slot = None;
    }

    let tls = native_tls::TlsConnector::builder()
        .build()
        .map_err(|err| GatewayError::Connection(format!("tls setup failed: {err}")))?;
    let client = imap::connect(
        (config.server.as_str(), config.port),
        config.server.as_str(),
        &tls,
    )
    .map_err(map_imap_error)?;

    let mut session = client
        .login(config.user.as_str(), config.password.as_str())
        .map_err(|(err, _)| GatewayError::Auth(err.to_string()))?;
    session.select("INBOX").map_err(map_imap_error)?;

    *slot = Some(session);
    Ok(())
}

fn map_imap_error(err: imap::Error) -> GatewayError {
    match err {
        imap::Error::Io(err) => GatewayError::Connection(err.to_string()),
        imap::Error::ConnectionLost => GatewayError::Connection("connection lost".into()),
        imap::Error::TlsHandshake(err) => GatewayError::Connection(err.to_string()),
        imap::Error::Tls(err) => GatewayError::Connection(err.to_string()),
        imap::Error::No(msg) => GatewayError::Protocol(format!("server rejected command: {msg}")),
        imap::Error::Bad(msg) => GatewayError::Protocol(format!("malformed command: {msg}")),
        other => GatewayError::Protocol(other.to_string()),
    }
}

/// Parse one `* <seq> FETCH (X-GM-MSGID … X-GM-LABELS (…))` response line.
fn parse_metadata_line(line: &str) -> Option<(u32, String, Vec<String>)> {
    let seq = FETCH_SEQ
        .captures(line)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())?;
    let gmail_id = X_GM_MSGID
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())?;
    let labels = X_GM_LABELS
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|m| parse_label_tokens(m.as_str()))
        .unwrap_or_default();
    Some((seq, gmail_id, labels))
}

fn parse_label_tokens(labels: &str) -> Vec<String> {
    LABEL_TOKEN
        .captures_iter(labels)
        .filter_map(|captures| {
            if let Some(quoted) = captures.get(1) {
                Some(quoted.as_str().replace("\\\"", "\"").replace("\\\\", "\\"))
            } else {
                captures.get(2).map(|m| m.as_str().to_string())
            }
        })
        .collect()
}

/// `SEARCH OR` takes exactly two keys, so n keys need n-1 chained ORs:
/// `OR OR X-GM-MSGID a X-GM-MSGID b X-GM-MSGID c`.
fn or_msgid_criteria(ids: &[String]) -> String {
    if ids.len() == 1 {
        return format!("X-GM-MSGID {}", ids[0]);
    }
    let prefixes = "OR ".repeat(ids.len() - 1);
    let keys = ids
        .iter()
        .map(|id| format!("X-GM-MSGID {id}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{prefixes}{keys}")
}

fn quote_label(label: &str) -> String {
    if label.contains(' ') {
        format!("\"{label}\"")
    } else {
        label.to_string()
    }
}

fn uid_for(session: &mut ImapSession, gmail_id: &str) -> Result<Option<u32>, GatewayError> {
    let uids = session
        .uid_search(format!("X-GM-MSGID {gmail_id}"))
        .map_err(map_imap_error)?;
    Ok(uids.into_iter().max())
}

fn store_labels(
    session: &mut ImapSession,
    gmail_id: &str,
    flag: char,
    label: &str,
) -> Result<(), GatewayError> {
    let Some(uid) = uid_for(session, gmail_id)? else {
        warn!(message_id = %gmail_id, label, "message not found for label change; skipping");
        return Ok(());
    };

    session
        .run_command_and_read_response(&format!(
            "UID STORE {uid} {flag}X-GM-LABELS ({})",
            quote_label(label)
        ))
        .map_err(map_imap_error)?;
    Ok(())
}

#[async_trait]
impl MailGateway for ImapGateway {
    async fn list_unclassified(
        &self,
        known_categories: &[String],
        limit: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, GatewayError> {
        let known: HashSet<String> = known_categories.iter().cloned().collect();

        self.with_session(move |session, config| {
            let batch_size = config.batch_size.max(1);

            let mut seqs: Vec<u32> = session
                .search("UNSEEN")
                .map_err(map_imap_error)?
                .into_iter()
                .collect();
            // Highest sequence numbers are the newest messages.
            seqs.sort_unstable_by(|a, b| b.cmp(a));

            // Phase 1: metadata-only scan, no bodies. Collect qualifying
            // (sequence, gmail id) pairs until the limit is reached.
            let mut qualifying: Vec<(u32, String)> = Vec::new();
            'scan: for chunk in seqs.chunks(batch_size) {
                let set = chunk
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let response = session
                    .run_command_and_read_response(&format!(
                        "FETCH {set} (X-GM-MSGID X-GM-LABELS)"
                    ))
                    .map_err(map_imap_error)?;

                let text = String::from_utf8_lossy(&response);
                for line in text.lines() {
                    let Some((seq, gmail_id, labels)) = parse_metadata_line(line) else {
                        continue;
                    };
                    if labels.iter().any(|label| known.contains(label)) {
                        continue;
                    }
                    qualifying.push((seq, gmail_id));
                    if qualifying.len() >= limit {
                        break 'scan;
                    }
                }
            }

            if qualifying.is_empty() {
                return Ok(Vec::new());
            }
            // Fetch responses arrive in server order; restore newest-first.
            qualifying.sort_unstable_by(|a, b| b.0.cmp(&a.0));

            // Phase 2: bodies for the qualifying messages only.
            let mut bodies: HashMap<u32, Vec<u8>> = HashMap::new();
            for chunk in qualifying.chunks(batch_size) {
                let set = chunk
                    .iter()
                    .map(|(seq, _)| seq.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let fetches = session
                    .fetch(&set, "BODY.PEEK[]")
                    .map_err(map_imap_error)?;
                for fetch in fetches.iter() {
                    if let Some(body) = fetch.body() {
                        bodies.insert(fetch.message, body.to_vec());
                    }
                }
            }

            Ok(qualifying
                .iter()
                .filter_map(|(seq, gmail_id)| {
                    bodies.remove(seq).map(|body| (gmail_id.clone(), body))
                })
                .collect())
        })
        .await
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let id = id.to_string();
        self.with_session(move |session, _config| {
            let Some(uid) = uid_for(session, &id)? else {
                return Ok(None);
            };
            let fetches = session
                .uid_fetch(uid.to_string(), "BODY.PEEK[]")
                .map_err(map_imap_error)?;
            Ok(fetches
                .iter()
                .next()
                .and_then(|fetch| fetch.body())
                .map(|body| body.to_vec()))
        })
        .await
    }

    async fn labels_of(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, GatewayError> {
        let ids: Vec<String> = ids.to_vec();
        self.with_session(move |session, config| {
            let batch_size = config.batch_size.max(1);
            let requested: HashSet<&String> = ids.iter().collect();

            // SEARCH only returns matching UIDs, with no mapping back to the
            // search keys, so X-GM-MSGID is fetched again to rebuild it.
            let mut uids: Vec<u32> = Vec::new();
            for chunk in ids.chunks(batch_size) {
                if chunk.is_empty() {
                    continue;
                }
                let found = session
                    .uid_search(or_msgid_criteria(chunk))
                    .map_err(map_imap_error)?;
                uids.extend(found);
            }

            let mut results = HashMap::new();
            for chunk in uids.chunks(batch_size) {
                if chunk.is_empty() {
                    continue;
                }
                let set = chunk
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let response = session
                    .run_command_and_read_response(&format!(
                        "UID FETCH {set} (X-GM-MSGID X-GM-LABELS)"
                    ))
                    .map_err(map_imap_error)?;

                let text = String::from_utf8_lossy(&response);
                for line in text.lines() {
                    let Some((_seq, gmail_id, labels)) = parse_metadata_line(line) else {
                        continue;
                    };
                    if requested.contains(&gmail_id) {
                        results.insert(gmail_id, labels);
                    }
                }
            }

            Ok(results)
        })
        .await
    }

    async fn add_label(&self, id: &str, category: &str) -> Result<(), GatewayError> {
        let id = id.to_string();
        let category = category.to_string();
        self.with_session(move |session, _config| store_labels(session, &id, '+', &category))
            .await
    }

    async fn remove_label(&self, id: &str, category: &str) -> Result<(), GatewayError> {
        let id = id.to_string();
        let category = category.to_string();
        self.with_session(move |session, _config| store_labels(session, &id, '-', &category))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metadata_line_with_quoted_and_atom_labels() {
        let line = r#"* 12 FETCH (X-GM-MSGID 1234567890 X-GM-LABELS ("My Label" FOCUS "\\Inbox"))"#;
        let (seq, gmail_id, labels) = parse_metadata_line(line).expect("parse");
        assert_eq!(seq, 12);
        assert_eq!(gmail_id, "1234567890");
        assert_eq!(labels, vec!["My Label", "FOCUS", "\\Inbox"]);
    }

    #[test]
    fn parses_metadata_line_without_labels() {
        let line = "* 3 FETCH (X-GM-MSGID 42 X-GM-LABELS ())";
        let (seq, gmail_id, labels) = parse_metadata_line(line).expect("parse");
        assert_eq!(seq, 3);
        assert_eq!(gmail_id, "42");
        assert!(labels.is_empty());
    }

    #[test]
    fn ignores_lines_without_msgid() {
        assert!(parse_metadata_line("* 3 FETCH (FLAGS (\\Seen))").is_none());
        assert!(parse_metadata_line("a4 OK FETCH completed").is_none());
    }

    #[test]
    fn unescapes_quoted_labels() {
        let labels = parse_label_tokens(r#""with \"quotes\"" plain"#);
        assert_eq!(labels, vec!["with \"quotes\"", "plain"]);
    }

    #[test]
    fn or_criteria_for_single_id_has_no_prefix() {
        assert_eq!(
            or_msgid_criteria(&["1".to_string()]),
            "X-GM-MSGID 1".to_string()
        );
    }

    #[test]
    fn or_criteria_chains_n_minus_one_ors() {
        let ids = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        assert_eq!(
            or_msgid_criteria(&ids),
            "OR OR X-GM-MSGID 1 X-GM-MSGID 2 X-GM-MSGID 3"
        );
    }

    #[test]
    fn labels_with_spaces_are_quoted_for_store() {
        assert_eq!(quote_label("FOCUS"), "FOCUS");
        assert_eq!(quote_label("My Label"), "\"My Label\"");
    }
}
