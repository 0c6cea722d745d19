use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use thiserror::Error;

/// Structured features extracted from one raw RFC-822 message. This is the
/// classifier's entire view of a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFeatures {
    pub sender: String,
    pub recipient: String,
    pub cc: String,
    pub subject: String,
    pub body: String,
    pub mass_mail: bool,
    pub attachment_kinds: Vec<String>,
    pub received_at: Option<DateTime<Utc>>,
}

/// The configured user's position in a message's envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Direct,
    Cc,
    Hidden,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Direct => "Direct",
            Role::Cc => "CC",
            Role::Hidden => "Hidden",
        }
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("malformed message: {0}")]
    Parse(#[from] mailparse::MailParseError),
}

/// Whether one of the user's addresses appears in the To header (Direct),
/// the Cc header (CC), or neither (Hidden: bcc, mailing list, ...).
///
/// The match is a case-insensitive substring check against the raw header
/// value, without address parsing. An address showing up inside a display
/// name counts as a hit. Training data was produced with this exact rule, so
/// inference must keep it.
pub fn determine_role(to: &str, cc: &str, self_addresses: &[String]) -> Role {
    let to_lower = to.to_lowercase();
    let cc_lower = cc.to_lowercase();

    for address in self_addresses {
        let address = address.trim().to_lowercase();
        if address.is_empty() {
            continue;
        }
        if to_lower.contains(&address) {
            return Role::Direct;
        }
    }

    for address in self_addresses {
        let address = address.trim().to_lowercase();
        if address.is_empty() {
            continue;
        }
        if cc_lower.contains(&address) {
            return Role::Cc;
        }
    }

    Role::Hidden
}

/// Parse a raw message into classification features.
pub fn extract_features(raw: &[u8]) -> Result<MessageFeatures, FeatureError> {
    let parsed = mailparse::parse_mail(raw)?;

    let sender = parsed.headers.get_first_value("From").unwrap_or_default();
    let recipient = parsed.headers.get_first_value("To").unwrap_or_default();
    let cc = parsed.headers.get_first_value("Cc").unwrap_or_default();
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let mass_mail = parsed
        .headers
        .get_first_value("List-Unsubscribe")
        .is_some();

    let received_at = parsed
        .headers
        .get_first_value("Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    let mut body = String::new();
    let mut attachment_kinds = Vec::new();

    if parsed.subparts.is_empty() {
        body = parsed.get_body()?;
    } else {
        collect_parts(&parsed, &mut body, &mut attachment_kinds)?;
    }

    Ok(MessageFeatures {
        sender,
        recipient,
        cc,
        subject,
        body,
        mass_mail,
        attachment_kinds: dedup_preserving_order(attachment_kinds),
        received_at,
    })
}

/// Walk all subparts collecting attachment extension tags and the first
/// text/plain body.
fn collect_parts(
    mail: &ParsedMail<'_>,
    body: &mut String,
    attachment_kinds: &mut Vec<String>,
) -> Result<(), FeatureError> {
    for part in &mail.subparts {
        let disposition = part.get_content_disposition();

        if disposition.disposition == DispositionType::Attachment {
            if let Some(kind) = attachment_kind(part, disposition.params.get("filename")) {
                attachment_kinds.push(kind);
            }
        } else if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") && body.is_empty() {
            *body = part.get_body()?;
        }

        collect_parts(part, body, attachment_kinds)?;
    }
    Ok(())
}

/// Uppercase extension tag for an attachment part. Taken from the filename
/// when present, otherwise inferred from the declared MIME type.
fn attachment_kind(part: &ParsedMail<'_>, filename: Option<&String>) -> Option<String> {
    if let Some(filename) = filename {
        let ext = filename.rsplit_once('.').map(|(_, ext)| ext)?;
        if ext.is_empty() {
            return None;
        }
        return Some(ext.to_uppercase());
    }

    mime_guess::get_mime_extensions_str(&part.ctype.mimetype)
        .and_then(|extensions| extensions.first())
        .map(|ext| ext.to_uppercase())
}

fn dedup_preserving_order(kinds: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    kinds
        .into_iter()
        .filter(|kind| seen.insert(kind.clone()))
        .collect()
}

fn format_attachment_kinds(kinds: &[String]) -> String {
    if kinds.is_empty() {
        return "None".to_string();
    }
    format!("[{}]", kinds.join(", "))
}

/// Build the classifier input string. This is the single source of truth for
/// the input shape: training and inference both go through it, byte for byte.
pub fn format_model_input(features: &MessageFeatures, self_addresses: &[String]) -> String {
    let role = determine_role(&features.recipient, &features.cc, self_addresses);
    let mass_mail = if features.mass_mail { "Yes" } else { "No" };
    let attachments = format_attachment_kinds(&features.attachment_kinds);

    format!(
        "passage: Role: {} | Mass Mail: {} | Attachment Types: {} | From: {} | To: {} | Subject: {} | Body: {}",
        role.as_str(),
        mass_mail,
        attachments,
        features.sender,
        features.recipient,
        features.subject,
        features.body,
    )
}
