//! Outgoing message types, address validation, and MIME construction.

use lettre::address::Envelope;
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, DispatchError};

/// Send request as decoded from the HTTP body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRequest {
    /// Optional sender; empty means the provider's default identity.
    #[serde(default)]
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// An accepted message waiting for (or undergoing) delivery.
///
/// Built only through [`Message::from_request`], so the recipient (and an
/// explicit sender) have passed address validation. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub sender: Option<String>,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Envelope plus wire bytes for one transport call.
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    pub envelope: Envelope,
    pub raw: Vec<u8>,
}

/// Check that `address` is a syntactically well-formed mailbox.
///
/// Accepts both `user@example.com` and `Name <user@example.com>`. No DNS or
/// mailbox-existence checks are made.
pub fn validate_address(address: &str) -> bool {
    parse_mailbox(address).is_some()
}

fn parse_mailbox(address: &str) -> Option<Mailbox> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<Mailbox>().ok()
}

impl Message {
    /// Validate a request and turn it into an immutable message.
    pub fn from_request(id: u64, request: EmailRequest) -> Result<Self, DispatchError> {
        if !validate_address(&request.to) {
            return Err(DispatchError::InvalidAddress {
                field: "recipient",
                value: request.to,
            });
        }

        let sender = match request.from.trim() {
            "" => None,
            from if validate_address(from) => Some(from.to_string()),
            _ => {
                return Err(DispatchError::InvalidAddress {
                    field: "sender",
                    value: request.from,
                })
            }
        };

        Ok(Self {
            id,
            sender,
            recipient: request.to.trim().to_string(),
            subject: request.subject,
            body: request.body,
        })
    }

    /// Resolve the effective sender and build the envelope and MIME document.
    ///
    /// `default_sender` is used when the message carries no explicit sender.
    pub fn prepare(&self, default_sender: &str) -> Result<PreparedMessage, DeliveryError> {
        let from_raw = self.sender.as_deref().unwrap_or(default_sender);
        let from = parse_mailbox(from_raw)
            .ok_or_else(|| DeliveryError::InvalidSender(from_raw.to_string()))?;
        let to = parse_mailbox(&self.recipient)
            .ok_or_else(|| DeliveryError::InvalidRecipient(self.recipient.clone()))?;

        let envelope = Envelope::new(Some(from.email.clone()), vec![to.email.clone()])
            .map_err(|_| DeliveryError::InvalidRecipient(self.recipient.clone()))?;

        let raw = build_mime(&from, &to, &self.subject, &self.body);

        Ok(PreparedMessage { envelope, raw })
    }
}

/// Build the HTML MIME document with CRLF line endings.
fn build_mime(from: &Mailbox, to: &Mailbox, subject: &str, body: &str) -> Vec<u8> {
    let mut doc = String::with_capacity(body.len() + 256);
    doc.push_str("MIME-Version: 1.0\r\n");
    doc.push_str("Content-Type: text/html; charset=\"UTF-8\"\r\n");
    doc.push_str(&format!("From: {}\r\n", from));
    doc.push_str(&format!("To: {}\r\n", to));
    doc.push_str(&format!("Subject: {}\r\n", header_value(subject)));
    doc.push_str("\r\n");
    doc.push_str(&normalize_line_endings(body));
    doc.push_str("\r\n");
    doc.into_bytes()
}

/// Header values must stay on one line.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn normalize_line_endings(body: &str) -> String {
    body.replace("\r\n", "\n").replace('\n', "\r\n")
}
