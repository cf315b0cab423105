use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use scraper::Html;
use serde::Deserialize;
use thiserror::Error;

use crate::models::FetchedEmail;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Bodies are truncated to this many characters before classification to
/// bound per-message LLM cost.
pub const BODY_EXCERPT_LIMIT: usize = 2000;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("access token expired or revoked")]
    AuthExpired,
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("rate limited by the Gmail API")]
    RateLimited,
    #[error("Gmail API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
}

/// The mailbox side of the pipeline: list message IDs for a search query,
/// then fetch one message with its body extracted.
pub trait Mailbox {
    fn list_messages(&self, query: &str, max_results: u32) -> Result<Vec<String>, MailboxError>;
    fn get_message(&self, id: &str) -> Result<FetchedEmail, MailboxError>;
}

// --- Gmail API wire types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

// --- Client ---

pub struct GmailClient {
    client: reqwest::blocking::Client,
    access_token: String,
}

impl GmailClient {
    pub fn new(access_token: String) -> Result<Self, MailboxError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            access_token,
        })
    }

    fn check_status(
        &self,
        response: reqwest::blocking::Response,
        context: &str,
    ) -> Result<reqwest::blocking::Response, MailboxError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MailboxError::AuthExpired);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MailboxError::NotFound(context.to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MailboxError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(MailboxError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

impl Mailbox for GmailClient {
    fn list_messages(&self, query: &str, max_results: u32) -> Result<Vec<String>, MailboxError> {
        let max_results = max_results.to_string();
        let response = self
            .client
            .get(format!("{}/messages", GMAIL_API_BASE))
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .send()?;
        let response = self.check_status(response, query)?;

        let list: MessageListResponse = response.json()?;
        Ok(list.messages.into_iter().map(|stub| stub.id).collect())
    }

    fn get_message(&self, id: &str) -> Result<FetchedEmail, MailboxError> {
        let response = self
            .client
            .get(format!("{}/messages/{}", GMAIL_API_BASE, id))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()?;
        let response = self.check_status(response, id)?;

        let detail: MessageDetail = response.json()?;
        Ok(fetched_from_detail(detail))
    }
}

fn fetched_from_detail(detail: MessageDetail) -> FetchedEmail {
    let headers = detail
        .payload
        .as_ref()
        .map(|p| &p.headers[..])
        .unwrap_or(&[]);

    let get_header = |name: &str| -> String {
        headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
            .unwrap_or_default()
    };

    let subject = get_header("Subject");
    let sender = get_header("From");
    let date = parse_message_date(Some(&get_header("Date")), detail.internal_date.as_deref());

    let body = detail
        .payload
        .as_ref()
        .and_then(extract_body)
        .unwrap_or_default();

    FetchedEmail {
        id: detail.id,
        subject,
        sender,
        date,
        snippet: detail.snippet,
        body: truncate_body(&body, BODY_EXCERPT_LIMIT),
    }
}

/// Best-effort plain text from a message payload: the direct body data if
/// present, else the first text/plain part (recursing into multiparts),
/// else the first text/html part with tags stripped.
fn extract_body(payload: &MessagePart) -> Option<String> {
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_ref()) {
        if let Some(text) = decode_body_data(data) {
            if payload.mime_type == "text/html" {
                return Some(html_to_text(&text));
            }
            return Some(text);
        }
    }
    if let Some(text) = find_part_text(payload, "text/plain") {
        return Some(text);
    }
    find_part_text(payload, "text/html").map(|html| html_to_text(&html))
}

fn find_part_text(part: &MessagePart, target_mime: &str) -> Option<String> {
    if part.mime_type == target_mime {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            if let Some(text) = decode_body_data(data) {
                return Some(text);
            }
        }
    }
    for child in &part.parts {
        if let Some(text) = find_part_text(child, target_mime) {
            return Some(text);
        }
    }
    None
}

/// Gmail body data is URL-safe base64 without padding.
fn decode_body_data(data: &str) -> Option<String> {
    match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data) {
        Ok(bytes) => String::from_utf8(bytes).ok(),
        Err(_) => None,
    }
}

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    // Collapse the whitespace soup HTML emails leave behind.
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_body(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }
    body.chars().take(limit).collect()
}

/// Message date from the RFC 2822 Date header, falling back to Gmail's
/// internalDate (epoch millis) when the header is missing or mangled.
fn parse_message_date(header: Option<&str>, internal_ms: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(raw) = header {
        // Some senders append "(UTC)" style comments that trip the parser.
        let cleaned = match raw.find(" (") {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned.trim()) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    internal_ms
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}
