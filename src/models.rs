use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Saved,
    Applied,
    Interviewing,
    Offer,
    Closed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Saved => "saved",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "saved" => Some(ApplicationStatus::Saved),
            "applied" => Some(ApplicationStatus::Applied),
            "interviewing" => Some(ApplicationStatus::Interviewing),
            "offer" => Some(ApplicationStatus::Offer),
            "closed" => Some(ApplicationStatus::Closed),
            _ => None,
        }
    }

    /// Pipeline progression rank. `Closed` is terminal and sits outside the
    /// ordering, so it has no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            ApplicationStatus::Saved => Some(0),
            ApplicationStatus::Applied => Some(1),
            ApplicationStatus::Interviewing => Some(2),
            ApplicationStatus::Offer => Some(3),
            ApplicationStatus::Closed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    Rejected,
    Withdrawn,
    Ghosted,
    Accepted,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Rejected => "rejected",
            CloseReason::Withdrawn => "withdrawn",
            CloseReason::Ghosted => "ghosted",
            CloseReason::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rejected" => Some(CloseReason::Rejected),
            "withdrawn" => Some(CloseReason::Withdrawn),
            "ghosted" => Some(CloseReason::Ghosted),
            "accepted" => Some(CloseReason::Accepted),
            _ => None,
        }
    }
}

/// What kind of job-search email the classifier decided a message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Application,
    Interview,
    Rejection,
    Offer,
    Unknown,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::Application => "application",
            EmailType::Interview => "interview",
            EmailType::Rejection => "rejection",
            EmailType::Offer => "offer",
            EmailType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "application" => Some(EmailType::Application),
            "interview" => Some(EmailType::Interview),
            "rejection" => Some(EmailType::Rejection),
            "offer" => Some(EmailType::Offer),
            "unknown" => Some(EmailType::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub company: String,
    pub role: String,
    pub location: Option<String>,
    pub status: ApplicationStatus,
    pub close_reason: Option<CloseReason>, // set iff status == closed
    pub job_url: Option<String>,
    pub source_email_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationEmail {
    pub id: i64,
    pub application_id: i64,
    pub gmail_message_id: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>, // RFC 3339
    pub snippet: Option<String>,
    pub email_type: Option<EmailType>,
}

/// One mailbox message after fetch + body extraction, ready for the
/// classifier.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: Option<DateTime<Utc>>,
    pub snippet: String,
    pub body: String,
}
