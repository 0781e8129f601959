use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Access role attached to an account.
///
/// Stored role strings vary in case between records, so parsing folds case.
/// Anything unrecognized lands in `Other` and never satisfies a permitted
/// role set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
    Faculty,
    Student,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "ADMIN" => Role::Admin,
            "STAFF" => Role::Staff,
            "FACULTY" => Role::Faculty,
            "STUDENT" => Role::Student,
            _ => Role::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::Staff => "STAFF",
            Role::Faculty => "FACULTY",
            Role::Student => "STUDENT",
            Role::Other(raw) => raw,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Other(String::new())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Role::parse(&raw))
    }
}

/// Lifecycle state of a borrow request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Declined,
    Returned,
    Other(String),
}

impl RequestStatus {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "PENDING" => RequestStatus::Pending,
            "APPROVED" => RequestStatus::Approved,
            "DECLINED" => RequestStatus::Declined,
            "RETURNED" => RequestStatus::Returned,
            _ => RequestStatus::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Declined => "DECLINED",
            RequestStatus::Returned => "RETURNED",
            RequestStatus::Other(raw) => raw,
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Pending
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RequestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RequestStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RequestStatus::parse(&raw))
    }
}

/// An account as the backend reports it. Some deployments send `avatar`,
/// others `avatarUrl`; both land in `avatar_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, alias = "avatar")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl UserProfile {
    /// Resolve a relative avatar path against the API origin. Absolute URLs
    /// pass through untouched, as does a path that will not resolve.
    pub fn normalize_avatar(mut self, origin: &Url) -> Self {
        if let Some(raw) = self.avatar_url.take() {
            self.avatar_url = Some(resolve_asset_url(origin, &raw));
        }
        self
    }
}

fn resolve_asset_url(origin: &Url, raw: &str) -> String {
    if Url::parse(raw).is_ok() {
        return raw.to_string();
    }
    match origin.join(raw) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// A notification row, normalized at ingestion.
///
/// The backend is inconsistent about the read flag: some rows carry `read`,
/// some `isRead`, some neither. The flag here is the OR of whatever was
/// present, so a row missing both counts as unread.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub id: String,
    pub title: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    is_read: Option<bool>,
    #[serde(default)]
    link: Option<String>,
}

impl From<RawNotification> for NotificationRecord {
    fn from(raw: RawNotification) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            message: raw.message,
            created_at: raw.created_at,
            read: raw.read.unwrap_or(false) || raw.is_read.unwrap_or(false),
            link: raw.link,
        }
    }
}

impl<'de> Deserialize<'de> for NotificationRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawNotification::deserialize(deserializer).map(Into::into)
    }
}

/// A document in the library.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "filename")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A request to borrow a physical document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    pub id: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Sections of a cross-entity search, one per backing endpoint. A section
/// that failed or was skipped is simply empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub files: Vec<FileRecord>,
    pub requests: Vec<BorrowRequest>,
    pub users: Vec<UserProfile>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.requests.is_empty() && self.users.is_empty()
    }

    pub fn total(&self) -> usize {
        self.files.len() + self.requests.len() + self.users.len()
    }
}
