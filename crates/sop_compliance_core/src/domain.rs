//! crates/sop_compliance_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database driver; they derive `serde`
//! so the web layer and the CSV exporter can serialize them directly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Enumerations (stored as lowercase text)
//=========================================================================================

/// Priority attached to documents and assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Parse from string. Unknown values fall back to `Medium`.
    pub fn from_str_value(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Medium)
    }

    /// Strict parse. Returns `None` for anything unrecognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "urgent" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// The kind of controlled document. Drives the acknowledgment retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Sop,
    Procedure,
    Policy,
    Training,
}

impl DocumentType {
    /// Parse from string. Returns `None` for anything unrecognised.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sop" => Some(Self::Sop),
            "procedure" => Some(Self::Procedure),
            "policy" => Some(Self::Policy),
            "training" => Some(Self::Training),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sop => "sop",
            Self::Procedure => "procedure",
            Self::Policy => "policy",
            Self::Training => "training",
        }
    }
}

/// Publication state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SopStatus {
    Draft,
    Active,
    Archived,
}

impl SopStatus {
    pub fn from_str_value(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "active" | "published" => Self::Active,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// Display status of an assignment. Always derived, see `status::derive_assignment_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Acknowledged,
    Overdue,
}

impl AssignmentStatus {
    pub fn from_str_value(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Pending)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "acknowledged" | "completed" => Some(Self::Acknowledged),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Acknowledged => "acknowledged",
            Self::Overdue => "overdue",
        }
    }
}

/// Status of a historical acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcknowledgmentStatus {
    Acknowledged,
    Expired,
    Superseded,
}

/// Role of a user inside their company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    pub fn from_str_value(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "admin" | "owner" => Self::Admin,
            "manager" => Self::Manager,
            _ => Self::Employee,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    /// Admins and managers may assign documents and read company-wide reports.
    pub fn can_manage(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

//=========================================================================================
// Tenants and Users
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Represents a user - used throughout the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub department: Option<String>,
    pub role: Role,
}

impl User {
    /// Name shown in reports; falls back to the email when no name was set.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.email
        } else {
            &self.full_name
        }
    }
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// Fields required to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub company_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub department: Option<String>,
    pub role: Role,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Documents, Assignments, Acknowledgments
//=========================================================================================

/// A controlled document (SOP, policy, procedure or training material).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sop {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub content: String,
    pub version: String,
    pub document_type: Option<DocumentType>,
    pub department: Option<String>,
    pub status: SopStatus,
    pub priority: Priority,
    pub next_review_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSop {
    pub company_id: Uuid,
    pub title: String,
    pub content: String,
    pub version: String,
    pub document_type: Option<DocumentType>,
    pub department: Option<String>,
    pub status: SopStatus,
    pub priority: Priority,
    pub next_review_date: Option<NaiveDate>,
}

/// Partial edit of a document. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SopUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub version: Option<String>,
    pub document_type: Option<DocumentType>,
    pub department: Option<String>,
    pub status: Option<SopStatus>,
    pub priority: Option<Priority>,
    pub next_review_date: Option<NaiveDate>,
}

impl SopUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.version.is_none()
            && self.document_type.is_none()
            && self.department.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.next_review_date.is_none()
    }

    /// Applies the edit in place and stamps `updated_at`.
    pub fn apply(self, sop: &mut Sop, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            sop.title = title;
        }
        if let Some(content) = self.content {
            sop.content = content;
        }
        if let Some(version) = self.version {
            sop.version = version;
        }
        if let Some(document_type) = self.document_type {
            sop.document_type = Some(document_type);
        }
        if let Some(department) = self.department {
            sop.department = Some(department);
        }
        if let Some(status) = self.status {
            sop.status = status;
        }
        if let Some(priority) = self.priority {
            sop.priority = priority;
        }
        if let Some(date) = self.next_review_date {
            sop.next_review_date = Some(date);
        }
        sop.updated_at = now;
    }
}

/// Bumps the last numeric component of a dotted version: `1.4` becomes `1.5`.
/// Anything unparsable gets `.1` appended.
pub fn next_version(version: &str) -> String {
    let trimmed = version.trim();
    match trimmed.rsplit_once('.') {
        Some((head, last)) => match last.parse::<u32>() {
            Ok(n) => format!("{}.{}", head, n + 1),
            Err(_) => format!("{}.1", trimmed),
        },
        None => match trimmed.parse::<u32>() {
            Ok(n) => format!("{}.1", n),
            Err(_) if trimmed.is_empty() => "1.0".to_string(),
            Err(_) => format!("{}.1", trimmed),
        },
    }
}

/// A document assigned to a user for acknowledgment. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sop_id: Uuid,
    pub user_id: Uuid,
    pub assigned_by: Uuid,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub company_id: Uuid,
    pub sop_id: Uuid,
    pub user_id: Uuid,
    pub assigned_by: Uuid,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub notes: Option<String>,
}

/// A user's confirmation that they read an assigned document. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub sop_id: Uuid,
    pub sop_version: String,
    pub notes: Option<String>,
    pub acknowledged_at: DateTime<Utc>,
}

//=========================================================================================
// Notifications and Audit Trail
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub read: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// A notification expires by plain timestamp comparison.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One entry of the company audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub company_id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub company_id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: serde_json::Value,
}

//=========================================================================================
// Change Events (real-time push)
//=========================================================================================

/// The tables a subscriber can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Sops,
    SopAssignments,
    Acknowledgments,
    Notifications,
    AuditLogs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change announced to subscribers after a successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub company_id: Uuid,
    pub record_id: Uuid,
    pub user_id: Option<Uuid>,
    /// Set for changes to documents employees cannot see.
    #[serde(default)]
    pub managers_only: bool,
}
