//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sop_compliance_core::domain::{
    Acknowledgment, Assignment, AssignmentStatus, AuditLog, Company, DocumentType, NewAssignment,
    NewAuditLog, NewNotification, NewSop, NewUser, Notification, Priority, Role, Sop, SopStatus,
    User, UserCredentials,
};
use sop_compliance_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a driver error, turning a missing row into `NotFound` for `what`.
fn lookup_error(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} not found", what())),
        _ => PortError::Unexpected(e.to_string()),
    }
}

/// Maps a driver error, turning a unique-key violation into `Conflict`.
fn write_error(e: sqlx::Error, conflict: impl FnOnce() -> String) -> PortError {
    let unique_violation = e
        .as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == "23505");
    if unique_violation {
        PortError::Conflict(conflict())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, company_id, email, full_name, department, role";
const SOP_COLUMNS: &str = "id, company_id, title, content, version, document_type, department, \
     status, priority, next_review_date, created_at, updated_at";
const ASSIGNMENT_COLUMNS: &str =
    "id, company_id, sop_id, user_id, assigned_by, due_date, priority, status, notes, created_at";
const ACK_COLUMNS: &str = "id, assignment_id, user_id, sop_id, sop_version, notes, acknowledged_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, company_id, notification_type, title, message, \
     priority, read, expires_at, created_at";
const AUDIT_COLUMNS: &str =
    "id, company_id, actor_id, action, entity_type, entity_id, details, created_at";

#[derive(FromRow)]
struct CompanyRecord {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}
impl CompanyRecord {
    fn to_domain(self) -> Company {
        Company {
            id: self.id,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    company_id: Uuid,
    email: String,
    full_name: String,
    department: Option<String>,
    role: String,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            company_id: self.company_id,
            email: self.email,
            full_name: self.full_name,
            department: self.department,
            role: Role::from_str_value(&self.role),
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    password_hash: String,
}

#[derive(FromRow)]
struct SopRecord {
    id: Uuid,
    company_id: Uuid,
    title: String,
    content: String,
    version: String,
    document_type: Option<String>,
    department: Option<String>,
    status: String,
    priority: String,
    next_review_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SopRecord {
    fn to_domain(self) -> Sop {
        Sop {
            id: self.id,
            company_id: self.company_id,
            title: self.title,
            content: self.content,
            version: self.version,
            document_type: self
                .document_type
                .as_deref()
                .and_then(DocumentType::from_str_value),
            department: self.department,
            status: SopStatus::from_str_value(&self.status),
            priority: Priority::from_str_value(&self.priority),
            next_review_date: self.next_review_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AssignmentRecord {
    id: Uuid,
    company_id: Uuid,
    sop_id: Uuid,
    user_id: Uuid,
    assigned_by: Uuid,
    due_date: Option<DateTime<Utc>>,
    priority: String,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}
impl AssignmentRecord {
    fn to_domain(self) -> Assignment {
        Assignment {
            id: self.id,
            company_id: self.company_id,
            sop_id: self.sop_id,
            user_id: self.user_id,
            assigned_by: self.assigned_by,
            due_date: self.due_date,
            priority: Priority::from_str_value(&self.priority),
            status: AssignmentStatus::from_str_value(&self.status),
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AcknowledgmentRecord {
    id: Uuid,
    assignment_id: Uuid,
    user_id: Uuid,
    sop_id: Uuid,
    sop_version: String,
    notes: Option<String>,
    acknowledged_at: DateTime<Utc>,
}
impl AcknowledgmentRecord {
    fn to_domain(self) -> Acknowledgment {
        Acknowledgment {
            id: self.id,
            assignment_id: self.assignment_id,
            user_id: self.user_id,
            sop_id: self.sop_id,
            sop_version: self.sop_version,
            notes: self.notes,
            acknowledged_at: self.acknowledged_at,
        }
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: Uuid,
    user_id: Uuid,
    company_id: Uuid,
    notification_type: String,
    title: String,
    message: String,
    priority: String,
    read: bool,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl NotificationRecord {
    fn to_domain(self) -> Notification {
        Notification {
            id: self.id,
            user_id: self.user_id,
            company_id: self.company_id,
            notification_type: self.notification_type,
            title: self.title,
            message: self.message,
            priority: Priority::from_str_value(&self.priority),
            read: self.read,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AuditLogRecord {
    id: Uuid,
    company_id: Uuid,
    actor_id: Uuid,
    action: String,
    entity_type: String,
    entity_id: Uuid,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}
impl AuditLogRecord {
    fn to_domain(self) -> AuditLog {
        AuditLog {
            id: self.id,
            company_id: self.company_id,
            actor_id: self.actor_id,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            details: self.details,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let email = user.email.trim().to_lowercase();
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, company_id, email, full_name, department, role, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user.company_id)
        .bind(&email)
        .bind(&user.full_name)
        .bind(&user.department)
        .bind(user.role.as_str())
        .bind(&user.hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, || format!("User {} already exists", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| lookup_error(e, || format!("User {}", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let email = email.trim().to_lowercase();
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| lookup_error(e, || format!("User {}", email)))?;
        Ok(UserCredentials {
            user_id: record.id,
            email: record.email,
            hashed_password: record.password_hash,
        })
    }

    async fn list_users_for_company(&self, company_id: Uuid) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE company_id = $1 ORDER BY email ASC",
            USER_COLUMNS
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_company(&self, name: &str) -> PortResult<Company> {
        let record = sqlx::query_as::<_, CompanyRecord>(
            "INSERT INTO companies (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name.trim())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_company(&self, company_id: Uuid) -> PortResult<Company> {
        let record = sqlx::query_as::<_, CompanyRecord>(
            "SELECT id, name, created_at FROM companies WHERE id = $1",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| lookup_error(e, || format!("Company {}", company_id)))?;
        Ok(record.to_domain())
    }

    async fn create_sop(&self, sop: NewSop) -> PortResult<Sop> {
        let record = sqlx::query_as::<_, SopRecord>(&format!(
            "INSERT INTO sops (id, company_id, title, content, version, document_type, department, \
             status, priority, next_review_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            SOP_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(sop.company_id)
        .bind(&sop.title)
        .bind(&sop.content)
        .bind(&sop.version)
        .bind(sop.document_type.map(|t| t.as_str()))
        .bind(&sop.department)
        .bind(sop.status.as_str())
        .bind(sop.priority.as_str())
        .bind(sop.next_review_date)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_sop(&self, sop_id: Uuid) -> PortResult<Sop> {
        let record = sqlx::query_as::<_, SopRecord>(&format!(
            "SELECT {} FROM sops WHERE id = $1",
            SOP_COLUMNS
        ))
        .bind(sop_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| lookup_error(e, || format!("Document {}", sop_id)))?;
        Ok(record.to_domain())
    }

    async fn update_sop(&self, sop: &Sop) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE sops SET title = $1, content = $2, version = $3, document_type = $4, \
             department = $5, status = $6, priority = $7, next_review_date = $8, updated_at = $9 \
             WHERE id = $10",
        )
        .bind(&sop.title)
        .bind(&sop.content)
        .bind(&sop.version)
        .bind(sop.document_type.map(|t| t.as_str()))
        .bind(&sop.department)
        .bind(sop.status.as_str())
        .bind(sop.priority.as_str())
        .bind(sop.next_review_date)
        .bind(sop.updated_at)
        .bind(sop.id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Document {} not found", sop.id)));
        }
        Ok(())
    }

    async fn list_sops_for_company(&self, company_id: Uuid) -> PortResult<Vec<Sop>> {
        let records = sqlx::query_as::<_, SopRecord>(&format!(
            "SELECT {} FROM sops WHERE company_id = $1 ORDER BY title ASC",
            SOP_COLUMNS
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> PortResult<Assignment> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "INSERT INTO sop_assignments (id, company_id, sop_id, user_id, assigned_by, due_date, \
             priority, status, notes) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            ASSIGNMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(assignment.company_id)
        .bind(assignment.sop_id)
        .bind(assignment.user_id)
        .bind(assignment.assigned_by)
        .bind(assignment.due_date)
        .bind(assignment.priority.as_str())
        .bind(AssignmentStatus::Pending.as_str())
        .bind(&assignment.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM sop_assignments WHERE id = $1",
            ASSIGNMENT_COLUMNS
        ))
        .bind(assignment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| lookup_error(e, || format!("Assignment {}", assignment_id)))?;
        Ok(record.to_domain())
    }

    async fn list_assignments_for_user(&self, user_id: Uuid) -> PortResult<Vec<Assignment>> {
        let records = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM sop_assignments WHERE user_id = $1 ORDER BY created_at ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_assignments_for_company(&self, company_id: Uuid) -> PortResult<Vec<Assignment>> {
        let records = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM sop_assignments WHERE company_id = $1 ORDER BY created_at ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_assignment_status(
        &self,
        assignment_id: Uuid,
        status: AssignmentStatus,
    ) -> PortResult<()> {
        let result = sqlx::query("UPDATE sop_assignments SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(assignment_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Assignment {} not found",
                assignment_id
            )));
        }
        Ok(())
    }

    async fn create_acknowledgment(&self, acknowledgment: Acknowledgment) -> PortResult<()> {
        let assignment_id = acknowledgment.assignment_id;
        sqlx::query(
            "INSERT INTO acknowledgments (id, assignment_id, user_id, sop_id, sop_version, notes, \
             acknowledged_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(acknowledgment.id)
        .bind(acknowledgment.assignment_id)
        .bind(acknowledgment.user_id)
        .bind(acknowledgment.sop_id)
        .bind(&acknowledgment.sop_version)
        .bind(&acknowledgment.notes)
        .bind(acknowledgment.acknowledged_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(e, || {
                format!("Assignment {} is already acknowledged", assignment_id)
            })
        })?;
        Ok(())
    }

    async fn get_acknowledgment_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> PortResult<Option<Acknowledgment>> {
        let record = sqlx::query_as::<_, AcknowledgmentRecord>(&format!(
            "SELECT {} FROM acknowledgments WHERE assignment_id = $1",
            ACK_COLUMNS
        ))
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn list_acknowledgments_for_user(&self, user_id: Uuid) -> PortResult<Vec<Acknowledgment>> {
        let records = sqlx::query_as::<_, AcknowledgmentRecord>(&format!(
            "SELECT {} FROM acknowledgments WHERE user_id = $1 ORDER BY acknowledged_at ASC",
            ACK_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_acknowledgments_for_company(
        &self,
        company_id: Uuid,
    ) -> PortResult<Vec<Acknowledgment>> {
        let records = sqlx::query_as::<_, AcknowledgmentRecord>(
            "SELECT ack.id, ack.assignment_id, ack.user_id, ack.sop_id, ack.sop_version, ack.notes, \
             ack.acknowledged_at FROM acknowledgments ack \
             JOIN sop_assignments asg ON asg.id = ack.assignment_id \
             WHERE asg.company_id = $1 ORDER BY ack.acknowledged_at ASC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_notification(&self, notification: NewNotification) -> PortResult<Notification> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            "INSERT INTO notifications (id, user_id, company_id, notification_type, title, message, \
             priority, expires_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.company_id)
        .bind(&notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.priority.as_str())
        .bind(notification.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_notifications_for_user(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {} FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn mark_notification_read(&self, notification_id: Uuid, user_id: Uuid) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE notifications SET read = true WHERE id = $1 AND user_id = $2")
                .bind(notification_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Notification {} not found",
                notification_id
            )));
        }
        Ok(())
    }

    async fn record_audit_log(&self, entry: NewAuditLog) -> PortResult<AuditLog> {
        let record = sqlx::query_as::<_, AuditLogRecord>(&format!(
            "INSERT INTO audit_logs (id, company_id, actor_id, action, entity_type, entity_id, details) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            AUDIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(entry.company_id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.details)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_audit_logs(
        &self,
        company_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<AuditLog>> {
        let records = sqlx::query_as::<_, AuditLogRecord>(&format!(
            "SELECT {} FROM audit_logs WHERE company_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            AUDIT_COLUMNS
        ))
        .bind(company_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn count_audit_logs(&self, company_id: Uuid) -> PortResult<u64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_logs WHERE company_id = $1")
                .bind(company_id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(count.max(0) as u64)
    }
}
