//! crates/sop_compliance_core/src/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. Backs the test
//! suites and the `memory://` demo mode of the api service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Acknowledgment, Assignment, AssignmentStatus, AuditLog, AuthSession, Company, NewAssignment,
    NewAuditLog, NewNotification, NewSop, NewUser, Notification, Sop, User, UserCredentials,
};
use crate::ports::{DatabaseService, PortError, PortResult};

#[derive(Default)]
struct Tables {
    companies: HashMap<Uuid, Company>,
    users: HashMap<Uuid, User>,
    password_hashes: HashMap<Uuid, String>,
    auth_sessions: HashMap<String, AuthSession>,
    sops: HashMap<Uuid, Sop>,
    assignments: HashMap<Uuid, Assignment>,
    acknowledgments: HashMap<Uuid, Acknowledgment>,
    notifications: HashMap<Uuid, Notification>,
    audit_logs: Vec<AuditLog>,
}

#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails the way an unreachable backend would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> PortResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(PortError::Unexpected(
                "backing store unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub async fn company_count(&self) -> usize {
        self.tables.read().await.companies.len()
    }

    /// Inserts an assignment with a caller-chosen creation time.
    pub async fn insert_assignment(&self, assignment: Assignment) {
        self.tables
            .write()
            .await
            .assignments
            .insert(assignment.id, assignment);
    }

    /// Inserts a document row verbatim, timestamps included.
    pub async fn insert_sop(&self, sop: Sop) {
        self.tables.write().await.sops.insert(sop.id, sop);
    }

    /// Inserts an acknowledgment row verbatim.
    pub async fn insert_acknowledgment(&self, acknowledgment: Acknowledgment) {
        self.tables
            .write()
            .await
            .acknowledgments
            .insert(acknowledgment.id, acknowledgment);
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl DatabaseService for MemoryDatabase {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let email = user.email.trim().to_lowercase();
        if tables.users.values().any(|u| u.email == email) {
            return Err(PortError::Conflict(format!("User {} already exists", email)));
        }
        let record = User {
            id: Uuid::new_v4(),
            company_id: user.company_id,
            email,
            full_name: user.full_name,
            department: user.department,
            role: user.role,
        };
        tables
            .password_hashes
            .insert(record.id, user.hashed_password);
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.check_available()?;
        self.tables
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let email = email.trim().to_lowercase();
        let user = tables
            .users
            .values()
            .find(|u| u.email == email)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;
        let hashed_password = tables
            .password_hashes
            .get(&user.id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Credentials for {} not found", email)))?;
        Ok(UserCredentials {
            user_id: user.id,
            email: user.email.clone(),
            hashed_password,
        })
    }

    async fn list_users_for_company(&self, company_id: Uuid) -> PortResult<Vec<User>> {
        self.check_available()?;
        let users = self
            .tables
            .read()
            .await
            .users
            .values()
            .filter(|u| u.company_id == company_id)
            .cloned()
            .collect();
        Ok(sorted_by(users, |u: &User| u.email.clone()))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.check_available()?;
        self.tables.write().await.auth_sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        self.check_available()?;
        let tables = self.tables.read().await;
        match tables.auth_sessions.get(session_id) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.check_available()?;
        self.tables.write().await.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn create_company(&self, name: &str) -> PortResult<Company> {
        self.check_available()?;
        let company = Company {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .companies
            .insert(company.id, company.clone());
        Ok(company)
    }

    async fn get_company(&self, company_id: Uuid) -> PortResult<Company> {
        self.check_available()?;
        self.tables
            .read()
            .await
            .companies
            .get(&company_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Company {} not found", company_id)))
    }

    async fn create_sop(&self, sop: NewSop) -> PortResult<Sop> {
        self.check_available()?;
        let now = Utc::now();
        let record = Sop {
            id: Uuid::new_v4(),
            company_id: sop.company_id,
            title: sop.title,
            content: sop.content,
            version: sop.version,
            document_type: sop.document_type,
            department: sop.department,
            status: sop.status,
            priority: sop.priority,
            next_review_date: sop.next_review_date,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .sops
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_sop(&self, sop_id: Uuid) -> PortResult<Sop> {
        self.check_available()?;
        self.tables
            .read()
            .await
            .sops
            .get(&sop_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", sop_id)))
    }

    async fn update_sop(&self, sop: &Sop) -> PortResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        match tables.sops.get_mut(&sop.id) {
            Some(existing) => {
                *existing = sop.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!("Document {} not found", sop.id))),
        }
    }

    async fn list_sops_for_company(&self, company_id: Uuid) -> PortResult<Vec<Sop>> {
        self.check_available()?;
        let sops = self
            .tables
            .read()
            .await
            .sops
            .values()
            .filter(|s| s.company_id == company_id)
            .cloned()
            .collect();
        Ok(sorted_by(sops, |s: &Sop| s.title.clone()))
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> PortResult<Assignment> {
        self.check_available()?;
        let record = Assignment {
            id: Uuid::new_v4(),
            company_id: assignment.company_id,
            sop_id: assignment.sop_id,
            user_id: assignment.user_id,
            assigned_by: assignment.assigned_by,
            due_date: assignment.due_date,
            priority: assignment.priority,
            status: AssignmentStatus::Pending,
            notes: assignment.notes,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .assignments
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        self.check_available()?;
        self.tables
            .read()
            .await
            .assignments
            .get(&assignment_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Assignment {} not found", assignment_id)))
    }

    async fn list_assignments_for_user(&self, user_id: Uuid) -> PortResult<Vec<Assignment>> {
        self.check_available()?;
        let assignments = self
            .tables
            .read()
            .await
            .assignments
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by(assignments, |a: &Assignment| a.created_at))
    }

    async fn list_assignments_for_company(&self, company_id: Uuid) -> PortResult<Vec<Assignment>> {
        self.check_available()?;
        let assignments = self
            .tables
            .read()
            .await
            .assignments
            .values()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect();
        Ok(sorted_by(assignments, |a: &Assignment| a.created_at))
    }

    async fn update_assignment_status(
        &self,
        assignment_id: Uuid,
        status: AssignmentStatus,
    ) -> PortResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let assignment = tables
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| PortError::NotFound(format!("Assignment {} not found", assignment_id)))?;
        assignment.status = status;
        Ok(())
    }

    async fn create_acknowledgment(&self, acknowledgment: Acknowledgment) -> PortResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables
            .acknowledgments
            .values()
            .any(|a| a.assignment_id == acknowledgment.assignment_id)
        {
            return Err(PortError::Conflict(format!(
                "Assignment {} is already acknowledged",
                acknowledgment.assignment_id
            )));
        }
        tables
            .acknowledgments
            .insert(acknowledgment.id, acknowledgment);
        Ok(())
    }

    async fn get_acknowledgment_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> PortResult<Option<Acknowledgment>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .acknowledgments
            .values()
            .find(|a| a.assignment_id == assignment_id)
            .cloned())
    }

    async fn list_acknowledgments_for_user(&self, user_id: Uuid) -> PortResult<Vec<Acknowledgment>> {
        self.check_available()?;
        let acks = self
            .tables
            .read()
            .await
            .acknowledgments
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by(acks, |a: &Acknowledgment| a.acknowledged_at))
    }

    async fn list_acknowledgments_for_company(
        &self,
        company_id: Uuid,
    ) -> PortResult<Vec<Acknowledgment>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let acks = tables
            .acknowledgments
            .values()
            .filter(|a| {
                tables
                    .assignments
                    .get(&a.assignment_id)
                    .is_some_and(|asg| asg.company_id == company_id)
            })
            .cloned()
            .collect();
        Ok(sorted_by(acks, |a: &Acknowledgment| a.acknowledged_at))
    }

    async fn create_notification(&self, notification: NewNotification) -> PortResult<Notification> {
        self.check_available()?;
        let record = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            company_id: notification.company_id,
            notification_type: notification.notification_type,
            title: notification.title,
            message: notification.message,
            priority: notification.priority,
            read: false,
            expires_at: notification.expires_at,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .notifications
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_notifications_for_user(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        self.check_available()?;
        let mut notifications: Vec<Notification> = self
            .tables
            .read()
            .await
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, notification_id: Uuid, user_id: Uuid) -> PortResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        match tables.notifications.get_mut(&notification_id) {
            Some(n) if n.user_id == user_id => {
                n.read = true;
                Ok(())
            }
            _ => Err(PortError::NotFound(format!(
                "Notification {} not found",
                notification_id
            ))),
        }
    }

    async fn record_audit_log(&self, entry: NewAuditLog) -> PortResult<AuditLog> {
        self.check_available()?;
        let record = AuditLog {
            id: Uuid::new_v4(),
            company_id: entry.company_id,
            actor_id: entry.actor_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            created_at: Utc::now(),
        };
        self.tables.write().await.audit_logs.push(record.clone());
        Ok(record)
    }

    async fn list_audit_logs(
        &self,
        company_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<AuditLog>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        // Appended in time order; newest first.
        Ok(tables
            .audit_logs
            .iter()
            .rev()
            .filter(|l| l.company_id == company_id)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_audit_logs(&self, company_id: Uuid) -> PortResult<u64> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .audit_logs
            .iter()
            .filter(|l| l.company_id == company_id)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, Role};

    fn new_user(company_id: Uuid, email: &str) -> NewUser {
        NewUser {
            company_id,
            email: email.to_string(),
            full_name: "Test User".to_string(),
            department: None,
            role: Role::Employee,
            hashed_password: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let db = MemoryDatabase::new();
        let company = db.create_company("Acme").await.expect("company");
        db.create_user(new_user(company.id, "Dup@Example.com"))
            .await
            .expect("first user");
        let err = db
            .create_user(new_user(company.id, "dup@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_second_acknowledgment_conflicts() {
        let db = MemoryDatabase::new();
        let assignment = db
            .create_assignment(NewAssignment {
                company_id: Uuid::new_v4(),
                sop_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                assigned_by: Uuid::new_v4(),
                due_date: None,
                priority: Priority::Low,
                notes: None,
            })
            .await
            .expect("assignment");
        let ack = Acknowledgment {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            user_id: assignment.user_id,
            sop_id: assignment.sop_id,
            sop_version: "1.0".to_string(),
            notes: None,
            acknowledged_at: Utc::now(),
        };
        db.create_acknowledgment(ack.clone()).await.expect("first ack");
        let again = Acknowledgment {
            id: Uuid::new_v4(),
            ..ack
        };
        assert!(matches!(
            db.create_acknowledgment(again).await,
            Err(PortError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let db = MemoryDatabase::new();
        db.set_unavailable(true);
        assert!(matches!(
            db.get_company(Uuid::new_v4()).await,
            Err(PortError::Unexpected(_))
        ));
        db.set_unavailable(false);
        assert!(matches!(
            db.get_company(Uuid::new_v4()).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_logs_are_newest_first_and_counted() {
        let db = MemoryDatabase::new();
        let company_id = Uuid::new_v4();
        for action in ["first", "second", "third"] {
            db.record_audit_log(NewAuditLog {
                company_id,
                actor_id: Uuid::new_v4(),
                action: action.to_string(),
                entity_type: "sop".to_string(),
                entity_id: Uuid::new_v4(),
                details: serde_json::Value::Null,
            })
            .await
            .expect("audit");
        }
        let page = db.list_audit_logs(company_id, 2, 0).await.expect("list");
        assert_eq!(page[0].action, "third");
        assert_eq!(page.len(), 2);
        assert_eq!(db.count_audit_logs(company_id).await.expect("count"), 3);
    }
}
