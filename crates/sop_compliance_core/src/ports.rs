//! crates/sop_compliance_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted database and the real-time transport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Acknowledgment, Assignment, AssignmentStatus, AuditLog, ChangeEvent, Company, NewAssignment,
    NewAuditLog, NewNotification, NewSop, NewUser, Notification, Sop, Table, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users and Auth ---
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn list_users_for_company(&self, company_id: Uuid) -> PortResult<Vec<User>>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Companies ---
    async fn create_company(&self, name: &str) -> PortResult<Company>;

    async fn get_company(&self, company_id: Uuid) -> PortResult<Company>;

    // --- Documents ---
    async fn create_sop(&self, sop: NewSop) -> PortResult<Sop>;

    async fn get_sop(&self, sop_id: Uuid) -> PortResult<Sop>;

    /// Persists every mutable column of `sop`, including `updated_at`.
    async fn update_sop(&self, sop: &Sop) -> PortResult<()>;

    async fn list_sops_for_company(&self, company_id: Uuid) -> PortResult<Vec<Sop>>;

    // --- Assignments ---
    async fn create_assignment(&self, assignment: NewAssignment) -> PortResult<Assignment>;

    async fn get_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment>;

    async fn list_assignments_for_user(&self, user_id: Uuid) -> PortResult<Vec<Assignment>>;

    async fn list_assignments_for_company(&self, company_id: Uuid) -> PortResult<Vec<Assignment>>;

    async fn update_assignment_status(
        &self,
        assignment_id: Uuid,
        status: AssignmentStatus,
    ) -> PortResult<()>;

    // --- Acknowledgments ---
    async fn create_acknowledgment(&self, acknowledgment: Acknowledgment) -> PortResult<()>;

    async fn get_acknowledgment_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> PortResult<Option<Acknowledgment>>;

    async fn list_acknowledgments_for_user(&self, user_id: Uuid) -> PortResult<Vec<Acknowledgment>>;

    async fn list_acknowledgments_for_company(
        &self,
        company_id: Uuid,
    ) -> PortResult<Vec<Acknowledgment>>;

    // --- Notifications ---
    async fn create_notification(&self, notification: NewNotification) -> PortResult<Notification>;

    async fn list_notifications_for_user(&self, user_id: Uuid) -> PortResult<Vec<Notification>>;

    async fn mark_notification_read(&self, notification_id: Uuid, user_id: Uuid) -> PortResult<()>;

    // --- Audit Trail ---
    async fn record_audit_log(&self, entry: NewAuditLog) -> PortResult<AuditLog>;

    async fn list_audit_logs(
        &self,
        company_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> PortResult<Vec<AuditLog>>;

    async fn count_audit_logs(&self, company_id: Uuid) -> PortResult<u64>;
}

//=========================================================================================
// Change Feed Port
//=========================================================================================

/// Callback invoked for every change event on a subscribed table.
pub type ChangeCallback = Box<dyn Fn(ChangeEvent) + Send + Sync>;

/// Push channel for row-level changes. Adapters decide how events travel.
pub trait ChangeFeed: Send + Sync {
    /// Announces a change to every current subscriber of `event.table`.
    fn publish(&self, event: ChangeEvent);

    /// Registers `callback` for changes on `table` until the returned handle is
    /// unsubscribed or dropped.
    fn subscribe(&self, table: Table, callback: ChangeCallback) -> Subscription;
}

/// Handle for an active change-feed subscription.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps the adapter-specific teardown for a subscription.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Detaches the callback. Further events are not delivered.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_unsubscribe_runs_teardown_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_teardown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
