//! crates/sop_compliance_core/src/service.rs
//!
//! The application service. Every operation is one fetch-compute cycle: the
//! rows it needs are read concurrently, joined once all reads settle, and
//! reshaped through the pure status, aggregate and report modules. A failed
//! read fails the whole operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{
    counts_for, department_stats, join_rows, upcoming_reviews, user_stats, ComplianceCounts,
    ComplianceRow, DepartmentStats, UpcomingReview, UserComplianceStats,
};
use crate::domain::{
    next_version, Acknowledgment, AcknowledgmentStatus, Assignment, AssignmentStatus, AuditLog,
    ChangeEvent, ChangeKind, Company, DocumentType, NewAssignment, NewAuditLog, NewNotification,
    NewSop, Notification, Priority, Sop, SopStatus, SopUpdate, Table, User,
};
use crate::export::{export_rows, ExportFormat};
use crate::ports::{ChangeFeed, DatabaseService, PortError, PortResult};
use crate::report::{build_report, filter_rows, total_pages, Pagination, ReportFilters, ReportPage, ReportRow};
use crate::status::{days_until_due, derive_acknowledgment_status, derive_assignment_status, expires_at};
use crate::validation::require_non_empty;

//=========================================================================================
// View Models
//=========================================================================================

/// An assignment as shown on the "my documents" screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentView {
    pub assignment: Assignment,
    pub sop: Option<Sop>,
    pub acknowledgment: Option<Acknowledgment>,
    pub status: AssignmentStatus,
    pub days_until_due: Option<i64>,
}

/// One line of a user's acknowledgment history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcknowledgmentHistoryEntry {
    pub acknowledgment: Acknowledgment,
    pub sop_title: String,
    pub document_type: Option<DocumentType>,
    pub current_version: Option<String>,
    pub status: AcknowledgmentStatus,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyDashboard {
    pub company: Company,
    pub overall: ComplianceCounts,
    pub departments: Vec<DepartmentStats>,
    pub users: Vec<UserComplianceStats>,
    pub upcoming_reviews: Vec<UpcomingReview>,
    pub total_documents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditTrailPage {
    pub entries: Vec<AuditLog>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Request to assign one document to several users.
#[derive(Debug, Clone)]
pub struct AssignRequest {
    pub sop_id: Uuid,
    pub user_ids: Vec<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

//=========================================================================================
// Service
//=========================================================================================

#[derive(Clone)]
pub struct ComplianceService {
    db: Arc<dyn DatabaseService>,
    feed: Option<Arc<dyn ChangeFeed>>,
}

impl ComplianceService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db, feed: None }
    }

    /// Mutations announce themselves on `feed` once they are stored.
    pub fn with_change_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn db(&self) -> &Arc<dyn DatabaseService> {
        &self.db
    }

    fn publish(&self, table: Table, kind: ChangeKind, company_id: Uuid, record_id: Uuid, user_id: Option<Uuid>) {
        self.emit(ChangeEvent {
            table,
            kind,
            company_id,
            record_id,
            user_id,
            managers_only: false,
        });
    }

    /// Document changes reach employees only while the document is, or just
    /// stopped being, active.
    fn publish_sop(&self, kind: ChangeKind, sop: &Sop, actor_id: Uuid, was_active: bool) {
        self.emit(ChangeEvent {
            table: Table::Sops,
            kind,
            company_id: sop.company_id,
            record_id: sop.id,
            user_id: Some(actor_id),
            managers_only: !was_active && sop.status != SopStatus::Active,
        });
    }

    fn emit(&self, event: ChangeEvent) {
        if let Some(feed) = &self.feed {
            feed.publish(event);
        }
    }

    /// Audit entries are written after the primary change; a failure here is
    /// logged and does not undo the change.
    async fn audit(&self, actor: &User, action: &str, entity_type: &str, entity_id: Uuid, details: serde_json::Value) {
        let entry = NewAuditLog {
            company_id: actor.company_id,
            actor_id: actor.id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            details,
        };
        match self.db.record_audit_log(entry).await {
            Ok(log) => self.publish(Table::AuditLogs, ChangeKind::Insert, log.company_id, log.id, Some(actor.id)),
            Err(e) => warn!("Failed to record audit log '{}' for {}: {}", action, entity_id, e),
        }
    }

    // --- Employee views ---

    /// The user's assignments joined with their documents and acknowledgments.
    /// Overdue first, then pending, then acknowledged; earliest due date first within each.
    pub async fn my_assignments(&self, user_id: Uuid, now: DateTime<Utc>) -> PortResult<Vec<AssignmentView>> {
        let user = self.db.get_user_by_id(user_id).await?;
        let (assignments, sops, acks) = futures::try_join!(
            self.db.list_assignments_for_user(user.id),
            self.db.list_sops_for_company(user.company_id),
            self.db.list_acknowledgments_for_user(user.id),
        )?;

        let mut views: Vec<AssignmentView> = join_rows(assignments, &sops, &[], &acks)
            .into_iter()
            .map(|row| {
                let status = derive_assignment_status(&row.assignment, row.acknowledgment.as_ref(), now);
                AssignmentView {
                    days_until_due: days_until_due(&row.assignment, now),
                    assignment: row.assignment,
                    sop: row.sop,
                    acknowledgment: row.acknowledgment,
                    status,
                }
            })
            .collect();
        views.sort_by(|a, b| {
            status_rank(a.status)
                .cmp(&status_rank(b.status))
                .then_with(|| due_key(a).cmp(&due_key(b)))
        });
        Ok(views)
    }

    pub async fn my_stats(&self, user_id: Uuid, now: DateTime<Utc>) -> PortResult<ComplianceCounts> {
        let views = self.my_assignments(user_id, now).await?;
        Ok(ComplianceCounts::from_statuses(views.iter().map(|v| v.status)))
    }

    /// Every acknowledgment the user has made, newest first, with its current status.
    pub async fn acknowledgment_history(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<AcknowledgmentHistoryEntry>> {
        let user = self.db.get_user_by_id(user_id).await?;
        let (acks, sops) = futures::try_join!(
            self.db.list_acknowledgments_for_user(user.id),
            self.db.list_sops_for_company(user.company_id),
        )?;

        let mut entries: Vec<AcknowledgmentHistoryEntry> = acks
            .into_iter()
            .map(|ack| {
                let sop = sops.iter().find(|s| s.id == ack.sop_id);
                let document_type = sop.and_then(|s| s.document_type);
                AcknowledgmentHistoryEntry {
                    status: derive_acknowledgment_status(&ack, sop, now),
                    expires_at: expires_at(&ack, document_type),
                    sop_title: sop.map(|s| s.title.clone()).unwrap_or_default(),
                    document_type,
                    current_version: sop.map(|s| s.version.clone()),
                    acknowledgment: ack,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.acknowledgment.acknowledged_at.cmp(&a.acknowledgment.acknowledged_at));
        Ok(entries)
    }

    /// Records the user's acknowledgment of one of their own assignments.
    pub async fn acknowledge(
        &self,
        user: &User,
        assignment_id: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> PortResult<Acknowledgment> {
        let (assignment, existing) = futures::try_join!(
            self.db.get_assignment(assignment_id),
            self.db.get_acknowledgment_for_assignment(assignment_id),
        )?;
        if assignment.user_id != user.id {
            return Err(PortError::Unauthorized);
        }
        if existing.is_some() {
            return Err(PortError::Conflict(format!(
                "Assignment {} is already acknowledged",
                assignment_id
            )));
        }
        let sop = self.db.get_sop(assignment.sop_id).await?;

        let acknowledgment = Acknowledgment {
            id: Uuid::new_v4(),
            assignment_id,
            user_id: user.id,
            sop_id: sop.id,
            sop_version: sop.version.clone(),
            notes: notes.filter(|n| !n.trim().is_empty()),
            acknowledged_at: now,
        };
        self.db.create_acknowledgment(acknowledgment.clone()).await?;
        self.db
            .update_assignment_status(assignment_id, AssignmentStatus::Acknowledged)
            .await?;
        info!("User {} acknowledged '{}' v{}", user.id, sop.title, sop.version);

        self.publish(Table::Acknowledgments, ChangeKind::Insert, assignment.company_id, acknowledgment.id, Some(user.id));
        self.publish(Table::SopAssignments, ChangeKind::Update, assignment.company_id, assignment_id, Some(user.id));
        self.audit(
            user,
            "sop.acknowledged",
            "sop_assignment",
            assignment_id,
            serde_json::json!({ "sop_id": sop.id, "sop_version": sop.version }),
        )
        .await;
        Ok(acknowledgment)
    }

    /// Unread-or-read notifications that have not expired, newest first.
    pub async fn notifications(&self, user_id: Uuid, now: DateTime<Utc>) -> PortResult<Vec<Notification>> {
        let notifications = self.db.list_notifications_for_user(user_id).await?;
        Ok(notifications.into_iter().filter(|n| !n.is_expired(now)).collect())
    }

    pub async fn mark_notification_read(&self, user: &User, notification_id: Uuid) -> PortResult<()> {
        self.db.mark_notification_read(notification_id, user.id).await?;
        self.publish(Table::Notifications, ChangeKind::Update, user.company_id, notification_id, Some(user.id));
        Ok(())
    }

    /// Documents of the actor's company, by title. Employees see active ones only.
    pub async fn documents(&self, actor: &User) -> PortResult<Vec<Sop>> {
        let sops = self.db.list_sops_for_company(actor.company_id).await?;
        if actor.role.can_manage() {
            return Ok(sops);
        }
        Ok(sops.into_iter().filter(|s| s.status == SopStatus::Active).collect())
    }

    // --- Administration ---

    /// Users of a company, for the assignment picker.
    pub async fn company_users(&self, actor: &User, company_id: Uuid) -> PortResult<Vec<User>> {
        ensure_manager(actor, company_id)?;
        self.db.list_users_for_company(company_id).await
    }

    pub async fn create_sop(&self, actor: &User, sop: NewSop) -> PortResult<Sop> {
        ensure_manager(actor, sop.company_id)?;
        require_non_empty(&sop.title, "title")?;
        let sop = self.db.create_sop(sop).await?;
        info!("Document '{}' created by {}", sop.title, actor.id);
        self.publish_sop(ChangeKind::Insert, &sop, actor.id, false);
        self.audit(actor, "sop.created", "sop", sop.id, serde_json::json!({ "title": sop.title, "version": sop.version }))
            .await;
        Ok(sop)
    }

    /// Edits a document. A content change without an explicit version bumps
    /// the version. Any edit moves `updated_at`, which supersedes earlier
    /// acknowledgments.
    pub async fn update_sop(
        &self,
        actor: &User,
        sop_id: Uuid,
        mut update: SopUpdate,
        now: DateTime<Utc>,
    ) -> PortResult<Sop> {
        if update.is_empty() {
            return Err(PortError::Validation("update contains no changes".to_string()));
        }
        if let Some(title) = &update.title {
            require_non_empty(title, "title")?;
        }
        let mut sop = self.db.get_sop(sop_id).await?;
        ensure_manager(actor, sop.company_id)?;

        let previous_version = sop.version.clone();
        let was_active = sop.status == SopStatus::Active;
        let content_changed = update.content.as_ref().is_some_and(|c| *c != sop.content);
        if content_changed && update.version.is_none() {
            update.version = Some(next_version(&sop.version));
        }
        update.apply(&mut sop, now);
        self.db.update_sop(&sop).await?;

        info!("Document '{}' updated: v{} -> v{}", sop.title, previous_version, sop.version);
        self.publish_sop(ChangeKind::Update, &sop, actor.id, was_active);
        self.audit(
            actor,
            "sop.updated",
            "sop",
            sop.id,
            serde_json::json!({ "from_version": previous_version, "to_version": sop.version }),
        )
        .await;
        Ok(sop)
    }

    /// Assigns a document to each listed user and notifies them.
    pub async fn assign(&self, actor: &User, request: AssignRequest) -> PortResult<Vec<Assignment>> {
        if request.user_ids.is_empty() {
            return Err(PortError::Validation("at least one user is required".to_string()));
        }
        let (sop, users) = futures::try_join!(
            self.db.get_sop(request.sop_id),
            self.db.list_users_for_company(actor.company_id),
        )?;
        ensure_manager(actor, sop.company_id)?;
        for user_id in &request.user_ids {
            if !users.iter().any(|u| u.id == *user_id) {
                return Err(PortError::NotFound(format!("User {} not found", user_id)));
            }
        }

        let priority = request.priority.unwrap_or(sop.priority);
        let created = try_join_all(request.user_ids.iter().map(|user_id| {
            self.db.create_assignment(NewAssignment {
                company_id: sop.company_id,
                sop_id: sop.id,
                user_id: *user_id,
                assigned_by: actor.id,
                due_date: request.due_date,
                priority,
                notes: request.notes.clone(),
            })
        }))
        .await?;
        info!("Assigned '{}' to {} user(s)", sop.title, created.len());

        for assignment in &created {
            self.publish(Table::SopAssignments, ChangeKind::Insert, assignment.company_id, assignment.id, Some(assignment.user_id));
            let notification = NewNotification {
                user_id: assignment.user_id,
                company_id: assignment.company_id,
                notification_type: "assignment".to_string(),
                title: format!("New document: {}", sop.title),
                message: match assignment.due_date {
                    Some(due) => format!("Please acknowledge '{}' by {}.", sop.title, due.format("%Y-%m-%d")),
                    None => format!("Please acknowledge '{}'.", sop.title),
                },
                priority,
                expires_at: None,
            };
            match self.db.create_notification(notification).await {
                Ok(n) => self.publish(Table::Notifications, ChangeKind::Insert, n.company_id, n.id, Some(n.user_id)),
                Err(e) => warn!("Failed to notify user {}: {}", assignment.user_id, e),
            }
            self.audit(
                actor,
                "sop.assigned",
                "sop_assignment",
                assignment.id,
                serde_json::json!({ "sop_id": sop.id, "user_id": assignment.user_id }),
            )
            .await;
        }
        Ok(created)
    }

    // --- Reporting ---

    /// Every assignment of the company joined with document, assignee and acknowledgment.
    pub async fn compliance_rows(&self, actor: &User, company_id: Uuid) -> PortResult<Vec<ComplianceRow>> {
        ensure_manager(actor, company_id)?;
        let (assignments, sops, users, acks) = futures::try_join!(
            self.db.list_assignments_for_company(company_id),
            self.db.list_sops_for_company(company_id),
            self.db.list_users_for_company(company_id),
            self.db.list_acknowledgments_for_company(company_id),
        )?;
        Ok(join_rows(assignments, &sops, &users, &acks))
    }

    pub async fn company_dashboard(
        &self,
        actor: &User,
        company_id: Uuid,
        review_window_days: i64,
        now: DateTime<Utc>,
    ) -> PortResult<CompanyDashboard> {
        ensure_manager(actor, company_id)?;
        let (company, assignments, sops, users, acks) = futures::try_join!(
            self.db.get_company(company_id),
            self.db.list_assignments_for_company(company_id),
            self.db.list_sops_for_company(company_id),
            self.db.list_users_for_company(company_id),
            self.db.list_acknowledgments_for_company(company_id),
        )?;
        let rows = join_rows(assignments, &sops, &users, &acks);

        Ok(CompanyDashboard {
            company,
            overall: counts_for(&rows, now),
            departments: department_stats(&rows, now),
            users: user_stats(&rows, now),
            upcoming_reviews: upcoming_reviews(&sops, now, review_window_days),
            total_documents: sops.len(),
        })
    }

    pub async fn compliance_report(
        &self,
        actor: &User,
        filters: &ReportFilters,
        pagination: &Pagination,
        now: DateTime<Utc>,
    ) -> PortResult<ReportPage> {
        let rows = self.compliance_rows(actor, actor.company_id).await?;
        Ok(build_report(&rows, filters, pagination, now))
    }

    /// The whole filtered report (no pagination) encoded as a file.
    pub async fn export_report(
        &self,
        actor: &User,
        filters: &ReportFilters,
        search: &str,
        format: ExportFormat,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<u8>> {
        // Unsupported formats fail before anything is read.
        format.ensure_supported()?;
        let rows = self.compliance_rows(actor, actor.company_id).await?;
        let lines: Vec<ReportRow> = filter_rows(&rows, filters, search, now)
            .into_iter()
            .map(|r| ReportRow::from_row(r, now))
            .collect();
        info!("Exporting {} report row(s) as {:?}", lines.len(), format);
        Ok(export_rows(&lines, format)?)
    }

    pub async fn audit_trail(
        &self,
        actor: &User,
        company_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> PortResult<AuditTrailPage> {
        ensure_manager(actor, company_id)?;
        let pagination = Pagination::new(Some(page), Some(page_size), None);
        let (entries, total_count) = futures::try_join!(
            self.db.list_audit_logs(company_id, pagination.page_size, pagination.offset() as u32),
            self.db.count_audit_logs(company_id),
        )?;
        Ok(AuditTrailPage {
            entries,
            total_count,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages: total_pages(total_count as usize, pagination.page_size),
        })
    }
}

/// Only admins and managers of the same company may read company-wide data.
fn ensure_manager(actor: &User, company_id: Uuid) -> PortResult<()> {
    if actor.company_id == company_id && actor.role.can_manage() {
        Ok(())
    } else {
        Err(PortError::Unauthorized)
    }
}

fn status_rank(status: AssignmentStatus) -> u8 {
    match status {
        AssignmentStatus::Overdue => 0,
        AssignmentStatus::Pending => 1,
        AssignmentStatus::Acknowledged => 2,
    }
}

// Undated assignments sort after dated ones.
fn due_key(view: &AssignmentView) -> (bool, Option<DateTime<Utc>>) {
    (view.assignment.due_date.is_none(), view.assignment.due_date)
}
