//! crates/sop_compliance_core/src/board.rs
//!
//! Per-view state for a user's assignment list. Acknowledging is speculative:
//! the row flips locally first, and is restored if the store rejects the write.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::aggregate::ComplianceCounts;
use crate::domain::{Acknowledgment, AssignmentStatus, User};
use crate::ports::{PortError, PortResult};
use crate::service::{AssignmentView, ComplianceService};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentBoard {
    items: Vec<AssignmentView>,
}

impl AssignmentBoard {
    pub fn new(items: Vec<AssignmentView>) -> Self {
        Self { items }
    }

    pub async fn load(service: &ComplianceService, user_id: Uuid, now: DateTime<Utc>) -> PortResult<Self> {
        Ok(Self::new(service.my_assignments(user_id, now).await?))
    }

    pub fn items(&self) -> &[AssignmentView] {
        &self.items
    }

    pub fn counts(&self) -> ComplianceCounts {
        ComplianceCounts::from_statuses(self.items.iter().map(|v| v.status))
    }

    /// Marks the row acknowledged, then confirms with the service.
    /// On failure the row goes back to exactly what it was and the error is returned.
    pub async fn acknowledge(
        &mut self,
        service: &ComplianceService,
        user: &User,
        assignment_id: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> PortResult<Acknowledgment> {
        let index = self
            .items
            .iter()
            .position(|v| v.assignment.id == assignment_id)
            .ok_or_else(|| PortError::NotFound(format!("Assignment {} not found", assignment_id)))?;

        let snapshot = self.items[index].clone();
        {
            let item = &mut self.items[index];
            item.status = AssignmentStatus::Acknowledged;
            item.assignment.status = AssignmentStatus::Acknowledged;
        }

        match service.acknowledge(user, assignment_id, notes, now).await {
            Ok(ack) => {
                self.items[index].acknowledgment = Some(ack.clone());
                Ok(ack)
            }
            Err(e) => {
                warn!("Rolling back optimistic acknowledgment of {}: {}", assignment_id, e);
                self.items[index] = snapshot;
                Err(e)
            }
        }
    }
}
