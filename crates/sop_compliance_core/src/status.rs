//! crates/sop_compliance_core/src/status.rs
//!
//! Status derivation for assignments and acknowledgments. Every function here is
//! pure: the caller supplies `now`, so the same rows always derive the same status.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    Acknowledgment, AcknowledgmentStatus, Assignment, AssignmentStatus, DocumentType, Sop,
};

/// Retention window applied when the document type is unknown.
pub const DEFAULT_RETENTION_DAYS: i64 = 730;

/// How long an acknowledgment stays valid for a given kind of document.
pub fn retention_days(document_type: Option<DocumentType>) -> i64 {
    match document_type {
        Some(DocumentType::Sop) | Some(DocumentType::Procedure) => 730,
        Some(DocumentType::Policy) => 1095,
        Some(DocumentType::Training) => 365,
        None => DEFAULT_RETENTION_DAYS,
    }
}

/// Display status of an assignment.
///
/// An acknowledgment always wins, whatever the due date says. Without one, the
/// assignment is overdue only when it has a due date strictly before `now`.
pub fn derive_assignment_status(
    assignment: &Assignment,
    acknowledgment: Option<&Acknowledgment>,
    now: DateTime<Utc>,
) -> AssignmentStatus {
    if acknowledgment.is_some() {
        return AssignmentStatus::Acknowledged;
    }
    match assignment.due_date {
        Some(due) if due < now => AssignmentStatus::Overdue,
        _ => AssignmentStatus::Pending,
    }
}

/// Status of a historical acknowledgment.
///
/// Supersession is checked before expiry. `sop` is the document's current row;
/// when it is missing the acknowledgment can only expire, using the default window.
pub fn derive_acknowledgment_status(
    acknowledgment: &Acknowledgment,
    sop: Option<&Sop>,
    now: DateTime<Utc>,
) -> AcknowledgmentStatus {
    if let Some(sop) = sop {
        if sop.updated_at > acknowledgment.acknowledged_at {
            return AcknowledgmentStatus::Superseded;
        }
    }
    let window = Duration::days(retention_days(sop.and_then(|s| s.document_type)));
    if now - acknowledgment.acknowledged_at > window {
        AcknowledgmentStatus::Expired
    } else {
        AcknowledgmentStatus::Acknowledged
    }
}

/// The instant after which an acknowledgment counts as expired.
pub fn expires_at(
    acknowledgment: &Acknowledgment,
    document_type: Option<DocumentType>,
) -> DateTime<Utc> {
    acknowledgment.acknowledged_at + Duration::days(retention_days(document_type))
}

/// Whole days left until the due date; negative once it has passed.
/// `None` when the assignment has no due date.
pub fn days_until_due(assignment: &Assignment, now: DateTime<Utc>) -> Option<i64> {
    assignment.due_date.map(|due| (due - now).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, SopStatus};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn assignment(due: Option<DateTime<Utc>>) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            sop_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            assigned_by: Uuid::new_v4(),
            due_date: due,
            priority: Priority::Medium,
            status: AssignmentStatus::Pending,
            notes: None,
            created_at: at(2024, 1, 1),
        }
    }

    fn sop(document_type: Option<DocumentType>, updated_at: DateTime<Utc>) -> Sop {
        Sop {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            title: "Lockout / Tagout".to_string(),
            content: String::new(),
            version: "1.0".to_string(),
            document_type,
            department: Some("Safety".to_string()),
            status: SopStatus::Active,
            priority: Priority::High,
            next_review_date: None,
            created_at: at(2023, 6, 1),
            updated_at,
        }
    }

    fn ack(acknowledged_at: DateTime<Utc>) -> Acknowledgment {
        Acknowledgment {
            id: Uuid::new_v4(),
            assignment_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            sop_id: Uuid::new_v4(),
            sop_version: "1.0".to_string(),
            notes: None,
            acknowledged_at,
        }
    }

    #[test]
    fn test_past_due_without_ack_is_overdue() {
        let a = assignment(Some(at(2024, 1, 10)));
        assert_eq!(
            derive_assignment_status(&a, None, at(2024, 2, 1)),
            AssignmentStatus::Overdue
        );
    }

    #[test]
    fn test_ack_wins_over_due_date() {
        let a = assignment(Some(at(2024, 1, 10)));
        let k = ack(at(2024, 1, 20));
        assert_eq!(
            derive_assignment_status(&a, Some(&k), at(2024, 2, 1)),
            AssignmentStatus::Acknowledged
        );
    }

    #[test]
    fn test_missing_due_date_is_never_overdue() {
        let a = assignment(None);
        assert_eq!(
            derive_assignment_status(&a, None, at(2030, 1, 1)),
            AssignmentStatus::Pending
        );
    }

    #[test]
    fn test_future_due_date_is_pending() {
        let a = assignment(Some(at(2024, 3, 1)));
        assert_eq!(
            derive_assignment_status(&a, None, at(2024, 2, 1)),
            AssignmentStatus::Pending
        );
    }

    #[test]
    fn test_training_ack_expires_after_a_year() {
        let doc = sop(Some(DocumentType::Training), at(2023, 12, 1));
        let k = ack(at(2024, 1, 5));
        assert_eq!(
            derive_acknowledgment_status(&k, Some(&doc), at(2025, 6, 1)),
            AcknowledgmentStatus::Expired
        );
    }

    #[test]
    fn test_policy_ack_still_valid_after_two_years() {
        let doc = sop(Some(DocumentType::Policy), at(2023, 12, 1));
        let k = ack(at(2024, 1, 5));
        assert_eq!(
            derive_acknowledgment_status(&k, Some(&doc), at(2026, 1, 1)),
            AcknowledgmentStatus::Acknowledged
        );
    }

    #[test]
    fn test_superseded_checked_before_expiry() {
        let doc = sop(Some(DocumentType::Training), at(2024, 3, 1));
        let k = ack(at(2024, 1, 5));
        // Well past the 365 day window, but the document changed after the ack.
        assert_eq!(
            derive_acknowledgment_status(&k, Some(&doc), at(2026, 1, 1)),
            AcknowledgmentStatus::Superseded
        );
    }

    #[test]
    fn test_missing_type_uses_default_window() {
        assert_eq!(retention_days(None), DEFAULT_RETENTION_DAYS);
        let doc = sop(None, at(2023, 1, 1));
        let k = ack(at(2024, 1, 5));
        assert_eq!(
            derive_acknowledgment_status(&k, Some(&doc), at(2025, 6, 1)),
            AcknowledgmentStatus::Acknowledged
        );
        assert_eq!(
            derive_acknowledgment_status(&k, Some(&doc), at(2026, 2, 1)),
            AcknowledgmentStatus::Expired
        );
    }

    #[test]
    fn test_expires_at_and_days_until_due() {
        let k = ack(at(2024, 1, 1));
        assert_eq!(expires_at(&k, Some(DocumentType::Training)), at(2024, 12, 31));

        let a = assignment(Some(at(2024, 1, 10)));
        assert_eq!(days_until_due(&a, at(2024, 1, 5)), Some(5));
        assert_eq!(days_until_due(&a, at(2024, 1, 12)), Some(-2));
        assert_eq!(days_until_due(&assignment(None), at(2024, 1, 5)), None);
    }
}
