//! crates/sop_compliance_core/src/aggregate.rs
//!
//! Rolls joined assignment rows up into compliance statistics for dashboards
//! and reports. Empty input always yields zeroed statistics.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Acknowledgment, Assignment, AssignmentStatus, Sop, SopStatus, User};
use crate::status::derive_assignment_status;

/// Group used when neither the document nor the assignee names a department.
pub const UNKNOWN_DEPARTMENT: &str = "Unknown";

/// One assignment joined with its document, assignee and acknowledgment.
#[derive(Debug, Clone)]
pub struct ComplianceRow {
    pub assignment: Assignment,
    pub sop: Option<Sop>,
    pub user: Option<User>,
    pub acknowledgment: Option<Acknowledgment>,
}

impl ComplianceRow {
    pub fn status(&self, now: DateTime<Utc>) -> AssignmentStatus {
        derive_assignment_status(&self.assignment, self.acknowledgment.as_ref(), now)
    }

    /// Document department, then assignee department, then `"Unknown"`.
    pub fn department(&self) -> &str {
        non_blank(self.sop.as_ref().and_then(|s| s.department.as_deref()))
            .or_else(|| non_blank(self.user.as_ref().and_then(|u| u.department.as_deref())))
            .unwrap_or(UNKNOWN_DEPARTMENT)
    }

    /// Time from assignment to acknowledgment, if acknowledged.
    pub fn response_time(&self) -> Option<Duration> {
        self.acknowledgment
            .as_ref()
            .map(|ack| ack.acknowledged_at - self.assignment.created_at)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Joins raw rows the way the hosted backend's nested selects would.
/// Documents and users missing from the lookup tables stay `None`.
pub fn join_rows(
    assignments: Vec<Assignment>,
    sops: &[Sop],
    users: &[User],
    acknowledgments: &[Acknowledgment],
) -> Vec<ComplianceRow> {
    let sops: HashMap<Uuid, &Sop> = sops.iter().map(|s| (s.id, s)).collect();
    let users: HashMap<Uuid, &User> = users.iter().map(|u| (u.id, u)).collect();
    let acks: HashMap<Uuid, &Acknowledgment> = acknowledgments
        .iter()
        .map(|a| (a.assignment_id, a))
        .collect();

    assignments
        .into_iter()
        .map(|assignment| ComplianceRow {
            sop: sops.get(&assignment.sop_id).map(|s| (*s).clone()),
            user: users.get(&assignment.user_id).map(|u| (*u).clone()),
            acknowledgment: acks.get(&assignment.id).map(|a| (*a).clone()),
            assignment,
        })
        .collect()
}

//=========================================================================================
// Counts
//=========================================================================================

/// Status counts for any scope (one user, a department, a company).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceCounts {
    pub total: u32,
    pub pending: u32,
    pub acknowledged: u32,
    pub overdue: u32,
    pub compliance_rate: u32,
}

impl ComplianceCounts {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = AssignmentStatus>,
    {
        let mut counts = Self::default();
        for status in statuses {
            counts.record(status);
        }
        counts.compliance_rate = compliance_rate(counts.acknowledged, counts.total);
        counts
    }

    fn record(&mut self, status: AssignmentStatus) {
        self.total += 1;
        match status {
            AssignmentStatus::Pending => self.pending += 1,
            AssignmentStatus::Acknowledged => self.acknowledged += 1,
            AssignmentStatus::Overdue => self.overdue += 1,
        }
    }
}

/// `round(acknowledged / total * 100)`, and 0 for an empty scope.
pub fn compliance_rate(acknowledged: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(acknowledged) / f64::from(total) * 100.0).round() as u32
}

pub fn counts_for(rows: &[ComplianceRow], now: DateTime<Utc>) -> ComplianceCounts {
    ComplianceCounts::from_statuses(rows.iter().map(|r| r.status(now)))
}

//=========================================================================================
// Department and User Rollups
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentStats {
    pub department: String,
    pub total: u32,
    pub pending: u32,
    pub acknowledged: u32,
    pub overdue: u32,
    pub compliance_rate: u32,
    /// Mean days from assignment to acknowledgment, acknowledged rows only.
    pub avg_response_time_days: f64,
}

/// Per-department statistics sorted by department name.
pub fn department_stats(rows: &[ComplianceRow], now: DateTime<Utc>) -> Vec<DepartmentStats> {
    let mut groups: BTreeMap<&str, Vec<&ComplianceRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.department()).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(department, rows)| {
            let counts = ComplianceCounts::from_statuses(rows.iter().map(|r| r.status(now)));
            let response_times: Vec<Duration> =
                rows.iter().filter_map(|r| r.response_time()).collect();
            DepartmentStats {
                department: department.to_string(),
                total: counts.total,
                pending: counts.pending,
                acknowledged: counts.acknowledged,
                overdue: counts.overdue,
                compliance_rate: counts.compliance_rate,
                avg_response_time_days: mean_days(&response_times),
            }
        })
        .collect()
}

/// Mean of durations in days, rounded to one decimal. Zero for an empty slice.
fn mean_days(durations: &[Duration]) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    let total_secs: i64 = durations.iter().map(|d| d.num_seconds()).sum();
    let days = total_secs as f64 / 86_400.0 / durations.len() as f64;
    (days * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserComplianceStats {
    pub user_id: Uuid,
    pub name: String,
    pub department: String,
    pub counts: ComplianceCounts,
}

/// Per-assignee statistics, lowest compliance rate first.
pub fn user_stats(rows: &[ComplianceRow], now: DateTime<Utc>) -> Vec<UserComplianceStats> {
    let mut groups: HashMap<Uuid, Vec<&ComplianceRow>> = HashMap::new();
    for row in rows {
        groups.entry(row.assignment.user_id).or_default().push(row);
    }

    let mut stats: Vec<UserComplianceStats> = groups
        .into_iter()
        .map(|(user_id, rows)| {
            let user = rows.iter().find_map(|r| r.user.as_ref());
            UserComplianceStats {
                user_id,
                name: user
                    .map(|u| u.display_name().to_string())
                    .unwrap_or_else(|| user_id.to_string()),
                department: non_blank(user.and_then(|u| u.department.as_deref()))
                    .unwrap_or(UNKNOWN_DEPARTMENT)
                    .to_string(),
                counts: ComplianceCounts::from_statuses(rows.iter().map(|r| r.status(now))),
            }
        })
        .collect();
    stats.sort_by(|a, b| {
        a.counts
            .compliance_rate
            .cmp(&b.counts.compliance_rate)
            .then_with(|| a.name.cmp(&b.name))
    });
    stats
}

//=========================================================================================
// Review Schedule
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingReview {
    pub sop_id: Uuid,
    pub title: String,
    pub next_review_date: NaiveDate,
    pub days_remaining: i64,
}

/// Active documents whose review date falls on or before `now + within_days`,
/// soonest first. Reviews already past due are included with negative days.
pub fn upcoming_reviews(sops: &[Sop], now: DateTime<Utc>, within_days: i64) -> Vec<UpcomingReview> {
    let today = now.date_naive();
    let mut reviews: Vec<UpcomingReview> = sops
        .iter()
        .filter(|s| s.status == SopStatus::Active)
        .filter_map(|s| {
            let date = s.next_review_date?;
            let days_remaining = (date - today).num_days();
            (days_remaining <= within_days).then(|| UpcomingReview {
                sop_id: s.id,
                title: s.title.clone(),
                next_review_date: date,
                days_remaining,
            })
        })
        .collect();
    reviews.sort_by_key(|r| r.next_review_date);
    reviews
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, Role};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn row(
        sop_department: Option<&str>,
        user_department: Option<&str>,
        acknowledged_after_days: Option<i64>,
    ) -> ComplianceRow {
        let company_id = Uuid::nil();
        let created_at = at(2024, 1, 1);
        let user = User {
            id: Uuid::new_v4(),
            company_id,
            email: "worker@example.com".to_string(),
            full_name: "Pat Worker".to_string(),
            department: user_department.map(str::to_string),
            role: Role::Employee,
        };
        let sop = Sop {
            id: Uuid::new_v4(),
            company_id,
            title: "Forklift Operation".to_string(),
            content: String::new(),
            version: "2.1".to_string(),
            document_type: None,
            department: sop_department.map(str::to_string),
            status: SopStatus::Active,
            priority: Priority::Medium,
            next_review_date: None,
            created_at,
            updated_at: created_at,
        };
        let assignment = Assignment {
            id: Uuid::new_v4(),
            company_id,
            sop_id: sop.id,
            user_id: user.id,
            assigned_by: Uuid::new_v4(),
            due_date: Some(at(2024, 1, 10)),
            priority: Priority::Medium,
            status: AssignmentStatus::Pending,
            notes: None,
            created_at,
        };
        let acknowledgment = acknowledged_after_days.map(|days| Acknowledgment {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            user_id: user.id,
            sop_id: sop.id,
            sop_version: sop.version.clone(),
            notes: None,
            acknowledged_at: created_at + Duration::days(days),
        });
        ComplianceRow {
            assignment,
            sop: Some(sop),
            user: Some(user),
            acknowledgment,
        }
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let counts = counts_for(&[], at(2024, 2, 1));
        assert_eq!(counts, ComplianceCounts::default());
        assert!(department_stats(&[], at(2024, 2, 1)).is_empty());
        assert_eq!(compliance_rate(0, 0), 0);
    }

    #[test]
    fn test_safety_department_seventy_percent() {
        let mut rows: Vec<ComplianceRow> = (0..7).map(|_| row(Some("Safety"), None, Some(2))).collect();
        rows.extend((0..3).map(|_| row(Some("Safety"), None, None)));

        let stats = department_stats(&rows, at(2024, 2, 1));
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].department, "Safety");
        assert_eq!(stats[0].total, 10);
        assert_eq!(stats[0].acknowledged, 7);
        assert_eq!(stats[0].overdue, 3);
        assert_eq!(stats[0].compliance_rate, 70);
        assert_eq!(stats[0].avg_response_time_days, 2.0);
    }

    #[test]
    fn test_department_falls_back_to_assignee_then_unknown() {
        let rows = vec![
            row(None, Some("Quality"), None),
            row(Some("  "), None, None),
            row(Some("Safety"), Some("Quality"), None),
        ];
        let names: Vec<String> = department_stats(&rows, at(2024, 1, 5))
            .into_iter()
            .map(|s| s.department)
            .collect();
        assert_eq!(names, vec!["Quality", "Safety", "Unknown"]);
    }

    #[test]
    fn test_avg_response_time_ignores_unacknowledged() {
        let rows = vec![
            row(Some("Ops"), None, Some(1)),
            row(Some("Ops"), None, Some(4)),
            row(Some("Ops"), None, None),
        ];
        let stats = department_stats(&rows, at(2024, 1, 5));
        assert_eq!(stats[0].avg_response_time_days, 2.5);
        assert_eq!(stats[0].compliance_rate, 67);
    }

    #[test]
    fn test_user_stats_orders_laggards_first() {
        let done = row(Some("Ops"), Some("Ops"), Some(1));
        let mut late = row(Some("Ops"), Some("Ops"), None);
        late.user.as_mut().unwrap().full_name = "Alex Late".to_string();

        let stats = user_stats(&[done, late], at(2024, 2, 1));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "Alex Late");
        assert_eq!(stats[0].counts.overdue, 1);
        assert_eq!(stats[1].counts.compliance_rate, 100);
    }

    #[test]
    fn test_upcoming_reviews_window() {
        let base = row(Some("Ops"), None, None).sop.unwrap();
        let mut soon = base.clone();
        soon.next_review_date = NaiveDate::from_ymd_opt(2024, 1, 20);
        let mut later = base.clone();
        later.next_review_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let mut archived = soon.clone();
        archived.status = SopStatus::Archived;

        let reviews = upcoming_reviews(&[later, soon, archived], at(2024, 1, 10), 30);
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].days_remaining, 10);
    }
}
