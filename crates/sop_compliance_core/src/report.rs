//! crates/sop_compliance_core/src/report.rs
//!
//! Compliance report building: filtering, free-text search, pagination and the
//! formatted rows handed to the web layer and the CSV exporter.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{ComplianceCounts, ComplianceRow};
use crate::domain::{AssignmentStatus, DocumentType, Priority};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

//=========================================================================================
// Filters
//=========================================================================================

/// Fixed lookback windows offered by the report screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRangePreset {
    #[serde(rename = "last-7-days")]
    Last7Days,
    #[default]
    #[serde(rename = "last-30-days")]
    Last30Days,
    #[serde(rename = "last-90-days")]
    Last90Days,
    #[serde(rename = "last-year")]
    LastYear,
}

impl DateRangePreset {
    /// Unrecognised values fall back to the 30 day window.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "last-7-days" => Self::Last7Days,
            "last-90-days" => Self::Last90Days,
            "last-year" => Self::LastYear,
            _ => Self::Last30Days,
        }
    }

    pub fn lookback_days(&self) -> i64 {
        match self {
            Self::Last7Days => 7,
            Self::Last30Days => 30,
            Self::Last90Days => 90,
            Self::LastYear => 365,
        }
    }

    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.lookback_days())
    }
}

/// Report filters. `None` on any optional field means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilters {
    pub date_range: DateRangePreset,
    pub status: Option<AssignmentStatus>,
    pub department: Option<String>,
    pub priority: Option<Priority>,
    pub document_type: Option<DocumentType>,
}

impl ReportFilters {
    /// Builds filters from the raw string parameters used by the query API.
    /// `"all"`, empty strings, absent and unrecognised values disable the
    /// corresponding filter.
    pub fn from_params(
        date_range: Option<&str>,
        status: Option<&str>,
        department: Option<&str>,
        priority: Option<&str>,
        document_type: Option<&str>,
    ) -> Self {
        Self {
            date_range: date_range.map(DateRangePreset::parse).unwrap_or_default(),
            status: selected(status).and_then(AssignmentStatus::parse),
            department: selected(department).map(str::to_string),
            priority: selected(priority).and_then(Priority::parse),
            document_type: selected(document_type).and_then(DocumentType::from_str_value),
        }
    }

    fn matches(&self, row: &ComplianceRow, now: DateTime<Utc>) -> bool {
        if row.assignment.created_at < self.date_range.start(now) {
            return false;
        }
        if let Some(status) = self.status {
            if row.status(now) != status {
                return false;
            }
        }
        if let Some(department) = &self.department {
            if !row.department().eq_ignore_ascii_case(department) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if row.assignment.priority != priority {
                return false;
            }
        }
        if let Some(document_type) = self.document_type {
            if row.sop.as_ref().and_then(|s| s.document_type) != Some(document_type) {
                return false;
            }
        }
        true
    }
}

fn selected(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

//=========================================================================================
// Pagination
//=========================================================================================

/// Page cursor plus the search term, which is applied just before slicing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub search: String,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: String::new(),
        }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, page_size: Option<u32>, search: Option<&str>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            search: search.unwrap_or_default().trim().to_string(),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }
}

pub fn total_pages(total: usize, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as usize) as u32
}

//=========================================================================================
// Report Rows and Pages
//=========================================================================================

/// One formatted report line. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub assignment_id: Uuid,
    pub document: String,
    pub document_type: String,
    pub version: String,
    pub department: String,
    pub user: String,
    pub email: String,
    pub priority: String,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl ReportRow {
    pub fn from_row(row: &ComplianceRow, now: DateTime<Utc>) -> Self {
        Self {
            assignment_id: row.assignment.id,
            document: row
                .sop
                .as_ref()
                .map(|s| s.title.clone())
                .unwrap_or_default(),
            document_type: row
                .sop
                .as_ref()
                .and_then(|s| s.document_type)
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            version: row
                .sop
                .as_ref()
                .map(|s| s.version.clone())
                .unwrap_or_default(),
            department: row.department().to_string(),
            user: row
                .user
                .as_ref()
                .map(|u| u.display_name().to_string())
                .unwrap_or_default(),
            email: row
                .user
                .as_ref()
                .map(|u| u.email.clone())
                .unwrap_or_default(),
            priority: row.assignment.priority.as_str().to_string(),
            status: row.status(now),
            assigned_at: row.assignment.created_at,
            due_date: row.assignment.due_date,
            acknowledged_at: row.acknowledgment.as_ref().map(|a| a.acknowledged_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPage {
    pub rows: Vec<ReportRow>,
    pub total_count: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    /// Statistics over the filtered set before pagination.
    pub stats: ComplianceCounts,
}

/// Case-insensitive substring match on document title and user name/email.
fn matches_search(row: &ComplianceRow, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let in_title = row
        .sop
        .as_ref()
        .is_some_and(|s| s.title.to_lowercase().contains(needle));
    let in_user = row.user.as_ref().is_some_and(|u| {
        u.full_name.to_lowercase().contains(needle) || u.email.to_lowercase().contains(needle)
    });
    in_title || in_user
}

/// Filters, newest first, for every page and for export.
pub fn filter_rows<'a>(
    rows: &'a [ComplianceRow],
    filters: &ReportFilters,
    search: &str,
    now: DateTime<Utc>,
) -> Vec<&'a ComplianceRow> {
    let needle = search.trim().to_lowercase();
    let mut filtered: Vec<&ComplianceRow> = rows
        .iter()
        .filter(|r| filters.matches(r, now))
        .filter(|r| matches_search(r, &needle))
        .collect();
    filtered.sort_by(|a, b| b.assignment.created_at.cmp(&a.assignment.created_at));
    filtered
}

/// Builds one page of the compliance report.
pub fn build_report(
    rows: &[ComplianceRow],
    filters: &ReportFilters,
    pagination: &Pagination,
    now: DateTime<Utc>,
) -> ReportPage {
    let filtered = filter_rows(rows, filters, &pagination.search, now);
    let stats = ComplianceCounts::from_statuses(filtered.iter().map(|r| r.status(now)));
    let total_count = filtered.len();

    let page_rows = filtered
        .iter()
        .skip(pagination.offset())
        .take(pagination.page_size as usize)
        .map(|r| ReportRow::from_row(r, now))
        .collect();

    ReportPage {
        rows: page_rows,
        total_count,
        page: pagination.page,
        page_size: pagination.page_size,
        total_pages: total_pages(total_count, pagination.page_size),
        stats,
    }
}

//=========================================================================================
// View State (reducer)
//=========================================================================================

/// State of a report screen. Transitions are pure; fetching happens elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportViewState {
    pub filters: ReportFilters,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportAction {
    SetFilters(ReportFilters),
    SetSearch(String),
    SetPage(u32),
    SetPageSize(u32),
}

impl ReportViewState {
    pub fn reduce(mut self, action: ReportAction) -> Self {
        match action {
            ReportAction::SetFilters(filters) => {
                if filters != self.filters {
                    self.filters = filters;
                    self.pagination.page = 1;
                }
            }
            ReportAction::SetSearch(term) => {
                let term = term.trim().to_string();
                if term != self.pagination.search {
                    self.pagination.search = term;
                    self.pagination.page = 1;
                }
            }
            ReportAction::SetPage(page) => self.pagination.page = page.max(1),
            ReportAction::SetPageSize(size) => {
                self.pagination.page_size = size.clamp(1, MAX_PAGE_SIZE);
                self.pagination.page = 1;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Acknowledgment, Assignment, Role, Sop, SopStatus, User};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn row(title: &str, user_name: &str, created_at: DateTime<Utc>, acked: bool) -> ComplianceRow {
        let user = User {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            email: format!("{}@example.com", user_name.to_lowercase().replace(' ', ".")),
            full_name: user_name.to_string(),
            department: Some("Operations".to_string()),
            role: Role::Employee,
        };
        let sop = Sop {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            title: title.to_string(),
            content: String::new(),
            version: "1.0".to_string(),
            document_type: Some(DocumentType::Sop),
            department: None,
            status: SopStatus::Active,
            priority: Priority::Medium,
            next_review_date: None,
            created_at,
            updated_at: created_at,
        };
        let assignment = Assignment {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            sop_id: sop.id,
            user_id: user.id,
            assigned_by: Uuid::new_v4(),
            due_date: None,
            priority: Priority::High,
            status: AssignmentStatus::Pending,
            notes: None,
            created_at,
        };
        let acknowledgment = acked.then(|| Acknowledgment {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            user_id: user.id,
            sop_id: sop.id,
            sop_version: "1.0".to_string(),
            notes: None,
            acknowledged_at: created_at + Duration::hours(3),
        });
        ComplianceRow {
            assignment,
            sop: Some(sop),
            user: Some(user),
            acknowledgment,
        }
    }

    #[test]
    fn test_date_range_presets() {
        assert_eq!(DateRangePreset::parse("last-7-days").lookback_days(), 7);
        assert_eq!(DateRangePreset::parse("last-30-days").lookback_days(), 30);
        assert_eq!(DateRangePreset::parse("last-90-days").lookback_days(), 90);
        assert_eq!(DateRangePreset::parse("last-year").lookback_days(), 365);
        assert_eq!(DateRangePreset::parse("last-decade").lookback_days(), 30);
    }

    #[test]
    fn test_from_params_treats_all_as_no_filter() {
        let filters = ReportFilters::from_params(
            Some("last-90-days"),
            Some("all"),
            Some(""),
            Some("ALL"),
            Some("bogus"),
        );
        assert_eq!(filters.date_range, DateRangePreset::Last90Days);
        assert_eq!(filters.status, None);
        assert_eq!(filters.department, None);
        assert_eq!(filters.priority, None);
        assert_eq!(filters.document_type, None);
    }

    #[test]
    fn test_unrecognised_filter_values_match_everything() {
        let now = at(2024, 3, 1);
        let rows = vec![
            row("A", "X", now - Duration::days(1), true),
            row("B", "Y", now - Duration::days(1), false),
        ];
        let filters = ReportFilters::from_params(None, Some("bogus"), None, Some("nonsense"), Some("memo"));
        assert_eq!(filters.status, None);
        assert_eq!(filters.priority, None);
        assert_eq!(filters.document_type, None);
        let page = build_report(&rows, &filters, &Pagination::default(), now);
        assert_eq!(page.total_count, 2);

        let filters = ReportFilters::from_params(None, Some("Pending"), None, Some("medium"), None);
        assert_eq!(filters.status, Some(AssignmentStatus::Pending));
        assert_eq!(filters.priority, Some(Priority::Medium));
    }

    #[test]
    fn test_stats_cover_filtered_unpaginated_set() {
        let now = at(2024, 3, 1);
        let rows: Vec<ComplianceRow> = (0..25)
            .map(|i| row("Hand Washing", "Sam Lee", now - Duration::days(1 + i), i % 5 == 0))
            .collect();

        let page = build_report(&rows, &ReportFilters::default(), &Pagination::new(Some(2), Some(10), None), now);
        // All 25 rows fall inside the default 30 day window.
        assert_eq!(page.total_count, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.rows.len(), 10);
        assert_eq!(page.stats.total, 25);
        assert_eq!(page.stats.acknowledged, 5);
        assert_eq!(page.stats.compliance_rate, 20);
    }

    #[test]
    fn test_date_window_excludes_old_rows() {
        let now = at(2024, 3, 1);
        let rows = vec![
            row("Recent", "A", now - Duration::days(3), false),
            row("Old", "B", now - Duration::days(45), false),
        ];
        let mut filters = ReportFilters::default();
        filters.date_range = DateRangePreset::Last7Days;
        let page = build_report(&rows, &filters, &Pagination::default(), now);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].document, "Recent");
    }

    #[test]
    fn test_search_is_case_insensitive_on_title_and_user() {
        let now = at(2024, 3, 1);
        let rows = vec![
            row("Chemical Storage", "Dana Cruz", now - Duration::days(1), false),
            row("Fire Drill", "Morgan Chem", now - Duration::days(2), false),
            row("Ladder Safety", "Kim Ito", now - Duration::days(3), false),
        ];
        let page = build_report(
            &rows,
            &ReportFilters::default(),
            &Pagination::new(None, None, Some("CHEM")),
            now,
        );
        assert_eq!(page.total_count, 2);
        assert_eq!(page.stats.total, 2);
    }

    #[test]
    fn test_status_filter() {
        let now = at(2024, 3, 1);
        let rows = vec![
            row("A", "X", now - Duration::days(1), true),
            row("B", "Y", now - Duration::days(1), false),
        ];
        let mut filters = ReportFilters::default();
        filters.status = Some(AssignmentStatus::Pending);
        let page = build_report(&rows, &filters, &Pagination::default(), now);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].status, AssignmentStatus::Pending);
    }

    #[test]
    fn test_page_past_end_is_empty_with_totals() {
        let now = at(2024, 3, 1);
        let rows = vec![row("A", "X", now - Duration::days(1), false)];
        let page = build_report(&rows, &ReportFilters::default(), &Pagination::new(Some(4), Some(10), None), now);
        assert!(page.rows.is_empty());
        assert_eq!(page.total_count, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_changing_filters_resets_page() {
        let state = ReportViewState::default().reduce(ReportAction::SetPage(3));
        assert_eq!(state.pagination.page, 3);

        let mut pending = ReportFilters::default();
        pending.status = Some(AssignmentStatus::Pending);
        let state = state.reduce(ReportAction::SetFilters(pending.clone()));
        assert_eq!(state.pagination.page, 1);

        // Same filters again leave the cursor alone.
        let state = state
            .reduce(ReportAction::SetPage(2))
            .reduce(ReportAction::SetFilters(pending));
        assert_eq!(state.pagination.page, 2);
    }

    #[test]
    fn test_search_change_resets_page_only_when_term_differs() {
        let state = ReportViewState::default()
            .reduce(ReportAction::SetSearch("fire".to_string()))
            .reduce(ReportAction::SetPage(4))
            .reduce(ReportAction::SetSearch("fire".to_string()));
        assert_eq!(state.pagination.page, 4);

        let state = state.reduce(ReportAction::SetSearch("fire drill".to_string()));
        assert_eq!(state.pagination.page, 1);
        assert_eq!(state.pagination.search, "fire drill");
    }
}
