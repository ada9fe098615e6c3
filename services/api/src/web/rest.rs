//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every handler reads the signed-in `User` placed in the request extensions by
//! `require_auth` and delegates to `ComplianceService`; port errors are mapped
//! to status codes by `port_error_response`.

use crate::error::{port_error_response, HandlerError};
use crate::web::auth::{AuthResponse, LoginRequest, SignupRequest};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sop_compliance_core::domain::{
    Acknowledgment, Assignment, DocumentType, NewSop, Notification, Priority, Sop, SopStatus,
    SopUpdate, User,
};
use sop_compliance_core::export::ExportFormat;
use sop_compliance_core::report::{Pagination, ReportFilters, ReportPage};
use sop_compliance_core::service::{
    AcknowledgmentHistoryEntry, AssignRequest, AssignmentView, AuditTrailPage, CompanyDashboard,
};
use sop_compliance_core::aggregate::ComplianceCounts;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        my_assignments_handler,
        acknowledge_handler,
        my_acknowledgments_handler,
        my_stats_handler,
        my_notifications_handler,
        mark_notification_read_handler,
        list_sops_handler,
        create_sop_handler,
        update_sop_handler,
        assign_handler,
        company_users_handler,
        dashboard_handler,
        compliance_report_handler,
        export_report_handler,
        audit_logs_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            AuthResponse,
            AcknowledgeRequest,
            CreateSopRequest,
            UpdateSopRequest,
            AssignRequestBody,
        )
    ),
    tags(
        (name = "SOP Compliance API", description = "Document assignment, acknowledgment and compliance reporting.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload and Query Structs
//=========================================================================================

#[derive(Deserialize, ToSchema, Default)]
pub struct AcknowledgeRequest {
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSopRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub version: Option<String>,
    /// sop | procedure | policy | training
    pub document_type: Option<String>,
    pub department: Option<String>,
    /// draft | active | archived; defaults to active
    pub status: Option<String>,
    /// low | medium | high | critical
    pub priority: Option<String>,
    pub next_review_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateSopRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub version: Option<String>,
    pub document_type: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub next_review_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignRequestBody {
    pub sop_id: Uuid,
    pub user_ids: Vec<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub notes: Option<String>,
}

/// Filter, search and paging parameters of the compliance report.
#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    /// last-7-days | last-30-days | last-90-days | last-year
    pub date_range: Option<String>,
    pub status: Option<String>,
    pub department: Option<String>,
    pub priority: Option<String>,
    pub document_type: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ReportQuery {
    fn filters(&self) -> ReportFilters {
        ReportFilters::from_params(
            self.date_range.as_deref(),
            self.status.as_deref(),
            self.department.as_deref(),
            self.priority.as_deref(),
            self.document_type.as_deref(),
        )
    }
}

/// Read alongside `ReportQuery` from the same query string.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// csv | excel | pdf
    pub format: String,
}

#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

fn parse_document_type(value: Option<&str>) -> Result<Option<DocumentType>, HandlerError> {
    match value {
        None => Ok(None),
        Some(raw) => DocumentType::from_str_value(raw).map(Some).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Unknown document type '{}'", raw),
            )
        }),
    }
}

//=========================================================================================
// Employee Handlers
//=========================================================================================

/// List the signed-in user's assignments with derived status.
#[utoipa::path(
    get,
    path = "/me/assignments",
    responses(
        (status = 200, description = "Assignments, overdue first"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn my_assignments_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<AssignmentView>>, HandlerError> {
    let views = state
        .service
        .my_assignments(user.id, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok(Json(views))
}

/// Acknowledge one of the signed-in user's assignments.
#[utoipa::path(
    post,
    path = "/assignments/{id}/acknowledge",
    request_body = AcknowledgeRequest,
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 201, description = "Acknowledgment recorded"),
        (status = 403, description = "Assignment belongs to someone else"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Already acknowledged")
    )
)]
pub async fn acknowledge_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(assignment_id): Path<Uuid>,
    body: Option<Json<AcknowledgeRequest>>,
) -> Result<(StatusCode, Json<Acknowledgment>), HandlerError> {
    let notes = body.and_then(|Json(b)| b.notes);
    let ack = state
        .service
        .acknowledge(&user, assignment_id, notes, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(ack)))
}

/// The signed-in user's acknowledgment history with current status.
#[utoipa::path(
    get,
    path = "/me/acknowledgments",
    responses((status = 200, description = "History, newest first"))
)]
pub async fn my_acknowledgments_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<AcknowledgmentHistoryEntry>>, HandlerError> {
    let history = state
        .service
        .acknowledgment_history(user.id, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok(Json(history))
}

#[utoipa::path(
    get,
    path = "/me/stats",
    responses((status = 200, description = "Counts and compliance rate"))
)]
pub async fn my_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<ComplianceCounts>, HandlerError> {
    let stats = state
        .service
        .my_stats(user.id, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok(Json(stats))
}

#[utoipa::path(
    get,
    path = "/me/notifications",
    responses((status = 200, description = "Unexpired notifications, newest first"))
)]
pub async fn my_notifications_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Notification>>, HandlerError> {
    let notifications = state
        .service
        .notifications(user.id, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok(Json(notifications))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_notification_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .service
        .mark_notification_read(&user, notification_id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Document Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/sops",
    responses((status = 200, description = "Documents of the caller's company"))
)]
pub async fn list_sops_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Sop>>, HandlerError> {
    let sops = state
        .service
        .documents(&user)
        .await
        .map_err(port_error_response)?;
    Ok(Json(sops))
}

#[utoipa::path(
    post,
    path = "/sops",
    request_body = CreateSopRequest,
    responses(
        (status = 201, description = "Document created"),
        (status = 400, description = "Invalid document"),
        (status = 403, description = "Caller cannot manage documents")
    )
)]
pub async fn create_sop_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateSopRequest>,
) -> Result<(StatusCode, Json<Sop>), HandlerError> {
    let new_sop = NewSop {
        company_id: user.company_id,
        title: req.title.trim().to_string(),
        content: req.content,
        version: req
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "1.0".to_string()),
        document_type: parse_document_type(req.document_type.as_deref())?,
        department: req.department.filter(|d| !d.trim().is_empty()),
        status: req
            .status
            .as_deref()
            .map(SopStatus::from_str_value)
            .unwrap_or(SopStatus::Active),
        priority: req
            .priority
            .as_deref()
            .map(Priority::from_str_value)
            .unwrap_or(Priority::Medium),
        next_review_date: req.next_review_date,
    };
    let sop = state
        .service
        .create_sop(&user, new_sop)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(sop)))
}

/// Edit a document. Any edit supersedes earlier acknowledgments.
#[utoipa::path(
    patch,
    path = "/sops/{id}",
    request_body = UpdateSopRequest,
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document updated"),
        (status = 400, description = "Empty or invalid update"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn update_sop_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(sop_id): Path<Uuid>,
    Json(req): Json<UpdateSopRequest>,
) -> Result<Json<Sop>, HandlerError> {
    let update = SopUpdate {
        title: req.title,
        content: req.content,
        version: req.version,
        document_type: parse_document_type(req.document_type.as_deref())?,
        department: req.department,
        status: req.status.as_deref().map(SopStatus::from_str_value),
        priority: req.priority.as_deref().map(Priority::from_str_value),
        next_review_date: req.next_review_date,
    };
    let sop = state
        .service
        .update_sop(&user, sop_id, update, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok(Json(sop))
}

//=========================================================================================
// Administration and Reporting Handlers
//=========================================================================================

#[utoipa::path(
    post,
    path = "/assignments",
    request_body = AssignRequestBody,
    responses(
        (status = 201, description = "Assignments created"),
        (status = 400, description = "No users given"),
        (status = 403, description = "Caller cannot assign documents"),
        (status = 404, description = "Document or user not found")
    )
)]
pub async fn assign_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<AssignRequestBody>,
) -> Result<(StatusCode, Json<Vec<Assignment>>), HandlerError> {
    let request = AssignRequest {
        sop_id: req.sop_id,
        user_ids: req.user_ids,
        due_date: req.due_date,
        priority: req.priority.as_deref().map(Priority::from_str_value),
        notes: req.notes.filter(|n| !n.trim().is_empty()),
    };
    let created = state
        .service
        .assign(&user, request)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/companies/{id}/users",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 200, description = "Users of the company"),
        (status = 403, description = "Caller cannot manage this company")
    )
)]
pub async fn company_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<Vec<User>>, HandlerError> {
    let users = state
        .service
        .company_users(&user, company_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(users))
}

/// Company-wide compliance dashboard.
#[utoipa::path(
    get,
    path = "/companies/{id}/dashboard",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 200, description = "Overall, per-department and per-user compliance"),
        (status = 403, description = "Caller cannot manage this company"),
        (status = 404, description = "Company not found")
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<CompanyDashboard>, HandlerError> {
    let dashboard = state
        .service
        .company_dashboard(&user, company_id, state.config.review_window_days, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok(Json(dashboard))
}

/// Filtered, searched and paginated compliance report of the caller's company.
#[utoipa::path(
    get,
    path = "/reports/compliance",
    params(ReportQuery),
    responses(
        (status = 200, description = "One page of report rows plus stats over all matches"),
        (status = 403, description = "Caller cannot read reports")
    )
)]
pub async fn compliance_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportPage>, HandlerError> {
    let pagination = Pagination::new(
        query.page,
        query.page_size.or(Some(state.config.default_page_size)),
        query.search.as_deref(),
    );
    let page = state
        .service
        .compliance_report(&user, &query.filters(), &pagination, Utc::now())
        .await
        .map_err(port_error_response)?;
    Ok(Json(page))
}

/// Download every matching report row as a file.
#[utoipa::path(
    get,
    path = "/reports/compliance/export",
    params(ExportQuery, ReportQuery),
    responses(
        (status = 200, description = "The encoded report"),
        (status = 400, description = "Unknown format"),
        (status = 501, description = "Format not implemented")
    )
)]
pub async fn export_report_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(export): Query<ExportQuery>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let format = ExportFormat::from_str_value(&export.format).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown export format '{}'", export.format),
        )
    })?;
    let search = query.search.as_deref().unwrap_or_default().trim();
    let body = state
        .service
        .export_report(&user, &query.filters(), search, format, Utc::now())
        .await
        .map_err(|e| {
            error!("Report export failed: {:?}", e);
            port_error_response(e)
        })?;

    info!("User {} exported {} bytes", user.id, body.len());
    let disposition = format!(
        "attachment; filename=\"compliance-report-{}.{}\"",
        Utc::now().format("%Y-%m-%d"),
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Bytes::from(body),
    ))
}

/// Company audit trail, newest first.
#[utoipa::path(
    get,
    path = "/companies/{id}/audit-logs",
    params(("id" = Uuid, Path, description = "Company id"), PageQuery),
    responses(
        (status = 200, description = "One page of audit entries"),
        (status = 403, description = "Caller cannot manage this company")
    )
)]
pub async fn audit_logs_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(company_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<AuditTrailPage>, HandlerError> {
    let trail = state
        .service
        .audit_trail(
            &user,
            company_id,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(state.config.default_page_size),
        )
        .await
        .map_err(port_error_response)?;
    Ok(Json(trail))
}
