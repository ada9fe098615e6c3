//! Router-level tests against the in-memory store.

use std::sync::Arc;

use api_lib::adapters::BroadcastChangeFeed;
use api_lib::config::Config;
use api_lib::web::{router, state::AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sop_compliance_core::memory::MemoryDatabase;
use tower::ServiceExt;

/// Test application context
struct TestApp {
    router: Router,
    db: Arc<MemoryDatabase>,
}

/// Response from a test request
#[derive(Debug)]
struct TestResponse {
    status: StatusCode,
    content_type: Option<String>,
    set_cookie: Option<String>,
    text: String,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("memory://".to_string()),
            _ => None,
        })
        .expect("Failed to build test config");
        let db = Arc::new(MemoryDatabase::new());
        let state = Arc::new(AppState::new(
            db.clone(),
            Arc::new(BroadcastChangeFeed::new(16)),
            config,
        ));
        Self {
            router: router(state),
            db,
        }
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut req = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let header_text = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header_text(header::CONTENT_TYPE);
        let set_cookie = header_text(header::SET_COOKIE);
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");
        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            content_type,
            set_cookie,
            text,
            body,
        }
    }

    /// Signs up and returns the `session=...` cookie pair plus the response body.
    async fn signup(&self, payload: Value) -> (String, Value) {
        let response = self.request("POST", "/auth/signup", Some(payload), None).await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "Signup failed: {}",
            response.text
        );
        let cookie = response
            .set_cookie
            .as_deref()
            .and_then(|c| c.split(';').next())
            .expect("No session cookie")
            .to_string();
        (cookie, response.body)
    }
}

fn admin_signup() -> Value {
    json!({
        "email": "avery@northwind.test",
        "password": "correct-horse",
        "confirm_password": "correct-horse",
        "full_name": "Avery Admin",
        "department": "Quality",
        "company_name": "Northwind Foods"
    })
}

fn employee_signup(company_id: &str) -> Value {
    json!({
        "email": "lee@northwind.test",
        "password": "battery-staple",
        "confirm_password": "battery-staple",
        "full_name": "Lee Line",
        "department": "Production",
        "company_id": company_id
    })
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = TestApp::new();
    let response = app.request("GET", "/me/assignments", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .request("GET", "/me/assignments", None, Some("session=not-a-session"))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_validation() {
    let app = TestApp::new();

    let mut mismatch = admin_signup();
    mismatch["confirm_password"] = json!("something-else");
    let response = app.request("POST", "/auth/signup", Some(mismatch), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let mut short = admin_signup();
    short["password"] = json!("short");
    short["confirm_password"] = json!("short");
    let response = app.request("POST", "/auth/signup", Some(short), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let mut no_company = admin_signup();
    no_company["company_name"] = Value::Null;
    let response = app.request("POST", "/auth/signup", Some(no_company), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    app.signup(admin_signup()).await;
    let response = app.request("POST", "/auth/signup", Some(admin_signup()), None).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_duplicate_email_creates_no_company() {
    let app = TestApp::new();
    app.signup(admin_signup()).await;
    assert_eq!(app.db.company_count().await, 1);

    let mut again = admin_signup();
    again["email"] = json!("AVERY@northwind.test");
    again["company_name"] = json!("Second Co");
    let response = app.request("POST", "/auth/signup", Some(again), None).await;
    assert_eq!(response.status, StatusCode::CONFLICT, "{}", response.text);
    assert!(response.set_cookie.is_none());
    assert_eq!(app.db.company_count().await, 1);
}

#[tokio::test]
async fn test_login_and_logout() {
    let app = TestApp::new();
    app.signup(admin_signup()).await;

    let bad = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({"email": "avery@northwind.test", "password": "wrong-password"})),
            None,
        )
        .await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);

    let good = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({"email": "Avery@Northwind.test", "password": "correct-horse"})),
            None,
        )
        .await;
    assert_eq!(good.status, StatusCode::OK);
    assert_eq!(good.body["role"], "admin");
    let cookie = good
        .set_cookie
        .as_deref()
        .and_then(|c| c.split(';').next())
        .expect("cookie")
        .to_string();

    let out = app.request("POST", "/auth/logout", None, Some(&cookie)).await;
    assert_eq!(out.status, StatusCode::OK);
    let after = app.request("GET", "/me/stats", None, Some(&cookie)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_assign_acknowledge_and_report() {
    let app = TestApp::new();
    let (admin, admin_body) = app.signup(admin_signup()).await;
    let company_id = admin_body["company_id"].as_str().expect("company id").to_string();
    let (worker, worker_body) = app.signup(employee_signup(&company_id)).await;
    assert_eq!(worker_body["role"], "employee");
    let worker_id = worker_body["user_id"].as_str().expect("user id").to_string();

    // Employees cannot create documents.
    let denied = app
        .request("POST", "/sops", Some(json!({"title": "Forklift Basics"})), Some(&worker))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let sop = app
        .request(
            "POST",
            "/sops",
            Some(json!({
                "title": "Lockout, Tagout",
                "content": "Isolate energy before service.",
                "document_type": "sop",
                "department": "Safety",
                "priority": "high"
            })),
            Some(&admin),
        )
        .await;
    assert_eq!(sop.status, StatusCode::CREATED, "{}", sop.text);
    let sop_id = sop.body["id"].as_str().expect("sop id").to_string();

    let assigned = app
        .request(
            "POST",
            "/assignments",
            Some(json!({"sop_id": sop_id, "user_ids": [worker_id]})),
            Some(&admin),
        )
        .await;
    assert_eq!(assigned.status, StatusCode::CREATED, "{}", assigned.text);
    let assignment_id = assigned.body[0]["id"].as_str().expect("assignment id").to_string();

    let mine = app.request("GET", "/me/assignments", None, Some(&worker)).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body.as_array().map(Vec::len), Some(1));
    assert_eq!(mine.body[0]["status"], "pending");

    let inbox = app.request("GET", "/me/notifications", None, Some(&worker)).await;
    assert_eq!(inbox.body.as_array().map(Vec::len), Some(1));

    // Only the assignee may acknowledge, and only once.
    let path = format!("/assignments/{}/acknowledge", assignment_id);
    let foreign = app.request("POST", &path, None, Some(&admin)).await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);
    let first = app
        .request("POST", &path, Some(json!({"notes": "Read twice"})), Some(&worker))
        .await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.text);
    assert_eq!(first.body["sop_version"], "1.0");
    let second = app.request("POST", &path, None, Some(&worker)).await;
    assert_eq!(second.status, StatusCode::CONFLICT);

    let stats = app.request("GET", "/me/stats", None, Some(&worker)).await;
    assert_eq!(stats.body["acknowledged"], 1);
    assert_eq!(stats.body["compliance_rate"], 100);

    // Reporting is for managers.
    let dashboard_path = format!("/companies/{}/dashboard", company_id);
    let forbidden = app.request("GET", &dashboard_path, None, Some(&worker)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    let dashboard = app.request("GET", &dashboard_path, None, Some(&admin)).await;
    assert_eq!(dashboard.status, StatusCode::OK);
    assert_eq!(dashboard.body["departments"][0]["department"], "Safety");
    assert_eq!(dashboard.body["overall"]["compliance_rate"], 100);

    let report = app
        .request(
            "GET",
            "/reports/compliance?status=acknowledged&search=lee&page_size=5",
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(report.status, StatusCode::OK);
    assert_eq!(report.body["total_count"], 1);
    assert_eq!(report.body["page_size"], 5);

    let csv = app
        .request("GET", "/reports/compliance/export?format=csv", None, Some(&admin))
        .await;
    assert_eq!(csv.status, StatusCode::OK);
    assert!(csv.content_type.as_deref().is_some_and(|c| c.starts_with("text/csv")));
    assert!(csv.text.starts_with("assignment_id,document,"));
    assert!(csv.text.contains("\"Lockout, Tagout\""));
    assert_eq!(csv.text.lines().count(), 2);
    assert!(csv.text.ends_with('\n'));

    let pdf = app
        .request("GET", "/reports/compliance/export?format=pdf", None, Some(&admin))
        .await;
    assert_eq!(pdf.status, StatusCode::NOT_IMPLEMENTED);
    let unknown = app
        .request("GET", "/reports/compliance/export?format=doc", None, Some(&admin))
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

    let audit = app
        .request(
            "GET",
            &format!("/companies/{}/audit-logs?page=1&page_size=2", company_id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(audit.status, StatusCode::OK);
    assert_eq!(audit.body["total_count"], 3);
    assert_eq!(audit.body["total_pages"], 2);
    assert_eq!(audit.body["entries"][0]["action"], "sop.acknowledged");
}

#[tokio::test]
async fn test_document_edit_supersedes_acknowledgment() {
    let app = TestApp::new();
    let (admin, admin_body) = app.signup(admin_signup()).await;
    let company_id = admin_body["company_id"].as_str().expect("company id").to_string();
    let (worker, worker_body) = app.signup(employee_signup(&company_id)).await;

    let sop = app
        .request(
            "POST",
            "/sops",
            Some(json!({"title": "Hand Washing", "content": "Twenty seconds.", "document_type": "policy"})),
            Some(&admin),
        )
        .await;
    let sop_id = sop.body["id"].as_str().expect("sop id").to_string();
    let assigned = app
        .request(
            "POST",
            "/assignments",
            Some(json!({"sop_id": sop_id, "user_ids": [worker_body["user_id"]]})),
            Some(&admin),
        )
        .await;
    let assignment_id = assigned.body[0]["id"].as_str().expect("assignment id").to_string();
    app.request(
        "POST",
        &format!("/assignments/{}/acknowledge", assignment_id),
        None,
        Some(&worker),
    )
    .await;

    let history = app.request("GET", "/me/acknowledgments", None, Some(&worker)).await;
    assert_eq!(history.body[0]["status"], "acknowledged");

    let empty = app
        .request("PATCH", &format!("/sops/{}", sop_id), Some(json!({})), Some(&admin))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let edited = app
        .request(
            "PATCH",
            &format!("/sops/{}", sop_id),
            Some(json!({"content": "Thirty seconds."})),
            Some(&admin),
        )
        .await;
    assert_eq!(edited.status, StatusCode::OK, "{}", edited.text);
    assert_eq!(edited.body["version"], "1.1");

    let history = app.request("GET", "/me/acknowledgments", None, Some(&worker)).await;
    assert_eq!(history.body[0]["status"], "superseded");
    assert_eq!(history.body[0]["current_version"], "1.1");
}

#[tokio::test]
async fn test_unknown_records_are_not_found() {
    let app = TestApp::new();
    let (admin, _) = app.signup(admin_signup()).await;
    let missing = uuid::Uuid::new_v4();

    let ack = app
        .request(
            "POST",
            &format!("/assignments/{}/acknowledge", missing),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(ack.status, StatusCode::NOT_FOUND);

    let read = app
        .request(
            "POST",
            &format!("/notifications/{}/read", missing),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(read.status, StatusCode::NOT_FOUND);

    let join = app
        .request("POST", "/auth/signup", Some(employee_signup(&missing.to_string())), None)
        .await;
    assert_eq!(join.status, StatusCode::NOT_FOUND);
}
