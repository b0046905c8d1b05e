//! Integration tests for the Defence HQ backend.

use std::path::Path;

use axum::body::Body;
use axum::http::Request;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::{BootstrapAdmin, Config, LogFormat};
use crate::{create_router, init_state};

const ADMIN_EMAIL: &str = "admin@dhq.test";
const ADMIN_PASSWORD: &str = "Command#Post1";
const STRONG_PASSWORD: &str = "Field!Unit42";

fn test_config(dir: &Path) -> Config {
    Config {
        db_path: dir.join("test.sqlite"),
        index_path: dir.join("index"),
        media_path: dir.join("media"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Text,
        session_ttl_hours: 1,
        max_upload_bytes: 1024 * 1024,
        bootstrap_admin: Some(BootstrapAdmin {
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    admin_token: String,
    temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let config = test_config(temp_dir.path());

        let state = init_state(config).await.expect("Failed to init state");
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut fixture = TestFixture {
            client: Client::new(),
            base_url,
            admin_token: String::new(),
            temp_dir,
        };
        fixture.admin_token = fixture.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        fixture
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                reqwest::Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn admin_get(&self, path: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, Some(&self.admin_token), None)
            .await
    }

    async fn admin_post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(&self.admin_token), Some(body))
            .await
    }

    async fn admin_put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, Some(&self.admin_token), Some(body))
            .await
    }

    async fn submit_report(&self, state: &str, description: &str, priority: &str) -> String {
        let (status, body) = self
            .send(
                reqwest::Method::POST,
                "/public/reports",
                None,
                Some(json!({
                    "description": description,
                    "location": "Along the federal highway",
                    "state": state,
                    "threatType": "banditry",
                    "priority": priority,
                    "isAnonymous": true
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "submit failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// Create a commander-role account and a commander profile linked to it.
    async fn create_linked_commander(&self, email: &str, state: &str) -> (String, String) {
        let (status, user) = self
            .admin_post(
                "/api/users",
                json!({
                    "email": email,
                    "fullName": "Col. Test",
                    "role": "commander",
                    "password": STRONG_PASSWORD
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create user failed: {}", user);
        let user_id = user["data"]["id"].as_str().unwrap().to_string();

        let commander_id = self.create_commander(state, Some(&user_id)).await;
        let token = self.login(email, STRONG_PASSWORD).await;
        (commander_id, token)
    }

    async fn create_commander(&self, state: &str, user_id: Option<&str>) -> String {
        let (status, body) = self
            .admin_post(
                "/api/commanders",
                json!({
                    "name": format!("Commander {}", state),
                    "rank": "Colonel",
                    "state": state,
                    "userId": user_id
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create commander failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn assign(&self, report_id: &str, commander_id: &str) -> (StatusCode, Value) {
        self.admin_post(
            "/api/assignments",
            json!({ "reportId": report_id, "commanderId": commander_id }),
        )
        .await
    }

    async fn resolve(&self, assignment_id: &str, token: &str, form: Form) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(&format!("/api/assignments/{}/resolve", assignment_id)))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

fn resolution_part() -> Part {
    Part::text(
        json!({
            "summary": "Suspects dispersed, two arrested",
            "outcome": "apprehended",
            "arrests": 2
        })
        .to_string(),
    )
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_session_required() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .send(reqwest::Method::GET, "/api/reports", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = fixture
        .send(reqwest::Method::GET, "/api/reports", Some("not-a-session"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = fixture
        .send(
            reqwest::Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL, "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid email or password");

    let (status, body) = fixture.admin_get("/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);
    assert_eq!(body["data"]["role"], "admin");

    // Token in the query string, as WebSocket clients send it
    let (status, body) = fixture
        .send(
            reqwest::Method::GET,
            &format!("/api/auth/me?access_token={}", fixture.admin_token),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let fixture = TestFixture::new().await;
    let token = fixture.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, _) = fixture
        .send(reqwest::Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = fixture
        .send(reqwest::Method::GET, "/api/auth/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other sessions are unaffected
    let (status, _) = fixture.admin_get("/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_public_submission_and_tracking() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .send(
            reqwest::Method::POST,
            "/public/reports",
            None,
            Some(json!({
                "description": "Kidnappers seen moving towards the forest reserve",
                "location": "Kachia road",
                "state": "Kaduna State",
                "threatType": "kidnapping",
                "reporterName": "Amina",
                "reporterPhone": "+2348012345678"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let tracking = &body["data"];
    assert_eq!(tracking["status"], "pending");
    assert_eq!(tracking["state"], "Kaduna");
    assert!(tracking.get("description").is_none());
    assert!(tracking.get("reporterName").is_none());
    let id = tracking["id"].as_str().unwrap();

    let (status, body) = fixture
        .send(reqwest::Method::GET, &format!("/public/reports/{}", id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["threatType"], "kidnapping");

    // Back office sees the full record with default priority
    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", id)).await;
    assert_eq!(body["data"]["report"]["priority"], "medium");
    assert_eq!(body["data"]["report"]["reporterName"], "Amina");
    assert_eq!(body["data"]["assignments"].as_array().unwrap().len(), 0);

    let (status, body) = fixture
        .send(reqwest::Method::GET, "/public/reports/missing", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_public_submission_validation() {
    let fixture = TestFixture::new().await;

    let cases = [
        json!({ "description": "too short", "location": "x", "state": "Lagos", "threatType": "other" }),
        json!({ "description": "A long enough description", "location": "x", "state": "Atlantis", "threatType": "other" }),
        json!({ "description": "A long enough description", "location": "x", "state": "Lagos", "threatType": "other", "latitude": 6.5 }),
        json!({ "description": "A long enough description", "location": "x", "state": "Lagos", "threatType": "other", "isAnonymous": true, "reporterName": "Ade" }),
    ];

    for case in cases {
        let (status, body) = fixture
            .send(reqwest::Method::POST, "/public/reports", None, Some(case))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    let (_, body) = fixture.admin_get("/api/reports").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_report_filters() {
    let fixture = TestFixture::new().await;

    fixture
        .submit_report("Lagos", "Armed robbery at the bus park last night", "critical")
        .await;
    fixture
        .submit_report("Kano", "Cattle rustlers attacked the settlement", "low")
        .await;
    fixture
        .submit_report("Lagos", "Cult clash reported near the campus gate", "low")
        .await;

    let (_, body) = fixture.admin_get("/api/reports?state=lagos").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = fixture
        .admin_get("/api/reports?state=Lagos&priority=critical")
        .await;
    let reports = body["data"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["priority"], "critical");

    let (_, body) = fixture.admin_get("/api/reports?status=resolved").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (_, body) = fixture.admin_get("/api/reports").await;
    let reports = body["data"].as_array().unwrap();
    assert_eq!(reports.len(), 3);
    // Newest first
    assert!(reports[0]["createdAt"].as_str() >= reports[2]["createdAt"].as_str());

    // Bounds with a UTC offset compare as instants
    let earliest = reports[2]["createdAt"].as_str().unwrap();
    let shifted = chrono::DateTime::parse_from_rfc3339(earliest)
        .unwrap()
        .with_timezone(&chrono::FixedOffset::east_opt(3600).unwrap())
        .to_rfc3339();
    let (status, body) = fixture
        .admin_get(&format!(
            "/api/reports?from={}",
            shifted.replace('+', "%2B")
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, body) = fixture.admin_get("/api/reports?from=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture.admin_get("/api/analytics?to=03/04/2025").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_assignment_workflow() {
    let fixture = TestFixture::new().await;

    let (commander_id, commander_token) = fixture
        .create_linked_commander("kaduna.cmd@dhq.test", "Kaduna")
        .await;
    let report_id = fixture
        .submit_report("Kaduna", "Gunmen blocked the highway near the toll gate", "high")
        .await;

    let (_, body) = fixture
        .admin_get(&format!("/api/reports/{}/eligible-commanders", report_id))
        .await;
    let eligible = body["data"].as_array().unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0]["id"], commander_id.as_str());

    let (status, body) = fixture.assign(&report_id, &commander_id).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let assignment_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "pending");

    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", report_id)).await;
    assert_eq!(body["data"]["report"]["status"], "assigned");
    assert_eq!(body["data"]["assignments"].as_array().unwrap().len(), 1);

    let (_, body) = fixture
        .admin_get(&format!("/api/commanders/{}", commander_id))
        .await;
    assert_eq!(body["data"]["activeAssignments"], 1);
    assert_eq!(body["data"]["totalAssignments"], 1);

    // A second open assignment for the same report is refused
    let (status, body) = fixture.assign(&report_id, &commander_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // The commander sees the work on their own dashboard
    let (status, body) = fixture
        .send(reqwest::Method::GET, "/api/me/dashboard", Some(&commander_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let open = body["data"]["openAssignments"].as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["report"]["id"], report_id.as_str());

    let (status, body) = fixture
        .send(
            reqwest::Method::POST,
            &format!("/api/assignments/{}/accept", assignment_id),
            Some(&commander_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "accepted");

    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", report_id)).await;
    assert_eq!(body["data"]["report"]["status"], "in_progress");

    let evidence = Part::bytes(b"\xFF\xD8\xFFscene".to_vec())
        .file_name("scene photo.jpg")
        .mime_str("image/jpeg")
        .unwrap();
    let form = Form::new()
        .part("resolution", resolution_part())
        .part("evidence", evidence);
    let (status, body) = fixture.resolve(&assignment_id, &commander_token, form).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let resolution = &body["data"]["resolution"];
    assert_eq!(body["data"]["status"], "resolved");
    assert_eq!(resolution["outcome"], "apprehended");
    assert_eq!(resolution["arrests"], 2);
    let evidence_url = resolution["evidenceUrls"][0].as_str().unwrap().to_string();
    assert!(evidence_url.starts_with("/media/evidence/"));

    let resp = fixture.client.get(fixture.url(&evidence_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");

    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", report_id)).await;
    assert_eq!(body["data"]["report"]["status"], "resolved");

    let (_, body) = fixture
        .admin_get(&format!("/api/commanders/{}", commander_id))
        .await;
    assert_eq!(body["data"]["activeAssignments"], 0);
    assert_eq!(body["data"]["resolvedAssignments"], 1);
    assert_eq!(body["data"]["successRate"], 100.0);

    // Resolved reports can then be closed
    let (status, body) = fixture
        .admin_put(
            &format!("/api/reports/{}/status", report_id),
            json!({ "status": "closed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "closed");
}

#[tokio::test]
async fn test_assignment_eligibility_rules() {
    let fixture = TestFixture::new().await;

    let kano_commander = fixture.create_commander("Kano", None).await;
    let lagos_commander = fixture.create_commander("Lagos", None).await;
    let report_id = fixture
        .submit_report("Lagos", "Shots fired near the waterfront market", "high")
        .await;

    let (status, body) = fixture.assign(&report_id, &kano_commander).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("serves Kano"));

    let (status, _) = fixture
        .admin_put(
            &format!("/api/commanders/{}", lagos_commander),
            json!({ "status": "on_leave" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = fixture.assign(&report_id, &lagos_commander).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = fixture
        .admin_get(&format!("/api/reports/{}/eligible-commanders", report_id))
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", report_id)).await;
    assert_eq!(body["data"]["report"]["status"], "pending");
}

#[tokio::test]
async fn test_failed_evidence_upload_leaves_state_unchanged() {
    let fixture = TestFixture::new().await;

    let (commander_id, commander_token) = fixture
        .create_linked_commander("plateau.cmd@dhq.test", "Plateau")
        .await;
    let report_id = fixture
        .submit_report("Plateau", "Communal clash spreading to nearby villages", "critical")
        .await;
    let (_, body) = fixture.assign(&report_id, &commander_id).await;
    let assignment_id = body["data"]["id"].as_str().unwrap().to_string();

    let good = Part::bytes(b"%PDF-1.4 report".to_vec())
        .file_name("after-action.pdf")
        .mime_str("application/pdf")
        .unwrap();
    let bad = Part::bytes(b"MZ\x90\x00".to_vec())
        .file_name("payload.exe")
        .mime_str("application/x-msdownload")
        .unwrap();
    let form = Form::new()
        .part("resolution", resolution_part())
        .part("evidence", good)
        .part("evidence", bad);

    let (status, body) = fixture.resolve(&assignment_id, &commander_token, form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (_, body) = fixture
        .admin_get(&format!("/api/assignments/{}", assignment_id))
        .await;
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"].get("resolution").is_none());

    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", report_id)).await;
    assert_eq!(body["data"]["report"]["status"], "assigned");

    // The already-stored PDF was rolled back
    let evidence_dir = fixture.temp_dir.path().join("media").join("evidence");
    assert_eq!(std::fs::read_dir(evidence_dir).unwrap().count(), 0);

    let (_, body) = fixture
        .admin_get(&format!("/api/commanders/{}", commander_id))
        .await;
    assert_eq!(body["data"]["activeAssignments"], 1);
}

#[tokio::test]
async fn test_cancel_assignment() {
    let fixture = TestFixture::new().await;

    let commander_id = fixture.create_commander("Borno", None).await;
    let report_id = fixture
        .submit_report("Borno", "Insurgents sighted near the outpost", "critical")
        .await;
    let (_, body) = fixture.assign(&report_id, &commander_id).await;
    let assignment_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .admin_post(
            &format!("/api/assignments/{}/cancel", assignment_id),
            json!({ "reason": "Reassigning to rapid response unit" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", report_id)).await;
    assert_eq!(body["data"]["report"]["status"], "pending");

    let (_, body) = fixture
        .admin_get(&format!("/api/commanders/{}", commander_id))
        .await;
    assert_eq!(body["data"]["activeAssignments"], 0);
    assert_eq!(body["data"]["totalAssignments"], 1);
    assert_eq!(body["data"]["successRate"], 0.0);

    // Cancelling twice is refused
    let (status, _) = fixture
        .admin_post(&format!("/api/assignments/{}/cancel", assignment_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The report can be assigned again
    let (status, _) = fixture.assign(&report_id, &commander_id).await;
    assert_eq!(status, StatusCode::OK);

    // Commanders with history cannot be deleted
    let (status, _) = fixture
        .send(
            reqwest::Method::DELETE,
            &format!("/api/commanders/{}", commander_id),
            Some(&fixture.admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_status_transitions() {
    let fixture = TestFixture::new().await;
    let report_id = fixture
        .submit_report("Oyo", "Prank call about an explosion at the stadium", "low")
        .await;
    let path = format!("/api/reports/{}/status", report_id);

    let (status, body) = fixture.admin_put(&path, json!({ "status": "closed" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = fixture
        .admin_put(&path, json!({ "status": "rejected", "reason": "Hoax" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");

    let (status, body) = fixture.admin_put(&path, json!({ "status": "pending" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");

    let (status, _) = fixture.admin_put(&path, json!({ "status": "resolved" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A reopened report goes back into the assignment queue
    let commander_id = fixture.create_commander("Oyo", None).await;
    let (status, _) = fixture.assign(&report_id, &commander_id).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = fixture.admin_put(&path, json!({ "status": "rejected" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_update_version_conflict() {
    let fixture = TestFixture::new().await;
    let report_id = fixture
        .submit_report("Enugu", "Vandals stripping cables off the rail line", "medium")
        .await;
    let path = format!("/api/reports/{}", report_id);

    let (status, body) = fixture
        .admin_put(&path, json!({ "priority": "high", "expectedVersion": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["priority"], "high");
    assert_eq!(body["data"]["version"], 2);

    let (status, body) = fixture
        .admin_put(&path, json!({ "priority": "low", "expectedVersion": 1 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
}

#[tokio::test]
async fn test_role_guards() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture
        .admin_post(
            "/api/users",
            json!({
                "email": "analyst@dhq.test",
                "fullName": "Intel Analyst",
                "role": "analyst",
                "password": STRONG_PASSWORD
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let analyst = fixture.login("analyst@dhq.test", STRONG_PASSWORD).await;

    let (status, body) = fixture
        .send(reqwest::Method::GET, "/api/audit", Some(&analyst), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = fixture
        .send(
            reqwest::Method::POST,
            "/api/commanders",
            Some(&analyst),
            Some(json!({ "name": "X", "rank": "Major", "state": "Lagos" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = fixture
        .send(reqwest::Method::GET, "/api/analytics", Some(&analyst), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, commander) = fixture
        .create_linked_commander("rivers.cmd@dhq.test", "Rivers")
        .await;
    let (status, _) = fixture
        .send(reqwest::Method::GET, "/api/analytics", Some(&commander), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_commander_report_visibility() {
    let fixture = TestFixture::new().await;

    let (lagos_id, lagos_token) = fixture
        .create_linked_commander("lagos.cmd@dhq.test", "Lagos")
        .await;
    let (first_kano_id, _) = fixture
        .create_linked_commander("kano.one@dhq.test", "Kano")
        .await;
    let (second_kano_id, kano_token) = fixture
        .create_linked_commander("kano.two@dhq.test", "Kano")
        .await;

    let lagos_report = fixture
        .submit_report("Lagos", "Armed robbers attacked a bus at Ojota", "high")
        .await;
    let kano_report = fixture
        .submit_report("Kano", "Kidnappers seen near the Kano ring road", "critical")
        .await;
    fixture
        .submit_report("Kano", "Vandals cutting power cables at night", "low")
        .await;

    fixture.assign(&lagos_report, &lagos_id).await;
    let (_, body) = fixture.assign(&kano_report, &first_kano_id).await;
    let first_assignment = body["data"]["id"].as_str().unwrap().to_string();
    fixture
        .admin_post(
            &format!("/api/assignments/{}/cancel", first_assignment),
            json!({ "reason": "Handing over" }),
        )
        .await;
    let (status, _) = fixture.assign(&kano_report, &second_kano_id).await;
    assert_eq!(status, StatusCode::OK);

    // Only reports the commander holds are listed
    let (status, body) = fixture
        .send(reqwest::Method::GET, "/api/reports", Some(&lagos_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let reports = body["data"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["id"], lagos_report.as_str());

    let (status, _) = fixture
        .send(
            reqwest::Method::GET,
            &format!("/api/reports/{}", kano_report),
            Some(&lagos_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Assignment history is cut down to the caller's own work
    let (_, body) = fixture.admin_get(&format!("/api/reports/{}", kano_report)).await;
    assert_eq!(body["data"]["assignments"].as_array().unwrap().len(), 2);

    let (status, body) = fixture
        .send(
            reqwest::Method::GET,
            &format!("/api/reports/{}", kano_report),
            Some(&kano_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let assignments = body["data"]["assignments"].as_array().unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0]["commanderId"], second_kano_id.as_str());

    let (status, _) = fixture
        .send(
            reqwest::Method::GET,
            "/api/reports/search?q=kidnappers",
            Some(&kano_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_analytics() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.admin_get("/api/analytics?days=7").await;
    let data = &body["data"];
    assert_eq!(data["summary"]["totalReports"], 0);
    assert_eq!(data["summary"]["resolutionRate"], 0.0);
    assert_eq!(data["byWeekday"].as_array().unwrap().len(), 7);
    assert_eq!(data["byWeekday"][0]["label"], "Mon");
    assert_eq!(data["dailyTrend"].as_array().unwrap().len(), 7);

    fixture
        .submit_report("Lagos", "Armed robbery at the bus park last night", "critical")
        .await;
    fixture
        .submit_report("Lagos", "Suspicious vehicle parked at the bridge", "high")
        .await;
    fixture
        .submit_report("Kano", "Cattle rustlers attacked the settlement", "low")
        .await;

    let (_, body) = fixture.admin_get("/api/analytics").await;
    let data = &body["data"];
    assert_eq!(data["summary"]["totalReports"], 3);
    assert_eq!(data["summary"]["pending"], 3);
    assert_eq!(data["summary"]["criticalOpen"], 1);
    assert_eq!(data["byState"][0]["label"], "Lagos");
    assert_eq!(data["byState"][0]["count"], 2);
    let weekday_total: i64 = data["byWeekday"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["count"].as_i64().unwrap())
        .sum();
    assert_eq!(weekday_total, 3);

    let (_, body) = fixture.admin_get("/api/analytics?state=Kano").await;
    assert_eq!(body["data"]["summary"]["totalReports"], 1);
}

#[tokio::test]
async fn test_audit_trail() {
    let fixture = TestFixture::new().await;
    let report_id = fixture
        .submit_report("Benue", "Farmers attacked at dawn, several missing", "critical")
        .await;
    fixture
        .admin_put(
            &format!("/api/reports/{}", report_id),
            json!({ "priority": "high" }),
        )
        .await;

    let (status, body) = fixture.admin_get("/api/audit?limit=50").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert!(entries.iter().any(|e| e["kind"] == "change"
        && e["summary"] == format!("submit report {}", report_id)));
    assert!(entries.iter().any(|e| e["kind"] == "access"
        && e["summary"].as_str().unwrap().starts_with("PUT /api/reports/")));

    let timestamps: Vec<&str> = entries
        .iter()
        .map(|e| e["timestamp"].as_str().unwrap())
        .collect();
    assert!(timestamps.windows(2).all(|w| w[0] >= w[1]));

    let (_, body) = fixture
        .admin_get(&format!("/api/audit?entityType=report&entityId={}", report_id))
        .await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["kind"] == "change"));
    assert_eq!(entries[0]["details"]["priority"]["to"], "high");

    let (_, body) = fixture.admin_get("/api/audit/access?limit=1").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_notifications() {
    let fixture = TestFixture::new().await;
    fixture
        .submit_report("Zamfara", "Bandits demanding levies from farmers", "high")
        .await;
    fixture
        .submit_report("Zamfara", "Gunmen sighted on motorcycles at night", "high")
        .await;

    let (_, body) = fixture.admin_get("/api/notifications").await;
    let notifications = body["data"].as_array().unwrap();
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n["read"] == false));
    let first = notifications[0]["id"].as_str().unwrap().to_string();

    let (status, _) = fixture
        .admin_post(&format!("/api/notifications/{}/read", first), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = fixture.admin_post("/api/notifications/read-all", json!({})).await;
    assert_eq!(body["data"], 1);

    let (status, _) = fixture
        .admin_post("/api/notifications/unknown/read", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_password_policy() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .admin_post(
            "/api/users",
            json!({
                "email": "weak@dhq.test",
                "fullName": "Weak Password",
                "role": "analyst",
                "password": "password"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("uppercase"), "{}", message);
    assert!(message.contains("digit"), "{}", message);

    let request = json!({
        "email": "Ops@DHQ.test",
        "fullName": "Operations",
        "role": "analyst",
        "password": STRONG_PASSWORD
    });
    let (status, body) = fixture.admin_post("/api/users", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ops@dhq.test");

    let (status, _) = fixture.admin_post("/api/users", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_password() {
    let fixture = TestFixture::new().await;

    let (status, _) = fixture
        .admin_post(
            "/api/auth/password",
            json!({ "currentPassword": "nope", "newPassword": STRONG_PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fixture
        .admin_post(
            "/api/auth/password",
            json!({ "currentPassword": ADMIN_PASSWORD, "newPassword": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fixture
        .admin_post(
            "/api/auth/password",
            json!({ "currentPassword": ADMIN_PASSWORD, "newPassword": STRONG_PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The session that changed the password stays valid
    let (status, _) = fixture.admin_get("/api/auth/me").await;
    assert_eq!(status, StatusCode::OK);

    fixture.login(ADMIN_EMAIL, STRONG_PASSWORD).await;
}

#[tokio::test]
async fn test_deactivated_user_loses_access() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture
        .admin_post(
            "/api/users",
            json!({
                "email": "temp@dhq.test",
                "fullName": "Temporary",
                "role": "analyst",
                "password": STRONG_PASSWORD
            }),
        )
        .await;
    let user_id = body["data"]["id"].as_str().unwrap().to_string();
    let token = fixture.login("temp@dhq.test", STRONG_PASSWORD).await;

    let (status, body) = fixture
        .admin_put(&format!("/api/users/{}", user_id), json!({ "active": false }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], false);

    let (status, _) = fixture
        .send(reqwest::Method::GET, "/api/auth/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_search_reports() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .submit_report("Niger", "Gunmen blocked the highway near the toll gate", "high")
        .await;
    fixture
        .submit_report("Niger", "Youths vandalised the transformer overnight", "low")
        .await;

    let (status, body) = fixture.admin_get("/api/reports/search?q=toll").await;
    assert_eq!(status, StatusCode::OK);
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["report"]["id"], id.as_str());

    let (_, body) = fixture.admin_get("/api/reports/search?q=").await;
    assert_eq!(body["data"]["total"], 0);

    // Degenerate paging is clamped rather than failing
    let (status, body) = fixture
        .admin_get("/api/reports/search?q=highway&limit=0")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["limit"], 1);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);

    let (status, body) = fixture
        .admin_get("/api/reports/search?q=niger&limit=1&offset=18446744073709551615")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert!(body["data"]["results"].as_array().unwrap().is_empty());

    let (_, body) = fixture.admin_get("/api/reports/search?q=niger&limit=1").await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);

    let (status, _) = fixture
        .send(
            reqwest::Method::DELETE,
            &format!("/api/reports/{}", id),
            Some(&fixture.admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = fixture.admin_get("/api/reports/search?q=toll").await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_public_media_upload() {
    let fixture = TestFixture::new().await;

    let form = Form::new().part(
        "file",
        Part::bytes(b"fake-mp4".to_vec())
            .file_name("clip.mp4")
            .mime_str("video/mp4")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/public/media"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let object = &body["data"][0];
    assert_eq!(object["bucket"], "report-media");
    assert_eq!(object["contentType"], "video/mp4");
    let url = object["url"].as_str().unwrap();

    let resp = fixture.client.get(fixture.url(url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"fake-mp4");

    // A page declared as an image is stored and served as that image
    let form = Form::new().part(
        "file",
        Part::bytes(b"<script>alert(1)</script>".to_vec())
            .file_name("x.html")
            .mime_str("image/png")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/public/media"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["contentType"], "image/png");
    let url = body["data"][0]["url"].as_str().unwrap();
    assert!(url.ends_with(".png"));

    let resp = fixture.client.get(fixture.url(url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");

    // Documents are downloads, never rendered in place
    let form = Form::new().part(
        "file",
        Part::bytes(b"%PDF-1.4".to_vec())
            .file_name("statement.pdf")
            .mime_str("application/pdf")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/public/media"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let url = body["data"][0]["url"].as_str().unwrap();
    let resp = fixture.client.get(fixture.url(url)).send().await.unwrap();
    assert_eq!(resp.headers()["content-type"], "application/pdf");
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment"));

    let form = Form::new().part(
        "file",
        Part::bytes(b"<svg onload=alert(1)/>".to_vec())
            .file_name("map.svg")
            .mime_str("image/svg+xml")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/public/media"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let form = Form::new().part(
        "file",
        Part::bytes(b"#!/bin/sh".to_vec())
            .file_name("run.sh")
            .mime_str("application/x-sh")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/public/media"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .get(fixture.url("/media/report-media/missing.jpg"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_revision_increments() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.admin_get("/api/revision").await;
    let initial = body["data"]["revisionId"].as_i64().unwrap();

    fixture
        .submit_report("Ogun", "Pipeline vandals spotted at the creek", "medium")
        .await;

    let (_, body) = fixture.admin_get("/api/revision").await;
    assert_eq!(body["data"]["revisionId"].as_i64().unwrap(), initial + 1);
    assert_eq!(body["revisionId"].as_i64().unwrap(), initial + 1);
}

#[tokio::test]
async fn test_not_found() {
    let fixture = TestFixture::new().await;

    for path in [
        "/api/reports/nonexistent",
        "/api/commanders/nonexistent",
        "/api/assignments/nonexistent",
        "/api/commanders/nonexistent/dashboard",
    ] {
        let (status, body) = fixture.admin_get(path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(body["success"], false);
    }

    // Admin has no linked commander profile
    let (status, _) = fixture.admin_get("/api/me/dashboard").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_router_in_process() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_router(init_state(test_config(temp_dir.path())).await.unwrap());

    let resp = app
        .clone()
        .oneshot(Request::get("/api/realtime").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Bodies above the configured upload limit are refused
    let oversized = vec![b' '; 2 * 1024 * 1024];
    let resp = app
        .clone()
        .oneshot(
            Request::post("/public/reports")
                .header("content-type", "application/json")
                .body(Body::from(oversized))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let resp = app
        .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
