use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use formhub_api::app::{build_app, services::build_services};
use formhub_api::config::AppConfig;
use formhub_auth::{Account, AuthConfig, Hs256JwtIssuer};
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory stores, bound to an ephemeral port.
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            frontend_url: "http://frontend.test".to_string(),
            ..AppConfig::default()
        };
        let services = Arc::new(build_services(&config).await.expect("build services"));
        let app = build_app(&config, services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call(&self, method: reqwest::Method, path: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(reqwest::Method::GET, path, token, None).await
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(reqwest::Method::POST, path, token, Some(body)).await
    }

    async fn owner_token(&self, name: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/tenant/signup",
                None,
                json!({
                    "username": name,
                    "email": format!("{name}@owners.test"),
                    "password": "ownerpass",
                    "passwordConfirm": "ownerpass",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_form(&self, token: &str) -> String {
        let (status, body) = self
            .post(
                "/admin/forms",
                Some(token),
                json!({
                    "title": "Feedback",
                    "description": "Tell us",
                    "fields": [{"id": "fieldId", "type": "text", "label": "Say hi", "required": true}],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create form failed: {body}");
        body["form"]["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get("/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "auth_error");

    let (status, _) = srv.get("/admin/forms", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let srv = TestServer::spawn().await;

    let issuer = Hs256JwtIssuer::new(&AuthConfig {
        jwt_secret: JWT_SECRET.to_string(),
        ..AuthConfig::default()
    });
    let account = Account::tenant_owner("ghost", "ghost@x.test", "hash".into(), Utc::now());
    let stale = issuer
        .issue(&account, Utc::now() - ChronoDuration::days(30))
        .unwrap();

    let (status, _) = srv.get("/auth/me", Some(&stale.token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_store() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["store"], "up");
}

#[tokio::test]
async fn tenant_form_lifecycle() {
    let srv = TestServer::spawn().await;
    let owner = srv.owner_token("acme").await;

    let (status, me) = srv.get("/auth/me", Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    let tenant_id = me["user"]["id"].as_str().unwrap().to_string();
    assert!(me["user"].get("passwordHash").is_none());

    // Managed user.
    let (status, created) = srv
        .post(
            "/admin/users",
            Some(&owner),
            json!({"username": "user_u", "email": "u@x.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let user_id = created["user"]["id"].as_str().unwrap().to_string();

    let (status, session) = srv
        .post("/auth/user/login", None, json!({"email": "u@x.com", "password": "secret1"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["role"], "managed_user");
    assert_eq!(session["user"]["tenantId"], tenant_id.as_str());
    let user = session["token"].as_str().unwrap().to_string();

    let (status, body) = srv
        .post("/auth/user/login", None, json!({"email": "u@x.com", "password": "wrong!"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "auth_error");

    // Form, assignment, submission.
    let form_id = srv.create_form(&owner).await;
    let (status, form) = srv.get(&format!("/admin/forms/{form_id}"), Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(form["form"]["isPublished"], false);
    assert!(form["form"]["publicToken"].is_null());

    let (status, body) = srv
        .post(
            &format!("/admin/forms/{form_id}/assign-users"),
            Some(&owner),
            json!({"userIds": [user_id]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["form"]["assignedUsers"], json!([user_id]));

    let (_, assigned) = srv.get("/user/forms", Some(&user)).await;
    assert_eq!(assigned["forms"][0]["id"], form_id.as_str());

    let (status, body) = srv
        .post(
            &format!("/user/forms/{form_id}/submit"),
            Some(&user),
            json!({"answers": {"fieldId": "hello"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["submission"]["owner"], tenant_id.as_str());

    let (_, form) = srv.get(&format!("/admin/forms/{form_id}"), Some(&owner)).await;
    assert_eq!(form["form"]["submissionCount"], 1);

    // Publishing.
    let (status, first) = srv
        .post(&format!("/admin/forms/{form_id}/publish"), Some(&owner), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = first["publicToken"].as_str().unwrap().to_string();
    assert!(first["publicUrl"].as_str().unwrap().contains(&token));

    let (status, public) = srv.get(&format!("/public/forms/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["form"]["title"], "Feedback");
    assert!(public["form"].get("owner").is_none());
    assert!(public["form"].get("assignedUsers").is_none());

    let (_, second) = srv
        .post(&format!("/admin/forms/{form_id}/publish"), Some(&owner), json!({}))
        .await;
    assert_eq!(second["publicToken"], token.as_str());

    // Deletion cascades.
    let (status, body) = srv
        .call(reqwest::Method::DELETE, &format!("/admin/forms/{form_id}"), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedSubmissions"], 1);

    let (status, body) = srv.get(&format!("/admin/forms/{form_id}"), Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (_, mine) = srv.get("/user/submissions", Some(&user)).await;
    assert_eq!(mine["submissions"], json!([]));
    let (_, all) = srv.get("/admin/submissions", Some(&owner)).await;
    assert_eq!(all["submissions"], json!([]));
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_access() {
    let srv = TestServer::spawn().await;
    let owner = srv.owner_token("acme").await;
    let other = srv.owner_token("globex").await;
    let form_id = srv.create_form(&owner).await;

    let (status, body) = srv.get(&format!("/admin/forms/{form_id}"), Some(&other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = srv
        .post(&format!("/admin/forms/{form_id}/publish"), Some(&other), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .call(reqwest::Method::DELETE, &format!("/admin/forms/{form_id}"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = srv.get("/admin/forms", Some(&other)).await;
    assert_eq!(listed["forms"], json!([]));
}

#[tokio::test]
async fn managed_users_cannot_use_admin_routes() {
    let srv = TestServer::spawn().await;
    let owner = srv.owner_token("acme").await;
    srv.post(
        "/admin/users",
        Some(&owner),
        json!({"username": "user_u", "email": "u@x.com", "password": "secret1"}),
    )
    .await;
    let (_, session) = srv
        .post("/auth/user/login", None, json!({"email": "u@x.com", "password": "secret1"}))
        .await;
    let user = session["token"].as_str().unwrap().to_string();

    let (status, _) = srv.get("/admin/forms", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.get("/admin/users", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn public_submissions_honour_the_limit() {
    let srv = TestServer::spawn().await;
    let owner = srv.owner_token("acme").await;
    let form_id = srv.create_form(&owner).await;

    let (status, body) = srv
        .call(
            reqwest::Method::PUT,
            &format!("/admin/forms/{form_id}"),
            Some(&owner),
            Some(json!({"publicSettings": {"allowMultipleSubmissions": true, "submissionLimit": 1}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["form"]["title"], "Feedback");

    let (_, published) = srv
        .post(&format!("/admin/forms/{form_id}/publish"), Some(&owner), json!({}))
        .await;
    let token = published["publicToken"].as_str().unwrap().to_string();

    let (_, listed) = srv.get("/public/forms", None).await;
    assert_eq!(listed["forms"][0]["publicToken"], token.as_str());
    assert_eq!(listed["forms"][0]["fields"][0]["id"], "fieldId");
    assert!(listed["forms"][0]["assignedUsers"].is_null());

    let submit = json!({"publicToken": token, "answers": {"fieldId": "hi"}});
    let (status, body) = srv.post("/public/forms/submit", None, submit.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = srv.post("/public/forms/submit", None, submit).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "limit_exceeded");

    let (status, _) = srv.get("/public/forms/unknown-token", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_uses_the_envelope() {
    let srv = TestServer::spawn().await;
    let owner = srv.owner_token("acme").await;

    let res = srv
        .client
        .post(srv.url("/admin/forms"))
        .bearer_auth(&owner)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv.get("/admin/forms/not-a-uuid", Some(&owner)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = srv
        .post(
            "/auth/tenant/signup",
            None,
            json!({"username": "acme", "email": "acme@owners.test", "password": "ownerpass"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn standalone_users_author_fill_and_amend() {
    let srv = TestServer::spawn().await;

    let (status, author) = srv
        .post(
            "/auth/register",
            None,
            json!({"name": "Ana", "email": "ana@x.com", "password": "anapass", "passwordConfirm": "anapass"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{author}");
    let author = author["token"].as_str().unwrap().to_string();

    srv.post(
        "/auth/register",
        None,
        json!({"name": "Ben", "email": "ben@x.com", "password": "benpass"}),
    )
    .await;
    let (status, reader) = srv
        .post("/auth/login", None, json!({"email": "ben@x.com", "password": "benpass"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let reader = reader["token"].as_str().unwrap().to_string();

    let (status, body) = srv
        .post("/forms", Some(&author), json!({"title": "Empty", "fields": ["junk"]}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    // The tenant-owner surface stays closed to standalone users.
    let (status, body) = srv.post("/admin/forms", Some(&author), json!({"title": "Sneaky"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    let (status, _) = srv.get("/admin/forms", Some(&author)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv
        .post(
            "/forms",
            Some(&author),
            json!({"title": "Survey", "fields": r#"[{"id":"fieldId","type":"text"}]"#}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let form_id = body["form"]["id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .post(
            "/forms",
            Some(&author),
            json!({"formId": form_id, "title": "Survey v2", "fields": [{"id": "fieldId", "type": "text"}]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["form"]["title"], "Survey v2");

    let (status, body) = srv
        .post(
            &format!("/forms/{form_id}/submit"),
            Some(&reader),
            json!({"answers": {"fieldId": "first"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let submission_id = body["submission"]["id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .call(
            reqwest::Method::PATCH,
            &format!("/forms/submissions/{submission_id}"),
            Some(&reader),
            Some(json!({"answers": {"fieldId": "second"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["submission"]["answers"]["fieldId"], "second");

    let (status, _) = srv
        .call(
            reqwest::Method::PATCH,
            &format!("/forms/submissions/{submission_id}"),
            Some(&author),
            Some(json!({"answers": {"fieldId": "hijack"}})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, for_form) = srv.get(&format!("/forms/{form_id}/submissions"), Some(&author)).await;
    assert_eq!(for_form["submissions"].as_array().unwrap().len(), 1);
    let (status, _) = srv.get(&format!("/forms/{form_id}/submissions"), Some(&reader)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, mine) = srv.get("/forms/submissions", Some(&reader)).await;
    assert_eq!(mine["submissions"].as_array().unwrap().len(), 1);

    let (status, listed) = srv.get("/forms", Some(&author)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["forms"].as_array().unwrap().len(), 1);
    let (status, _) = srv
        .call(reqwest::Method::DELETE, &format!("/forms/{form_id}"), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = srv
        .call(reqwest::Method::DELETE, &format!("/forms/{form_id}"), Some(&author), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["deletedSubmissions"], 1);
}

#[tokio::test]
async fn forgot_password_response_is_constant() {
    let srv = TestServer::spawn().await;
    srv.post(
        "/auth/register",
        None,
        json!({"name": "Ana", "email": "ana@x.com", "password": "anapass"}),
    )
    .await;

    let (status_known, known) = srv
        .post("/auth/forgot-password", None, json!({"email": "ana@x.com"}))
        .await;
    let (status_unknown, unknown) = srv
        .post("/auth/forgot-password", None, json!({"email": "nobody@x.com"}))
        .await;
    assert_eq!(status_known, StatusCode::OK);
    assert_eq!(status_unknown, StatusCode::OK);
    assert_eq!(known, unknown);

    let (status, body) = srv
        .post("/auth/reset-password", None, json!({"token": "bogus", "password": "newpass"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
