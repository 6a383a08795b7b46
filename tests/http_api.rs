//! End-to-end: the API client against the router on a loopback port

use std::net::SocketAddr;
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

use e_library::account::{NewUser, Role};
use e_library::cache::AggregateCache;
use e_library::client::{
    ApiRequest, AuthenticatedGateway, Credentials, FORBIDDEN_MESSAGE, GatewayError,
    ReqwestTransport, TokenStore,
};
use e_library::config::{AppConfig, ClientConfig};
use e_library::db::{MemoryStore, UserStore};
use e_library::gateway::{build_router, state::AppState};
use e_library::storage::MemoryBlobStore;
use e_library::user_auth::TokenPair;

const CONFIG: &str = r#"
log_level: info
log_dir: ./logs
log_file: e_library.log
use_json: false
rotation: never
gateway:
  host: 127.0.0.1
  port: 0
auth:
  jwt_secret: integration-secret
  access_ttl_secs: 900
  refresh_ttl_secs: 3600
"#;

const PASSWORD: &str = "password123";

struct TestApp {
    base_url: String,
    store: Arc<MemoryStore>,
}

async fn spawn_app() -> TestApp {
    let config = AppConfig::from_yaml(CONFIG).unwrap();
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(
        &config,
        store.clone(),
        Arc::new(MemoryBlobStore::new()),
        AggregateCache::disabled(),
        None,
    ));
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        base_url: format!("http://{}/api/v1", addr),
        store,
    }
}

impl TestApp {
    fn client(&self) -> AuthenticatedGateway {
        let config = ClientConfig {
            api_base_url: self.base_url.clone(),
            ..ClientConfig::default()
        };
        let transport = Arc::new(ReqwestTransport::from_config(&config).unwrap());
        AuthenticatedGateway::new(transport, Arc::new(TokenStore::in_memory()), &config)
    }

    async fn seed_user(&self, email: &str, role: Role) -> Uuid {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(PASSWORD.as_bytes(), &salt)
            .unwrap()
            .to_string();
        let id = Uuid::new_v4();
        self.store
            .insert_user(&NewUser {
                id,
                email: email.to_string(),
                name: email.split('@').next().unwrap().to_string(),
                password_hash: hash,
                role,
            })
            .await
            .unwrap();
        id
    }

    async fn signed_in(&self, email: &str, role: Role) -> (AuthenticatedGateway, Uuid) {
        let id = self.seed_user(email, role).await;
        let client = self.client();
        client
            .login(&Credentials {
                email: email.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap();
        (client, id)
    }
}

fn expire_access_token(client: &AuthenticatedGateway) {
    let refresh_token = client.tokens().refresh_token().unwrap();
    client.tokens().set_tokens(&TokenPair {
        access_token: "expired.access.token".to_string(),
        refresh_token,
    });
}

#[tokio::test]
async fn qa_register_then_login_through_client() {
    let app = spawn_app().await;

    let http = reqwest::Client::new();
    let response = http
        .post(format!("{}/auth/register", app.base_url))
        .json(&json!({ "name": "Grace Hopper", "email": "grace@uni.edu", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let client = app.client();
    let session = client
        .login(&Credentials {
            email: "grace@uni.edu".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(session.user.role, Role::Student);

    let me: Value = client.get("/auth/me").await.unwrap();
    assert_eq!(me["email"], "grace@uni.edu");

    let wrong = app
        .client()
        .login(&Credentials {
            email: "grace@uni.edu".to_string(),
            password: "not-the-password".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(
        wrong,
        GatewayError::Unauthorized("Invalid email or password".to_string())
    );
}

#[tokio::test]
async fn qa_expired_access_token_is_refreshed_once() {
    let app = spawn_app().await;
    let (client, _) = app.signed_in("ada@uni.edu", Role::Student).await;
    let original_refresh = client.tokens().refresh_token().unwrap();

    expire_access_token(&client);
    let tasks = (0..6).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.execute(ApiRequest::get("/requests")).await })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }
    assert_eq!(client.refresh_count(), 1);

    // The old refresh token was rotated out
    let http = reqwest::Client::new();
    let replay = http
        .post(format!("{}/auth/refresh", app.base_url))
        .json(&json!({ "refreshToken": original_refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status().as_u16(), 401);
}

#[tokio::test]
async fn qa_revoked_session_redirects_to_login() {
    let app = spawn_app().await;
    let (client, _) = app.signed_in("alan@uni.edu", Role::Student).await;

    // Another device of the same user signs out; that revokes every session
    let http = reqwest::Client::new();
    let response = http
        .post(format!("{}/auth/logout", app.base_url))
        .bearer_auth(client.tokens().access_token().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    expire_access_token(&client);

    let err = client.execute(ApiRequest::get("/requests")).await.unwrap_err();
    assert_eq!(err.redirect(), Some("/login?redirect=%2Frequests"));
    assert!(!client.tokens().is_authenticated());
}

#[tokio::test]
async fn qa_client_logout_revokes_without_sending_refresh_token() {
    let app = spawn_app().await;
    let (client, _) = app.signed_in("barbara@uni.edu", Role::Student).await;
    let refresh_token = client.tokens().refresh_token().unwrap();

    client.logout().await;
    assert!(!client.tokens().is_authenticated());

    let http = reqwest::Client::new();
    let replay = http
        .post(format!("{}/auth/refresh", app.base_url))
        .json(&json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status().as_u16(), 401);

    let anonymous = http
        .post(format!("{}/auth/logout", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 401);
}

#[tokio::test]
async fn qa_error_classes_reach_the_caller() {
    let app = spawn_app().await;
    let (student, _) = app.signed_in("student@uni.edu", Role::Student).await;
    let (admin, admin_id) = app.signed_in("admin@uni.edu", Role::Admin).await;

    let err = student.execute(ApiRequest::get("/admin/metrics")).await.unwrap_err();
    assert_eq!(err, GatewayError::Forbidden(FORBIDDEN_MESSAGE.to_string()));

    let err = student
        .execute(ApiRequest::post("/requests").json(json!({
            "title": "Some Book",
            "reason": "short"
        })))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::Validation("Reason must be between 10 and 1000 characters".to_string())
    );

    let err = admin
        .execute(ApiRequest::new(
            reqwest::Method::DELETE,
            format!("/admin/users/{}", admin_id),
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::Api {
            status: 400,
            message: "Cannot delete your own account".to_string()
        }
    );

    let err = student
        .execute(ApiRequest::get(format!("/requests/{}", Uuid::new_v4())))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Api { status: 404, .. }));

    // None of these touched the refresh path
    assert_eq!(student.refresh_count(), 0);
    assert_eq!(admin.refresh_count(), 0);
}

#[tokio::test]
async fn qa_request_lifecycle_over_http() {
    let app = spawn_app().await;
    let (student, _) = app.signed_in("reader@uni.edu", Role::Student).await;
    let (admin, _) = app.signed_in("librarian@uni.edu", Role::Admin).await;

    let created: Value = student
        .post(
            "/requests",
            json!({
                "title": "Structure and Interpretation of Computer Programs",
                "reason": "Core text for the programming languages course"
            }),
        )
        .await
        .unwrap();
    assert_eq!(created["status"], "OPEN");
    let id = created["id"].as_str().unwrap().to_string();

    let updated = admin
        .execute(
            ApiRequest::new(reqwest::Method::PUT, format!("/requests/{}", id))
                .json(json!({ "status": "RESOLVED", "adminReply": "On the shelf" })),
        )
        .await
        .unwrap();
    assert_eq!(updated["status"], "RESOLVED");
    assert!(!updated["resolvedAt"].is_null());

    let stats: Value = admin.get("/requests/stats").await.unwrap();
    assert_eq!(stats["total"], 1);

    // Owner may no longer withdraw a processed request
    let err = student
        .execute(ApiRequest::new(
            reqwest::Method::DELETE,
            format!("/requests/{}", id),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::Forbidden(FORBIDDEN_MESSAGE.to_string()));
}

#[tokio::test]
async fn qa_public_routes_need_no_token() {
    let app = spawn_app().await;
    let http = reqwest::Client::new();

    let health: Value = http
        .get(format!("{}/health", app.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["code"], 0);
    assert_eq!(health["data"]["status"], "ok");

    let listing = http
        .get(format!("{}/resources?page=1&limit=5", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(listing.status().as_u16(), 200);

    let protected = http
        .get(format!("{}/requests", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(protected.status().as_u16(), 401);
}
