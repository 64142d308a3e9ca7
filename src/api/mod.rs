pub mod auth;
mod connections;
mod directory;
pub mod error;
mod feed;
mod messages;
pub mod metrics;
pub mod rate_limit;
pub mod validation;
mod ws;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Signup, verification and login share the tight auth tier
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/signup/verify", post(auth::verify))
        .route("/login", post(auth::login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let api_routes = Router::new()
        .route("/auth/me", get(auth::me))
        // Connections
        .route("/connections/request", post(connections::create_request))
        .route("/connections/respond", post(connections::respond))
        .route("/connections/received/:alumni_id", get(connections::received))
        .route("/connections/my/:student_id", get(connections::my_connections))
        .route("/connections/requested/:student_id", get(connections::requested))
        .route(
            "/connections/alumni/notifications/:alumni_id",
            get(connections::alumni_notifications),
        )
        .route(
            "/connections/student/notifications/:student_id",
            get(connections::student_notifications),
        )
        .route(
            "/connections/alumni/notifications/seen",
            post(connections::alumni_seen),
        )
        .route(
            "/connections/student/notifications/seen",
            post(connections::student_seen),
        )
        // Messages
        .route("/messages/send", post(messages::send))
        .route(
            "/messages/conversation/:student_id/:alumni_id",
            get(messages::conversation),
        )
        .route(
            "/messages/conversations/alumni/:alumni_id",
            get(messages::alumni_conversations),
        )
        .route("/messages/ws", get(ws::messages_ws))
        // Directory
        .route("/alumni", get(directory::list_alumni))
        .route("/alumni/all-ids", get(directory::alumni_ids))
        .route(
            "/alumni/me",
            get(directory::alumni_me).put(directory::update_alumni_me),
        )
        .route("/alumni/posts", post(feed::create_post))
        .route("/alumni/:id", get(directory::get_alumni))
        .route("/student/me", get(directory::student_me))
        .route("/student/me/password", post(directory::change_password))
        .route("/student/:id", get(directory::get_student))
        // Feed and Q&A
        .route("/posts", get(feed::list_posts).post(feed::create_post))
        .route("/posts/:id", delete(feed::delete_post))
        .route("/posts/:id/like", post(feed::like_post))
        .route("/posts/:id/comment", post(feed::comment_post))
        .route(
            "/qna/questions",
            get(feed::list_questions).post(feed::ask_question),
        )
        .route("/qna/questions/:id/answers", post(feed::answer_question))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .merge(auth_routes)
        .merge(api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the browser client. No configured origins means any origin.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{Identity, Profile};
    use crate::notifications::{OtpDispatcher, OtpMessage};
    use crate::store::{IdentityStore, MemoryStore, Stores};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::RETRY_AFTER, Request, StatusCode};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Keeps the last code sent to each address
    #[derive(Default)]
    struct CapturingDispatcher {
        codes: Mutex<Vec<(String, String)>>,
    }

    impl CapturingDispatcher {
        fn code_for(&self, email: &str) -> Option<String> {
            self.codes
                .lock()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl OtpDispatcher for CapturingDispatcher {
        async fn send_otp(&self, message: &OtpMessage<'_>) -> anyhow::Result<()> {
            self.codes
                .lock()
                .push((message.to_email.to_string(), message.code.to_string()));
            Ok(())
        }
    }

    struct TestApp {
        state: Arc<AppState>,
        dispatcher: Arc<CapturingDispatcher>,
    }

    impl TestApp {
        async fn new() -> Self {
            Self::with_config(Config::default()).await
        }

        async fn with_config(config: Config) -> Self {
            let store = Arc::new(MemoryStore::new());
            for (id, profile) in [
                ("s1", Profile::Student { roster_id: "PRN001".into() }),
                ("a1", Profile::Alumni { graduation_year: Some("2018".into()) }),
            ] {
                store
                    .insert_identity(&Identity {
                        id: id.into(),
                        email: format!("{}@example.edu", id),
                        name: format!("Member {}", id),
                        password_hash: "x".into(),
                        profile,
                        created_at: crate::db::timestamp_now(),
                    })
                    .await
                    .unwrap();
            }

            let dispatcher = Arc::new(CapturingDispatcher::default());
            let state = Arc::new(AppState::new(
                config,
                Stores::from_backend(store),
                dispatcher.clone(),
            ));
            Self { state, dispatcher }
        }

        async fn token_for(&self, id: &str) -> String {
            let identity = self
                .state
                .stores
                .identities
                .find_by_id(id)
                .await
                .unwrap()
                .unwrap();
            self.state.sessions.issue(&identity).unwrap()
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
            let response = create_router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, headers, body)
        }

        async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json");
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {}", token));
            }
            let (status, _, body) = self
                .send(builder.body(Body::from(body.to_string())).unwrap())
                .await;
            (status, body)
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            let mut builder = Request::builder().uri(uri);
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {}", token));
            }
            let (status, _, body) = self.send(builder.body(Body::empty()).unwrap()).await;
            (status, body)
        }
    }

    fn alumni_signup() -> Value {
        json!({
            "name": "Meera Nair",
            "email": "Meera@Example.com",
            "password": "correct horse",
            "role": "alumni",
            "passout": "2019"
        })
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        let mut config = ServerConfig::default();
        config.cors_origins = vec!["http://localhost:5173".to_string(), "bad\norigin".to_string()];
        // Invalid entries are skipped rather than failing startup
        let _ = cors_layer(&config);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }

    #[tokio::test]
    async fn test_signup_then_verify_over_http() {
        let app = TestApp::new().await;

        let (status, body) = app.post("/signup", alumni_signup(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requiresOTP"], true);
        assert_eq!(body["email"], "meera@example.com");

        let code = app.dispatcher.code_for("meera@example.com").unwrap();
        let (status, body) = app
            .post(
                "/signup/verify",
                json!({"email": "meera@example.com", "otp": code}),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(body["identity"]["role"], "alumni");
        assert_eq!(body["identity"]["graduationYear"], "2019");

        // The code is single use
        let (status, body) = app
            .post(
                "/signup/verify",
                json!({"email": "meera@example.com", "code": code}),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_or_expired_code");
    }

    #[tokio::test]
    async fn test_signup_validation_uses_error_envelope() {
        let app = TestApp::new().await;
        let mut body = alumni_signup();
        body["role"] = json!("janitor");

        let (status, body) = app.post("/signup", body, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["role"].is_array());
    }

    #[tokio::test]
    async fn test_verify_budget_is_enforced_per_email() {
        let mut config = Config::default();
        config.rate_limit.verify_attempts_per_window = 2;
        let app = TestApp::with_config(config).await;

        let guess = json!({"email": "meera@example.com", "code": "000000"});
        for _ in 0..2 {
            let (status, _) = app.post("/signup/verify", guess.clone(), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let request = Request::builder()
            .method("POST")
            .uri("/signup/verify")
            .header("content-type", "application/json")
            .body(Body::from(guess.to_string()))
            .unwrap();
        let (status, headers, body) = app.send(request).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(headers.contains_key(RETRY_AFTER));
        assert_eq!(body["error"]["code"], "too_many_requests");

        // Another address still has its own budget
        let (status, _) = app
            .post("/signup/verify", json!({"email": "other@example.com", "code": "1"}), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_connection_conflicts_are_409() {
        let app = TestApp::new().await;
        let pair = json!({"fromStudent": "s1", "toAlumni": "a1"});

        let (status, body) = app.post("/connections/request", pair.clone(), None).await;
        assert_eq!(status, StatusCode::OK);
        let request_id = body["request"]["id"].as_str().unwrap().to_string();

        let (status, body) = app.post("/connections/request", pair, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "duplicate_request");

        let respond = json!({"requestId": request_id, "action": "accept"});
        let (status, body) = app.post("/connections/respond", respond.clone(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["status"], "accepted");

        let (status, body) = app.post("/connections/respond", respond, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "already_resolved");

        let (status, body) = app
            .post(
                "/connections/respond",
                json!({"requestId": "missing", "action": "accept"}),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_seen_routes_take_precedence_over_party_ids() {
        let app = TestApp::new().await;
        app.post(
            "/connections/request",
            json!({"fromStudent": "s1", "toAlumni": "a1"}),
            None,
        )
        .await;

        let (status, body) = app.get("/connections/alumni/notifications/a1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        // `seen` is a POST route of its own, not an alumni id
        let (status, body) = app
            .post("/connections/alumni/notifications/seen", json!({"alumniId": "a1"}), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 1);

        let (_, body) = app.get("/connections/alumni/notifications/a1", None).await;
        assert!(body.as_array().unwrap().is_empty());

        let (status, body) = app
            .post("/connections/student/notifications/seen", json!({"partyId": "s1"}), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["updated"], 0);
    }

    #[tokio::test]
    async fn test_directory_routes() {
        let app = TestApp::new().await;

        let (status, body) = app.get("/alumni", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "a1");
        assert!(body[0].get("passwordHash").is_none());

        let (_, body) = app.get("/alumni/all-ids", None).await;
        assert_eq!(body, json!(["a1"]));

        let (status, _) = app.get("/alumni/s1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.get("/alumni/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let alumni = app.token_for("a1").await;
        let request = Request::builder()
            .method("PUT")
            .uri("/alumni/me")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", alumni))
            .body(Body::from(json!({"skills": "rust, sql", "company": "Acme"}).to_string()))
            .unwrap();
        let (status, _, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["skills"], json!(["rust", "sql"]));

        let (_, body) = app.get("/alumni/me", Some(&alumni)).await;
        assert_eq!(body["company"], "Acme");

        let student = app.token_for("s1").await;
        let (status, _) = app.get("/alumni/me", Some(&student)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (_, body) = app.get("/student/me", Some(&student)).await;
        assert_eq!(body["rosterId"], "PRN001");
        let (_, body) = app.get("/student/s1", None).await;
        assert_eq!(body, json!({"id": "s1", "name": "Member s1", "img": ""}));
    }

    #[tokio::test]
    async fn test_feed_routes_act_as_session_holder() {
        let app = TestApp::new().await;
        let alumni = app.token_for("a1").await;
        let student = app.token_for("s1").await;

        let (status, _) = app
            .post("/posts", json!({"content": "Hiring"}), Some(&student))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, post) = app
            .post("/alumni/posts", json!({"content": "Hiring"}), Some(&alumni))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let post_id = post["id"].as_str().unwrap().to_string();

        let like = format!("/posts/{}/like", post_id);
        let (status, body) = app.post(&like, json!({}), Some(&student)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"likes": 1, "likedBy": ["s1"]}));
        let (status, body) = app.post(&like, json!({}), Some(&student)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "already_liked");

        let (_, feed) = app.get("/posts", Some(&student)).await;
        assert_eq!(feed[0]["author"]["name"], "Member a1");

        let (status, question) = app
            .post("/qna/questions", json!({"questionText": "Tips?"}), Some(&student))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let answers = format!("/qna/questions/{}/answers", question["id"].as_str().unwrap());
        let (status, body) = app
            .post(&answers, json!({"text": "Practice"}), Some(&alumni))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answers"][0]["answeredByName"], "Member a1");

        let (_, questions) = app.get("/qna/questions?limit=5", Some(&student)).await;
        assert_eq!(questions.as_array().unwrap().len(), 1);
    }
}
