use std::net::SocketAddr;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, chat, events, gate, state::AppState};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": concat!("v", env!("CARGO_PKG_VERSION")) }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .merge(auth::router())
        .merge(events::router())
        .merge(chat::router())
        .layer(middleware::from_fn_with_state(state.clone(), gate::enforce))
        .with_state(state.clone())
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chat::handlers::FALLBACK_REPLY,
        chat::repo::Role,
        config::{RateLimit, RateLimitConfig},
        testing::Fixture,
    };
    use axum::{
        body::Body,
        http::{HeaderMap, Request, StatusCode},
    };
    use tower::ServiceExt;

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            headers,
            body,
        }
    }

    fn app_with(reply: Option<&str>, limits: RateLimitConfig) -> (Router, Fixture) {
        let fixture = AppState::fake(reply, limits);
        (build_app(fixture.state.clone()), fixture)
    }

    fn app() -> (Router, Fixture) {
        app_with(Some("[]"), RateLimitConfig::default())
    }

    async fn register(app: &Router, username: &str) -> Reply {
        call(
            app,
            Method::POST,
            "/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "demo123"
            })),
        )
        .await
    }

    async fn token_for(app: &Router, username: &str) -> String {
        let res = register(app, username).await;
        assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
        res.body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_and_version_are_public() {
        let (app, _) = app();
        let res = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["status"], "ok");
        let res = call(&app, Method::GET, "/version", None, None).await;
        assert!(res.body["version"].as_str().unwrap().starts_with('v'));
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        let (app, _) = app();
        for (method, uri) in [
            (Method::GET, "/api/user"),
            (Method::GET, "/api/events"),
            (Method::POST, "/ai"),
        ] {
            let res = call(&app, method, uri, None, Some(json!({}))).await;
            assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(res.body["code"], "unauthenticated");
        }
    }

    #[tokio::test]
    async fn register_login_and_profile() {
        let (app, _) = app();
        let res = register(&app, "demo").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["success"], true);
        assert_eq!(res.body["user"]["timezone"], "UTC");

        let res = call(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({ "username": "demo", "password": "demo123" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        let token = res.body["access_token"].as_str().unwrap().to_string();

        let me = call(&app, Method::GET, "/api/user", Some(&token), None).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["username"], "demo");
        assert_eq!(me.body["email"], "demo@example.com");
        assert!(me.body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (app, fixture) = app();
        assert_eq!(register(&app, "demo").await.status, StatusCode::OK);
        let res = register(&app, "demo").await;
        assert_eq!(res.status, StatusCode::CONFLICT);
        assert_eq!(res.body["code"], "duplicate_key");
        assert_eq!(fixture.users.count(), 1);
    }

    #[tokio::test]
    async fn registration_requires_every_field() {
        let (app, _) = app();
        let res = call(
            &app,
            Method::POST,
            "/register",
            None,
            Some(json!({ "username": "demo", "password": "demo123" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["code"], "validation_error");
        assert_eq!(res.body["error"], "Missing email");
    }

    #[tokio::test]
    async fn bad_credentials_are_rejected() {
        let (app, _) = app();
        register(&app, "demo").await;
        let res = call(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({ "username": "demo", "password": "wrong" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["code"], "invalid_credentials");
    }

    #[tokio::test]
    async fn logout_revokes_the_session() {
        let (app, _) = app();
        let token = token_for(&app, "demo").await;
        let res = call(&app, Method::GET, "/logout", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["success"], true);

        let me = call(&app, Method::GET, "/api/user", Some(&token), None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);

        // Logging out without a session is harmless.
        let res = call(&app, Method::POST, "/logout", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_rotates_the_pair() {
        let (app, _) = app();
        let res = register(&app, "demo").await;
        let refresh = res.body["refresh_token"].as_str().unwrap().to_string();

        let res = call(
            &app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        let access = res.body["access_token"].as_str().unwrap().to_string();
        let me = call(&app, Method::GET, "/api/user", Some(&access), None).await;
        assert_eq!(me.status, StatusCode::OK);

        let again = call(
            &app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(again.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn timezone_can_be_updated() {
        let (app, _) = app();
        let token = token_for(&app, "demo").await;
        let res = call(
            &app,
            Method::PUT,
            "/api/user/timezone",
            Some(&token),
            Some(json!({ "timezone": "Europe/Berlin" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["timezone"], "Europe/Berlin");

        let bad = call(
            &app,
            Method::PUT,
            "/api/user/timezone",
            Some(&token),
            Some(json!({ "timezone": "not a zone!" })),
        )
        .await;
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn events_are_private_to_their_owner() {
        let (app, _) = app();
        let alice = token_for(&app, "alice").await;
        let bob = token_for(&app, "bob").await;

        let created = call(
            &app,
            Method::POST,
            "/api/events",
            Some(&alice),
            Some(json!({
                "title": "Dentist",
                "start": "2025-08-02T09:00:00",
                "end": "2025-08-02T10:00:00"
            })),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let id = created.body["event"]["id"].as_str().unwrap().to_string();
        assert_eq!(created.body["event"]["start"], "2025-08-02T09:00:00Z");

        let list = call(&app, Method::GET, "/api/events", Some(&alice), None).await;
        assert_eq!(list.body["events"].as_array().unwrap().len(), 1);
        let list = call(&app, Method::GET, "/api/events", Some(&bob), None).await;
        assert!(list.body["events"].as_array().unwrap().is_empty());

        let uri = format!("/api/events/{id}");
        let update = json!({
            "title": "Dentist (moved)",
            "start": "2025-08-03T09:00:00Z",
            "end": "2025-08-03T10:00:00Z"
        });
        let res = call(&app, Method::PUT, &uri, Some(&bob), Some(update.clone())).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        let res = call(&app, Method::PUT, &uri, Some(&alice), Some(update)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["event"]["title"], "Dentist (moved)");

        let res = call(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        let res = call(&app, Method::DELETE, &uri, Some(&alice), None).await;
        assert_eq!(res.status, StatusCode::OK);
        let list = call(&app, Method::GET, "/api/events", Some(&alice), None).await;
        assert!(list.body["events"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_returns_parsed_commands() {
        let reply = r#"Here: [{"command":"ADD","title":"Gym","start":"2025-08-01T18:00:00","end":"2025-08-01T19:00:00"}]"#;
        let (app, fixture) = app_with(Some(reply), RateLimitConfig::default());
        let token = token_for(&app, "demo").await;

        let res = call(
            &app,
            Method::POST,
            "/ai",
            Some(&token),
            Some(json!({ "input": "gym at 6pm" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["commands"][0]["command"], "ADD");

        let log = fixture.conversations.messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].1, Role::User);
        assert_eq!(log[1].1, Role::Assistant);
    }

    #[tokio::test]
    async fn chat_provider_failure_degrades_to_message() {
        let (app, fixture) = app_with(None, RateLimitConfig::default());
        let token = token_for(&app, "demo").await;

        let res = call(
            &app,
            Method::POST,
            "/ai",
            Some(&token),
            Some(json!({ "input": "hello" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(
            res.body["commands"],
            json!([{ "command": "MESSAGE", "text": FALLBACK_REPLY }])
        );
        assert_eq!(fixture.conversations.messages().len(), 1);
    }

    #[tokio::test]
    async fn chat_rejects_blank_input() {
        let (app, _) = app();
        let token = token_for(&app, "demo").await;
        let res = call(
            &app,
            Method::POST,
            "/ai",
            Some(&token),
            Some(json!({ "input": "  " })),
        )
        .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["error"], "No input");
    }

    #[tokio::test]
    async fn exhausted_quota_is_429_with_retry_after() {
        let limits = RateLimitConfig {
            default: RateLimit::new(2, 60),
            ..RateLimitConfig::default()
        };
        let (app, _) = app_with(Some("[]"), limits);
        let token = token_for(&app, "demo").await;

        for _ in 0..2 {
            let res = call(&app, Method::GET, "/api/user", Some(&token), None).await;
            assert_eq!(res.status, StatusCode::OK);
        }
        let res = call(&app, Method::GET, "/api/user", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.body["code"], "rate_limited");
        let retry: u64 = res.headers[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry));
    }

    #[tokio::test]
    async fn anonymous_over_quota_still_sees_unauthenticated() {
        let limits = RateLimitConfig {
            chat: RateLimit::new(1, 60),
            ..RateLimitConfig::default()
        };
        let (app, _) = app_with(Some("[]"), limits);
        for _ in 0..3 {
            let res = call(&app, Method::POST, "/ai", None, Some(json!({ "input": "hi" }))).await;
            assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn login_attempts_are_rate_limited() {
        let limits = RateLimitConfig {
            auth: RateLimit::new(2, 60),
            ..RateLimitConfig::default()
        };
        let (app, _) = app_with(Some("[]"), limits);
        let creds = json!({ "username": "ghost", "password": "x" });
        for _ in 0..2 {
            let res = call(&app, Method::POST, "/login", None, Some(creds.clone())).await;
            assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        }
        let res = call(&app, Method::POST, "/login", None, Some(creds)).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unknown_paths_fall_through_to_404() {
        let (app, _) = app();
        let res = call(&app, Method::GET, "/nowhere", None, None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }
    #[tokio::test]
    async fn concurrent_refresh_with_one_token_succeeds_once() {
        let (app, _) = app();
        let res = register(&app, "demo").await;
        let body = json!({ "refresh_token": res.body["refresh_token"] });

        let (a, b) = tokio::join!(
            call(&app, Method::POST, "/auth/refresh", None, Some(body.clone())),
            call(&app, Method::POST, "/auth/refresh", None, Some(body)),
        );
        let ok = [a.status, b.status]
            .iter()
            .filter(|s| **s == StatusCode::OK)
            .count();
        assert_eq!(ok, 1, "{:?} {:?}", a.status, b.status);
        assert!([a.status, b.status].contains(&StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn head_requests_pass_the_gate_and_spend_quota() {
        let limits = RateLimitConfig {
            default: RateLimit::new(1, 60),
            ..RateLimitConfig::default()
        };
        let (app, _) = app_with(Some("[]"), limits);
        let token = token_for(&app, "demo").await;

        let res = call(&app, Method::HEAD, "/api/user", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::OK);
        let res = call(&app, Method::HEAD, "/api/user", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        let res = call(&app, Method::GET, "/api/user", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);

        let res = call(&app, Method::HEAD, "/api/events", None, None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unrouted_method_on_known_path_is_refused() {
        let (app, _) = app();
        let token = token_for(&app, "demo").await;
        let res = call(&app, Method::PATCH, "/api/events", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.body["code"], "method_not_allowed");
        let res = call(&app, Method::GET, "/ai", None, None).await;
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_input_gets_the_json_error_body() {
        let (app, _) = app();
        let token = token_for(&app, "demo").await;

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/events")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "validation_error");

        let res = call(&app, Method::DELETE, "/api/events/not-a-uuid", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["code"], "validation_error");
    }

    #[tokio::test]
    async fn passwords_are_kept_exactly_as_sent() {
        let (app, _) = app();
        let res = call(
            &app,
            Method::POST,
            "/register",
            None,
            Some(json!({
                "username": "spaced",
                "email": "spaced@example.com",
                "password": "  secret  "
            })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);

        for (password, expected) in [
            ("secret", StatusCode::UNAUTHORIZED),
            ("  secret  ", StatusCode::OK),
        ] {
            let res = call(
                &app,
                Method::POST,
                "/login",
                None,
                Some(json!({ "username": "spaced", "password": password })),
            )
            .await;
            assert_eq!(res.status, expected, "{password:?}");
        }
    }
}
