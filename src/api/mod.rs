//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api/v1` and speaks JSON. Read endpoints run
//! behind `optional_auth` so they can annotate results for a signed-in viewer;
//! write endpoints run behind `require_auth`.

pub mod articles;
pub mod auth;
pub mod comments;
pub mod middleware;
pub mod profile;
pub mod tags;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser, Viewer};

/// Build the `/api/v1` routes
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .route("/articles", post(articles::create_article))
        .route(
            "/articles/{id}",
            put(articles::update_article).delete(articles::delete_article),
        )
        .route("/articles/{id}/like", post(articles::toggle_like))
        .route("/articles/{id}/comments", post(comments::create_comment))
        .route("/auth/me", get(auth::me))
        .route(
            "/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public reads, annotated for the viewer when signed in
    let public_routes = Router::new()
        .route("/home", get(articles::home))
        .route("/articles", get(articles::list_articles))
        .route("/articles/{id}", get(articles::get_article))
        .route("/articles/{id}/likes/count", get(articles::like_count))
        .route("/articles/{id}/comments", get(comments::list_comments))
        .route("/tags", get(tags::list_tags))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ));

    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    public_routes.merge(protected_routes).merge(auth_routes)
}

/// Build the complete router with CORS and request tracing
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin without credentials. A concrete origin also allows
/// the session cookie.
fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origin == "*" {
        return base.allow_origin(AllowOrigin::any());
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => base.allow_origin(value).allow_credentials(true),
        Err(_) => {
            tracing::warn!("Invalid CORS origin '{}', allowing any origin", origin);
            base.allow_origin(AllowOrigin::any())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let mut config = Config::default();
        config.listing.page_size = 2;
        build_router(AppState::build(pool, &config), "*")
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(app: &Router, username: &str) -> String {
        let response = send(
            app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "secret123"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        let body = json_body(response).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert!(cookie.starts_with(&format!("session={};", token)));
        assert!(body["user"].get("password_hash").is_none());
        token
    }

    async fn create_article(app: &Router, token: &str, title: &str, tags: &[&str]) -> i64 {
        let response = send(
            app,
            Method::POST,
            "/api/v1/articles",
            Some(token),
            Some(json!({ "title": title, "content": "body text", "tags": tags })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["article"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_listing_pagination_and_sort_errors() {
        let app = test_app().await;
        let token = register(&app, "alice").await;
        for i in 0..3 {
            create_article(&app, &token, &format!("post {}", i), &["rust"]).await;
        }

        let response = send(&app, Method::GET, "/api/v1/articles", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["sort"], "newest");
        assert_eq!(body["articles"].as_array().unwrap().len(), 2);

        let body = json_body(send(&app, Method::GET, "/api/v1/articles?page=2&sort=oldest", None, None).await).await;
        assert_eq!(body["articles"].as_array().unwrap().len(), 1);
        assert_eq!(body["articles"][0]["article"]["title"], "post 2");

        let body = json_body(send(&app, Method::GET, "/api/v1/articles?page=abc", None, None).await).await;
        assert_eq!(body["page"], 1);

        let body = json_body(send(&app, Method::GET, "/api/v1/articles?tag=nope", None, None).await).await;
        assert_eq!(body["total_pages"], 0);
        assert!(body["articles"].as_array().unwrap().is_empty());

        let response = send(&app, Method::GET, "/api/v1/articles?sort=random", None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "UNSUPPORTED_SORT_MODE");
    }

    #[tokio::test]
    async fn test_like_flow_and_viewer_annotation() {
        let app = test_app().await;
        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;
        let id = create_article(&app, &alice, "likeable", &[]).await;

        let response = send(&app, Method::POST, &format!("/api/v1/articles/{}/like", id), Some(&bob), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "liked": true, "like_count": 1 }));

        let count = json_body(send(&app, Method::GET, &format!("/api/v1/articles/{}/likes/count", id), None, None).await).await;
        assert_eq!(count, json!({ "likes_count": 1 }));

        let detail = json_body(send(&app, Method::GET, &format!("/api/v1/articles/{}", id), Some(&bob), None).await).await;
        assert_eq!(detail["is_liked"], true);
        assert_eq!(detail["like_count"], 1);
        assert_eq!(detail["author"]["username"], "alice");

        let anonymous = json_body(send(&app, Method::GET, &format!("/api/v1/articles/{}", id), None, None).await).await;
        assert_eq!(anonymous["is_liked"], false);

        let popular = json_body(send(&app, Method::GET, "/api/v1/articles?sort=popular", Some(&bob), None).await).await;
        assert_eq!(popular["articles"][0]["is_liked"], true);

        let response = send(&app, Method::POST, "/api/v1/articles/999/like", Some(&bob), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_authorization_rules() {
        let app = test_app().await;
        let alice = register(&app, "alice").await;
        let bob = register(&app, "bob").await;
        let id = create_article(&app, &alice, "mine", &[]).await;

        let response = send(
            &app,
            Method::POST,
            "/api/v1/articles",
            None,
            Some(json!({ "title": "x", "content": "y" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let edit = json!({ "title": "changed", "content": "changed", "tags": ["edited"] });
        let response = send(&app, Method::PUT, &format!("/api/v1/articles/{}", id), Some(&bob), Some(edit.clone())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::PUT, &format!("/api/v1/articles/{}", id), Some(&alice), Some(edit)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["article"]["title"], "changed");
        assert_eq!(body["tags"][0]["name"], "edited");

        let response = send(&app, Method::DELETE, &format!("/api/v1/articles/{}", id), Some(&bob), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = send(&app, Method::DELETE, &format!("/api/v1/articles/{}", id), Some(&alice), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, Method::GET, &format!("/api/v1/articles/{}", id), None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_comments_tags_and_home() {
        let app = test_app().await;
        let token = register(&app, "carol").await;
        let id = create_article(&app, &token, "discussed", &["web", "db"]).await;

        let uri = format!("/api/v1/articles/{}/comments", id);
        let response = send(&app, Method::POST, &uri, Some(&token), Some(json!({ "content": "hello" }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = send(&app, Method::POST, &uri, Some(&token), Some(json!({ "content": "  " }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let comments = json_body(send(&app, Method::GET, &uri, None, None).await).await;
        assert_eq!(comments["comments"][0]["author_username"], "carol");

        let detail = json_body(send(&app, Method::GET, &format!("/api/v1/articles/{}", id), None, None).await).await;
        assert_eq!(detail["comments"].as_array().unwrap().len(), 1);

        let tags = json_body(send(&app, Method::GET, "/api/v1/tags", None, None).await).await;
        assert_eq!(tags["tags"][0]["name"], "db");
        assert_eq!(tags["tags"][1]["name"], "web");

        let home = json_body(send(&app, Method::GET, "/api/v1/home", None, None).await).await;
        assert_eq!(home["articles"].as_array().unwrap().len(), 1);
        assert_eq!(home["total_likes"], 0);
    }

    #[tokio::test]
    async fn test_login_profile_and_logout() {
        let app = test_app().await;
        let first = register(&app, "dave").await;
        create_article(&app, &first, "by dave", &[]).await;

        let response = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "dave", "password": "wrong-pass" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "dave", "password": "secret123" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(response).await["token"].as_str().unwrap().to_string();

        let me = json_body(send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await).await;
        assert_eq!(me["user"]["username"], "dave");

        let profile = json_body(send(&app, Method::GET, "/api/v1/profile", Some(&token), None).await).await;
        assert_eq!(profile["articles"].as_array().unwrap().len(), 1);

        let response = send(
            &app,
            Method::PUT,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "current_password": "secret123", "full_name": "Dave D" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"]["full_name"], "Dave D");

        let response = send(&app, Method::POST, "/api/v1/auth/logout", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));

        let response = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = send(&app, Method::GET, "/api/v1/auth/me", Some(&first), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let app = test_app().await;
        register(&app, "erin").await;

        let response = send(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "erin", "email": "other@example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
