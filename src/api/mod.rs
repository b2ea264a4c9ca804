mod audit;
pub mod auth;
mod books;
mod borrows;
mod error;
mod rate_limit;
mod reservations;
mod reviews;
mod settings;
mod stats;
mod users;
mod validation;

pub use rate_limit::RateLimiter;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Login and registration: public, but rate limited
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::auth_rate_limit,
        ));

    // Catalog browsing is open; mutations authenticate through the User
    // extractor and are gated on the librarian role in the handlers
    let catalog_routes = Router::new()
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .patch(books::update_book)
                .delete(books::delete_book),
        )
        .route(
            "/books/:id/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route(
            "/books/:id/reviews/:review_id",
            axum::routing::patch(reviews::update_review).delete(reviews::delete_review),
        );

    // Everything else requires a valid session
    let protected_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users", get(users::list_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/borrows",
            get(borrows::list_borrows).post(borrows::create_borrow),
        )
        .route("/borrows/:id", get(borrows::get_borrow))
        .route("/borrows/:id/return", post(borrows::return_borrow))
        // Legacy spelling kept as an alias of the same handler
        .route("/borrows/:id/mark_returned", post(borrows::return_borrow))
        .route(
            "/reserves",
            get(reservations::list_reservations).post(reservations::create_reservation),
        )
        .route("/reserves/:id/cancel", post(reservations::cancel_reservation))
        .route(
            "/settings",
            get(settings::get_settings).patch(settings::update_settings),
        )
        .route("/stats/library", get(stats::library_stats))
        .route("/stats/me", get(stats::my_stats))
        .route("/audit-logs", get(audit::list_logs))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", auth_routes.merge(catalog_routes).merge(protected_routes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let db = crate::db::test_pool().await;
        let mut config = Config::default();
        // Tests hammer the auth endpoints; do not trip the limiter
        config.rate_limit.enabled = false;
        auth::ensure_admin_user(&db, "admin@example.org", "Librarian1pass")
            .await
            .unwrap();
        let state = Arc::new(AppState::new(config, db));
        create_router(state)
    }

    async fn request(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn login(app: &Router, email: &str, password: &str) -> String {
        let (status, body) = request(
            app,
            "POST",
            "/api/login",
            None,
            Some(json!({"email": email, "password": password})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn register_reader(app: &Router, email: &str) -> String {
        let (status, body) = request(
            app,
            "POST",
            "/api/register",
            None,
            Some(json!({
                "name": "Test Reader",
                "email": email,
                "password": "readerpass1",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["role"], "Reader");
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let app = test_app().await;
        let (status, body) = request(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({"email": "admin@example.org", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = test_app().await;

        // Protected route without a token
        let (status, _) = request(&app, "GET", "/api/users/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Login grants access
        let token = login(&app, "admin@example.org", "Librarian1pass").await;
        let (status, body) = request(&app, "GET", "/api/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "admin@example.org");
        assert_eq!(body["role"], "Librarian");

        // Logout revokes the session
        let (status, _) = request(&app, "POST", "/api/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = request(&app, "GET", "/api/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_role_gating_on_catalog_mutations() {
        let app = test_app().await;
        let reader_token = register_reader(&app, "reader@example.org").await;
        let librarian_token = login(&app, "admin@example.org", "Librarian1pass").await;

        let new_book = json!({
            "title": "The Left Hand of Darkness",
            "author": "Ursula K. Le Guin",
            "isbn": "978-0-441-47812-5",
            "category": "Science Fiction",
            "shelf_location": "SF-12",
        });

        // A reader may not create books
        let (status, body) = request(
            &app,
            "POST",
            "/api/books",
            Some(&reader_token),
            Some(new_book.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["error"]["message"],
            "You do not have permission to perform this action"
        );

        // A librarian may
        let (status, created) = request(
            &app,
            "POST",
            "/api/books",
            Some(&librarian_token),
            Some(new_book),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "Available");

        // Settings writes are gated the same way
        let (status, _) = request(
            &app,
            "PATCH",
            "/api/settings",
            Some(&reader_token),
            Some(json!({"max_borrow_days": 14})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_created_book_appears_in_listing() {
        let app = test_app().await;
        let librarian_token = login(&app, "admin@example.org", "Librarian1pass").await;

        let (status, created) = request(
            &app,
            "POST",
            "/api/books",
            Some(&librarian_token),
            Some(json!({
                "title": "Snow Crash",
                "author": "Neal Stephenson",
                "isbn": "978-0-553-38095-8",
                "category": "Science Fiction",
                "shelf_location": "SF-03",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        // Catalog browsing needs no session
        let (status, listing) = request(&app, "GET", "/api/books?search=snow", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["count"], 1);
        assert_eq!(listing["results"][0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_borrow_and_return_flow() {
        let app = test_app().await;
        let librarian_token = login(&app, "admin@example.org", "Librarian1pass").await;
        let reader_token = register_reader(&app, "reader@example.org").await;

        let (_, book) = request(
            &app,
            "POST",
            "/api/books",
            Some(&librarian_token),
            Some(json!({
                "title": "Dune",
                "author": "Frank Herbert",
                "isbn": "978-0-441-17271-9",
                "category": "Science Fiction",
                "shelf_location": "SF-01",
            })),
        )
        .await;
        let book_id = book["id"].as_str().unwrap();

        let (status, borrow) = request(
            &app,
            "POST",
            "/api/borrows",
            Some(&reader_token),
            Some(json!({"book_id": book_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(borrow["status"], "Active");
        assert_eq!(borrow["fine"], 0.0);

        // The book is no longer available to a second reader
        let other_token = register_reader(&app, "other@example.org").await;
        let (status, _) = request(
            &app,
            "POST",
            "/api/borrows",
            Some(&other_token),
            Some(json!({"book_id": book_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Return through the legacy alias; the record closes
        let borrow_id = borrow["id"].as_str().unwrap();
        let (status, returned) = request(
            &app,
            "POST",
            &format!("/api/borrows/{}/mark_returned", borrow_id),
            Some(&reader_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(returned["status"], "Returned");

        // Double return is rejected
        let (status, body) = request(
            &app,
            "POST",
            &format!("/api/borrows/{}/return", borrow_id),
            Some(&reader_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Book already marked as returned.");

        // Readers only see their own records; librarians see all
        let (_, own) = request(&app, "GET", "/api/borrows", Some(&other_token), None).await;
        assert_eq!(own.as_array().unwrap().len(), 0);
        let (_, all) = request(&app, "GET", "/api/borrows", Some(&librarian_token), None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
    }
}
