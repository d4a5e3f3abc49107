mod auth;
mod cart;
mod extract;
mod products;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::require_auth;
use crate::auth::token::TokenSigner;
use crate::config::Config;
use crate::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: TokenSigner,
}

async fn health() -> &'static str {
    "ok"
}

pub fn create_router(state: AppState) -> Router {
    let limits = state.config.rate_limit;

    // Health checks: no rate limit
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health));

    // Auth: 10 requests per 60 seconds per IP
    let auth_routes = rate_limited(
        Router::new()
            .route("/api/auth/signup", post(auth::signup))
            .route("/api/auth/login", post(auth::login)),
        limits,
        6,
        10,
    );

    // Public catalog: 30 requests per 60 seconds per IP
    let public_catalog = rate_limited(
        Router::new()
            .route("/api/products", get(products::list))
            .route(
                "/api/products/{id}",
                get(products::get).delete(products::delete),
            )
            .route("/api/products/category/{category}", get(products::by_category))
            .route("/api/products/add", post(products::create_public)),
        limits,
        2,
        30,
    );

    // Protected API: 120 requests per 60 seconds per IP
    let protected = rate_limited(
        Router::new()
            .route("/api/auth/me", get(auth::me))
            .route("/api/products/owned/add", post(products::create_owned))
            .route("/api/cart", get(cart::list))
            .route("/api/cart/add", post(cart::add))
            .route("/api/cart/totalItemInCart", get(cart::total_items))
            .route("/api/cart/remove/{product_id}", delete(cart::remove))
            .route(
                "/api/cart/updateQuantity/{product_id}",
                put(cart::update_quantity),
            )
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth)),
        limits,
        2,
        120,
    );

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(public_catalog)
        .merge(protected)
        .with_state(state)
}

/// Wraps `router` in a per-IP limiter replenishing one request every
/// `per_second` seconds up to `burst`. Keys on the peer address, so the app
/// must be served with connect info.
fn rate_limited(
    router: Router<AppState>,
    enabled: bool,
    per_second: u64,
    burst: u32,
) -> Router<AppState> {
    if !enabled {
        return router;
    }

    match GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(burst)
        .finish()
    {
        Some(config) => router.layer(GovernorLayer::new(Arc::new(config))),
        None => {
            tracing::warn!(per_second, burst, "Invalid rate limit settings, limiter disabled");
            router
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::token::{INVALID_TOKEN_MESSAGE, MISSING_TOKEN_MESSAGE};
    use crate::db;

    fn test_app() -> Router {
        let config = Config {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            token_secret: "router-test-secret".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            db_pool_size: 1,
            store_timeout: Duration::from_secs(60),
            rate_limit: false,
        };
        let tokens = TokenSigner::new(&config.token_secret);
        create_router(AppState {
            db: db::test_pool(),
            config,
            tokens,
        })
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        send_request(app, request).await
    }

    async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn signup_and_login(app: &Router, handle: &str, mobile: &str) -> (String, String) {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({
                "fullname": format!("{handle} Example"),
                "username": handle,
                "password": "pw",
                "mobileNumber": mobile,
                "dateOfBirth": "2000-01-01",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let user_id = body["userId"].as_str().expect("userId").to_string();

        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": handle, "password": "pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["userId"], json!(user_id));
        assert!(body["issuedAt"].is_string());
        (user_id, body["token"].as_str().expect("token").to_string())
    }

    async fn add_public_product(app: &Router, name: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/products/add",
            None,
            Some(json!({
                "productName": name,
                "image": "https://img.example/p.png",
                "price": 12.5,
                "title": format!("{name} title"),
                "category": "kitchen",
                "description": "A thing",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["product"]["id"].as_str().expect("id").to_string()
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = test_app();
        let (status, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_login_cart_scenario() {
        let app = test_app();
        let p1 = add_public_product(&app, "kettle").await;
        let (user_id, token) = signup_and_login(&app, "alice", "5551234567").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(&token),
            Some(json!({ "productId": p1, "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["userId"], json!(user_id));
        assert_eq!(body["items"], json!([{ "productId": p1, "quantity": 1 }]));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(&token),
            Some(json!({ "productId": p1, "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["items"], json!([{ "productId": p1, "quantity": 3 }]));

        let (status, body) =
            send(&app, Method::GET, "/api/cart/totalItemInCart", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "count": 1 }));

        let (status, body) = send(
            &app,
            Method::DELETE,
            &format!("/api/cart/remove/{p1}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["message"], json!("Product removed from cart"));
        assert_eq!(body["cart"]["items"], json!([]));

        let (status, body) =
            send(&app, Method::GET, "/api/cart/totalItemInCart", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "count": 0 }));

        let (status, body) = send(&app, Method::GET, "/api/cart", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "items": [] }));
    }

    #[tokio::test]
    async fn update_quantity_overwrites_and_validates() {
        let app = test_app();
        let p1 = add_public_product(&app, "kettle").await;
        let (_, token) = signup_and_login(&app, "alice", "5551234567").await;
        let uri = format!("/api/cart/updateQuantity/{p1}");

        let (status, body) =
            send(&app, Method::PUT, &uri, Some(&token), Some(json!({ "quantity": 5 }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Cart not found" }));

        for quantity in [2, 3] {
            send(
                &app,
                Method::POST,
                "/api/cart/add",
                Some(&token),
                Some(json!({ "productId": p1, "quantity": quantity })),
            )
            .await;
        }

        let (status, body) =
            send(&app, Method::PUT, &uri, Some(&token), Some(json!({ "quantity": 5 }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["cart"]["items"], json!([{ "productId": p1, "quantity": 5 }]));

        let (status, body) =
            send(&app, Method::PUT, &uri, Some(&token), Some(json!({ "quantity": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Quantity must be greater than zero" }));
    }

    #[tokio::test]
    async fn cart_requires_a_valid_token() {
        let app = test_app();

        let (status, body) = send(&app, Method::GET, "/api/cart", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": MISSING_TOKEN_MESSAGE }));

        let (status, body) = send(&app, Method::GET, "/api/cart", Some("forged.token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": INVALID_TOKEN_MESSAGE }));

        let foreign = TokenSigner::new("someone-else").issue("user-x").expect("issue");
        let (status, _) = send(&app, Method::GET, "/api/cart", Some(&foreign.token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_authorization_is_invalid_not_missing() {
        let app = test_app();
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/cart")
            .header(header::AUTHORIZATION, "Basic YWxpY2U6cHc=")
            .body(Body::empty())
            .expect("request");

        let (status, body) = send_request(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": INVALID_TOKEN_MESSAGE }));
    }

    #[tokio::test]
    async fn unreadable_json_bodies_are_bad_requests() {
        let app = test_app();
        let (_, token) = signup_and_login(&app, "alice", "5551234567").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(&token),
            Some(json!({ "productId": "x", "quantity": "two" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .body(Body::from(r#"{"username":"alice","password":"pw"}"#))
            .expect("request");
        let (status, body) = send_request(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/products/add")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let (status, body) = send_request(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");
    }

    #[tokio::test]
    async fn cart_lookups_before_first_add() {
        let app = test_app();
        let (_, token) = signup_and_login(&app, "alice", "5551234567").await;

        let (status, body) = send(&app, Method::GET, "/api/cart", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Cart not found" }));

        let (status, body) =
            send(&app, Method::GET, "/api/cart/totalItemInCart", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "count": 0 }));

        let (status, _) =
            send(&app, Method::DELETE, "/api/cart/remove/anything", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn path_ids_match_the_stored_form() {
        let app = test_app();
        let p1 = add_public_product(&app, "kettle").await;
        let upper = p1.to_uppercase();
        let (_, token) = signup_and_login(&app, "alice", "5551234567").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(&token),
            Some(json!({ "productId": upper, "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["items"], json!([{ "productId": p1, "quantity": 2 }]));

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/cart/updateQuantity/{upper}"),
            Some(&token),
            Some(json!({ "quantity": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["cart"]["items"], json!([{ "productId": p1, "quantity": 4 }]));

        let (status, body) = send(
            &app,
            Method::DELETE,
            &format!("/api/cart/remove/{upper}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["cart"]["items"], json!([]));
    }

    #[tokio::test]
    async fn add_validates_product_reference() {
        let app = test_app();
        let (_, token) = signup_and_login(&app, "alice", "5551234567").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(&token),
            Some(json!({ "productId": "not-an-id", "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid product ID" }));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(&token),
            Some(json!({ "productId": uuid::Uuid::new_v4().to_string(), "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Product is not available" }));
    }

    #[tokio::test]
    async fn signup_and_login_failures() {
        let app = test_app();
        signup_and_login(&app, "alice", "5551234567").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({
                "fullname": "Other Alice",
                "handle": "alice",
                "password": "pw2",
                "mobileNumber": "5559999999",
                "dateOfBirth": "1999-05-05",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({ "handle": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, unknown) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "nobody", "password": "pw" })),
        )
        .await;
        let (_, wrong) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(unknown, wrong);
        assert_eq!(unknown, json!({ "error": "Invalid credentials" }));
    }

    #[tokio::test]
    async fn login_by_mobile_and_me() {
        let app = test_app();
        let (user_id, _) = signup_and_login(&app, "alice", "5551234567").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "5551234567", "password": "pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().expect("token").to_string();

        let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(user_id));
        assert_eq!(body["handle"], json!("alice"));
        assert!(body.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn catalog_routes() {
        let app = test_app();
        let kettle = add_public_product(&app, "kettle").await;
        add_public_product(&app, "pan").await;

        let (status, body) = send(&app, Method::GET, "/api/products", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().expect("array").len(), 2);

        let (status, body) =
            send(&app, Method::GET, &format!("/api/products/{kettle}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["productName"], json!("kettle"));
        assert_eq!(body["price"], json!(12.5));

        let (status, body) =
            send(&app, Method::GET, "/api/products/category/kitchen", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().expect("array").len(), 2);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/products/add",
            None,
            Some(json!({ "productName": "broken", "price": -3 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) =
            send(&app, Method::DELETE, &format!("/api/products/{kettle}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Product deleted successfully" }));

        let (status, body) =
            send(&app, Method::GET, &format!("/api/products/{kettle}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Product not found" }));
    }

    #[tokio::test]
    async fn owned_products_need_a_token_and_are_not_publicly_deletable() {
        let app = test_app();
        let product = json!({
            "productName": "lamp",
            "image": "https://img.example/lamp.png",
            "price": 30,
            "title": "Desk lamp",
            "category": "home",
            "description": "Bright",
        });

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/products/owned/add",
            None,
            Some(product.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (user_id, token) = signup_and_login(&app, "alice", "5551234567").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/products/owned/add",
            Some(&token),
            Some(product),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["product"]["ownerId"], json!(user_id));
        let id = body["product"]["id"].as_str().expect("id").to_string();

        let (status, _) =
            send(&app, Method::DELETE, &format!("/api/products/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
