use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Json, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Map, Value};

use agentmart::api::types::{
    AgentQuery, Credentials, NewAgentReview, ReviewPriority, ReviewRequest, ReviewStatus,
};
use agentmart::api::{AgentCatalog, AuthApi, CreditApi, ExecutionApi, HttpMarketplace, RatingApi};
use agentmart::config::ApiConfig;
use agentmart::error::AppError;
use agentmart::nav::{self, Page, Route};
use agentmart::store::{AgentCache, Favorites, SessionStore};

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn client(base_url: &str, session: Arc<SessionStore>) -> HttpMarketplace {
    let config = ApiConfig {
        base_url: format!("{base_url}/"),
        timeout_secs: 5,
        token: None,
    };
    HttpMarketplace::new(&config, session).unwrap()
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn test_list_agents_sends_filters_and_guest_id() {
    let seen: Arc<Mutex<Option<(HashMap<String, String>, HeaderMap)>>> = Arc::default();
    let captured = Arc::clone(&seen);
    let router = Router::new().route(
        "/api/agents",
        get(move |headers: HeaderMap, Query(query): Query<HashMap<String, String>>| {
            let captured = Arc::clone(&captured);
            async move {
                *captured.lock().unwrap() = Some((query, headers));
                Json(json!({
                    "items": [
                        {"id": "a1", "name": "Summarizer", "rating": 4.5},
                        {"id": "a2", "name": "SQL Helper"}
                    ],
                    "total": 2
                }))
            }
        }),
    );
    let base = spawn_backend(router).await;
    let session = Arc::new(SessionStore::in_memory());
    let api = client(&base, Arc::clone(&session));

    let query = AgentQuery {
        category: Some("writing".to_string()),
        sort_by: Some("popular".to_string()),
        limit: Some(10),
        ..AgentQuery::default()
    };
    let page = api.list_agents(&query).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, Some(2));

    let (params, headers) = seen.lock().unwrap().take().unwrap();
    assert_eq!(params.get("category").map(String::as_str), Some("writing"));
    assert_eq!(params.get("sort_by").map(String::as_str), Some("popular"));
    assert_eq!(params.get("limit").map(String::as_str), Some("10"));
    assert!(!params.contains_key("search"));
    assert_eq!(header(&headers, "x-guest-id"), Some(session.guest_id().await));
    assert!(header(&headers, "authorization").is_none());
}

#[tokio::test]
async fn test_unauthorized_clears_persisted_session() {
    let router = Router::new().route(
        "/api/auth/me",
        get(|headers: HeaderMap| async move {
            assert_eq!(
                header(&headers, "authorization").as_deref(),
                Some("Bearer stale-token")
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Could not validate credentials"})),
            )
        }),
    );
    let base = spawn_backend(router).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let session = Arc::new(SessionStore::load(&path).unwrap());
    session.set_token("stale-token".to_string()).await.unwrap();
    let api = client(&base, Arc::clone(&session));

    let err = api.me().await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(ref d) if d == "Could not validate credentials"));
    assert!(session.token().await.is_none());

    let reloaded = SessionStore::load(&path).unwrap();
    assert!(reloaded.token().await.is_none());
}

#[tokio::test]
async fn test_error_detail_surfaces() {
    let router = Router::new().route(
        "/api/credits/purchase",
        post(|| async {
            (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({"detail": "Payment method declined"})),
            )
        }),
    );
    let base = spawn_backend(router).await;
    let api = client(&base, Arc::new(SessionStore::in_memory()));

    match api.purchase_credits(100).await {
        Err(AppError::Api { status, detail }) => {
            assert_eq!(status, 402);
            assert_eq!(detail, "Payment method declined");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_execute_and_request_review() {
    let review_body: Arc<Mutex<Option<Value>>> = Arc::default();
    let captured = Arc::clone(&review_body);
    let router = Router::new()
        .route(
            "/api/agents/:id/execute",
            post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({
                    "id": "e1",
                    "agent_id": id,
                    "status": "completed",
                    "outputs": {"echo": body["inputs"]["topic"]},
                    "review_status": null
                }))
            }),
        )
        .route(
            "/api/executions/:id/request-review",
            post(move |Path(id): Path<String>, Json(body): Json<Value>| {
                let captured = Arc::clone(&captured);
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({
                        "id": id,
                        "status": "completed",
                        "outputs": "draft",
                        "review_status": "pending"
                    }))
                }
            }),
        );
    let base = spawn_backend(router).await;
    let api = client(&base, Arc::new(SessionStore::in_memory()));

    let mut inputs = Map::new();
    inputs.insert("topic".to_string(), json!("rust"));
    let execution = api.execute_agent("a1", &inputs).await.unwrap();
    assert_eq!(execution.agent_id.as_deref(), Some("a1"));
    assert_eq!(execution.outputs, json!({"echo": "rust"}));
    assert_eq!(execution.review_status, ReviewStatus::None);

    let request = ReviewRequest {
        note: "tighten wording".to_string(),
        priority: Some(ReviewPriority::High),
    };
    let execution = api.request_review("e1", &request).await.unwrap();
    assert_eq!(execution.review_status, ReviewStatus::Pending);
    assert_eq!(
        review_body.lock().unwrap().take().unwrap(),
        json!({"note": "tighten wording", "priority": "high"})
    );
}

#[tokio::test]
async fn test_missing_agent_resolves_to_not_found_page() {
    let router = Router::new().route(
        "/api/agents/:id",
        get(|Path(id): Path<String>| async move {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"detail": format!("Agent {id} not found")})),
            )
        }),
    );
    let base = spawn_backend(router).await;
    let api = client(&base, Arc::new(SessionStore::in_memory()));

    let err = api.get_agent("ghost").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref d) if d == "Agent ghost not found"));

    let page = nav::resolve(&Route::parse("/agents/ghost"), &api, &api, &AgentCache::new())
        .await
        .unwrap();
    assert_eq!(
        page,
        Page::NotFound {
            path: "/agents/ghost".to_string()
        }
    );
}

#[tokio::test]
async fn test_invalid_rating_never_hits_backend() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new().route(
        "/api/reviews",
        post(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::CREATED
            }
        }),
    );
    let base = spawn_backend(router).await;
    let api = client(&base, Arc::new(SessionStore::in_memory()));

    let review = NewAgentReview {
        agent_id: "a1".to_string(),
        rating: 6,
        comment: None,
    };
    assert!(matches!(
        api.create_review(&review).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        api.purchase_credits(0).await,
        Err(AppError::Validation(_))
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wrong_password_keeps_session_and_detail() {
    let router = Router::new().route(
        "/api/auth/login",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Incorrect email or password"})),
            )
        }),
    );
    let base = spawn_backend(router).await;
    let session = Arc::new(SessionStore::in_memory());
    session.set_token("current-token".to_string()).await.unwrap();
    let api = client(&base, Arc::clone(&session));

    let credentials = Credentials {
        email: "ada@example.com".to_string(),
        password: "wrong".to_string(),
    };
    let err = api.login(&credentials).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(ref d) if d == "Incorrect email or password"));
    assert_eq!(session.token().await.as_deref(), Some("current-token"));
}

#[tokio::test]
async fn test_favorite_toggle_accepts_no_content() {
    let router = Router::new().route(
        "/api/agents/:id/favorite",
        post(|| async { StatusCode::NO_CONTENT }).delete(|| async { StatusCode::NO_CONTENT }),
    );
    let base = spawn_backend(router).await;
    let api = client(&base, Arc::new(SessionStore::in_memory()));
    let favorites = Favorites::new();

    assert!(favorites.toggle(&api, "a1").await.unwrap());
    assert!(favorites.contains("a1").await);

    assert!(!favorites.toggle(&api, "a1").await.unwrap());
    assert!(!favorites.contains("a1").await);
}
