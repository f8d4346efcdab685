use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::ApiConfig;
use crate::error::{AppError, Result};
use crate::store::session::SessionStore;

use super::types::*;
use super::{AgentCatalog, AuthApi, CreditApi, ExecutionApi, RatingApi};

const GUEST_HEADER: &str = "X-Guest-Id";

/// REST client for the marketplace backend.
pub struct HttpMarketplace {
    client: Client,
    base_url: String,
    /// Static token from configuration, used instead of the session token.
    static_token: Option<String>,
    session: Arc<SessionStore>,
}

impl HttpMarketplace {
    pub fn new(config: &ApiConfig, session: Arc<SessionStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            static_token: config
                .token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach the bearer token, or the guest id when anonymous.
    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = match &self.static_token {
            Some(token) => Some(token.clone()),
            None => self.session.token().await,
        };
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder.header(GUEST_HEADER, self.session.guest_id().await),
        }
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send_with_query(method, path, &[], body).await
    }

    async fn send_with_query<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.dispatch(method, path, query, body).await?;
        Ok(response.json::<T>().await?)
    }

    /// Send a request and return the successful response with its body unread.
    async fn dispatch<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut builder = self.client.request(method.clone(), self.url(path));
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let builder = self.authorize(builder).await;

        tracing::debug!(method = %method, path = path, "Sending request");
        let response = builder.send().await?;
        self.check_status(path, response).await
    }

    async fn check_status(&self, path: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_error_detail(status, &body);

        match status {
            // Bad credentials on login/register say nothing about the stored session
            StatusCode::UNAUTHORIZED if is_credential_exchange(path) => {
                Err(AppError::Unauthorized(detail))
            }
            StatusCode::UNAUTHORIZED => {
                tracing::warn!(path = path, detail = %detail, "Backend rejected credentials, logging out");
                if let Err(e) = self.session.logout().await {
                    tracing::error!(error = %e, "Failed to clear session after 401");
                }
                Err(AppError::Unauthorized(detail))
            }
            StatusCode::NOT_FOUND => Err(AppError::NotFound(detail)),
            _ => {
                tracing::warn!(path = path, status = status.as_u16(), detail = %detail, "Request failed");
                Err(AppError::Api {
                    status: status.as_u16(),
                    detail,
                })
            }
        }
    }
}

fn is_credential_exchange(path: &str) -> bool {
    matches!(path, "/auth/login" | "/auth/register")
}

/// Favorite state from a favorite/unfavorite reply.
///
/// Empty or non-JSON bodies (e.g. `204 No Content`) confirm the requested state.
fn confirmed_favorite(body: &str, requested: bool) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("favorited").and_then(Value::as_bool))
        .unwrap_or(requested)
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Pull a human-readable message out of an error body.
///
/// Handles `{"detail": "..."}` and validation-style `{"detail": [{"msg": "..."}]}`.
pub fn extract_error_detail(status: StatusCode, body: &str) -> String {
    let fallback = || format!("Request failed with status {}", status.as_u16());

    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return fallback();
    };

    match parsed.get("detail") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                fallback()
            } else {
                messages.join("; ")
            }
        }
        _ => fallback(),
    }
}

#[async_trait]
impl AgentCatalog for HttpMarketplace {
    async fn list_agents(&self, query: &AgentQuery) -> Result<Page<Agent>> {
        self.send_with_query(Method::GET, "/agents", &query.to_pairs(), None::<&()>)
            .await
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        let path = format!("/agents/{}", segment(agent_id));
        self.send(Method::GET, &path, None::<&()>).await
    }

    async fn get_creator(&self, username: &str) -> Result<Creator> {
        let path = format!("/creators/{}", segment(username));
        self.send(Method::GET, &path, None::<&()>).await
    }

    async fn set_favorite(&self, agent_id: &str, favorited: bool) -> Result<bool> {
        let path = format!("/agents/{}/favorite", segment(agent_id));
        let method = if favorited { Method::POST } else { Method::DELETE };
        let response = self.dispatch(method, &path, &[], None::<&()>).await?;
        let body = response.text().await?;
        Ok(confirmed_favorite(&body, favorited))
    }
}

#[async_trait]
impl ExecutionApi for HttpMarketplace {
    async fn execute_agent(
        &self,
        agent_id: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Execution> {
        let path = format!("/agents/{}/execute", segment(agent_id));
        self.send(Method::POST, &path, Some(&ExecuteRequest { inputs }))
            .await
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Execution> {
        let path = format!("/executions/{}", segment(execution_id));
        self.send(Method::GET, &path, None::<&()>).await
    }

    async fn request_review(
        &self,
        execution_id: &str,
        request: &ReviewRequest,
    ) -> Result<Execution> {
        let path = format!("/executions/{}/request-review", segment(execution_id));
        self.send(Method::POST, &path, Some(request)).await
    }

    async fn respond_review(
        &self,
        execution_id: &str,
        response: &ReviewResponse,
    ) -> Result<Execution> {
        let path = format!("/executions/{}/respond-review", segment(execution_id));
        self.send(Method::POST, &path, Some(response)).await
    }
}

#[async_trait]
impl RatingApi for HttpMarketplace {
    async fn list_reviews(&self, agent_id: &str) -> Result<Vec<AgentReview>> {
        self.send_with_query(
            Method::GET,
            "/reviews",
            &[("agent_id", agent_id.to_string())],
            None::<&()>,
        )
        .await
    }

    async fn create_review(&self, review: &NewAgentReview) -> Result<AgentReview> {
        if !(1..=5).contains(&review.rating) {
            return Err(AppError::Validation(format!(
                "rating must be between 1 and 5, got {}",
                review.rating
            )));
        }
        self.send(Method::POST, "/reviews", Some(review)).await
    }
}

#[async_trait]
impl CreditApi for HttpMarketplace {
    async fn purchase_credits(&self, amount: i64) -> Result<CreditBalance> {
        if amount <= 0 {
            return Err(AppError::Validation(format!(
                "purchase amount must be positive, got {amount}"
            )));
        }
        self.send(
            Method::POST,
            "/credits/purchase",
            Some(&json!({ "amount": amount })),
        )
        .await
    }

    async fn list_transactions(&self) -> Result<Vec<CreditTransaction>> {
        self.send(Method::GET, "/credits/transactions", None::<&()>)
            .await
    }
}

#[async_trait]
impl AuthApi for HttpMarketplace {
    async fn login(&self, credentials: &Credentials) -> Result<AuthToken> {
        self.send(Method::POST, "/auth/login", Some(credentials)).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthToken> {
        self.send(Method::POST, "/auth/register", Some(registration))
            .await
    }

    async fn me(&self) -> Result<User> {
        self.send(Method::GET, "/auth/me", None::<&()>).await
    }
}
