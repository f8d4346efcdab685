pub mod http;
pub mod types;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use types::*;

pub use http::HttpMarketplace;

/// Browsing and favoriting listings.
#[async_trait]
pub trait AgentCatalog: Send + Sync {
    /// List agents matching the given filters.
    async fn list_agents(&self, query: &AgentQuery) -> Result<Page<Agent>>;

    /// Fetch a single agent by id.
    async fn get_agent(&self, agent_id: &str) -> Result<Agent>;

    /// Fetch a creator's public profile.
    async fn get_creator(&self, username: &str) -> Result<Creator>;

    /// Mark or unmark an agent as a favorite. Returns the server-side state.
    async fn set_favorite(&self, agent_id: &str, favorited: bool) -> Result<bool>;
}

/// Running agents and the expert review workflow around executions.
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// Run an agent with the given inputs.
    async fn execute_agent(&self, agent_id: &str, inputs: &Map<String, Value>)
        -> Result<Execution>;

    /// Fetch an execution (also used to poll review status).
    async fn get_execution(&self, execution_id: &str) -> Result<Execution>;

    /// Ask for an expert review of an execution's output.
    async fn request_review(&self, execution_id: &str, request: &ReviewRequest)
        -> Result<Execution>;

    /// Answer a review request as the agent's creator.
    async fn respond_review(
        &self,
        execution_id: &str,
        response: &ReviewResponse,
    ) -> Result<Execution>;
}

/// Star ratings on agents.
#[async_trait]
pub trait RatingApi: Send + Sync {
    async fn list_reviews(&self, agent_id: &str) -> Result<Vec<AgentReview>>;

    async fn create_review(&self, review: &NewAgentReview) -> Result<AgentReview>;
}

/// Credit purchases and the transaction ledger.
#[async_trait]
pub trait CreditApi: Send + Sync {
    async fn purchase_credits(&self, amount: i64) -> Result<CreditBalance>;

    async fn list_transactions(&self) -> Result<Vec<CreditTransaction>>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthToken>;

    async fn register(&self, registration: &Registration) -> Result<AuthToken>;

    /// The currently authenticated user.
    async fn me(&self) -> Result<User>;
}

/// The full backend surface.
pub trait Marketplace: AgentCatalog + ExecutionApi + RatingApi + CreditApi + AuthApi {}

impl<T> Marketplace for T where T: AgentCatalog + ExecutionApi + RatingApi + CreditApi + AuthApi {}
