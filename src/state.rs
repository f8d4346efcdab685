use std::sync::Arc;

use crate::api::types::AgentQuery;
use crate::api::{AgentCatalog, HttpMarketplace};
use crate::config::AppConfig;
use crate::error::Result;
use crate::review::ReviewPoller;
use crate::store::{AgentCache, Favorites, SessionStore};

/// Everything a command needs, owned in one place.
pub struct AppState {
    pub config: AppConfig,
    pub api: Arc<HttpMarketplace>,
    pub session: Arc<SessionStore>,
    pub agents: AgentCache,
    pub favorites: Favorites,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let session = Arc::new(SessionStore::load(config.session_path()?)?);
        Self::with_session(config, session)
    }

    pub fn with_session(config: AppConfig, session: Arc<SessionStore>) -> Result<Self> {
        let api = Arc::new(HttpMarketplace::new(&config.api, Arc::clone(&session))?);

        Ok(Self {
            config,
            api,
            session,
            agents: AgentCache::new(),
            favorites: Favorites::new(),
        })
    }

    pub fn poller(&self) -> ReviewPoller {
        ReviewPoller::new(self.api.clone(), self.config.poll_interval())
    }

    /// Seed favorites from the server for the logged-in user.
    pub async fn load_favorites(&self) -> Result<()> {
        let Some(user) = self.session.user().await else {
            return Ok(());
        };

        let query = AgentQuery {
            favorited_by: Some(user.id.clone()),
            ..AgentQuery::default()
        };
        let page = self.api.list_agents(&query).await?;
        tracing::debug!(count = page.items.len(), "Loaded favorites");
        self.favorites
            .seed(page.items.iter().map(|a| a.id.clone()))
            .await;
        self.agents.insert_page(&page.items).await;
        Ok(())
    }
}
