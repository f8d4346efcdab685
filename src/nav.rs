use crate::api::types::{Agent, Creator, Execution};
use crate::api::{AgentCatalog, ExecutionApi};
use crate::error::{AppError, Result};
use crate::store::AgentCache;

/// A location in the storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Browse,
    AgentDetail(String),
    Creator(String),
    Execution(String),
    Dashboard,
    Credits,
    Login,
    Register,
    NotFound(String),
}

impl Route {
    /// Map a path like `/agents/abc?tab=reviews` to a route.
    pub fn parse(path: &str) -> Route {
        let without_query = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<String> = without_query
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect();

        match segments.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            [] => Route::Home,
            ["agents"] => Route::Browse,
            ["agents", id] => Route::AgentDetail(id.to_string()),
            ["creators", username] => Route::Creator(username.to_string()),
            ["executions", id] => Route::Execution(id.to_string()),
            ["dashboard"] => Route::Dashboard,
            ["credits"] => Route::Credits,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Browse => "/agents".to_string(),
            Route::AgentDetail(id) => format!("/agents/{}", urlencoding::encode(id)),
            Route::Creator(username) => format!("/creators/{}", urlencoding::encode(username)),
            Route::Execution(id) => format!("/executions/{}", urlencoding::encode(id)),
            Route::Dashboard => "/dashboard".to_string(),
            Route::Credits => "/credits".to_string(),
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::NotFound(path) => path.clone(),
        }
    }
}

/// What a route resolves to once its entity is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    Home,
    Browse,
    Agent(Box<Agent>),
    Creator(Box<Creator>),
    Execution(Box<Execution>),
    Dashboard,
    Credits,
    Login,
    Register,
    NotFound { path: String },
}

/// Load the entity behind a route. Missing entities become [`Page::NotFound`].
pub async fn resolve(
    route: &Route,
    catalog: &dyn AgentCatalog,
    executions: &dyn ExecutionApi,
    cache: &AgentCache,
) -> Result<Page> {
    let loaded = match route {
        Route::Home => Ok(Page::Home),
        Route::Browse => Ok(Page::Browse),
        Route::Dashboard => Ok(Page::Dashboard),
        Route::Credits => Ok(Page::Credits),
        Route::Login => Ok(Page::Login),
        Route::Register => Ok(Page::Register),
        Route::NotFound(path) => Ok(Page::NotFound { path: path.clone() }),
        Route::AgentDetail(id) => cache
            .get_or_fetch(catalog, id)
            .await
            .map(|a| Page::Agent(Box::new(a))),
        Route::Creator(username) => catalog
            .get_creator(username)
            .await
            .map(|c| Page::Creator(Box::new(c))),
        Route::Execution(id) => executions
            .get_execution(id)
            .await
            .map(|e| Page::Execution(Box::new(e))),
    };

    match loaded {
        Err(AppError::NotFound(detail)) => {
            tracing::debug!(route = %route.path(), detail = %detail, "Route target not found");
            Ok(Page::NotFound { path: route.path() })
        }
        other => other,
    }
}
