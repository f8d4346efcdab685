use std::collections::HashSet;

use tokio::sync::RwLock;

use crate::api::AgentCatalog;
use crate::error::Result;

/// The user's favorited agent ids, updated optimistically.
#[derive(Default)]
pub struct Favorites {
    ids: RwLock<HashSet<String>>,
}

impl Favorites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace local membership with what the server reported.
    pub async fn seed<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = self.ids.write().await;
        set.clear();
        set.extend(ids);
    }

    pub async fn contains(&self, agent_id: &str) -> bool {
        self.ids.read().await.contains(agent_id)
    }

    pub async fn len(&self) -> usize {
        self.ids.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.read().await.is_empty()
    }

    /// Flip membership locally, then confirm with the backend.
    ///
    /// Returns the new membership. On failure the local flip is undone and
    /// the error is returned.
    pub async fn toggle(&self, catalog: &dyn AgentCatalog, agent_id: &str) -> Result<bool> {
        let favorited = {
            let mut set = self.ids.write().await;
            if set.remove(agent_id) {
                false
            } else {
                set.insert(agent_id.to_string());
                true
            }
        };

        match catalog.set_favorite(agent_id, favorited).await {
            Ok(confirmed) => {
                if confirmed != favorited {
                    tracing::debug!(
                        agent = agent_id,
                        confirmed,
                        "Backend disagreed with optimistic favorite state"
                    );
                    self.apply(agent_id, confirmed).await;
                }
                Ok(confirmed)
            }
            Err(e) => {
                tracing::warn!(agent = agent_id, error = %e, "Favorite toggle failed, rolling back");
                self.apply(agent_id, !favorited).await;
                Err(e)
            }
        }
    }

    async fn apply(&self, agent_id: &str, favorited: bool) {
        let mut set = self.ids.write().await;
        if favorited {
            set.insert(agent_id.to_string());
        } else {
            set.remove(agent_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::agents::tests::FakeCatalog;

    #[tokio::test]
    async fn test_toggle_twice_restores_membership() {
        let catalog = FakeCatalog::default();
        let favorites = Favorites::new();
        favorites.seed(["a1".to_string()]).await;

        assert!(!favorites.toggle(&catalog, "a1").await.unwrap());
        assert!(favorites.toggle(&catalog, "a1").await.unwrap());
        assert!(favorites.contains("a1").await);

        assert!(favorites.toggle(&catalog, "a2").await.unwrap());
        assert!(!favorites.toggle(&catalog, "a2").await.unwrap());
        assert!(!favorites.contains("a2").await);
        assert_eq!(favorites.len().await, 1);

        let calls = catalog.favorite_calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("a1".to_string(), false),
                ("a1".to_string(), true),
                ("a2".to_string(), true),
                ("a2".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_toggle_rolls_back() {
        let catalog = FakeCatalog {
            fail_favorites: true,
            ..FakeCatalog::default()
        };
        let favorites = Favorites::new();

        assert!(favorites.toggle(&catalog, "a1").await.is_err());
        assert!(!favorites.contains("a1").await);
        assert!(favorites.is_empty().await);
    }
}
